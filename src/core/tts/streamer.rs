//! Forwards synthesized audio to the caller chunk by chunk, with cooperative
//! cancellation for barge-in.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::base::{SynthesisError, Synthesizer};
use crate::core::latency::{LatencyStage, LatencyTracker};

/// Destination for outbound audio, normally the call transport.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Deliver one chunk. An error means the destination is gone.
    async fn send_audio(&self, chunk: Bytes) -> Result<(), SynthesisError>;
}

/// Text to speak plus a single-use cancellation token.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    text: String,
    token: CancellationToken,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            token: CancellationToken::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Stop the stream. Calling this again is a no-op.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisOutcome {
    Completed { chunks: usize, bytes: usize },
    /// Stopped by the request's token; chunks already sent stay sent.
    Cancelled { chunks: usize },
    Failed(SynthesisError),
}

impl SynthesisOutcome {
    /// The sink rejected audio, so the transport is gone.
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, SynthesisOutcome::Failed(SynthesisError::SinkClosed(_)))
    }
}

pub struct SpeechStreamer {
    synthesizer: Arc<dyn Synthesizer>,
}

impl SpeechStreamer {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self { synthesizer }
    }

    /// Speak `request` into `sink`, forwarding each chunk as it arrives.
    ///
    /// Never returns an error: backend problems come back as
    /// [`SynthesisOutcome::Failed`] and the utterance is dropped.
    pub async fn speak(
        &self,
        request: &SynthesisRequest,
        sink: &dyn AudioSink,
        latency: &LatencyTracker,
    ) -> SynthesisOutcome {
        let started = Instant::now();
        let token = &request.token;
        let mut first_chunk = Some(LatencyTracker::start_at(
            LatencyStage::TtsFirstChunk,
            started,
        ));

        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Synthesis cancelled before the backend answered");
                return SynthesisOutcome::Cancelled { chunks: 0 };
            }
            result = self.synthesizer.synthesize_stream(request.text()) => result,
        };
        let mut stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(provider = self.synthesizer.provider_info(), error = %e, "Synthesis request failed");
                return SynthesisOutcome::Failed(e);
            }
        };

        let mut chunks = 0;
        let mut bytes = 0;
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!(chunks, "Synthesis cancelled mid-stream");
                    return SynthesisOutcome::Cancelled { chunks };
                }
                item = stream.next() => item,
            };

            let chunk = match next {
                None => break,
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    warn!(chunks, error = %e, "Synthesis stream failed");
                    return SynthesisOutcome::Failed(e);
                }
            };
            if token.is_cancelled() {
                return SynthesisOutcome::Cancelled { chunks };
            }

            let len = chunk.len();
            if let Err(e) = sink.send_audio(chunk).await {
                return SynthesisOutcome::Failed(e);
            }
            chunks += 1;
            bytes += len;
            if let Some(handle) = first_chunk.take() {
                latency.end(handle);
            }
        }

        latency.end_with(
            LatencyTracker::start_at(LatencyStage::TtsTotal, started),
            Some(format!("chunks={chunks} bytes={bytes}")),
        );
        debug!(chunks, bytes, "Synthesis complete");
        SynthesisOutcome::Completed { chunks, bytes }
    }
}
