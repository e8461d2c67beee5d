//! Telephony media-stream frames and the outbound half of the transport.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::errors::TransportError;
use crate::core::tts::{AudioSink, SynthesisError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInfo {
    #[serde(alias = "streamId")]
    pub stream_sid: String,
    #[serde(alias = "callId")]
    pub call_sid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded audio
    pub payload: String,
}

/// Inbound transport event, tagged by `event`. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TransportEvent {
    Connected,
    Start { start: StartInfo },
    Media { media: MediaPayload },
    Stop,
    Mark,
    #[serde(other)]
    Unknown,
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Connected => "connected",
            TransportEvent::Start { .. } => "start",
            TransportEvent::Media { .. } => "media",
            TransportEvent::Stop => "stop",
            TransportEvent::Mark => "mark",
            TransportEvent::Unknown => "unknown",
        }
    }
}

/// Outbound transport frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutboundFrame {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    /// Discard any audio the carrier has buffered for playback
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl OutboundFrame {
    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Encode(e.to_string()))
    }
}

/// Writes frames for one stream onto the transport's outbound channel.
#[derive(Debug, Clone)]
pub struct TransportSink {
    tx: mpsc::Sender<OutboundFrame>,
    stream_sid: String,
}

impl TransportSink {
    pub fn new(tx: mpsc::Sender<OutboundFrame>, stream_sid: impl Into<String>) -> Self {
        Self {
            tx,
            stream_sid: stream_sid.into(),
        }
    }

    pub fn stream_sid(&self) -> &str {
        &self.stream_sid
    }

    pub async fn send_media(&self, audio: &[u8]) -> Result<(), TransportError> {
        self.send(OutboundFrame::Media {
            stream_sid: self.stream_sid.clone(),
            media: MediaPayload {
                payload: BASE64.encode(audio),
            },
        })
        .await
    }

    /// Barge-in: tell the carrier to drop queued playback.
    pub async fn clear(&self) -> Result<(), TransportError> {
        self.send(OutboundFrame::Clear {
            stream_sid: self.stream_sid.clone(),
        })
        .await
    }

    async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed("outbound channel closed".to_string()))
    }
}

#[async_trait]
impl AudioSink for TransportSink {
    async fn send_audio(&self, chunk: Bytes) -> Result<(), SynthesisError> {
        self.send_media(&chunk)
            .await
            .map_err(|e| SynthesisError::SinkClosed(e.to_string()))
    }
}

/// Decode a media payload.
pub fn decode_payload(payload: &str) -> Result<Bytes, base64::DecodeError> {
    BASE64.decode(payload).map(Bytes::from)
}
