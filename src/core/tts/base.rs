use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// TTS-specific error types
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthesisError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Provider error ({status}): {body}")]
    ProviderError { status: u16, body: String },

    #[error("Audio stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Audio sink closed: {0}")]
    SinkClosed(String),
}

/// A lazy, finite, non-restartable sequence of audio chunks.
pub type AudioChunkStream = BoxStream<'static, Result<Bytes, SynthesisError>>;

/// Streaming text-to-speech backend.
///
/// Chunks are in the transport's native encoding; nothing downstream transcodes.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text`. Resolves once the backend accepted the
    /// request; audio arrives through the returned stream.
    async fn synthesize_stream(&self, text: &str) -> Result<AudioChunkStream, SynthesisError>;

    fn provider_info(&self) -> &'static str;
}
