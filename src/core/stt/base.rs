use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::audio::AudioEncoding;

/// One recognized span of speech.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    /// The transcribed text
    pub text: String,
    /// Whether the recognizer will not revise this segment any further
    pub is_final: bool,
    /// Confidence score (0.0 to 1.0) when the backend reports one
    pub confidence: Option<f32>,
    /// Offset of the segment within the call audio, in seconds
    pub start_secs: Option<f64>,
    /// When the segment was received locally
    pub received_at: Instant,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, is_final: bool, confidence: Option<f32>) -> Self {
        Self {
            text: text.into(),
            is_final,
            confidence: confidence.map(|c| c.clamp(0.0, 1.0)),
            start_secs: None,
            received_at: Instant::now(),
        }
    }

    pub fn with_start(mut self, start_secs: f64) -> Self {
        self.start_secs = Some(start_secs);
        self
    }
}

/// Vendor-neutral recognizer events consumed by turn segmentation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    PartialTranscript(TranscriptSegment),
    FinalTranscript(TranscriptSegment),
    /// Silence exceeded the configured utterance-end timeout
    UtteranceEnd,
    /// Turn-aware backends: the speaker finished their turn
    EndOfTurn { transcript: Option<String> },
    /// Turn-aware backends: the speaker probably finished their turn
    EagerEndOfTurn { transcript: Option<String> },
    /// Turn-aware backends: speech resumed after an eager end of turn
    TurnResumed,
    ConnectionClosed,
    ConnectionError(RecognizerError),
}

/// Receiving half of a recognizer's event sequence.
pub type RecognizerEventStream = mpsc::UnboundedReceiver<RecognizerEvent>;

/// Error types for recognizer operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecognizerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Failed to send audio: {0}")]
    SendFailed(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

impl RecognizerError {
    /// Errors that mean the live connection is gone.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RecognizerError::ConnectionFailed(_)
                | RecognizerError::AuthenticationFailed(_)
                | RecognizerError::ConnectionLost(_)
                | RecognizerError::ProviderError(_)
        )
    }
}

/// Which streaming endpoint the recognizer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerFlavor {
    /// Classic streaming transcription with utterance-end signalling
    #[default]
    Listen,
    /// Turn-aware streaming with end-of-turn signalling
    Flux,
}

/// Connection parameters for a streaming recognizer
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizerConfig {
    /// API key for the recognizer backend
    pub api_key: String,
    /// Base WebSocket endpoint, without path
    pub endpoint: String,
    pub flavor: RecognizerFlavor,
    /// Model to use for transcription
    pub model: String,
    /// Language code for transcription (e.g., "en-US")
    pub language: String,
    /// Sample rate of the audio in Hz
    pub sample_rate: u32,
    pub encoding: AudioEncoding,
    /// Number of audio channels (1 for mono)
    pub channels: u16,
    pub interim_results: bool,
    /// Silence after which the backend signals utterance end
    pub utterance_end_ms: u32,
    pub smart_format: bool,
    /// Interval between keepalive control messages
    pub keepalive_interval: Duration,
    /// Upper bound on connect and graceful close
    pub connect_timeout: Duration,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: "wss://api.deepgram.com".to_string(),
            flavor: RecognizerFlavor::Listen,
            model: "nova-3".to_string(),
            language: "en-US".to_string(),
            sample_rate: 8000,
            encoding: AudioEncoding::Mulaw,
            channels: 1,
            interim_results: true,
            utterance_end_ms: 2000,
            smart_format: true,
            keepalive_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection state for recognizers
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerConnectionState {
    /// Not connected yet
    Disconnected,
    /// In the process of connecting
    Connecting,
    /// Connected and ready to receive audio
    Connected,
    /// Closed locally; cannot be reused
    Closed,
    /// Error state
    Error(String),
}

/// Statistics for recognizer traffic
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecognizerStats {
    /// Total audio bytes forwarded
    pub audio_bytes_sent: u64,
    /// Number of audio chunks forwarded
    pub audio_chunks_sent: u64,
    /// Number of keepalives sent
    pub keepalives_sent: u64,
    /// Number of final segments received
    pub final_segments: u32,
    /// Number of interim segments received
    pub partial_segments: u32,
}

impl RecognizerStats {
    pub fn record_event(&mut self, event: &RecognizerEvent) {
        match event {
            RecognizerEvent::FinalTranscript(_) => self.final_segments += 1,
            RecognizerEvent::PartialTranscript(_) => self.partial_segments += 1,
            _ => {}
        }
    }
}

/// A live streaming speech-to-text connection.
///
/// Sending audio before `connect` completes or after `close` is a silent no-op.
/// `close` may be called any number of times.
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// Open the long-lived connection and start the keepalive.
    async fn connect(&mut self) -> Result<(), RecognizerError>;

    /// Forward one chunk of audio.
    async fn send_audio(&mut self, audio: Bytes) -> Result<(), RecognizerError>;

    /// Take the normalized event sequence. Returns `None` after the first call.
    fn events(&mut self) -> Option<RecognizerEventStream>;

    /// Stop the keepalive, ask the backend to finalize, and release the connection.
    ///
    /// Finals produced by the backend while finalizing are delivered on the
    /// event sequence before `ConnectionClosed`.
    async fn close(&mut self) -> Result<(), RecognizerError>;

    fn is_ready(&self) -> bool;

    fn stats(&self) -> RecognizerStats;

    fn provider_info(&self) -> &'static str;
}
