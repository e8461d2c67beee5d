use serde::{Deserialize, Serialize};

use crate::core::audio::{AudioEncoding, DEFAULT_FLUSH_THRESHOLD_BYTES};
use crate::core::llm::ConversationConfig;

pub const DEFAULT_GREETING: &str = "Hello! Thanks for calling. How can I help you today?";

/// What a session does when its recognizer connection fails or drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerFailurePolicy {
    /// Tear the session down
    #[default]
    Abort,
    /// Keep the call up without transcription
    Continue,
}

/// Per-call settings injected at session construction.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Ingress bytes accumulated before forwarding to the recognizer
    pub flush_threshold_bytes: usize,
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    /// Spoken as soon as the call starts; empty disables the greeting
    pub greeting: String,
    pub recognizer_failure: RecognizerFailurePolicy,
    pub conversation: ConversationConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flush_threshold_bytes: DEFAULT_FLUSH_THRESHOLD_BYTES,
            encoding: AudioEncoding::Mulaw,
            sample_rate: 8000,
            greeting: DEFAULT_GREETING.to_string(),
            recognizer_failure: RecognizerFailurePolicy::Abort,
            conversation: ConversationConfig::default(),
        }
    }
}
