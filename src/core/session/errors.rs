//! Error types for call sessions

use crate::core::llm::{EngineError, ToolError};
use crate::core::stt::RecognizerError;
use crate::core::tts::SynthesisError;

use super::state::SessionState;

/// Failure writing to the call transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("transport closed: {0}")]
    Closed(String),
    #[error("failed to encode outbound frame: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("recognizer connection error: {0}")]
    RecognizerConnection(RecognizerError),
    #[error("recognizer send error: {0}")]
    RecognizerSend(RecognizerError),
    #[error("reasoning engine error: {0}")]
    ReasoningEngine(#[from] EngineError),
    #[error("tool execution error: {0}")]
    ToolExecution(#[from] ToolError),
    #[error("synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("'{event}' is not valid while the session is {state}")]
    InvalidState { state: SessionState, event: String },
}

impl SessionError {
    /// Errors that end the call. Recognizer connection loss only reaches a
    /// caller as an error when the failure policy is to abort.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Transport(_) | SessionError::RecognizerConnection(_)
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SessionError::Transport(TransportError::Closed("gone".into())).is_fatal());
        assert!(
            SessionError::RecognizerConnection(RecognizerError::ConnectionLost("eof".into()))
                .is_fatal()
        );
        assert!(
            !SessionError::RecognizerSend(RecognizerError::SendFailed("full".into())).is_fatal()
        );
        assert!(!SessionError::ReasoningEngine(EngineError::InvalidResponse("x".into())).is_fatal());
        assert!(!SessionError::Synthesis(SynthesisError::NetworkError("x".into())).is_fatal());
        assert!(
            !SessionError::InvalidState {
                state: SessionState::Closed,
                event: "media".into()
            }
            .is_fatal()
        );
    }
}
