pub mod audio;
pub mod calendar;
pub mod latency;
pub mod llm;
pub mod providers;
pub mod session;
pub mod stt;
pub mod tts;
pub mod turn;

// Re-export commonly used types for convenience
pub use audio::{AudioEncoding, AudioFrame, AudioIngressBuffer};
pub use latency::{LatencyStage, LatencySummary, LatencyTracker};
pub use llm::{ConversationConfig, ConversationEngine, ReasoningEngine, ToolRegistry};
pub use providers::{LiveProviders, ProviderError, ProviderFactory, ProviderSettings};
pub use session::{
    OutboundFrame, SessionConfig, SessionController, SessionError, SessionState, TransportEvent,
};
pub use stt::{Recognizer, RecognizerConfig, RecognizerError, RecognizerEvent, create_recognizer};
pub use tts::{ElevenLabsConfig, SpeechStreamer, SynthesisError, Synthesizer};
pub use turn::{Turn, TurnSegmenter};
