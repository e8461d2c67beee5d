//! Deepgram streaming speech-to-text.
//!
//! Supports the classic `/v1/listen` endpoint (interim and final results plus
//! `UtteranceEnd`) and the turn-aware `/v2/listen` endpoint (`TurnInfo` events).
//! Both are normalized into [`RecognizerEvent`](crate::core::stt::RecognizerEvent)s.

mod client;
mod config;
mod messages;


pub use client::DeepgramRecognizer;
pub use config::DEFAULT_FLUX_MODEL;
pub use messages::{ControlMessage, ServerMessage, TurnEvent};
