//! One phone call: the controller state machine, turn dispatch and the
//! telephony transport frames.

pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod errors;
pub mod state;
pub mod transport;

#[cfg(test)]
mod tests;

pub use config::{DEFAULT_GREETING, RecognizerFailurePolicy, SessionConfig};
pub use controller::SessionController;
pub use dispatcher::{FatalSignal, TurnDispatcher};
pub use errors::{SessionError, SessionResult, TransportError};
pub use state::SessionState;
pub use transport::{
    MediaPayload, OutboundFrame, StartInfo, TransportEvent, TransportSink, decode_payload,
};
