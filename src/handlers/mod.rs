//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `incoming_call` - Carrier webhook answering new calls
//! - `media_stream` - Per-call media-stream WebSocket

pub mod api;
pub mod incoming_call;
pub mod media_stream;

pub use incoming_call::incoming_call_handler;
pub use media_stream::media_stream_handler;
