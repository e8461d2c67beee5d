//! Inbound call audio: frame types and the ingress buffer that batches
//! transport frames into recognizer-sized chunks.

pub mod buffer;

pub use buffer::{AudioEncoding, AudioFrame, AudioIngressBuffer, DEFAULT_FLUSH_THRESHOLD_BYTES};
