use std::fmt;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Telephony carriers deliver 20ms of 8kHz mu-law per frame (160 bytes).
/// Four frames give the ~80ms chunks streaming recognizers prefer.
pub const DEFAULT_FLUSH_THRESHOLD_BYTES: usize = 4 * 160;

/// Audio encoding shared by the transport and the vendor backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    #[default]
    Mulaw,
    Alaw,
    Linear16,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Mulaw => "mulaw",
            AudioEncoding::Alaw => "alaw",
            AudioEncoding::Linear16 => "linear16",
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self {
            AudioEncoding::Mulaw | AudioEncoding::Alaw => 1,
            AudioEncoding::Linear16 => 2,
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound frame of call audio.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub data: Bytes,
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, encoding: AudioEncoding, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            encoding,
            sample_rate,
        }
    }

    /// An empty payload marks trailing silence / end of audio.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        let samples = self.data.len() / self.encoding.bytes_per_sample();
        (samples as u64 * 1000) / u64::from(self.sample_rate.max(1))
    }
}

/// Accumulates inbound frames and releases them in threshold-sized chunks.
///
/// Every flush hands off the accumulated bytes and resets the buffer in one
/// step, so a frame is never split across two chunks nor sent twice.
#[derive(Debug)]
pub struct AudioIngressBuffer {
    pending: BytesMut,
    threshold: usize,
    empty_frame_seen: bool,
    flushed_bytes: u64,
    flush_count: u64,
}

impl AudioIngressBuffer {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            pending: BytesMut::with_capacity(threshold * 2),
            threshold,
            empty_frame_seen: false,
            flushed_bytes: 0,
            flush_count: 0,
        }
    }

    /// Append a frame, returning a chunk when a flush condition is met.
    pub fn append(&mut self, frame: &AudioFrame) -> Option<Bytes> {
        if frame.is_empty() {
            self.empty_frame_seen = true;
        } else {
            self.pending.extend_from_slice(&frame.data);
        }

        if self.pending.len() >= self.threshold || self.empty_frame_seen {
            return self.flush();
        }
        None
    }

    /// Release everything buffered so far. Returns `None` when nothing is pending.
    pub fn flush(&mut self) -> Option<Bytes> {
        self.empty_frame_seen = false;
        if self.pending.is_empty() {
            return None;
        }

        let chunk = self.pending.split().freeze();
        self.flushed_bytes += chunk.len() as u64;
        self.flush_count += 1;
        debug!(bytes = chunk.len(), "Flushing ingress audio chunk");
        Some(chunk)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn flushed_bytes(&self) -> u64 {
        self.flushed_bytes
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }
}

impl Default for AudioIngressBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FLUSH_THRESHOLD_BYTES)
    }
}
