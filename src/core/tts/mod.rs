//! Speech synthesis: the backend interface, the ElevenLabs client and the
//! cancellable streamer that feeds audio to the caller.

mod base;
pub mod elevenlabs;
pub mod streamer;

pub use base::{AudioChunkStream, SynthesisError, Synthesizer};
pub use elevenlabs::{
    DEFAULT_ELEVENLABS_MODEL, DEFAULT_ELEVENLABS_VOICE, DEFAULT_OUTPUT_FORMAT,
    ELEVENLABS_BASE_URL, ElevenLabsConfig, ElevenLabsSynthesizer,
};
pub use streamer::{AudioSink, SpeechStreamer, SynthesisOutcome, SynthesisRequest};
