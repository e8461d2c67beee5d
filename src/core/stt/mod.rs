mod base;
pub mod deepgram;

pub use base::{
    Recognizer, RecognizerConfig, RecognizerConnectionState, RecognizerError, RecognizerEvent,
    RecognizerEventStream, RecognizerFlavor, RecognizerStats, TranscriptSegment,
};
pub use deepgram::DeepgramRecognizer;

/// Create a recognizer for the given configuration.
pub fn create_recognizer(config: RecognizerConfig) -> Result<Box<dyn Recognizer>, RecognizerError> {
    Ok(Box::new(DeepgramRecognizer::new(config)?))
}
