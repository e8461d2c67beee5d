//! Deepgram WebSocket messages and their normalization into [`RecognizerEvent`]s.

use serde::Deserialize;
use tracing::debug;

use crate::core::stt::base::{RecognizerError, RecognizerEvent, TranscriptSegment};

/// Control messages sent to Deepgram as text frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    KeepAlive,
    CloseStream,
    Finalize,
}

impl ControlMessage {
    pub fn to_json(self) -> String {
        match self {
            ControlMessage::KeepAlive => r#"{"type":"KeepAlive"}"#.to_string(),
            ControlMessage::CloseStream => r#"{"type":"CloseStream"}"#.to_string(),
            ControlMessage::Finalize => r#"{"type":"Finalize"}"#.to_string(),
        }
    }
}

/// Messages received from either Deepgram endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    Results(ResultsMessage),
    UtteranceEnd(UtteranceEndMessage),
    SpeechStarted(SpeechStartedMessage),
    Metadata(MetadataMessage),
    TurnInfo(TurnInfoMessage),
    Connected(ConnectedMessage),
    Error(ErrorMessage),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultsMessage {
    pub channel: ResultsChannel,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultsChannel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UtteranceEndMessage {
    pub last_word_end: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechStartedMessage {
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataMessage {
    pub request_id: Option<String>,
    pub model_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectedMessage {
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TurnEvent {
    Update,
    StartOfTurn,
    EagerEndOfTurn,
    TurnResumed,
    EndOfTurn,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnInfoMessage {
    pub event: TurnEvent,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub turn_index: u32,
    pub end_of_turn_confidence: Option<f32>,
    #[serde(default)]
    pub audio_window_start: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorMessage {
    pub description: Option<String>,
    pub message: Option<String>,
    pub code: Option<String>,
}

impl ErrorMessage {
    fn describe(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.code.clone())
            .unwrap_or_else(|| "unknown Deepgram error".to_string())
    }
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, RecognizerError> {
        serde_json::from_str(text)
            .map_err(|e| RecognizerError::InvalidMessage(format!("{e}: {text}")))
    }

    /// Translate a backend message into zero or more neutral events.
    pub fn into_events(self) -> Vec<RecognizerEvent> {
        match self {
            ServerMessage::Results(results) => {
                let Some(alternative) = results.channel.alternatives.into_iter().next() else {
                    return Vec::new();
                };
                let text = alternative.transcript.trim();
                if text.is_empty() {
                    return Vec::new();
                }
                let segment =
                    TranscriptSegment::new(text, results.is_final, alternative.confidence)
                        .with_start(results.start);
                if results.is_final {
                    vec![RecognizerEvent::FinalTranscript(segment)]
                } else {
                    vec![RecognizerEvent::PartialTranscript(segment)]
                }
            }
            ServerMessage::UtteranceEnd(_) => vec![RecognizerEvent::UtteranceEnd],
            ServerMessage::TurnInfo(turn) => turn.into_events(),
            ServerMessage::Error(error) => {
                vec![RecognizerEvent::ConnectionError(
                    RecognizerError::ProviderError(error.describe()),
                )]
            }
            ServerMessage::SpeechStarted(started) => {
                debug!(timestamp = ?started.timestamp, "Deepgram detected speech start");
                Vec::new()
            }
            ServerMessage::Metadata(metadata) => {
                debug!(request_id = ?metadata.request_id, "Deepgram metadata");
                Vec::new()
            }
            ServerMessage::Connected(connected) => {
                debug!(request_id = ?connected.request_id, "Deepgram session connected");
                Vec::new()
            }
            ServerMessage::Unknown => Vec::new(),
        }
    }
}

impl TurnInfoMessage {
    fn transcript(&self) -> Option<String> {
        let text = self.transcript.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    fn into_events(self) -> Vec<RecognizerEvent> {
        match self.event {
            TurnEvent::Update | TurnEvent::StartOfTurn => match self.transcript() {
                Some(text) => {
                    let segment = TranscriptSegment::new(text, false, self.end_of_turn_confidence)
                        .with_start(self.audio_window_start);
                    vec![RecognizerEvent::PartialTranscript(segment)]
                }
                None => Vec::new(),
            },
            TurnEvent::EagerEndOfTurn => vec![RecognizerEvent::EagerEndOfTurn {
                transcript: self.transcript(),
            }],
            TurnEvent::TurnResumed => vec![RecognizerEvent::TurnResumed],
            TurnEvent::EndOfTurn => vec![RecognizerEvent::EndOfTurn {
                transcript: self.transcript(),
            }],
            TurnEvent::Unknown => Vec::new(),
        }
    }
}
