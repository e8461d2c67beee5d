use std::fmt;
use std::time::Instant;

use tracing::debug;

use crate::core::stt::RecognizerEvent;

/// Why a turn was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnBoundary {
    /// The latest final segment ended a sentence
    Punctuation,
    /// The recognizer reported an utterance end while text was buffered
    Silence,
    /// A turn-aware recognizer reported the end of the turn
    EndOfTurn,
    /// Explicit flush, e.g. when the call stops
    Flush,
}

impl fmt::Display for TurnBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnBoundary::Punctuation => "punctuation",
            TurnBoundary::Silence => "silence",
            TurnBoundary::EndOfTurn => "end_of_turn",
            TurnBoundary::Flush => "flush",
        };
        f.write_str(name)
    }
}

/// One complete caller utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub text: String,
    pub segment_count: usize,
    pub boundary: TurnBoundary,
    /// When the first final segment of this turn arrived
    pub started_at: Option<Instant>,
    pub completed_at: Instant,
}

/// Whether text ends in sentence-terminal punctuation.
pub fn ends_sentence(text: &str) -> bool {
    matches!(text.trim_end().chars().last(), Some('.' | '!' | '?'))
}

/// Accumulates final transcript segments into one in-progress turn.
///
/// Boundaries are independent and OR-combined: whichever is observed first in
/// event-arrival order closes the turn. Closing hands the text out and clears
/// the buffer in the same call, so turns never overlap.
#[derive(Debug, Default)]
pub struct TurnSegmenter {
    segments: Vec<String>,
    started_at: Option<Instant>,
}

impl TurnSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one recognizer event, returning a turn when a boundary fires.
    pub fn on_event(&mut self, event: &RecognizerEvent) -> Option<Turn> {
        match event {
            RecognizerEvent::FinalTranscript(segment) => {
                let text = segment.text.trim();
                if text.is_empty() {
                    return None;
                }
                if self.segments.is_empty() {
                    self.started_at = Some(segment.received_at);
                }
                self.segments.push(text.to_string());
                if ends_sentence(text) {
                    return self.complete(TurnBoundary::Punctuation);
                }
                None
            }
            RecognizerEvent::UtteranceEnd => {
                if self.segments.is_empty() {
                    return None;
                }
                self.complete(TurnBoundary::Silence)
            }
            RecognizerEvent::EndOfTurn { transcript } => {
                // The turn-aware transcript covers the whole turn
                match transcript.as_deref().map(str::trim) {
                    Some(text) if !text.is_empty() => {
                        let count = self.segments.len().max(1);
                        self.segments.clear();
                        self.segments.push(text.to_string());
                        if self.started_at.is_none() {
                            self.started_at = Some(Instant::now());
                        }
                        self.complete_with_count(TurnBoundary::EndOfTurn, count)
                    }
                    _ => self.complete(TurnBoundary::EndOfTurn),
                }
            }
            RecognizerEvent::PartialTranscript(_)
            | RecognizerEvent::EagerEndOfTurn { .. }
            | RecognizerEvent::TurnResumed
            | RecognizerEvent::ConnectionClosed
            | RecognizerEvent::ConnectionError(_) => None,
        }
    }

    /// Close whatever is buffered.
    pub fn flush(&mut self) -> Option<Turn> {
        self.complete(TurnBoundary::Flush)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn pending_text(&self) -> String {
        self.segments.join(" ")
    }

    fn complete(&mut self, boundary: TurnBoundary) -> Option<Turn> {
        let count = self.segments.len();
        self.complete_with_count(boundary, count)
    }

    fn complete_with_count(&mut self, boundary: TurnBoundary, segment_count: usize) -> Option<Turn> {
        let segments = std::mem::take(&mut self.segments);
        let started_at = self.started_at.take();
        let text = segments.join(" ").trim().to_string();

        if text.is_empty() {
            return None;
        }

        debug!(%boundary, segments = segment_count, "Turn complete: {}", text);
        Some(Turn {
            text,
            segment_count,
            boundary,
            started_at,
            completed_at: Instant::now(),
        })
    }
}
