//! Per-call state machine.
//!
//! The controller owns every sub-component of one call and is the only part
//! of the session that reacts to transport events. Recognizer events are
//! consumed on their own task; turn answering runs on the dispatcher's worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::{RecognizerFailurePolicy, SessionConfig};
use super::dispatcher::{FatalSignal, TurnDispatcher};
use super::errors::{SessionError, SessionResult};
use super::state::SessionState;
use super::transport::{OutboundFrame, StartInfo, TransportEvent, TransportSink, decode_payload};
use crate::core::audio::{AudioFrame, AudioIngressBuffer};
use crate::core::latency::{LatencyStage, LatencyTracker};
use crate::core::llm::{ConversationEngine, ConversationMessage};
use crate::core::providers::ProviderFactory;
use crate::core::stt::{Recognizer, RecognizerError, RecognizerEvent, RecognizerEventStream};
use crate::core::tts::SpeechStreamer;
use crate::core::turn::{Turn, TurnSegmenter};

const RECOGNIZER_DRAIN_TIMEOUT: Duration = Duration::from_secs(3);

/// Sub-components that exist once the call has started.
struct ActiveCall {
    stream_sid: String,
    call_sid: String,
    buffer: AudioIngressBuffer,
    recognizer: Option<Box<dyn Recognizer>>,
    recognizer_task: Option<JoinHandle<()>>,
    dispatcher: Arc<TurnDispatcher>,
    closing: Arc<AtomicBool>,
}

pub struct SessionController {
    session_id: String,
    config: SessionConfig,
    providers: Arc<dyn ProviderFactory>,
    outbound: mpsc::Sender<OutboundFrame>,
    state: SessionState,
    created_at: Instant,
    latency: Arc<LatencyTracker>,
    fatal: FatalSignal,
    call: Option<ActiveCall>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        providers: Arc<dyn ProviderFactory>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string();
        Self {
            latency: Arc::new(LatencyTracker::new(session_id.clone())),
            session_id,
            config,
            providers,
            outbound,
            state: SessionState::Idle,
            created_at: Instant::now(),
            fatal: FatalSignal::new(),
            call: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stream_sid(&self) -> Option<&str> {
        self.call.as_ref().map(|c| c.stream_sid.as_str())
    }

    pub fn call_sid(&self) -> Option<&str> {
        self.call.as_ref().map(|c| c.call_sid.as_str())
    }

    pub fn latency(&self) -> &LatencyTracker {
        &self.latency
    }

    /// Signal raised by background tasks when the session must end.
    pub fn fatal_signal(&self) -> FatalSignal {
        self.fatal.clone()
    }

    /// Syntheses cancelled by barge-in so far.
    pub fn cancellations(&self) -> usize {
        self.call
            .as_ref()
            .map_or(0, |c| c.dispatcher.cancellations())
    }

    /// Snapshot of the conversation history. Empty before `start`.
    pub async fn history(&self) -> Vec<ConversationMessage> {
        match &self.call {
            Some(call) => call.dispatcher.with_history(|h| h.to_vec()).await,
            None => Vec::new(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.can_transition_to(next) {
            debug!(session = %self.session_id, from = %self.state, to = %next, "Session state change");
            self.state = next;
        } else {
            warn!(session = %self.session_id, from = %self.state, to = %next, "Ignoring invalid session transition");
        }
    }

    /// The transport connection was accepted.
    pub fn accept(&mut self) {
        self.transition(SessionState::Connected);
    }

    /// React to one inbound transport event.
    ///
    /// Only session-fatal errors are returned; the caller should then `close`.
    pub async fn handle_event(&mut self, event: TransportEvent) -> SessionResult<()> {
        if self.state == SessionState::Closed {
            debug!(session = %self.session_id, event = event.name(), "Session closed; ignoring event");
            return Ok(());
        }

        match event {
            TransportEvent::Connected => {
                info!(session = %self.session_id, "Media stream connected");
                Ok(())
            }
            TransportEvent::Start { start } => self.on_start(start).await,
            TransportEvent::Media { media } => {
                if !self.state.accepts_media() {
                    debug!(session = %self.session_id, state = %self.state, "Dropping media outside an active call");
                    return Ok(());
                }
                match decode_payload(&media.payload) {
                    Ok(audio) => self.on_media(audio).await,
                    Err(e) => warn!(session = %self.session_id, error = %e, "Dropping undecodable media payload"),
                }
                Ok(())
            }
            TransportEvent::Stop => {
                info!(session = %self.session_id, "Call ended by carrier");
                self.close().await;
                Ok(())
            }
            TransportEvent::Mark | TransportEvent::Unknown => Ok(()),
        }
    }

    async fn on_start(&mut self, start: StartInfo) -> SessionResult<()> {
        if self.state != SessionState::Connected {
            let error = SessionError::InvalidState {
                state: self.state,
                event: "start".to_string(),
            };
            warn!(session = %self.session_id, error = %error, "Ignoring start event");
            return Ok(());
        }
        info!(
            session = %self.session_id,
            stream_sid = %start.stream_sid,
            call_sid = %start.call_sid,
            "Inbound call started"
        );
        self.transition(SessionState::Active);

        let sink = TransportSink::new(self.outbound.clone(), start.stream_sid.clone());
        let conversation = ConversationEngine::new(
            self.providers.reasoning_engine(),
            self.providers.tools(),
            self.config.conversation.clone(),
        );
        let streamer = SpeechStreamer::new(self.providers.synthesizer());
        let dispatcher = Arc::new(TurnDispatcher::spawn(
            conversation,
            streamer,
            sink,
            self.latency.clone(),
            self.fatal.clone(),
        ));
        if !self.config.greeting.trim().is_empty() {
            dispatcher.say(&self.config.greeting);
        }

        let closing = Arc::new(AtomicBool::new(false));
        let connected = self.connect_recognizer().await;
        let mut call = ActiveCall {
            stream_sid: start.stream_sid,
            call_sid: start.call_sid,
            buffer: AudioIngressBuffer::new(self.config.flush_threshold_bytes),
            recognizer: None,
            recognizer_task: None,
            dispatcher: dispatcher.clone(),
            closing: closing.clone(),
        };

        let result = match connected {
            Ok(mut recognizer) => {
                if let Some(events) = recognizer.events() {
                    call.recognizer_task = Some(tokio::spawn(run_recognizer_events(
                        events,
                        dispatcher,
                        self.latency.clone(),
                        self.fatal.clone(),
                        self.config.recognizer_failure,
                        closing,
                    )));
                }
                call.recognizer = Some(recognizer);
                Ok(())
            }
            Err(e) => match self.config.recognizer_failure {
                RecognizerFailurePolicy::Abort => Err(SessionError::RecognizerConnection(e)),
                RecognizerFailurePolicy::Continue => {
                    warn!(session = %self.session_id, error = %e, "Recognizer unavailable; continuing without transcription");
                    Ok(())
                }
            },
        };
        self.call = Some(call);
        result
    }

    async fn connect_recognizer(&self) -> Result<Box<dyn Recognizer>, RecognizerError> {
        let mut recognizer = self.providers.create_recognizer()?;
        recognizer.connect().await?;
        info!(
            session = %self.session_id,
            provider = recognizer.provider_info(),
            "Recognizer connected"
        );
        Ok(recognizer)
    }

    async fn on_media(&mut self, audio: Bytes) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        let frame = AudioFrame::new(audio, self.config.encoding, self.config.sample_rate);
        if let Some(chunk) = call.buffer.append(&frame) {
            forward_audio(call, chunk).await;
        }
    }

    /// Release everything the session owns. Safe to call any number of times.
    pub async fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.transition(SessionState::Closing);

        if let Some(call) = self.call.as_mut() {
            call.closing.store(true, Ordering::SeqCst);

            if let Some(chunk) = call.buffer.flush() {
                forward_audio(call, chunk).await;
            }
            debug!(
                session = %self.session_id,
                flushed_bytes = call.buffer.flushed_bytes(),
                flushes = call.buffer.flush_count(),
                "Audio ingress drained"
            );

            call.dispatcher.shutdown().await;

            if let Some(mut recognizer) = call.recognizer.take() {
                if let Err(e) = recognizer.close().await {
                    warn!(session = %self.session_id, error = %e, "Recognizer close failed");
                }
                let stats = recognizer.stats();
                info!(
                    session = %self.session_id,
                    audio_bytes = stats.audio_bytes_sent,
                    audio_chunks = stats.audio_chunks_sent,
                    keepalives = stats.keepalives_sent,
                    finals = stats.final_segments,
                    "Recognizer closed"
                );
            }

            if let Some(mut task) = call.recognizer_task.take() {
                if tokio::time::timeout(RECOGNIZER_DRAIN_TIMEOUT, &mut task)
                    .await
                    .is_err()
                {
                    warn!(session = %self.session_id, "Recognizer event task did not finish; aborting");
                    task.abort();
                }
            }
        }

        self.latency.log_summary();
        self.transition(SessionState::Closed);
        info!(
            session = %self.session_id,
            duration_secs = self.created_at.elapsed().as_secs_f64(),
            "Session closed"
        );
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(call) = self.call.as_mut() {
            if let Some(task) = call.recognizer_task.take() {
                task.abort();
            }
        }
    }
}

async fn forward_audio(call: &mut ActiveCall, chunk: Bytes) {
    let Some(recognizer) = call.recognizer.as_mut() else {
        return;
    };
    if let Err(e) = recognizer.send_audio(chunk).await {
        warn!(error = %SessionError::RecognizerSend(e), "Dropped audio chunk");
    }
}

/// Fold recognizer events into turns until the connection closes.
async fn run_recognizer_events(
    mut events: RecognizerEventStream,
    dispatcher: Arc<TurnDispatcher>,
    latency: Arc<LatencyTracker>,
    fatal: FatalSignal,
    policy: RecognizerFailurePolicy,
    closing: Arc<AtomicBool>,
) {
    let mut segmenter = TurnSegmenter::new();

    while let Some(event) = events.recv().await {
        match &event {
            RecognizerEvent::ConnectionClosed => break,
            RecognizerEvent::ConnectionError(e) => {
                if closing.load(Ordering::SeqCst) {
                    debug!(error = %e, "Recognizer error while closing");
                } else if e.is_connection_error() && policy == RecognizerFailurePolicy::Abort {
                    fatal.raise(SessionError::RecognizerConnection(e.clone()));
                } else {
                    warn!(error = %e, "Recognizer error; continuing");
                }
                continue;
            }
            _ => {}
        }

        if let Some(turn) = segmenter.on_event(&event) {
            deliver_turn(turn, &dispatcher, &latency, &fatal, &closing).await;
        }
    }

    if let Some(turn) = segmenter.flush() {
        deliver_turn(turn, &dispatcher, &latency, &fatal, &closing).await;
    }
    debug!("Recognizer event loop finished");
}

async fn deliver_turn(
    turn: Turn,
    dispatcher: &TurnDispatcher,
    latency: &LatencyTracker,
    fatal: &FatalSignal,
    closing: &AtomicBool,
) {
    let started = turn.started_at.unwrap_or(turn.completed_at);
    latency.end_with(
        LatencyTracker::start_at(LatencyStage::SttToTurn, started),
        Some(format!("boundary={}", turn.boundary)),
    );

    if closing.load(Ordering::SeqCst) {
        info!(text = %turn.text, "Recording final turn of a closing call");
        dispatcher.record_unanswered(&turn.text).await;
        return;
    }
    if let Err(e) = dispatcher.dispatch(turn).await {
        fatal.raise(e.into());
    }
}
