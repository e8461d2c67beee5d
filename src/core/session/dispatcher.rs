//! Serial turn processing for one call.
//!
//! Completed turns are queued to a single worker, which answers them through
//! the conversation engine and speaks the answer. A newer turn supersedes any
//! older one: the older turn's synthesis is cancelled (once) and its answer is
//! never played.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::{SessionError, TransportError};
use super::transport::TransportSink;
use crate::core::latency::{LatencyStage, LatencyTracker};
use crate::core::llm::{ConversationEngine, ConversationMessage, TurnFailure};
use crate::core::tts::{SpeechStreamer, SynthesisOutcome, SynthesisRequest};
use crate::core::turn::Turn;

const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

enum Job {
    Respond { seq: u64, turn: Turn },
    Say { seq: u64, text: String },
}

/// Reports session-fatal failures to whoever owns the session.
#[derive(Clone, Default)]
pub struct FatalSignal {
    token: CancellationToken,
    error: Arc<Mutex<Option<SessionError>>>,
}

impl FatalSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first fatal error and wake the owner.
    pub fn raise(&self, error: SessionError) {
        {
            let mut slot = self.error.lock();
            if slot.is_none() {
                error!(error = %error, "Session-fatal failure");
                *slot = Some(error);
            }
        }
        self.token.cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn raised(&self) {
        self.token.cancelled().await
    }

    pub fn take_error(&self) -> Option<SessionError> {
        self.error.lock().take()
    }
}

/// Shared between the dispatcher handle and its worker.
struct Shared {
    conversation: AsyncMutex<ConversationEngine>,
    streamer: SpeechStreamer,
    sink: TransportSink,
    latency: Arc<LatencyTracker>,
    fatal: FatalSignal,
    /// Sequence number of the most recent turn
    latest: AtomicU64,
    /// Synthesis currently streaming, if any. Whoever takes it cancels it.
    speaking: Mutex<Option<SynthesisRequest>>,
    cancellations: AtomicUsize,
}

impl Shared {
    fn is_current(&self, seq: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == seq
    }

    fn cancel_speaking(&self) -> bool {
        let taken = self.speaking.lock().take();
        match taken {
            Some(request) => {
                request.cancel();
                self.cancellations.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}

pub struct TurnDispatcher {
    shared: Arc<Shared>,
    jobs: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TurnDispatcher {
    pub fn spawn(
        conversation: ConversationEngine,
        streamer: SpeechStreamer,
        sink: TransportSink,
        latency: Arc<LatencyTracker>,
        fatal: FatalSignal,
    ) -> Self {
        let shared = Arc::new(Shared {
            conversation: AsyncMutex::new(conversation),
            streamer,
            sink,
            latency,
            fatal,
            latest: AtomicU64::new(0),
            speaking: Mutex::new(None),
            cancellations: AtomicUsize::new(0),
        });
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_worker(shared.clone(), jobs_rx, shutdown.clone()));

        Self {
            shared,
            jobs: Mutex::new(Some(jobs_tx)),
            shutdown,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue agent speech that is not an answer to a turn, e.g. the greeting.
    /// A turn arriving while it plays interrupts it like any other answer.
    pub fn say(&self, text: &str) {
        let seq = self.shared.latest.load(Ordering::SeqCst);
        self.enqueue(Job::Say {
            seq,
            text: text.to_string(),
        });
    }

    /// Hand off a completed turn: stop current playback, clear the carrier's
    /// buffer, and queue the turn.
    pub async fn dispatch(&self, turn: Turn) -> Result<(), TransportError> {
        let seq = self.shared.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if self.shared.cancel_speaking() {
            info!(seq, "Barge-in: cancelled in-flight synthesis");
        }
        self.shared.sink.clear().await?;
        debug!(seq, text = %turn.text, boundary = %turn.boundary, "Dispatching turn");
        self.enqueue(Job::Respond { seq, turn });
        Ok(())
    }

    /// Record caller speech that will not be answered.
    pub async fn record_unanswered(&self, text: &str) {
        self.shared.conversation.lock().await.record_user_turn(text);
    }

    /// Syntheses cancelled so far.
    pub fn cancellations(&self) -> usize {
        self.shared.cancellations.load(Ordering::SeqCst)
    }

    /// Run `f` against the conversation history.
    pub async fn with_history<R>(
        &self,
        f: impl FnOnce(&[ConversationMessage]) -> R,
    ) -> R {
        let conversation = self.shared.conversation.lock().await;
        f(conversation.history())
    }

    fn enqueue(&self, job: Job) {
        let sent = self
            .jobs
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(job).is_ok());
        if !sent {
            debug!("Dispatcher is shut down; dropping job");
        }
    }

    /// Stop playback and the worker, waiting for it to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.jobs.lock().take();
        self.shutdown.cancel();
        self.shared.cancel_speaking();

        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            match tokio::time::timeout(WORKER_SHUTDOWN_TIMEOUT, &mut worker).await {
                Ok(Ok(())) => debug!("Dispatcher worker stopped"),
                Ok(Err(e)) => warn!(error = %e, "Dispatcher worker ended abnormally"),
                Err(_) => {
                    warn!("Dispatcher worker did not stop in time; aborting");
                    worker.abort();
                }
            }
        }
    }
}

impl Drop for TurnDispatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(worker) = self.worker.get_mut().take() {
            worker.abort();
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let (seq, text) = match job {
            Job::Say { seq, text } => {
                if !shared.is_current(seq) {
                    debug!(seq, "Caller spoke first; skipping queued speech");
                    continue;
                }
                shared.conversation.lock().await.record_assistant(&text);
                (seq, text)
            }
            Job::Respond { seq, turn } => {
                if !shared.is_current(seq) {
                    debug!(seq, "Turn superseded before it was answered");
                    shared.conversation.lock().await.record_user_turn(&turn.text);
                    continue;
                }

                let started = Instant::now();
                let response = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    response = async {
                        shared.conversation.lock().await.respond(&turn.text).await
                    } => response,
                };
                shared.latency.end_with(
                    LatencyTracker::start_at(LatencyStage::Engine, started),
                    Some(format!("engine_calls={}", response.engine_calls)),
                );
                if let Some(failure) = &response.failure {
                    log_turn_failure(failure);
                }
                if !shared.is_current(seq) {
                    debug!(seq, "Answer superseded by a newer turn; not speaking it");
                    shared.conversation.lock().await.retract_last_reply();
                    continue;
                }
                (seq, response.text)
            }
        };

        speak(&shared, seq, text).await;
        if shared.fatal.is_raised() {
            break;
        }
    }
    debug!("Dispatcher worker exiting");
}

async fn speak(shared: &Shared, seq: u64, text: String) {
    let request = SynthesisRequest::new(text);
    *shared.speaking.lock() = Some(request.clone());
    // A turn may have landed between the currency check and publishing the request
    if !shared.is_current(seq) {
        shared.cancel_speaking();
    }

    let outcome = shared
        .streamer
        .speak(&request, &shared.sink, &shared.latency)
        .await;

    // Only this worker publishes requests, so the slot holds ours or nothing
    shared.speaking.lock().take();

    if outcome.is_sink_failure() {
        shared.fatal.raise(SessionError::Transport(TransportError::Closed(
            "audio sink rejected synthesized audio".to_string(),
        )));
        return;
    }
    match outcome {
        SynthesisOutcome::Completed { chunks, .. } => debug!(seq, chunks, "Utterance played"),
        SynthesisOutcome::Cancelled { chunks } => debug!(seq, chunks, "Utterance interrupted"),
        SynthesisOutcome::Failed(e) => {
            warn!(seq, error = %SessionError::Synthesis(e), "Utterance dropped");
        }
    }
}

fn log_turn_failure(failure: &TurnFailure) {
    let error = match failure {
        TurnFailure::Engine(e) => SessionError::ReasoningEngine(e.clone()),
        TurnFailure::Tool(e) => SessionError::ToolExecution(e.clone()),
        TurnFailure::HopLimit(_) => {
            warn!(error = %failure, "Tool round trip limit reached; answered with fallback");
            return;
        }
    };
    warn!(error = %error, "Turn answered with fallback");
}
