//! Session-level tests driving a whole call through stub backends.

mod stubs;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::*;
use crate::core::llm::Role;
use crate::core::stt::{RecognizerError, RecognizerEvent, TranscriptSegment};
use stubs::{
    EchoEngine, RecordingSynthesizer, StubProviders, ToolHappyEngine, broken_tool_registry,
};

type Frames = Arc<Mutex<Vec<OutboundFrame>>>;

fn collect_frames(mut rx: mpsc::Receiver<OutboundFrame>) -> Frames {
    let frames: Frames = Arc::default();
    let sink = frames.clone();
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            sink.lock().push(frame);
        }
    });
    frames
}

async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn start_event() -> TransportEvent {
    TransportEvent::Start {
        start: StartInfo {
            stream_sid: "MZ-test".to_string(),
            call_sid: "CA-test".to_string(),
        },
    }
}

fn media_event(audio: &[u8]) -> TransportEvent {
    TransportEvent::Media {
        media: MediaPayload {
            payload: BASE64.encode(audio),
        },
    }
}

fn final_segment(text: &str) -> RecognizerEvent {
    RecognizerEvent::FinalTranscript(TranscriptSegment::new(text, true, Some(0.95)))
}

fn quiet_config() -> SessionConfig {
    SessionConfig {
        greeting: String::new(),
        ..Default::default()
    }
}

struct Harness {
    controller: SessionController,
    providers: Arc<StubProviders>,
    frames: Frames,
}

impl Harness {
    fn new(config: SessionConfig, providers: StubProviders) -> Self {
        let providers = Arc::new(providers);
        let (tx, rx) = mpsc::channel(1024);
        let controller = SessionController::new(config, providers.clone(), tx);
        Self {
            controller,
            providers,
            frames: collect_frames(rx),
        }
    }

    async fn started(config: SessionConfig, providers: StubProviders) -> Self {
        let mut harness = Self::new(config, providers);
        harness.controller.accept();
        harness
            .controller
            .handle_event(start_event())
            .await
            .expect("start should succeed");
        harness
    }

    fn spoken(&self) -> Vec<String> {
        self.providers.synthesizer.texts()
    }

    fn clears(&self) -> usize {
        self.frames
            .lock()
            .iter()
            .filter(|f| matches!(f, OutboundFrame::Clear { .. }))
            .count()
    }
}

fn echo_providers() -> StubProviders {
    StubProviders::new(
        RecordingSynthesizer::new(2, Duration::ZERO),
        Arc::new(EchoEngine::default()),
    )
}

#[tokio::test]
async fn test_trailing_audio_is_flushed_on_stop() {
    let mut h = Harness::started(quiet_config(), echo_providers()).await;

    for size in [160, 160, 160, 140] {
        h.controller
            .handle_event(media_event(&vec![0x7f; size]))
            .await
            .unwrap();
    }
    assert!(h.providers.control.chunk_sizes().is_empty());

    h.controller.handle_event(TransportEvent::Stop).await.unwrap();
    assert_eq!(h.providers.control.chunk_sizes(), vec![620]);
    assert_eq!(h.controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_full_buffers_are_forwarded_during_the_call() {
    let mut h = Harness::started(quiet_config(), echo_providers()).await;

    for _ in 0..9 {
        h.controller
            .handle_event(media_event(&[0x7f; 160]))
            .await
            .unwrap();
    }
    assert_eq!(h.providers.control.chunk_sizes(), vec![640, 640]);

    h.controller.close().await;
    assert_eq!(h.providers.control.chunk_sizes(), vec![640, 640, 160]);
}

#[tokio::test]
async fn test_punctuated_segments_form_one_turn() {
    let h = Harness::started(quiet_config(), echo_providers()).await;

    h.providers.control.emit(final_segment("I need"));
    h.providers.control.emit(final_segment("a property."));

    eventually("the answer to be spoken", || {
        h.spoken() == vec!["You said: I need a property.".to_string()]
    })
    .await;
    let history = h.controller.history().await;
    let user_turns: Vec<_> = history
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.text().to_string())
        .collect();
    assert_eq!(user_turns, vec!["I need a property.".to_string()]);
}

#[tokio::test]
async fn test_silence_closes_an_unpunctuated_turn() {
    let h = Harness::started(quiet_config(), echo_providers()).await;

    h.providers.control.emit(final_segment("yes I think so"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.spoken().is_empty());

    h.providers.control.emit(RecognizerEvent::UtteranceEnd);
    eventually("the answer to be spoken", || {
        h.spoken() == vec!["You said: yes I think so".to_string()]
    })
    .await;
}

#[tokio::test]
async fn test_greeting_is_spoken_and_recorded() {
    let config = SessionConfig {
        greeting: "Welcome to the office.".to_string(),
        ..Default::default()
    };
    let mut h = Harness::started(config, echo_providers()).await;

    eventually("the greeting", || !h.spoken().is_empty()).await;
    assert_eq!(h.spoken(), vec!["Welcome to the office.".to_string()]);
    eventually("greeting audio", || {
        h.frames
            .lock()
            .iter()
            .filter(|f| matches!(f, OutboundFrame::Media { stream_sid, .. } if stream_sid == "MZ-test"))
            .count()
            == 2
    })
    .await;

    h.controller.close().await;
    let history = h.controller.history().await;
    assert_eq!(history.last().map(|m| m.role), Some(Role::Assistant));
    assert_eq!(
        history.last().map(|m| m.text().to_string()),
        Some("Welcome to the office.".to_string())
    );
}

#[tokio::test]
async fn test_newer_turns_interrupt_older_answers() {
    let synth = RecordingSynthesizer::new(50, Duration::from_millis(20));
    let engine = EchoEngine::with_delay(Duration::from_millis(50));
    let config = SessionConfig {
        greeting: "Welcome".to_string(),
        ..Default::default()
    };
    let mut h = Harness::started(config, StubProviders::new(synth, engine)).await;

    eventually("the greeting to start", || {
        h.spoken() == vec!["Welcome".to_string()]
    })
    .await;

    h.providers.control.emit(final_segment("First."));
    eventually("the first answer to start", || {
        h.spoken().contains(&"You said: First.".to_string())
    })
    .await;

    h.providers.control.emit(final_segment("Second."));
    h.providers.control.emit(final_segment("Third."));
    eventually("the third answer to start", || {
        h.spoken().contains(&"You said: Third.".to_string())
    })
    .await;

    let spoken = h.spoken();
    assert!(!spoken.contains(&"You said: Second.".to_string()));
    // Greeting and the first answer were each cut off exactly once
    assert_eq!(h.controller.cancellations(), 2);
    assert_eq!(h.clears(), 3);

    h.controller.close().await;
    let history = h.controller.history().await;
    assert!(
        history
            .iter()
            .any(|m| m.role == Role::User && m.text() == "Second.")
    );
    assert!(!history.iter().any(|m| m.text() == "You said: Second."));
}

#[tokio::test]
async fn test_unheard_answer_is_dropped_from_history() {
    let engine = EchoEngine::with_delay(Duration::from_millis(150));
    let providers = StubProviders::new(RecordingSynthesizer::new(1, Duration::ZERO), engine.clone());
    let mut h = Harness::started(quiet_config(), providers).await;

    h.providers.control.emit(final_segment("First."));
    eventually("the first engine call", || {
        engine.calls.load(Ordering::SeqCst) == 1
    })
    .await;
    h.providers.control.emit(final_segment("Second."));
    eventually("the second answer", || {
        h.spoken() == vec!["You said: Second.".to_string()]
    })
    .await;

    h.controller.close().await;
    let history = h.controller.history().await;
    let replies: Vec<_> = history
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.text().to_string())
        .collect();
    assert_eq!(replies, vec!["You said: Second.".to_string()]);
    assert!(
        history
            .iter()
            .any(|m| m.role == Role::User && m.text() == "First.")
    );
}

#[tokio::test]
async fn test_failing_tool_yields_single_fallback() {
    let engine = Arc::new(ToolHappyEngine::default());
    let mut providers = StubProviders::new(
        RecordingSynthesizer::new(1, Duration::ZERO),
        engine.clone(),
    );
    providers.tools = Arc::new(broken_tool_registry());
    let config = quiet_config();
    let fallback = config.conversation.fallback_utterance.clone();
    let h = Harness::started(config, providers).await;

    h.providers.control.emit(final_segment("Book me for Tuesday."));
    eventually("the fallback", || !h.spoken().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.spoken(), vec![fallback]);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let mut h = Harness::started(quiet_config(), echo_providers()).await;

    h.controller.close().await;
    h.controller.close().await;
    assert_eq!(h.controller.state(), SessionState::Closed);
    assert_eq!(h.providers.control.closes.load(Ordering::SeqCst), 1);

    h.controller.handle_event(TransportEvent::Stop).await.unwrap();
    h.controller
        .handle_event(media_event(&[0x7f; 160]))
        .await
        .unwrap();
    assert_eq!(h.providers.control.closes.load(Ordering::SeqCst), 1);
    assert!(h.providers.control.chunk_sizes().is_empty());
}

#[tokio::test]
async fn test_media_before_start_is_ignored() {
    let mut h = Harness::new(quiet_config(), echo_providers());
    h.controller.accept();

    for _ in 0..8 {
        h.controller
            .handle_event(media_event(&[0x7f; 160]))
            .await
            .unwrap();
    }
    h.controller.handle_event(start_event()).await.unwrap();
    assert_eq!(h.controller.stream_sid(), Some("MZ-test"));
    assert_eq!(h.controller.call_sid(), Some("CA-test"));

    h.controller.close().await;
    assert!(h.providers.control.chunk_sizes().is_empty());
}

#[tokio::test]
async fn test_second_start_is_ignored() {
    let mut h = Harness::started(quiet_config(), echo_providers()).await;
    let second = TransportEvent::Start {
        start: StartInfo {
            stream_sid: "MZ-other".to_string(),
            call_sid: "CA-other".to_string(),
        },
    };

    h.controller.handle_event(second).await.unwrap();
    assert_eq!(h.controller.stream_sid(), Some("MZ-test"));
    assert_eq!(h.controller.state(), SessionState::Active);
    h.controller.close().await;
}

#[tokio::test]
async fn test_pending_turn_is_recorded_at_stop() {
    let engine = Arc::new(EchoEngine::default());
    let providers = StubProviders::new(RecordingSynthesizer::new(1, Duration::ZERO), engine.clone());
    let mut h = Harness::started(quiet_config(), providers).await;

    h.providers.control.emit(final_segment("and one more thing"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.controller.handle_event(TransportEvent::Stop).await.unwrap();

    let history = h.controller.history().await;
    let last = history.last().expect("history has the pending turn");
    assert_eq!(last.role, Role::User);
    assert_eq!(last.text(), "and one more thing");
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert!(h.spoken().is_empty());
}

#[tokio::test]
async fn test_recognizer_connect_failure_aborts_by_default() {
    let providers = echo_providers();
    providers.control.fail_connect.store(true, Ordering::SeqCst);
    let mut h = Harness::new(quiet_config(), providers);
    h.controller.accept();

    let result = h.controller.handle_event(start_event()).await;
    assert!(matches!(result, Err(SessionError::RecognizerConnection(_))));
    assert!(result.unwrap_err().is_fatal());

    h.controller.close().await;
    assert_eq!(h.controller.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_recognizer_connect_failure_can_be_tolerated() {
    let providers = echo_providers();
    providers.control.fail_connect.store(true, Ordering::SeqCst);
    let config = SessionConfig {
        greeting: "Hi there".to_string(),
        recognizer_failure: RecognizerFailurePolicy::Continue,
        ..Default::default()
    };
    let mut h = Harness::new(config, providers);
    h.controller.accept();

    h.controller.handle_event(start_event()).await.unwrap();
    assert_eq!(h.controller.state(), SessionState::Active);
    eventually("the greeting", || h.spoken() == vec!["Hi there".to_string()]).await;

    h.controller
        .handle_event(media_event(&[0x7f; 640]))
        .await
        .unwrap();
    h.controller.close().await;
    assert!(h.providers.control.chunk_sizes().is_empty());
}

#[tokio::test]
async fn test_lost_transport_is_fatal() {
    let providers = Arc::new(echo_providers());
    let (tx, rx) = mpsc::channel(1024);
    drop(rx);
    let config = SessionConfig {
        greeting: "Hello?".to_string(),
        ..Default::default()
    };
    let mut controller = SessionController::new(config, providers.clone(), tx);
    controller.accept();
    controller.handle_event(start_event()).await.unwrap();

    let fatal = controller.fatal_signal();
    tokio::time::timeout(Duration::from_secs(2), fatal.raised())
        .await
        .expect("transport loss should be reported");
    assert!(matches!(
        fatal.take_error(),
        Some(SessionError::Transport(TransportError::Closed(_)))
    ));
    controller.close().await;
}

#[tokio::test]
async fn test_lost_recognizer_is_fatal() {
    let mut h = Harness::started(quiet_config(), echo_providers()).await;
    let fatal = h.controller.fatal_signal();
    assert!(!fatal.is_raised());

    h.providers
        .control
        .emit(RecognizerEvent::ConnectionError(RecognizerError::ConnectionLost(
            "socket reset".to_string(),
        )));
    tokio::time::timeout(Duration::from_secs(2), fatal.raised())
        .await
        .expect("recognizer loss should be reported");
    let error = fatal.take_error().expect("error recorded");
    assert!(error.is_fatal());
    assert!(matches!(error, SessionError::RecognizerConnection(_)));

    h.controller.close().await;
}

#[tokio::test]
async fn test_recognizer_errors_are_tolerated_under_continue() {
    let config = SessionConfig {
        recognizer_failure: RecognizerFailurePolicy::Continue,
        ..quiet_config()
    };
    let h = Harness::started(config, echo_providers()).await;

    h.providers
        .control
        .emit(RecognizerEvent::ConnectionError(RecognizerError::ConnectionLost(
            "socket reset".to_string(),
        )));
    h.providers.control.emit(final_segment("Still there?"));
    eventually("the answer", || {
        h.spoken() == vec!["You said: Still there?".to_string()]
    })
    .await;
    assert!(!h.controller.fatal_signal().is_raised());
}

#[tokio::test]
async fn test_latency_is_recorded_per_stage() {
    let mut h = Harness::started(quiet_config(), echo_providers()).await;

    h.providers.control.emit(final_segment("What time is it?"));
    eventually("the answer", || !h.spoken().is_empty()).await;
    eventually("the synthesis to finish", || {
        h.controller
            .latency()
            .measurements()
            .iter()
            .any(|m| m.stage == crate::core::latency::LatencyStage::TtsTotal)
    })
    .await;
    h.controller.close().await;

    let summary = h.controller.latency().summary().expect("measurements");
    assert_eq!(summary.stages.len(), 4);
}
