//! Stub vendor backends shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use callwire::config::ServerConfig;
use callwire::core::llm::{
    ConversationMessage, EngineError, EngineReply, ReasoningEngine, Role, ToolDefinition,
    ToolRegistry,
};
use callwire::core::providers::ProviderFactory;
use callwire::core::session::SessionConfig;
use callwire::core::stt::{
    Recognizer, RecognizerError, RecognizerEvent, RecognizerEventStream, RecognizerStats,
};
use callwire::core::tts::{AudioChunkStream, SynthesisError, Synthesizer};
use callwire::{routes, state::AppState};

/// Shared view of what the stub recognizer received, plus a way to push
/// recognizer events into the session.
#[derive(Default)]
pub struct Backends {
    pub audio_bytes: AtomicUsize,
    pub recognizer_closes: AtomicUsize,
    pub spoken: Mutex<Vec<String>>,
    events: Mutex<Option<mpsc::UnboundedSender<RecognizerEvent>>>,
}

impl Backends {
    pub fn emit(&self, event: RecognizerEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn is_listening(&self) -> bool {
        self.events.lock().is_some()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

struct StubRecognizer {
    backends: Arc<Backends>,
    events: Option<RecognizerEventStream>,
}

#[async_trait]
impl Recognizer for StubRecognizer {
    async fn connect(&mut self) -> Result<(), RecognizerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.backends.events.lock() = Some(tx);
        self.events = Some(rx);
        Ok(())
    }

    async fn send_audio(&mut self, audio: Bytes) -> Result<(), RecognizerError> {
        self.backends
            .audio_bytes
            .fetch_add(audio.len(), Ordering::SeqCst);
        Ok(())
    }

    fn events(&mut self) -> Option<RecognizerEventStream> {
        self.events.take()
    }

    async fn close(&mut self) -> Result<(), RecognizerError> {
        self.backends.recognizer_closes.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.backends.events.lock().take() {
            let _ = tx.send(RecognizerEvent::ConnectionClosed);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn stats(&self) -> RecognizerStats {
        RecognizerStats::default()
    }

    fn provider_info(&self) -> &'static str {
        "stub"
    }
}

struct StubSynthesizer {
    backends: Arc<Backends>,
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    async fn synthesize_stream(&self, text: &str) -> Result<AudioChunkStream, SynthesisError> {
        self.backends.spoken.lock().push(text.to_string());
        Ok(stream::iter(vec![
            Ok::<_, SynthesisError>(Bytes::from_static(&[0xff; 160])),
            Ok(Bytes::from_static(&[0x7f; 160])),
        ])
        .boxed())
    }

    fn provider_info(&self) -> &'static str {
        "stub"
    }
}

struct EchoEngine;

#[async_trait]
impl ReasoningEngine for EchoEngine {
    async fn complete(
        &self,
        history: &[ConversationMessage],
        _tools: &[ToolDefinition],
    ) -> Result<EngineReply, EngineError> {
        let last = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text().to_string())
            .unwrap_or_default();
        Ok(EngineReply::Text(format!("You said: {last}")))
    }

    fn model(&self) -> &str {
        "echo"
    }
}

pub struct StubProviders {
    backends: Arc<Backends>,
}

impl ProviderFactory for StubProviders {
    fn create_recognizer(&self) -> Result<Box<dyn Recognizer>, RecognizerError> {
        Ok(Box::new(StubRecognizer {
            backends: self.backends.clone(),
            events: None,
        }))
    }

    fn synthesizer(&self) -> Arc<dyn Synthesizer> {
        Arc::new(StubSynthesizer {
            backends: self.backends.clone(),
        })
    }

    fn reasoning_engine(&self) -> Arc<dyn ReasoningEngine> {
        Arc::new(EchoEngine)
    }

    fn tools(&self) -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new())
    }
}

/// App state wired to stub backends.
pub fn stub_state(config: ServerConfig, session: SessionConfig) -> (Arc<AppState>, Arc<Backends>) {
    let backends = Arc::new(Backends::default());
    let providers = Arc::new(StubProviders {
        backends: backends.clone(),
    });
    (
        AppState::with_providers(config, session, providers),
        backends,
    )
}

/// Serve the full router on an ephemeral port and return its address.
pub async fn spawn_server(state: Arc<AppState>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routes::create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
