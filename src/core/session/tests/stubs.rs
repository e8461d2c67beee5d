//! Stub backends for driving a session without network access.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use crate::core::llm::{
    ConversationMessage, EngineError, EngineReply, ReasoningEngine, Role, ToolCallRequest,
    ToolDefinition, ToolError, ToolRegistry,
};
use crate::core::providers::ProviderFactory;
use crate::core::stt::{
    Recognizer, RecognizerError, RecognizerEvent, RecognizerEventStream, RecognizerStats,
};
use crate::core::tts::{AudioChunkStream, SynthesisError, Synthesizer};

/// Observes and drives the stub recognizer of a session.
#[derive(Default)]
pub struct RecognizerControl {
    pub chunks: Mutex<Vec<usize>>,
    pub closes: AtomicUsize,
    pub fail_connect: AtomicBool,
    event_tx: Mutex<Option<mpsc::UnboundedSender<RecognizerEvent>>>,
}

impl RecognizerControl {
    pub fn emit(&self, event: RecognizerEvent) {
        if let Some(tx) = self.event_tx.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().clone()
    }
}

pub struct StubRecognizer {
    control: Arc<RecognizerControl>,
    events: Option<RecognizerEventStream>,
    ready: bool,
    closed: bool,
}

#[async_trait]
impl Recognizer for StubRecognizer {
    async fn connect(&mut self) -> Result<(), RecognizerError> {
        if self.control.fail_connect.load(Ordering::SeqCst) {
            return Err(RecognizerError::ConnectionFailed("refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.control.event_tx.lock() = Some(tx);
        self.events = Some(rx);
        self.ready = true;
        Ok(())
    }

    async fn send_audio(&mut self, audio: Bytes) -> Result<(), RecognizerError> {
        if self.ready && !self.closed {
            self.control.chunks.lock().push(audio.len());
        }
        Ok(())
    }

    fn events(&mut self) -> Option<RecognizerEventStream> {
        self.events.take()
    }

    async fn close(&mut self) -> Result<(), RecognizerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.ready = false;
        self.control.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.control.event_tx.lock().take() {
            let _ = tx.send(RecognizerEvent::ConnectionClosed);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn stats(&self) -> RecognizerStats {
        let chunks = self.control.chunks.lock();
        RecognizerStats {
            audio_bytes_sent: chunks.iter().sum::<usize>() as u64,
            audio_chunks_sent: chunks.len() as u64,
            ..Default::default()
        }
    }

    fn provider_info(&self) -> &'static str {
        "stub"
    }
}

/// Records requested texts and streams fixed-size chunks.
pub struct RecordingSynthesizer {
    pub texts: Mutex<Vec<String>>,
    pub chunks_per_utterance: usize,
    pub chunk_delay: Duration,
}

impl RecordingSynthesizer {
    pub fn new(chunks_per_utterance: usize, chunk_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            texts: Mutex::new(Vec::new()),
            chunks_per_utterance,
            chunk_delay,
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize_stream(&self, text: &str) -> Result<AudioChunkStream, SynthesisError> {
        self.texts.lock().push(text.to_string());
        let delay = self.chunk_delay;
        Ok(stream::iter(0..self.chunks_per_utterance)
            .then(move |_| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, SynthesisError>(Bytes::from(vec![0xffu8; 160]))
            })
            .boxed())
    }

    fn provider_info(&self) -> &'static str {
        "recording"
    }
}

/// Answers every turn with `You said: <text>`.
#[derive(Default)]
pub struct EchoEngine {
    pub calls: AtomicUsize,
    pub delay: Duration,
}

impl EchoEngine {
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
        })
    }
}

#[async_trait]
impl ReasoningEngine for EchoEngine {
    async fn complete(
        &self,
        history: &[ConversationMessage],
        _tools: &[ToolDefinition],
    ) -> Result<EngineReply, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
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

/// Requests the `broken` tool whenever tools are offered.
#[derive(Default)]
pub struct ToolHappyEngine {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ReasoningEngine for ToolHappyEngine {
    async fn complete(
        &self,
        _history: &[ConversationMessage],
        tools: &[ToolDefinition],
    ) -> Result<EngineReply, EngineError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if tools.is_empty() {
            return Ok(EngineReply::Text("done".to_string()));
        }
        Ok(EngineReply::ToolCalls(vec![ToolCallRequest {
            id: format!("call_{n}"),
            name: "broken".to_string(),
            arguments: json!({}),
        }]))
    }

    fn model(&self) -> &str {
        "tool-happy"
    }
}

pub fn broken_tool_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(
        ToolDefinition::new("broken", "Always fails", vec![]),
        |_args| async {
            Err(ToolError::Execution {
                tool: "broken".to_string(),
                reason: "backend down".to_string(),
            })
        },
    );
    registry
}

pub struct StubProviders {
    pub control: Arc<RecognizerControl>,
    pub synthesizer: Arc<RecordingSynthesizer>,
    pub engine: Arc<dyn ReasoningEngine>,
    pub tools: Arc<ToolRegistry>,
}

impl StubProviders {
    pub fn new(synthesizer: Arc<RecordingSynthesizer>, engine: Arc<dyn ReasoningEngine>) -> Self {
        Self {
            control: Arc::new(RecognizerControl::default()),
            synthesizer,
            engine,
            tools: Arc::new(ToolRegistry::new()),
        }
    }
}

impl ProviderFactory for StubProviders {
    fn create_recognizer(&self) -> Result<Box<dyn Recognizer>, RecognizerError> {
        Ok(Box::new(StubRecognizer {
            control: self.control.clone(),
            events: None,
            ready: false,
            closed: false,
        }))
    }

    fn synthesizer(&self) -> Arc<dyn Synthesizer> {
        self.synthesizer.clone()
    }

    fn reasoning_engine(&self) -> Arc<dyn ReasoningEngine> {
        self.engine.clone()
    }

    fn tools(&self) -> Arc<ToolRegistry> {
        self.tools.clone()
    }
}
