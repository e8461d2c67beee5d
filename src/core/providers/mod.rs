//! Vendor wiring for call sessions.
//!
//! Sessions only see the capability traits. [`LiveProviders`] binds them to
//! Deepgram, ElevenLabs, OpenAI and (optionally) Google Calendar; tests swap
//! in their own [`ProviderFactory`].

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::core::calendar::{
    CalendarSettings, CredentialSource, GOOGLE_CALENDAR_BASE_URL, GoogleAuthClient,
    GoogleCalendarClient, GoogleError, Scheduler, register_calendar_tools,
};
use crate::core::llm::{
    DEFAULT_OPENAI_MODEL, EngineError, OPENAI_BASE_URL, OpenAIEngine, ReasoningEngine,
    ToolRegistry,
};
use crate::core::stt::{Recognizer, RecognizerConfig, RecognizerError, create_recognizer};
use crate::core::tts::{ElevenLabsConfig, ElevenLabsSynthesizer, SynthesisError, Synthesizer};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            timeout: Duration::from_millis(5000),
        }
    }
}

/// Everything needed to talk to the vendor backends.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderSettings {
    pub recognizer: RecognizerConfig,
    pub synthesis: ElevenLabsConfig,
    pub engine: EngineSettings,
    /// Calendar tools are registered only when this is set
    pub calendar: Option<CalendarSettings>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("synthesizer: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("reasoning engine: {0}")]
    Engine(#[from] EngineError),
    #[error("calendar: {0}")]
    Calendar(#[from] GoogleError),
}

/// Creates the backends one call session uses.
pub trait ProviderFactory: Send + Sync {
    /// A fresh, unconnected recognizer for one call.
    fn create_recognizer(&self) -> Result<Box<dyn Recognizer>, RecognizerError>;

    fn synthesizer(&self) -> Arc<dyn Synthesizer>;

    fn reasoning_engine(&self) -> Arc<dyn ReasoningEngine>;

    fn tools(&self) -> Arc<ToolRegistry>;
}

/// Production backends. Stateless clients are built once and shared.
pub struct LiveProviders {
    recognizer: RecognizerConfig,
    synthesizer: Arc<dyn Synthesizer>,
    engine: Arc<dyn ReasoningEngine>,
    tools: Arc<ToolRegistry>,
}

impl LiveProviders {
    pub fn new(settings: ProviderSettings, http: reqwest::Client) -> Result<Self, ProviderError> {
        settings.recognizer.validate()?;

        let synthesizer = ElevenLabsSynthesizer::new(http.clone(), settings.synthesis)?;
        let engine = OpenAIEngine::new(
            http.clone(),
            settings.engine.base_url,
            settings.engine.api_key,
            settings.engine.model,
            settings.engine.timeout,
        )?;

        let mut tools = ToolRegistry::new();
        if let Some(calendar) = settings.calendar {
            let auth = GoogleAuthClient::new(&CredentialSource::from_setting(&calendar.credentials))?;
            let client = GoogleCalendarClient::new(
                http,
                GOOGLE_CALENDAR_BASE_URL,
                calendar.calendar_id.clone(),
                Arc::new(auth),
            );
            info!(calendar = %calendar.calendar_id, "Calendar tools enabled");
            let scheduler = Arc::new(Scheduler::new(Arc::new(client), calendar));
            register_calendar_tools(&mut tools, scheduler);
        }

        Ok(Self {
            recognizer: settings.recognizer,
            synthesizer: Arc::new(synthesizer),
            engine: Arc::new(engine),
            tools: Arc::new(tools),
        })
    }

    /// Whether scheduling tools were registered.
    pub fn has_calendar_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

impl ProviderFactory for LiveProviders {
    fn create_recognizer(&self) -> Result<Box<dyn Recognizer>, RecognizerError> {
        create_recognizer(self.recognizer.clone())
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
