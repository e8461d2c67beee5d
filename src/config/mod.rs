//! Configuration module for the callwire server
//!
//! Configuration comes from a YAML file, environment variables, or both.
//! Environment variables always override YAML values.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Parsing helpers for individual settings
//!
//! # Example
//! ```rust,no_run
//! use callwire::config::ServerConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ServerConfig::from_file(Path::new("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::audio::{AudioEncoding, DEFAULT_FLUSH_THRESHOLD_BYTES};
use crate::core::calendar::CalendarSettings;
use crate::core::llm::{
    ConversationConfig, DEFAULT_FALLBACK_UTTERANCE, DEFAULT_MAX_TOOL_HOPS, DEFAULT_OPENAI_MODEL,
    OPENAI_BASE_URL, build_system_prompt,
};
use crate::core::providers::{EngineSettings, ProviderSettings};
use crate::core::session::{DEFAULT_GREETING, RecognizerFailurePolicy, SessionConfig};
use crate::core::stt::{RecognizerConfig, RecognizerFlavor};
use crate::core::tts::{
    DEFAULT_ELEVENLABS_MODEL, DEFAULT_ELEVENLABS_VOICE, DEFAULT_OUTPUT_FORMAT, ELEVENLABS_BASE_URL,
    ElevenLabsConfig,
};

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

pub use utils::parse_bool;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("Invalid YAML configuration: {0}")]
    Parse(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
///
/// Contains everything needed to run the server:
/// - Server settings (host, port, public host for carrier callbacks)
/// - Provider API keys (Deepgram, ElevenLabs, OpenAI)
/// - Recognizer, synthesis and engine tuning
/// - Per-call session behavior
/// - Optional Google Calendar scheduling
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub public_host: Option<String>,

    // Provider API keys
    pub deepgram_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub openai_api_key: Option<String>,

    // Recognizer
    pub recognizer_endpoint: String,
    pub recognizer_flavor: RecognizerFlavor,
    pub recognizer_model: String,
    pub recognizer_language: String,
    pub recognizer_utterance_end_ms: u32,
    pub recognizer_smart_format: bool,
    pub recognizer_keepalive_seconds: u64,

    // Synthesis
    pub elevenlabs_base_url: String,
    pub elevenlabs_voice_id: String,
    pub elevenlabs_model_id: String,
    pub elevenlabs_output_format: String,

    // Reasoning engine
    pub openai_model: String,
    pub openai_base_url: String,
    pub engine_timeout_ms: u64,
    pub max_tool_hops: usize,
    pub instructions_path: Option<PathBuf>,

    // Session
    pub flush_threshold_bytes: usize,
    pub greeting: String,
    pub fallback_utterance: String,
    pub recognizer_failure: RecognizerFailurePolicy,

    // Calendar scheduling (enabled when calendar_id is set)
    pub calendar_id: Option<String>,
    pub google_credentials: Option<String>,
    pub calendar_utc_offset_minutes: i32,
    pub business_hours_start: u32,
    pub business_hours_end: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let recognizer = RecognizerConfig::default();
        let calendar = CalendarSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 5050,
            public_host: None,
            deepgram_api_key: None,
            elevenlabs_api_key: None,
            openai_api_key: None,
            recognizer_endpoint: recognizer.endpoint,
            recognizer_flavor: recognizer.flavor,
            recognizer_model: recognizer.model,
            recognizer_language: recognizer.language,
            recognizer_utterance_end_ms: recognizer.utterance_end_ms,
            recognizer_smart_format: recognizer.smart_format,
            recognizer_keepalive_seconds: recognizer.keepalive_interval.as_secs(),
            elevenlabs_base_url: ELEVENLABS_BASE_URL.to_string(),
            elevenlabs_voice_id: DEFAULT_ELEVENLABS_VOICE.to_string(),
            elevenlabs_model_id: DEFAULT_ELEVENLABS_MODEL.to_string(),
            elevenlabs_output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            openai_base_url: OPENAI_BASE_URL.to_string(),
            engine_timeout_ms: 5000,
            max_tool_hops: DEFAULT_MAX_TOOL_HOPS,
            instructions_path: None,
            flush_threshold_bytes: DEFAULT_FLUSH_THRESHOLD_BYTES,
            greeting: DEFAULT_GREETING.to_string(),
            fallback_utterance: DEFAULT_FALLBACK_UTTERANCE.to_string(),
            recognizer_failure: RecognizerFailurePolicy::default(),
            calendar_id: None,
            google_credentials: None,
            calendar_utc_offset_minutes: calendar.utc_offset_minutes,
            business_hours_start: calendar.business_hours_start,
            business_hours_end: calendar.business_hours_end,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides
    ///
    /// Priority order (highest to lowest):
    /// 1. Environment variables
    /// 2. YAML file values
    /// 3. Default values
    ///
    /// `.env` is not read here: the file named on the command line is the
    /// source of truth, and only real environment variables override it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        merge::merge_config(Some(yaml_config))
    }

    /// Get the server address as a string in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_calendar(&self) -> bool {
        self.calendar_id.is_some()
    }

    /// Per-call behavior handed to every session.
    ///
    /// Reads the instructions file when one is configured.
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let instructions = match &self.instructions_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
            None => String::new(),
        };

        Ok(SessionConfig {
            flush_threshold_bytes: self.flush_threshold_bytes,
            encoding: AudioEncoding::Mulaw,
            sample_rate: 8000,
            greeting: self.greeting.clone(),
            recognizer_failure: self.recognizer_failure,
            conversation: ConversationConfig {
                system_prompt: build_system_prompt(&instructions, self.has_calendar()),
                max_tool_hops: self.max_tool_hops,
                engine_timeout: Duration::from_millis(self.engine_timeout_ms),
                fallback_utterance: self.fallback_utterance.clone(),
            },
        })
    }

    /// Vendor connection settings shared by every session.
    pub fn provider_settings(&self) -> ProviderSettings {
        let recognizer = RecognizerConfig {
            api_key: self.deepgram_api_key.clone().unwrap_or_default(),
            endpoint: self.recognizer_endpoint.clone(),
            flavor: self.recognizer_flavor,
            model: self.recognizer_model.clone(),
            language: self.recognizer_language.clone(),
            utterance_end_ms: self.recognizer_utterance_end_ms,
            smart_format: self.recognizer_smart_format,
            keepalive_interval: Duration::from_secs(self.recognizer_keepalive_seconds),
            ..Default::default()
        };
        let synthesis = ElevenLabsConfig {
            api_key: self.elevenlabs_api_key.clone().unwrap_or_default(),
            base_url: self.elevenlabs_base_url.clone(),
            voice_id: self.elevenlabs_voice_id.clone(),
            model_id: self.elevenlabs_model_id.clone(),
            output_format: self.elevenlabs_output_format.clone(),
        };
        let engine = EngineSettings {
            api_key: self.openai_api_key.clone().unwrap_or_default(),
            base_url: self.openai_base_url.clone(),
            model: self.openai_model.clone(),
            timeout: Duration::from_millis(self.engine_timeout_ms),
        };
        let calendar = self.calendar_id.as_ref().map(|calendar_id| CalendarSettings {
            calendar_id: calendar_id.clone(),
            credentials: self.google_credentials.clone().unwrap_or_default(),
            utc_offset_minutes: self.calendar_utc_offset_minutes,
            business_hours_start: self.business_hours_start,
            business_hours_end: self.business_hours_end,
        });

        ProviderSettings {
            recognizer,
            synthesis,
            engine,
            calendar,
        }
    }
}
