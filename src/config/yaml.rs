use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// Every field is optional so a file may carry only the values it cares
/// about. Environment variables override anything set here.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5050
///   public_host: "voice.example.com"
///
/// providers:
///   deepgram_api_key: "dg-key"
///   elevenlabs_api_key: "el-key"
///   openai_api_key: "sk-key"
///
/// recognizer:
///   model: "nova-3"
///   language: "en-US"
///   flavor: "listen"
///   utterance_end_ms: 2000
///   smart_format: true
///   keepalive_seconds: 5
///
/// synthesis:
///   voice_id: "UgBBYS2sOqTuMpoF3BR0"
///   model_id: "eleven_turbo_v2_5"
///   output_format: "ulaw_8000"
///
/// engine:
///   model: "gpt-4.1-nano"
///   timeout_ms: 5000
///   max_tool_hops: 3
///   instructions_path: "instructions.txt"
///
/// session:
///   flush_threshold_bytes: 640
///   greeting: "Hello! Thanks for calling."
///   recognizer_failure: "abort"
///
/// calendar:
///   calendar_id: "office@example.com"
///   credentials: "/secrets/service-account.json"
///   utc_offset_minutes: -300
///   business_hours_start: 9
///   business_hours_end: 17
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub providers: Option<ProvidersYaml>,
    pub recognizer: Option<RecognizerYaml>,
    pub synthesis: Option<SynthesisYaml>,
    pub engine: Option<EngineYaml>,
    pub session: Option<SessionYaml>,
    pub calendar: Option<CalendarYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Host name the carrier should dial back to for the media stream
    pub public_host: Option<String>,
}

/// Provider API keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    pub deepgram_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RecognizerYaml {
    pub endpoint: Option<String>,
    pub flavor: Option<String>,
    pub model: Option<String>,
    pub language: Option<String>,
    pub utterance_end_ms: Option<u32>,
    pub smart_format: Option<bool>,
    pub keepalive_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub base_url: Option<String>,
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub output_format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineYaml {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_tool_hops: Option<usize>,
    pub instructions_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionYaml {
    pub flush_threshold_bytes: Option<usize>,
    pub greeting: Option<String>,
    pub fallback_utterance: Option<String>,
    /// `abort` or `continue`
    pub recognizer_failure: Option<String>,
}

/// Calendar tools are enabled when `calendar_id` is present.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CalendarYaml {
    pub calendar_id: Option<String>,
    /// Path to a service-account JSON file, or the inline JSON itself
    pub credentials: Option<String>,
    pub utc_offset_minutes: Option<i32>,
    pub business_hours_start: Option<u32>,
    pub business_hours_end: Option<u32>,
}

impl YamlConfig {
    /// Load and parse a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
