use std::env;
use std::path::PathBuf;

use super::utils::{parse_bool, parse_failure_policy, parse_flavor, parse_number};
use super::validation::{validate_business_hours, validate_session};
use super::yaml::YamlConfig;
use super::{ConfigError, ServerConfig};

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. Environment variables
/// 2. YAML configuration values
/// 3. Default values
///
/// The merged configuration is validated before it is returned.
pub fn merge_config(yaml_config: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let yaml = yaml_config.unwrap_or_default();
    let defaults = ServerConfig::default();

    // ENV > YAML > default, for string values
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            env::var($env_var)
                .ok()
                .or($yaml_value)
                .unwrap_or($default)
        };
    }

    // ENV > YAML, for optional values
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            env::var($env_var).ok().or($yaml_value)
        };
    }

    // ENV (parsed) > YAML > default
    macro_rules! get_number {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match env::var($env_var) {
                Ok(raw) => parse_number($env_var, &raw)?,
                Err(_) => $yaml_value.unwrap_or($default),
            }
        };
    }

    macro_rules! get_bool {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            match env::var($env_var) {
                Ok(raw) => parse_bool(&raw).ok_or_else(|| {
                    ConfigError::Invalid(format!("{}: expected a boolean, got '{raw}'", $env_var))
                })?,
                Err(_) => $yaml_value.unwrap_or($default),
            }
        };
    }

    let server = yaml.server.unwrap_or_default();
    let providers = yaml.providers.unwrap_or_default();
    let recognizer = yaml.recognizer.unwrap_or_default();
    let synthesis = yaml.synthesis.unwrap_or_default();
    let engine = yaml.engine.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let calendar = yaml.calendar.unwrap_or_default();

    // Server
    let host = get_value!("HOST", server.host, defaults.host);
    let port = get_number!("PORT", server.port, defaults.port);
    let public_host = get_optional!("PUBLIC_HOST", server.public_host).filter(|h| !h.is_empty());

    // Provider API keys
    let deepgram_api_key = get_optional!("DEEPGRAM_API_KEY", providers.deepgram_api_key);
    let elevenlabs_api_key = get_optional!("ELEVENLABS_API_KEY", providers.elevenlabs_api_key);
    let openai_api_key = get_optional!("OPENAI_API_KEY", providers.openai_api_key);

    // Recognizer
    let recognizer_endpoint = get_value!(
        "DEEPGRAM_ENDPOINT",
        recognizer.endpoint,
        defaults.recognizer_endpoint
    );
    let recognizer_flavor = match get_optional!("DEEPGRAM_FLAVOR", recognizer.flavor) {
        Some(raw) => parse_flavor(&raw)?,
        None => defaults.recognizer_flavor,
    };
    let recognizer_model = get_value!("DEEPGRAM_MODEL", recognizer.model, defaults.recognizer_model);
    let recognizer_language = get_value!(
        "DEEPGRAM_LANGUAGE",
        recognizer.language,
        defaults.recognizer_language
    );
    let recognizer_utterance_end_ms = get_number!(
        "DEEPGRAM_UTTERANCE_END_MS",
        recognizer.utterance_end_ms,
        defaults.recognizer_utterance_end_ms
    );
    let recognizer_smart_format = get_bool!(
        "DEEPGRAM_SMART_FORMAT",
        recognizer.smart_format,
        defaults.recognizer_smart_format
    );
    let recognizer_keepalive_seconds = get_number!(
        "DEEPGRAM_KEEPALIVE_SECONDS",
        recognizer.keepalive_seconds,
        defaults.recognizer_keepalive_seconds
    );

    // Synthesis
    let elevenlabs_base_url = get_value!(
        "ELEVENLABS_BASE_URL",
        synthesis.base_url,
        defaults.elevenlabs_base_url
    );
    let elevenlabs_voice_id = get_value!(
        "ELEVENLABS_VOICE_ID",
        synthesis.voice_id,
        defaults.elevenlabs_voice_id
    );
    let elevenlabs_model_id = get_value!(
        "ELEVENLABS_MODEL_ID",
        synthesis.model_id,
        defaults.elevenlabs_model_id
    );
    let elevenlabs_output_format = get_value!(
        "ELEVENLABS_OUTPUT_FORMAT",
        synthesis.output_format,
        defaults.elevenlabs_output_format
    );

    // Reasoning engine
    let openai_model = get_value!("OPENAI_MODEL", engine.model, defaults.openai_model);
    let openai_base_url = get_value!("OPENAI_BASE_URL", engine.base_url, defaults.openai_base_url);
    let engine_timeout_ms =
        get_number!("ENGINE_TIMEOUT_MS", engine.timeout_ms, defaults.engine_timeout_ms);
    let max_tool_hops = get_number!("MAX_TOOL_HOPS", engine.max_tool_hops, defaults.max_tool_hops);
    let instructions_path =
        get_optional!("INSTRUCTIONS_PATH", engine.instructions_path).map(PathBuf::from);

    // Session
    let flush_threshold_bytes = get_number!(
        "FLUSH_THRESHOLD_BYTES",
        session.flush_threshold_bytes,
        defaults.flush_threshold_bytes
    );
    let greeting = get_value!("GREETING", session.greeting, defaults.greeting);
    let fallback_utterance = get_value!(
        "FALLBACK_UTTERANCE",
        session.fallback_utterance,
        defaults.fallback_utterance
    );
    let recognizer_failure =
        match get_optional!("RECOGNIZER_FAILURE", session.recognizer_failure) {
            Some(raw) => parse_failure_policy(&raw)?,
            None => defaults.recognizer_failure,
        };

    // Calendar
    let calendar_id =
        get_optional!("GOOGLE_CALENDAR_ID", calendar.calendar_id).filter(|id| !id.is_empty());
    let google_credentials = get_optional!("GOOGLE_APPLICATION_CREDENTIALS", calendar.credentials);
    let calendar_utc_offset_minutes = get_number!(
        "CALENDAR_UTC_OFFSET_MINUTES",
        calendar.utc_offset_minutes,
        defaults.calendar_utc_offset_minutes
    );
    let business_hours_start = get_number!(
        "BUSINESS_HOURS_START",
        calendar.business_hours_start,
        defaults.business_hours_start
    );
    let business_hours_end = get_number!(
        "BUSINESS_HOURS_END",
        calendar.business_hours_end,
        defaults.business_hours_end
    );

    let config = ServerConfig {
        host,
        port,
        public_host,
        deepgram_api_key,
        elevenlabs_api_key,
        openai_api_key,
        recognizer_endpoint,
        recognizer_flavor,
        recognizer_model,
        recognizer_language,
        recognizer_utterance_end_ms,
        recognizer_smart_format,
        recognizer_keepalive_seconds,
        elevenlabs_base_url,
        elevenlabs_voice_id,
        elevenlabs_model_id,
        elevenlabs_output_format,
        openai_model,
        openai_base_url,
        engine_timeout_ms,
        max_tool_hops,
        instructions_path,
        flush_threshold_bytes,
        greeting,
        fallback_utterance,
        recognizer_failure,
        calendar_id,
        google_credentials,
        calendar_utc_offset_minutes,
        business_hours_start,
        business_hours_end,
    };

    validate_session(&config)?;
    if config.calendar_id.is_some() {
        validate_business_hours(config.business_hours_start, config.business_hours_end)?;
    }

    Ok(config)
}
