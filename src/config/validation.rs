use super::{ConfigError, ServerConfig};

pub const MAX_TOOL_HOPS_LIMIT: usize = 5;

/// Validate session tuning values
///
/// Ensures the ingress buffer flushes at a positive size and that the engine
/// is bounded both in time and in tool round trips.
pub fn validate_session(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.flush_threshold_bytes == 0 {
        return Err(ConfigError::Invalid(
            "flush_threshold_bytes must be greater than zero".to_string(),
        ));
    }
    if config.engine_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "engine timeout_ms must be greater than zero".to_string(),
        ));
    }
    if !(1..=MAX_TOOL_HOPS_LIMIT).contains(&config.max_tool_hops) {
        return Err(ConfigError::Invalid(format!(
            "max_tool_hops must be between 1 and {MAX_TOOL_HOPS_LIMIT}, got {}",
            config.max_tool_hops
        )));
    }
    if config.recognizer_keepalive_seconds == 0 {
        return Err(ConfigError::Invalid(
            "recognizer keepalive_seconds must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Validate the business-hours window used for scheduling
pub fn validate_business_hours(start: u32, end: u32) -> Result<(), ConfigError> {
    if end > 24 {
        return Err(ConfigError::Invalid(format!(
            "business_hours_end must be at most 24, got {end}"
        )));
    }
    if start >= end {
        return Err(ConfigError::Invalid(format!(
            "business_hours_start ({start}) must be before business_hours_end ({end})"
        )));
    }
    Ok(())
}
