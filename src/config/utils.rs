use crate::core::session::RecognizerFailurePolicy;
use crate::core::stt::RecognizerFlavor;

use super::ConfigError;

/// Parse a boolean value from a string, supporting multiple formats
///
/// Accepts: "true", "false", "1", "0", "yes", "no" (case insensitive)
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub fn parse_flavor(s: &str) -> Result<RecognizerFlavor, ConfigError> {
    match s.trim().to_lowercase().as_str() {
        "listen" | "v1" => Ok(RecognizerFlavor::Listen),
        "flux" | "v2" => Ok(RecognizerFlavor::Flux),
        other => Err(ConfigError::Invalid(format!(
            "unknown recognizer flavor '{other}' (expected listen or flux)"
        ))),
    }
}

pub fn parse_failure_policy(s: &str) -> Result<RecognizerFailurePolicy, ConfigError> {
    match s.trim().to_lowercase().as_str() {
        "abort" => Ok(RecognizerFailurePolicy::Abort),
        "continue" => Ok(RecognizerFailurePolicy::Continue),
        other => Err(ConfigError::Invalid(format!(
            "unknown recognizer failure policy '{other}' (expected abort or continue)"
        ))),
    }
}

/// Parse a numeric setting, naming the setting in the error.
pub fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))
}
