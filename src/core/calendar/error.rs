/// Errors from Google credential handling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GoogleError {
    /// Credentials could not be loaded or a token could not be minted
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Missing or malformed credential configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Errors from calendar operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalendarError {
    #[error(transparent)]
    Auth(#[from] GoogleError),

    #[error("Calendar request failed: {0}")]
    RequestFailed(String),

    #[error("Calendar API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid calendar response: {0}")]
    InvalidResponse(String),
}

impl CalendarError {
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => CalendarError::Auth(GoogleError::AuthenticationFailed(body)),
            code => CalendarError::Api { status: code, body },
        }
    }
}
