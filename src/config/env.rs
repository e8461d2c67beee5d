use super::merge::merge_config;
use super::{ConfigError, ServerConfig};

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// Reads a `.env` file first when one exists, then applies defaults for
    /// anything unset.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or validation fails.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        merge_config(None)
    }
}
