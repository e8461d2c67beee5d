use std::sync::Arc;

use tracing::info;

use crate::config::ServerConfig;
use crate::core::providers::{LiveProviders, ProviderFactory};
use crate::core::session::SessionConfig;
use crate::errors::app_error::AppResult;

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Per-call behavior handed to every new session
    pub session_config: SessionConfig,
    /// Vendor clients shared by all sessions
    pub providers: Arc<dyn ProviderFactory>,
}

impl AppState {
    /// Build state backed by the live vendor providers.
    pub fn new(config: ServerConfig) -> AppResult<Arc<Self>> {
        let session_config = config.session_config()?;
        let providers = LiveProviders::new(config.provider_settings(), reqwest::Client::new())?;
        info!(
            scheduling = providers.has_calendar_tools(),
            "Vendor providers ready"
        );
        Ok(Self::with_providers(config, session_config, Arc::new(providers)))
    }

    /// Build state around any provider factory.
    pub fn with_providers(
        config: ServerConfig,
        session_config: SessionConfig,
        providers: Arc<dyn ProviderFactory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            session_config,
            providers,
        })
    }
}
