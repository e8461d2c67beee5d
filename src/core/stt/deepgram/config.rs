//! Connection parameters and URL construction for the Deepgram streaming API.

use url::Url;

use crate::core::stt::base::{RecognizerConfig, RecognizerError, RecognizerFlavor};

/// Model used on the turn-aware endpoint when the configured one is not a flux model.
pub const DEFAULT_FLUX_MODEL: &str = "flux-general-en";

impl RecognizerConfig {
    /// Validate the configuration.
    ///
    /// Checks that the API key is present, the endpoint is a WebSocket URL and
    /// the audio description is usable.
    pub fn validate(&self) -> Result<(), RecognizerError> {
        if self.api_key.trim().is_empty() {
            return Err(RecognizerError::ConfigurationError(
                "API key is required for Deepgram".to_string(),
            ));
        }
        if !(self.endpoint.starts_with("wss://") || self.endpoint.starts_with("ws://")) {
            return Err(RecognizerError::ConfigurationError(format!(
                "Recognizer endpoint must be a ws:// or wss:// URL, got {}",
                self.endpoint
            )));
        }
        if self.sample_rate == 0 {
            return Err(RecognizerError::ConfigurationError(
                "Sample rate must be greater than 0".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(RecognizerError::ConfigurationError(
                "Channel count must be greater than 0".to_string(),
            ));
        }
        if self.keepalive_interval.is_zero() {
            return Err(RecognizerError::ConfigurationError(
                "Keepalive interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the streaming URL for the configured flavor.
    pub fn build_websocket_url(&self) -> Result<Url, RecognizerError> {
        let base = self.endpoint.trim_end_matches('/');
        let path = match self.flavor {
            RecognizerFlavor::Listen => "/v1/listen",
            RecognizerFlavor::Flux => "/v2/listen",
        };

        let mut url = Url::parse(&format!("{base}{path}")).map_err(|e| {
            RecognizerError::ConfigurationError(format!("Invalid recognizer endpoint: {e}"))
        })?;

        {
            let mut query = url.query_pairs_mut();
            match self.flavor {
                RecognizerFlavor::Listen => {
                    query.append_pair("model", &self.model);
                    query.append_pair("language", &self.language);
                    query.append_pair("encoding", self.encoding.as_str());
                    query.append_pair("sample_rate", &self.sample_rate.to_string());
                    query.append_pair("channels", &self.channels.to_string());
                    query.append_pair("smart_format", bool_str(self.smart_format));
                    query.append_pair("interim_results", bool_str(self.interim_results));
                    // utterance_end_ms is only honoured alongside interim results
                    if self.interim_results && self.utterance_end_ms > 0 {
                        query.append_pair("utterance_end_ms", &self.utterance_end_ms.to_string());
                    }
                }
                RecognizerFlavor::Flux => {
                    let model = if self.model.starts_with("flux") {
                        self.model.as_str()
                    } else {
                        DEFAULT_FLUX_MODEL
                    };
                    query.append_pair("model", model);
                    query.append_pair("encoding", self.encoding.as_str());
                    query.append_pair("sample_rate", &self.sample_rate.to_string());
                }
            }
        }

        Ok(url)
    }
}

fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
