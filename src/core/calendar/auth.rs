//! Google service-account credentials for the Calendar API.
//!
//! Credentials come from one of three places:
//!
//! - **Application Default Credentials** when nothing is configured
//! - **Inline JSON** when the configured value starts with `{`
//! - **File path** otherwise

use std::path::Path;

use google_cloud_auth::credentials::{Builder as CredentialsBuilder, CacheableResource, Credentials};
use http::Extensions;
use tracing::{debug, error};

use super::error::GoogleError;

pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    ApplicationDefault,
    JsonContent(String),
    FilePath(String),
}

impl CredentialSource {
    /// Classify a configured credential string.
    pub fn from_setting(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            CredentialSource::ApplicationDefault
        } else if trimmed.starts_with('{') {
            CredentialSource::JsonContent(trimmed.to_string())
        } else {
            CredentialSource::FilePath(trimmed.to_string())
        }
    }

    /// Load the service-account JSON, if this source carries one.
    fn service_account_json(&self) -> Result<Option<serde_json::Value>, GoogleError> {
        let raw = match self {
            CredentialSource::ApplicationDefault => return Ok(None),
            CredentialSource::JsonContent(json) => json.clone(),
            CredentialSource::FilePath(path) => {
                if path.contains("..") {
                    return Err(GoogleError::ConfigurationError(
                        "Invalid credential file path: path traversal not allowed".to_string(),
                    ));
                }
                if !Path::new(path).exists() {
                    return Err(GoogleError::ConfigurationError(format!(
                        "Credential file not found: {path}"
                    )));
                }
                std::fs::read_to_string(path).map_err(|e| {
                    GoogleError::ConfigurationError(format!(
                        "Failed to read credentials file '{path}': {e}"
                    ))
                })?
            }
        };

        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            GoogleError::ConfigurationError(format!("Invalid credentials JSON: {e}"))
        })?;
        match value.get("type").and_then(|t| t.as_str()) {
            Some("service_account") => Ok(Some(value)),
            other => Err(GoogleError::ConfigurationError(format!(
                "Expected a service_account credential, found {}",
                other.unwrap_or("no type")
            ))),
        }
    }
}

/// Supplies OAuth2 bearer tokens.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self) -> Result<String, GoogleError>;
}

/// Token provider backed by `google-cloud-auth` credentials.
pub struct GoogleAuthClient {
    credentials: Credentials,
}

impl std::fmt::Debug for GoogleAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAuthClient")
            .field("credentials", &"<credentials>")
            .finish()
    }
}

impl GoogleAuthClient {
    pub fn new(source: &CredentialSource) -> Result<Self, GoogleError> {
        let scopes = vec![CALENDAR_SCOPE.to_string()];

        let credentials = match source.service_account_json()? {
            Some(json) => {
                use google_cloud_auth::credentials::service_account;
                service_account::Builder::new(json)
                    .with_access_specifier(service_account::AccessSpecifier::from_scopes(scopes))
                    .build()
                    .map_err(|e| {
                        error!(error = %e, "Failed to load service account credentials");
                        GoogleError::AuthenticationFailed(format!(
                            "Failed to load service account credentials: {e}"
                        ))
                    })?
            }
            None => CredentialsBuilder::default()
                .with_scopes(scopes)
                .build()
                .map_err(|e| {
                    GoogleError::AuthenticationFailed(format!(
                        "Failed to initialize Application Default Credentials: {e}"
                    ))
                })?,
        };

        debug!("Google Calendar credentials initialized");
        Ok(Self { credentials })
    }

    fn bearer_from_headers(
        headers: CacheableResource<http::HeaderMap>,
    ) -> Result<String, GoogleError> {
        let header_map = match headers {
            CacheableResource::New { data, .. } => data,
            CacheableResource::NotModified => {
                return Err(GoogleError::AuthenticationFailed(
                    "Received NotModified response but no cached token available".to_string(),
                ));
            }
        };

        let value = header_map
            .get(http::header::AUTHORIZATION)
            .ok_or_else(|| {
                GoogleError::AuthenticationFailed(
                    "No Authorization header in credentials response".to_string(),
                )
            })?
            .to_str()
            .map_err(|e| {
                GoogleError::AuthenticationFailed(format!("Invalid Authorization header: {e}"))
            })?;

        value
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| {
                GoogleError::AuthenticationFailed(
                    "Authorization header is not a Bearer token".to_string(),
                )
            })
    }
}

#[async_trait::async_trait]
impl TokenProvider for GoogleAuthClient {
    async fn get_token(&self) -> Result<String, GoogleError> {
        let headers = self
            .credentials
            .headers(Extensions::new())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch access token");
                GoogleError::AuthenticationFailed(format!("Failed to fetch access token: {e}"))
            })?;
        Self::bearer_from_headers(headers)
    }
}

/// Fixed token, for tests against a mock Calendar API.
#[cfg(test)]
pub struct StaticTokenProvider(pub String);

#[cfg(test)]
#[async_trait::async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Result<String, GoogleError> {
        Ok(self.0.clone())
    }
}
