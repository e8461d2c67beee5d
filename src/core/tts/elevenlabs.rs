use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error};

use super::base::{AudioChunkStream, SynthesisError, Synthesizer};

pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
pub const DEFAULT_ELEVENLABS_VOICE: &str = "UgBBYS2sOqTuMpoF3BR0";
pub const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_turbo_v2_5";
/// Mu-law at 8 kHz, the telephony transport's native format
pub const DEFAULT_OUTPUT_FORMAT: &str = "ulaw_8000";

#[derive(Debug, Clone, PartialEq)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub output_format: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: ELEVENLABS_BASE_URL.to_string(),
            voice_id: DEFAULT_ELEVENLABS_VOICE.to_string(),
            model_id: DEFAULT_ELEVENLABS_MODEL.to_string(),
            output_format: DEFAULT_OUTPUT_FORMAT.to_string(),
        }
    }
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// ElevenLabs streaming synthesis over the HTTP REST API
pub struct ElevenLabsSynthesizer {
    client: reqwest::Client,
    config: ElevenLabsConfig,
}

impl ElevenLabsSynthesizer {
    pub fn new(client: reqwest::Client, config: ElevenLabsConfig) -> Result<Self, SynthesisError> {
        if config.api_key.trim().is_empty() {
            return Err(SynthesisError::InvalidConfiguration(
                "API key is required for ElevenLabs".to_string(),
            ));
        }
        if config.voice_id.trim().is_empty() {
            return Err(SynthesisError::InvalidConfiguration(
                "Voice ID is required for ElevenLabs".to_string(),
            ));
        }
        Ok(Self { client, config })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }
}

#[async_trait]
impl Synthesizer for ElevenLabsSynthesizer {
    async fn synthesize_stream(&self, text: &str) -> Result<AudioChunkStream, SynthesisError> {
        debug!(chars = text.len(), voice = %self.config.voice_id, "Requesting synthesis");

        let response = self
            .client
            .post(self.stream_url())
            .query(&[("output_format", self.config.output_format.as_str())])
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/basic")
            .json(&StreamRequest {
                text,
                model_id: &self.config.model_id,
            })
            .send()
            .await
            .map_err(|e| SynthesisError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, body = %body, "TTS API error");
            return Err(SynthesisError::ProviderError {
                status: status.as_u16(),
                body,
            });
        }

        let chunks = response
            .bytes_stream()
            .filter_map(|item| async move {
                match item {
                    Ok(bytes) if bytes.is_empty() => None,
                    Ok(bytes) => Some(Ok(bytes)),
                    Err(e) => Some(Err(SynthesisError::StreamInterrupted(e.to_string()))),
                }
            })
            .boxed();
        Ok(chunks)
    }

    fn provider_info(&self) -> &'static str {
        "elevenlabs"
    }
}
