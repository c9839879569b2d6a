//! Text-to-speech adapter
//!
//! Submits the assistant's reply text with the configured voice options and
//! returns the synthesized MP3 payload. The service responds with the audio
//! base64-encoded inside a JSON envelope.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;

use voice_gateway_core::{AdapterError, TextToSpeech, VoiceConfig};

/// TTS client configuration
#[derive(Debug, Clone)]
pub struct TtsClientConfig {
    /// Base URL of the TTS service
    pub url: String,
    /// Optional API key sent as a bearer header
    pub api_key: Option<String>,
    /// Transport-level timeout in milliseconds
    pub timeout_ms: u64,
    /// Longest text the service accepts in one request
    pub max_text_chars: usize,
}

impl Default for TtsClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8092".to_string(),
            api_key: None,
            timeout_ms: 30_000,
            max_text_chars: 5_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

/// HTTP text-to-speech adapter
pub struct HttpTextToSpeech {
    config: TtsClientConfig,
    client: reqwest::Client,
}

impl HttpTextToSpeech {
    pub fn new(config: TtsClientConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AdapterError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn new_with_url(url: impl Into<String>) -> Result<Self, AdapterError> {
        Self::new(TtsClientConfig {
            url: url.into(),
            ..Default::default()
        })
    }
}

#[async_trait]
impl TextToSpeech for HttpTextToSpeech {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, AdapterError> {
        if text.is_empty() {
            return Err(AdapterError::InvalidInput("empty text".to_string()));
        }
        if text.len() > self.config.max_text_chars {
            return Err(AdapterError::InvalidInput(format!(
                "text too long: {} chars (limit {})",
                text.len(),
                self.config.max_text_chars
            )));
        }

        let url = format!("{}/synthesize", self.config.url);
        let mut request = self.client.post(&url).json(&serde_json::json!({
            "text": text,
            "languageCode": voice.language_code,
            "voiceName": voice.voice_name,
            "gender": voice.gender,
            "speakingRate": voice.speaking_rate,
            "audioEncoding": "MP3",
        }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::Request(format!("TTS request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Service {
                status: status.as_u16(),
                message: body,
            });
        }

        let result: TtsResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(format!("Failed to parse TTS response: {}", e)))?;

        let audio = BASE64
            .decode(&result.audio_content)
            .map_err(|e| AdapterError::Decode(format!("Invalid base64 audio: {}", e)))?;

        tracing::debug!(bytes = audio.len(), "Synthesized reply audio");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TtsClientConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8092");
        assert_eq!(config.max_text_chars, 5_000);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_network() {
        let tts = HttpTextToSpeech::new(TtsClientConfig::default()).unwrap();
        let err = tts
            .synthesize("", &VoiceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidInput(_)));
    }
}
