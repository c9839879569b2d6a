//! Speech-to-text adapter
//!
//! Takes one complete WAV-containerized utterance, extracts the 16-bit PCM
//! payload, and submits it to the STT service together with the recognition
//! options. An empty transcript in the response is propagated as a legal
//! "no speech detected" outcome, never as an error.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use std::io::Cursor;

use voice_gateway_core::{AdapterError, AudioConfig, SpeechToText, Transcript};

/// STT client configuration
#[derive(Debug, Clone)]
pub struct SttClientConfig {
    /// Base URL of the STT service
    pub url: String,
    /// Optional API key sent as a bearer header
    pub api_key: Option<String>,
    /// Transport-level timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SttClientConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8091".to_string(),
            api_key: None,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SttResponse {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// HTTP speech-to-text adapter
pub struct HttpSpeechToText {
    config: SttClientConfig,
    client: reqwest::Client,
}

impl HttpSpeechToText {
    pub fn new(config: SttClientConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AdapterError::Request(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn new_with_url(url: impl Into<String>) -> Result<Self, AdapterError> {
        Self::new(SttClientConfig {
            url: url.into(),
            ..Default::default()
        })
    }

    /// Decode the WAV container and return the raw PCM16 data chunk plus
    /// the utterance duration in milliseconds.
    fn extract_pcm(audio: &[u8]) -> Result<(Vec<u8>, u64), AdapterError> {
        let mut reader = hound::WavReader::new(Cursor::new(audio))
            .map_err(|e| AdapterError::InvalidInput(format!("not a WAV container: {}", e)))?;
        let spec = reader.spec();

        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(AdapterError::InvalidInput(format!(
                "unsupported sample format: {} bits {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        let samples: Vec<i16> = reader
            .samples::<i16>()
            .collect::<Result<_, _>>()
            .map_err(|e| AdapterError::InvalidInput(format!("truncated WAV data: {}", e)))?;

        let duration_ms = if spec.sample_rate > 0 {
            samples.len() as u64 * 1000 / (spec.sample_rate as u64 * spec.channels as u64)
        } else {
            0
        };

        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Ok((pcm, duration_ms))
    }
}

#[async_trait]
impl SpeechToText for HttpSpeechToText {
    async fn transcribe(
        &self,
        audio: &[u8],
        config: &AudioConfig,
    ) -> Result<Transcript, AdapterError> {
        let (pcm, duration_ms) = Self::extract_pcm(audio)?;
        tracing::debug!(bytes = pcm.len(), duration_ms, "Submitting utterance to STT");

        let url = format!("{}/transcribe", self.config.url);
        let mut request = self.client.post(&url).json(&serde_json::json!({
            "audio": BASE64.encode(&pcm),
            "encoding": config.encoding.as_str(),
            "sampleRateHz": config.sample_rate_hz,
            "languageCode": config.language_code,
        }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::Request(format!("STT request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Service {
                status: status.as_u16(),
                message: body,
            });
        }

        let result: SttResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Decode(format!("Failed to parse STT response: {}", e)))?;

        Ok(Transcript {
            text: result.transcript,
            confidence: result.confidence,
        })
    }
}
