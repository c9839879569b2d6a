//! Audio and voice configuration types for the STT/TTS adapters

use serde::{Deserialize, Serialize};

/// Recognised audio encodings for inbound utterances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    #[default]
    Linear16,
}

impl AudioEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear16 => "LINEAR16",
        }
    }
}

/// Recognition options passed to the STT adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub encoding: AudioEncoding,
    pub sample_rate_hz: u32,
    pub language_code: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            encoding: AudioEncoding::Linear16,
            sample_rate_hz: 16_000,
            language_code: "en-IN".to_string(),
        }
    }
}

/// Voice gender for synthesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceGender {
    #[default]
    Female,
    Male,
    Neutral,
}

/// Synthesis options passed to the TTS adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    pub language_code: String,
    pub voice_name: String,
    pub gender: VoiceGender,
    pub speaking_rate: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language_code: "en-IN".to_string(),
            voice_name: "en-IN-Wavenet-A".to_string(),
            gender: VoiceGender::Female,
            speaking_rate: 1.0,
        }
    }
}

/// Result of transcribing one utterance
///
/// An empty `text` is a legal outcome meaning no speech was detected.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Transcript {
    pub text: String,
    /// Recognizer confidence in [0, 1]
    pub confidence: f32,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
