//! Frame envelopes for the WebSocket protocol
//!
//! Control frames are text frames carrying a structured object with a
//! `type` discriminator; binary frames carry one WAV utterance. Type tags
//! are snake_case, payload fields camelCase.

use serde::{Deserialize, Serialize};

use voice_gateway_core::QueryMetadata;

/// Inbound control frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Re-verify mid-connection
    Auth { token: String },
    /// Set user id for anonymous flows only
    UserInfo { user_id: String },
    /// Bind the connection to a session
    SetChatId { chat_id: String },
    /// Advisory: client is about to send audio
    StartStream,
    /// Advisory: client finished capturing
    EndStream,
    /// Begin a text turn
    TextMessage { text: String },
    /// Deprecated; advisory no-op
    ClearContext,
}

impl ClientFrame {
    /// Would this frame begin a new turn?
    pub fn is_turn_initiating(&self) -> bool {
        matches!(self, Self::TextMessage { .. })
    }
}

/// Failure reasons carried by an unsuccessful `speech_response`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnFailure {
    NoSpeech,
    SttFailed,
    PersistFailed,
}

impl TurnFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoSpeech => "no_speech",
            Self::SttFailed => "stt_failed",
            Self::PersistFailed => "persist_failed",
        }
    }
}

/// Outbound reply frames
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    ConnectionEstablished {
        message: String,
        authenticated: bool,
    },
    AuthSuccess {
        user_id: String,
    },
    AuthError {
        error: String,
    },
    SpeechResponse {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcription: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        text_response: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<QueryMetadata>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<TurnFailure>,
    },
    AudioContent {
        audio_content: String,
    },
    Error {
        error: String,
    },
}

impl ServerFrame {
    /// Successful turn reply
    pub fn speech_ok(
        transcription: impl Into<String>,
        text_response: impl Into<String>,
        metadata: Option<QueryMetadata>,
    ) -> Self {
        Self::SpeechResponse {
            success: true,
            transcription: Some(transcription.into()),
            text_response: Some(text_response.into()),
            metadata,
            reason: None,
        }
    }

    /// Failed turn reply
    pub fn speech_failed(reason: TurnFailure) -> Self {
        Self::SpeechResponse {
            success: false,
            transcription: None,
            text_response: None,
            metadata: None,
            reason: Some(reason),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }
}

/// Why an inbound text frame was not a control frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// Not JSON, not an object, or a recognised type with a bad payload
    InvalidJson,
    /// Well-formed object with an unrecognised `type`
    UnknownType(String),
}

impl FrameParseError {
    /// The error string sent back to the client
    pub fn reply_text(&self) -> &'static str {
        match self {
            Self::InvalidJson => "Invalid JSON message format",
            Self::UnknownType(_) => "Unknown control type",
        }
    }
}

const KNOWN_TYPES: &[&str] = &[
    "auth",
    "user_info",
    "set_chat_id",
    "start_stream",
    "end_stream",
    "text_message",
    "clear_context",
];

/// Classify an inbound text frame
///
/// Distinguishes malformed JSON from a structured object with an unknown
/// `type`, because the two get different error replies.
pub fn parse_client_frame(text: &str) -> Result<ClientFrame, FrameParseError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| FrameParseError::InvalidJson)?;

    let frame_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(FrameParseError::InvalidJson)?;

    if !KNOWN_TYPES.contains(&frame_type) {
        return Err(FrameParseError::UnknownType(frame_type.to_string()));
    }

    serde_json::from_value(value).map_err(|_| FrameParseError::InvalidJson)
}
