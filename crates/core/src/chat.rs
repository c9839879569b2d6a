//! Chat session and message records
//!
//! A chat session is an ordered, ownership-scoped sequence of messages.
//! Message ids are minted by the gateway before the store write so that a
//! retry after cancellation lands on the same row (idempotent append).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// How the utterance entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Voice,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

/// Session document
///
/// Invariants: `user_id` never changes; `last_updated >= created_at`;
/// `last_updated` advances on every appended message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub chat_id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl ChatSession {
    /// Create a new session document with a server-assigned id
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            chat_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            created_at: now,
            last_updated: now,
        }
    }
}

/// Message document within a session
///
/// Timestamps are full ISO-8601 instants; ordering within a session is by
/// `timestamp` ascending with `message_id` as tiebreaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub role: MessageRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub source_type: SourceType,
}

impl ChatMessage {
    /// Mint a message with a fresh server-assigned id and current timestamp
    pub fn new(role: MessageRole, text: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            source_type,
        }
    }
}
