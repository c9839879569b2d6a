//! ScyllaDB-backed chat store

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use scylla::frame::value::CqlTimestamp;

use voice_gateway_core::{ChatMessage, ChatSession, ChatStore, MessageRole, SourceType, StoreError};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Chat store backed by ScyllaDB
///
/// The message insert is the primary write of `append_message`; the
/// `last_updated` bump on the session document is best-effort and only
/// logged on failure, matching the documented atomicity contract.
#[derive(Clone)]
pub struct ScyllaChatStore {
    client: ScyllaClient,
}

impl ScyllaChatStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn ts(value: DateTime<Utc>) -> CqlTimestamp {
        CqlTimestamp(value.timestamp_millis())
    }

    fn from_ts(value: CqlTimestamp) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(value.0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn parse_role(raw: &str) -> Result<MessageRole, PersistenceError> {
        match raw {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(PersistenceError::Decode(format!("unknown role: {}", other))),
        }
    }

    fn parse_source(raw: &str) -> Result<SourceType, PersistenceError> {
        match raw {
            "text" => Ok(SourceType::Text),
            "voice" => Ok(SourceType::Voice),
            other => Err(PersistenceError::Decode(format!(
                "unknown source type: {}",
                other
            ))),
        }
    }

    async fn fetch_session(&self, chat_id: &str) -> Result<Option<ChatSession>, PersistenceError> {
        let query = format!(
            "SELECT chat_id, user_id, title, created_at, last_updated FROM {}.chat_sessions WHERE chat_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (chat_id,))
            .await?;

        let row = result
            .maybe_first_row_typed::<(String, String, String, CqlTimestamp, CqlTimestamp)>()
            .map_err(|e| PersistenceError::Decode(e.to_string()))?;

        Ok(row.map(|(chat_id, user_id, title, created_at, last_updated)| ChatSession {
            chat_id,
            user_id,
            title,
            created_at: Self::from_ts(created_at),
            last_updated: Self::from_ts(last_updated),
        }))
    }

    /// Advance `last_updated` on the session document and its by-user row.
    async fn bump_last_updated(
        &self,
        session: &ChatSession,
        now: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let keyspace = self.client.keyspace();

        let update = format!(
            "UPDATE {}.chat_sessions SET last_updated = ? WHERE chat_id = ?",
            keyspace
        );
        self.client
            .session()
            .query_unpaged(update, (Self::ts(now), session.chat_id.as_str()))
            .await?;

        // The by-user listing clusters on last_updated, so the old row is
        // replaced rather than updated in place.
        let delete = format!(
            "DELETE FROM {}.chat_sessions_by_user WHERE user_id = ? AND last_updated = ? AND chat_id = ?",
            keyspace
        );
        self.client
            .session()
            .query_unpaged(
                delete,
                (
                    session.user_id.as_str(),
                    Self::ts(session.last_updated),
                    session.chat_id.as_str(),
                ),
            )
            .await?;

        let insert = format!(
            "INSERT INTO {}.chat_sessions_by_user (user_id, last_updated, chat_id, title, created_at) VALUES (?, ?, ?, ?, ?)",
            keyspace
        );
        self.client
            .session()
            .query_unpaged(
                insert,
                (
                    session.user_id.as_str(),
                    Self::ts(now),
                    session.chat_id.as_str(),
                    session.title.as_str(),
                    Self::ts(session.created_at),
                ),
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ChatStore for ScyllaChatStore {
    async fn create_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        let keyspace = self.client.keyspace();

        let insert = format!(
            "INSERT INTO {}.chat_sessions (chat_id, user_id, title, created_at, last_updated) VALUES (?, ?, ?, ?, ?)",
            keyspace
        );
        self.client
            .session()
            .query_unpaged(
                insert,
                (
                    session.chat_id.as_str(),
                    session.user_id.as_str(),
                    session.title.as_str(),
                    Self::ts(session.created_at),
                    Self::ts(session.last_updated),
                ),
            )
            .await
            .map_err(PersistenceError::from)?;

        let by_user = format!(
            "INSERT INTO {}.chat_sessions_by_user (user_id, last_updated, chat_id, title, created_at) VALUES (?, ?, ?, ?, ?)",
            keyspace
        );
        self.client
            .session()
            .query_unpaged(
                by_user,
                (
                    session.user_id.as_str(),
                    Self::ts(session.last_updated),
                    session.chat_id.as_str(),
                    session.title.as_str(),
                    Self::ts(session.created_at),
                ),
            )
            .await
            .map_err(PersistenceError::from)?;

        tracing::debug!(chat_id = %session.chat_id, user_id = %session.user_id, "Session created");
        Ok(())
    }

    async fn append_message(
        &self,
        chat_id: &str,
        message: &ChatMessage,
    ) -> Result<(), StoreError> {
        let session = self
            .fetch_session(chat_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        // Primary write. The (timestamp, message_id) clustering key makes a
        // retried append with the same id overwrite its own row.
        let insert = format!(
            "INSERT INTO {}.chat_messages (chat_id, timestamp, message_id, role, text, source_type) VALUES (?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                insert,
                (
                    chat_id,
                    Self::ts(message.timestamp),
                    message.message_id.as_str(),
                    message.role.as_str(),
                    message.text.as_str(),
                    message.source_type.as_str(),
                ),
            )
            .await
            .map_err(PersistenceError::from)?;

        // Best-effort recency bump; the message is durable either way.
        if let Err(e) = self.bump_last_updated(&session, message.timestamp).await {
            tracing::warn!(chat_id = %chat_id, error = %e, "Failed to advance last_updated");
        }

        Ok(())
    }

    async fn load_session(
        &self,
        chat_id: &str,
        requesting_user_id: &str,
    ) -> Result<ChatSession, StoreError> {
        let session = self
            .fetch_session(chat_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        if session.user_id != requesting_user_id {
            return Err(StoreError::Denied);
        }
        Ok(session)
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        let query = format!(
            "SELECT chat_id, title, created_at, last_updated FROM {}.chat_sessions_by_user WHERE user_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id,))
            .await
            .map_err(PersistenceError::from)?;

        let rows = result
            .rows_typed::<(String, String, CqlTimestamp, CqlTimestamp)>()
            .map_err(|e| PersistenceError::Decode(e.to_string()))
            .map_err(StoreError::from)?;

        let mut sessions = Vec::new();
        for row in rows {
            let (chat_id, title, created_at, last_updated) =
                row.map_err(|e| StoreError::Backend(e.to_string()))?;
            sessions.push(ChatSession {
                chat_id,
                user_id: user_id.to_string(),
                title,
                created_at: Self::from_ts(created_at),
                last_updated: Self::from_ts(last_updated),
            });
        }
        Ok(sessions)
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        requesting_user_id: &str,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        // Ownership gate before any message read
        self.load_session(chat_id, requesting_user_id).await?;

        let query = format!(
            "SELECT message_id, role, text, timestamp, source_type FROM {}.chat_messages WHERE chat_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (chat_id,))
            .await
            .map_err(PersistenceError::from)?;

        let rows = result
            .rows_typed::<(String, String, String, CqlTimestamp, String)>()
            .map_err(|e| PersistenceError::Decode(e.to_string()))
            .map_err(StoreError::from)?;

        let mut messages = Vec::new();
        for row in rows {
            let (message_id, role, text, timestamp, source_type) =
                row.map_err(|e| StoreError::Backend(e.to_string()))?;
            messages.push(ChatMessage {
                message_id,
                role: Self::parse_role(&role).map_err(StoreError::from)?,
                text,
                timestamp: Self::from_ts(timestamp),
                source_type: Self::parse_source(&source_type).map_err(StoreError::from)?,
            });
        }
        Ok(messages)
    }
}
