//! In-memory chat store
//!
//! Default backend when ScyllaDB persistence is disabled. Sessions do not
//! survive restarts. Also the store that test suites run against.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use voice_gateway_core::{ChatMessage, ChatSession, ChatStore, StoreError};

struct SessionRecord {
    session: ChatSession,
    messages: Vec<ChatMessage>,
}

/// In-memory chat store
#[derive(Default)]
pub struct InMemoryChatStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored sessions
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn create_session(&self, session: &ChatSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        sessions.insert(
            session.chat_id.clone(),
            SessionRecord {
                session: session.clone(),
                messages: Vec::new(),
            },
        );
        Ok(())
    }

    async fn append_message(
        &self,
        chat_id: &str,
        message: &ChatMessage,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        let record = sessions.get_mut(chat_id).ok_or(StoreError::NotFound)?;

        // Idempotent per server-assigned id: a retry replaces its own entry.
        if let Some(existing) = record
            .messages
            .iter_mut()
            .find(|m| m.message_id == message.message_id)
        {
            *existing = message.clone();
        } else {
            record.messages.push(message.clone());
            record
                .messages
                .sort_by(|a, b| (a.timestamp, &a.message_id).cmp(&(b.timestamp, &b.message_id)));
        }

        if message.timestamp > record.session.last_updated {
            record.session.last_updated = message.timestamp;
        }
        Ok(())
    }

    async fn load_session(
        &self,
        chat_id: &str,
        requesting_user_id: &str,
    ) -> Result<ChatSession, StoreError> {
        let sessions = self.sessions.read();
        let record = sessions.get(chat_id).ok_or(StoreError::NotFound)?;
        if record.session.user_id != requesting_user_id {
            return Err(StoreError::Denied);
        }
        Ok(record.session.clone())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError> {
        let sessions = self.sessions.read();
        let mut owned: Vec<ChatSession> = sessions
            .values()
            .filter(|r| r.session.user_id == user_id)
            .map(|r| r.session.clone())
            .collect();
        owned.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(owned)
    }

    async fn list_messages(
        &self,
        chat_id: &str,
        requesting_user_id: &str,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let sessions = self.sessions.read();
        let record = sessions.get(chat_id).ok_or(StoreError::NotFound)?;
        if record.session.user_id != requesting_user_id {
            return Err(StoreError::Denied);
        }
        Ok(record.messages.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_gateway_core::{MessageRole, SourceType};

    fn session(user: &str) -> ChatSession {
        ChatSession::new(user, "Test chat")
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = InMemoryChatStore::new();
        let s = session("u1");
        store.create_session(&s).await.unwrap();

        let loaded = store.load_session(&s.chat_id, "u1").await.unwrap();
        assert_eq!(loaded.chat_id, s.chat_id);
        assert_eq!(loaded.title, "Test chat");
    }

    #[tokio::test]
    async fn test_ownership_enforced() {
        let store = InMemoryChatStore::new();
        let s = session("u1");
        store.create_session(&s).await.unwrap();

        assert!(matches!(
            store.load_session(&s.chat_id, "intruder").await,
            Err(StoreError::Denied)
        ));
        assert!(matches!(
            store.list_messages(&s.chat_id, "intruder").await,
            Err(StoreError::Denied)
        ));
        assert!(matches!(
            store.load_session("missing", "u1").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_append_orders_and_bumps_last_updated() {
        let store = InMemoryChatStore::new();
        let s = session("u1");
        store.create_session(&s).await.unwrap();

        let first = ChatMessage::new(MessageRole::User, "hello", SourceType::Text);
        let second = ChatMessage::new(MessageRole::Assistant, "hi there", SourceType::Text);
        store.append_message(&s.chat_id, &first).await.unwrap();
        store.append_message(&s.chat_id, &second).await.unwrap();

        let messages = store.list_messages(&s.chat_id, "u1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].timestamp <= messages[1].timestamp);
        assert_eq!(messages[0].role, MessageRole::User);

        let loaded = store.load_session(&s.chat_id, "u1").await.unwrap();
        assert!(loaded.last_updated >= second.timestamp);
    }

    #[tokio::test]
    async fn test_append_idempotent_per_message_id() {
        let store = InMemoryChatStore::new();
        let s = session("u1");
        store.create_session(&s).await.unwrap();

        let message = ChatMessage::new(MessageRole::User, "once", SourceType::Voice);
        store.append_message(&s.chat_id, &message).await.unwrap();
        store.append_message(&s.chat_id, &message).await.unwrap();

        let messages = store.list_messages(&s.chat_id, "u1").await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "once");
    }

    #[tokio::test]
    async fn test_list_sessions_recency_order() {
        let store = InMemoryChatStore::new();
        let a = session("u1");
        let b = session("u1");
        let other = session("u2");
        store.create_session(&a).await.unwrap();
        store.create_session(&b).await.unwrap();
        store.create_session(&other).await.unwrap();

        // Touch session a so it becomes the most recent
        let touch = ChatMessage::new(MessageRole::User, "bump", SourceType::Text);
        store.append_message(&a.chat_id, &touch).await.unwrap();

        let sessions = store.list_sessions("u1").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].chat_id, a.chat_id);
    }
}
