//! Persistence layer for the voice gateway
//!
//! Provides the chat store behind `voice_gateway_core::ChatStore`:
//! - `ScyllaChatStore` - production persistence using ScyllaDB
//! - `InMemoryChatStore` - default backend when persistence is disabled,
//!   also used by test suites
//!
//! Layout follows the documented model: a `chat_sessions` table for the
//! session documents and a `chat_messages` table clustered by timestamp for
//! each session's message sub-collection.

pub mod chats;
pub mod client;
pub mod error;
pub mod memory;
pub mod schema;

pub use chats::ScyllaChatStore;
pub use client::ScyllaClient;
pub use error::PersistenceError;
pub use memory::InMemoryChatStore;

use voice_gateway_config::PersistenceConfig;

/// Initialize the persistence layer from the gateway settings
pub async fn init(settings: &PersistenceConfig) -> Result<ScyllaChatStore, PersistenceError> {
    let client = ScyllaClient::connect(settings).await?;
    Ok(ScyllaChatStore::new(client))
}
