//! ScyllaDB connection handling
//!
//! The client is constructed directly from the gateway's persistence
//! settings; host lists and keyspace names come from the config layer, not
//! from the process environment. Connecting also ensures the keyspace and
//! tables exist, so a freshly connected client is immediately usable by
//! the chat store.

use scylla::{Session, SessionBuilder};
use std::sync::Arc;

use voice_gateway_config::PersistenceConfig;

use crate::error::PersistenceError;
use crate::schema;

/// Shared handle to the ScyllaDB session
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    keyspace: String,
}

impl ScyllaClient {
    /// Connect to the cluster described by the persistence settings
    ///
    /// Creates the keyspace and the chat tables if they do not exist yet,
    /// so callers never race the schema on first write.
    pub async fn connect(settings: &PersistenceConfig) -> Result<Self, PersistenceError> {
        if settings.scylla_hosts.is_empty() {
            return Err(PersistenceError::Connection(
                "no ScyllaDB hosts configured".to_string(),
            ));
        }

        tracing::info!(
            hosts = ?settings.scylla_hosts,
            keyspace = %settings.keyspace,
            "Connecting to ScyllaDB"
        );

        let session = SessionBuilder::new()
            .known_nodes(&settings.scylla_hosts)
            .build()
            .await?;

        schema::create_keyspace(&session, &settings.keyspace, settings.replication_factor).await?;
        schema::create_tables(&session, &settings.keyspace).await?;
        tracing::info!(keyspace = %settings.keyspace, "Schema ensured");

        Ok(Self {
            session: Arc::new(session),
            keyspace: settings.keyspace.clone(),
        })
    }

    /// Get the underlying session
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Get keyspace name
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }
}
