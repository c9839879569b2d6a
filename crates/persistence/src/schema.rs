//! ScyllaDB schema creation

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    // Session documents
    let sessions_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.chat_sessions (
            chat_id TEXT,
            user_id TEXT,
            title TEXT,
            created_at TIMESTAMP,
            last_updated TIMESTAMP,
            PRIMARY KEY (chat_id)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(sessions_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::Schema(format!("Failed to create chat_sessions table: {}", e))
        })?;

    // Message sub-collection, clustered by timestamp ascending so that
    // listMessages reads in transcript order. message_id is the clustering
    // tiebreaker and makes the same server-assigned id overwrite its own row
    // on retry instead of duplicating it.
    let messages_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.chat_messages (
            chat_id TEXT,
            timestamp TIMESTAMP,
            message_id TEXT,
            role TEXT,
            text TEXT,
            source_type TEXT,
            PRIMARY KEY ((chat_id), timestamp, message_id)
        ) WITH CLUSTERING ORDER BY (timestamp ASC, message_id ASC)
    "#,
        keyspace
    );

    session
        .query_unpaged(messages_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::Schema(format!("Failed to create chat_messages table: {}", e))
        })?;

    // Lookup of sessions per owner, ordered by recency
    let by_user_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.chat_sessions_by_user (
            user_id TEXT,
            last_updated TIMESTAMP,
            chat_id TEXT,
            title TEXT,
            created_at TIMESTAMP,
            PRIMARY KEY ((user_id), last_updated, chat_id)
        ) WITH CLUSTERING ORDER BY (last_updated DESC, chat_id ASC)
    "#,
        keyspace
    );

    session
        .query_unpaged(by_user_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::Schema(format!(
                "Failed to create chat_sessions_by_user table: {}",
                e
            ))
        })?;

    tracing::info!("All tables created successfully");
    Ok(())
}
