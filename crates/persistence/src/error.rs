//! Persistence error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Row decode error: {0}")]
    Decode(String),
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(e: scylla::transport::errors::NewSessionError) -> Self {
        Self::Connection(e.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(e: scylla::transport::errors::QueryError) -> Self {
        Self::Query(e.to_string())
    }
}

impl From<PersistenceError> for voice_gateway_core::StoreError {
    fn from(e: PersistenceError) -> Self {
        voice_gateway_core::StoreError::Backend(e.to_string())
    }
}
