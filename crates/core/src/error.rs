//! Error types for the adapter and store boundaries

use thiserror::Error;

/// Failure verifying a bearer token
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Token is malformed, expired, or has an invalid signature
    #[error("invalid token: {0}")]
    Invalid(String),

    /// The identity provider could not be reached
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Failure calling an external adapter (STT, TTS, query resolver)
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("service returned status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Failure at the chat store boundary
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session not found")]
    NotFound,

    #[error("session not owned by caller")]
    Denied,

    #[error("store backend error: {0}")]
    Backend(String),
}
