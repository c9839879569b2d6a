//! Adapter traits for the external collaborators
//!
//! The gateway talks to five external services through these seams. Each
//! trait is object-safe so the server can hold `Arc<dyn ...>` and test
//! suites can substitute in-memory fakes.

use async_trait::async_trait;

use crate::chat::{ChatMessage, ChatSession};
use crate::error::{AdapterError, StoreError, VerifyError};
use crate::identity::Identity;
use crate::query::ResolvedAnswer;
use crate::speech::{AudioConfig, Transcript, VoiceConfig};

/// Token verifier (C1)
///
/// Validates a bearer token against the identity provider. Callable both
/// during the upgrade handshake and mid-connection for `auth` frames.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError>;
}

/// Chat store (C2)
///
/// Owns the persisted session documents and their message sub-collections.
/// `append_message` must be idempotent per `message_id`: writing the same
/// server-assigned id twice yields a single message.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a session document with `created_at = last_updated = now`
    async fn create_session(&self, session: &ChatSession) -> Result<(), StoreError>;

    /// Append a message and advance the session's `last_updated`
    ///
    /// The message write is primary; the `last_updated` bump is best-effort
    /// if the backend cannot do both in one transaction.
    async fn append_message(&self, chat_id: &str, message: &ChatMessage)
        -> Result<(), StoreError>;

    /// Load a session, enforcing `session.user_id == requesting_user_id`
    async fn load_session(
        &self,
        chat_id: &str,
        requesting_user_id: &str,
    ) -> Result<ChatSession, StoreError>;

    /// Sessions owned by `user_id`, ordered by `last_updated` descending
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, StoreError>;

    /// Messages of an owned session, ordered by `timestamp` ascending
    async fn list_messages(
        &self,
        chat_id: &str,
        requesting_user_id: &str,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}

/// Speech-to-text (C3)
///
/// Transcribes one complete utterance. An empty transcript is a legal,
/// non-error outcome and means no speech was detected.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        config: &AudioConfig,
    ) -> Result<Transcript, AdapterError>;
}

/// Text-to-speech (C4)
///
/// Returns an opaque MP3 payload; the gateway base64-encodes for transport.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &VoiceConfig) -> Result<Vec<u8>, AdapterError>;
}

/// Query resolver (C5)
///
/// Resolves one utterance to an answer with classification metadata. Empty
/// query text is rejected at the gateway before this is called.
#[async_trait]
pub trait QueryResolver: Send + Sync {
    async fn resolve(&self, user_id: &str, query: &str) -> Result<ResolvedAnswer, AdapterError>;
}
