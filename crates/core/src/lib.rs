//! Core types and traits for the voice gateway
//!
//! This crate provides the foundational pieces shared by all other crates:
//! - Identity and chat-session domain types
//! - Adapter traits for the external collaborators (token verifier, chat
//!   store, STT, TTS, query resolver)
//! - Error types for the adapter and store boundaries

pub mod chat;
pub mod error;
pub mod identity;
pub mod query;
pub mod speech;
pub mod traits;

pub use chat::{ChatMessage, ChatSession, MessageRole, SourceType};
pub use error::{AdapterError, StoreError, VerifyError};
pub use identity::{Identity, Role};
pub use query::{QueryIntent, QueryMetadata, ResolvedAnswer};
pub use speech::{AudioConfig, AudioEncoding, Transcript, VoiceConfig, VoiceGender};
pub use traits::{ChatStore, QueryResolver, SpeechToText, TextToSpeech, TokenVerifier};
