//! HTTP-backed adapters for the gateway's external collaborators
//!
//! Each adapter wraps one external service behind the matching core trait:
//! - `HttpTokenVerifier` - identity provider token verification
//! - `HttpSpeechToText` - speech-to-text service
//! - `HttpTextToSpeech` - text-to-speech service
//! - `HttpQueryResolver` - contextual query engine
//!
//! All adapters share a `reqwest::Client` per instance and are safe for
//! concurrent use; request deadlines are enforced by the caller, not here.

pub mod resolver;
pub mod stt;
pub mod tts;
pub mod verifier;

pub use resolver::{HttpQueryResolver, ResolverClientConfig};
pub use stt::{HttpSpeechToText, SttClientConfig};
pub use tts::{HttpTextToSpeech, TtsClientConfig};
pub use verifier::{HttpTokenVerifier, VerifierClientConfig};
