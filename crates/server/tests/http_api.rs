//! HTTP surface tests
//!
//! Drives the router directly: health probe and the session bootstrap
//! endpoint with its auth and persistence behavior.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;

use voice_gateway_config::Settings;
use voice_gateway_core::{
    AdapterError, AudioConfig, ChatStore, Identity, MessageRole, QueryResolver, ResolvedAnswer,
    Role, SpeechToText, TextToSpeech, TokenVerifier, Transcript, VerifyError, VoiceConfig,
};
use voice_gateway_persistence::InMemoryChatStore;
use voice_gateway_server::{create_router, AppState};

struct FakeVerifier;

#[async_trait]
impl TokenVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        match token {
            "tok-a" => Ok(Identity::new("user-a", Role::User)),
            _ => Err(VerifyError::Invalid("unknown token".to_string())),
        }
    }
}

struct UnusedStt;

#[async_trait]
impl SpeechToText for UnusedStt {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _config: &AudioConfig,
    ) -> Result<Transcript, AdapterError> {
        unreachable!("not exercised over HTTP")
    }
}

struct UnusedTts;

#[async_trait]
impl TextToSpeech for UnusedTts {
    async fn synthesize(&self, _text: &str, _voice: &VoiceConfig) -> Result<Vec<u8>, AdapterError> {
        unreachable!("not exercised over HTTP")
    }
}

struct UnusedResolver;

#[async_trait]
impl QueryResolver for UnusedResolver {
    async fn resolve(&self, _user_id: &str, _query: &str) -> Result<ResolvedAnswer, AdapterError> {
        unreachable!("not exercised over HTTP")
    }
}

fn app() -> (axum::Router, Arc<InMemoryChatStore>) {
    let store = Arc::new(InMemoryChatStore::new());
    let state = AppState::new(
        Settings::default(),
        Arc::new(FakeVerifier),
        Arc::new(UnusedStt),
        Arc::new(UnusedTts),
        Arc::new(UnusedResolver),
        store.clone(),
    );
    (create_router(state), store)
}

#[tokio::test]
async fn test_health() {
    let (app, _store) = app();

    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"Healthy");
}

#[tokio::test]
async fn test_create_chat_requires_token() {
    let (app, store) = app();

    let response = app
        .oneshot(
            Request::post("/api/chat/new")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"title":"T"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_create_chat_rejects_bad_token() {
    let (app, store) = app();

    let response = app
        .oneshot(
            Request::post("/api/chat/new")
                .header(header::AUTHORIZATION, "Bearer nope")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"title":"T"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.session_count(), 0);
}

#[tokio::test]
async fn test_create_chat_seeds_greeting() {
    let (app, store) = app();

    let response = app
        .oneshot(
            Request::post("/api/chat/new")
                .header(header::AUTHORIZATION, "Bearer tok-a")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"title":"My chat"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["title"], "My chat");
    let chat_id = json["data"]["chatId"].as_str().unwrap().to_string();
    assert!(json["data"]["createdAt"].is_string());
    assert!(json["data"]["lastUpdated"].is_string());

    // The session belongs to the token's user and carries the greeting
    let messages = store.list_messages(&chat_id, "user-a").await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::Assistant);
    assert_eq!(messages[0].text, "How can I help you today?");

    let sessions = store.list_sessions("user-a").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].chat_id, chat_id);
}
