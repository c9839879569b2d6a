//! HTTP endpoints
//!
//! The HTTP surface is deliberately small: session bootstrap so clients
//! hold a `chatId` before opening the WebSocket, a health probe, and the
//! Prometheus scrape endpoint. Everything conversational rides on the
//! WebSocket at `/`.

use axum::{
    extract::{Json, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voice_gateway_core::{ChatMessage, ChatSession, Identity, MessageRole, SourceType};

use crate::connection::ws_handler;
use crate::metrics::{self, metrics_handler};
use crate::state::AppState;
use crate::GatewayError;

/// Assistant greeting seeded into every new session
const GREETING_TEXT: &str = "How can I help you today?";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );

    Router::new()
        // WebSocket endpoint at the root
        .route("/", get(ws_handler))
        // Session bootstrap
        .route("/api/chat/new", post(create_chat))
        // Health check
        .route("/api/health", get(health_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns a permissive layer (for dev)
/// - If cors_origins is empty, defaults to localhost:3000 for safety
/// - Otherwise, uses the configured origins
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    // Credentialed CORS cannot use wildcard headers
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Session bootstrap request
#[derive(Debug, Deserialize)]
struct CreateChatRequest {
    #[serde(default = "default_title")]
    title: String,
}

fn default_title() -> String {
    "New Chat".to_string()
}

/// Pull the bearer token out of the Authorization header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// `POST /api/chat/new` - create a session and seed the greeting
///
/// Returns 201 with the session document, 401 on auth failure, 500 when
/// the store is unavailable.
async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateChatRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    metrics::record_request("chat_new");

    let token = bearer_token(&headers)
        .ok_or_else(|| GatewayError::Auth("Invalid or missing token".to_string()))?;
    let identity: Identity = state.verifier.verify(token).await.map_err(|e| {
        tracing::debug!(error = %e, "Session bootstrap rejected");
        GatewayError::Auth("Invalid or missing token".to_string())
    })?;

    let session = ChatSession::new(&identity.user_id, &request.title);
    state.store.create_session(&session).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to create session");
        GatewayError::Persistence("Failed to create session".to_string())
    })?;

    let greeting = ChatMessage::new(MessageRole::Assistant, GREETING_TEXT, SourceType::Text);
    state
        .store
        .append_message(&session.chat_id, &greeting)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, chat_id = %session.chat_id, "Failed to seed greeting");
            GatewayError::Persistence("Failed to create session".to_string())
        })?;

    tracing::info!(chat_id = %session.chat_id, user_id = %identity.user_id, "Session created");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "data": {
                "chatId": session.chat_id,
                "title": session.title,
                "createdAt": session.created_at,
                "lastUpdated": session.last_updated,
            },
        })),
    ))
}

/// `GET /api/health`
async fn health_check() -> impl IntoResponse {
    metrics::record_request("health");
    (StatusCode::OK, "Healthy")
}
