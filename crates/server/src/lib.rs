//! Voice Gateway Server
//!
//! Provides the WebSocket endpoint that carries conversational voice/text
//! turns plus the HTTP surface for session bootstrap and health.

pub mod connection;
pub mod frames;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod state;
pub mod turn;

pub use connection::ws_handler;
pub use frames::{ClientFrame, FrameParseError, ServerFrame, TurnFailure};
pub use http::create_router;
pub use metrics::init_metrics;
pub use registry::{ConnectionRegistry, ConnectionSender, SendError};
pub use state::AppState;
pub use turn::{TurnInput, TurnPipeline};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
///
/// Fallible HTTP handlers return this and let the `IntoResponse` impl map
/// it to a status code and the `{success: false, error}` envelope.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            GatewayError::Auth(_) => (StatusCode::UNAUTHORIZED, "auth"),
            GatewayError::Session(_) => (StatusCode::NOT_FOUND, "session"),
            GatewayError::WebSocket(_) | GatewayError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, "request")
            },
            GatewayError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store"),
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        crate::metrics::record_error(kind);

        let message = match self {
            GatewayError::Auth(m)
            | GatewayError::Session(m)
            | GatewayError::WebSocket(m)
            | GatewayError::Persistence(m)
            | GatewayError::InvalidRequest(m)
            | GatewayError::Internal(m) => m,
        };
        (
            status,
            Json(serde_json::json!({
                "success": false,
                "error": message,
            })),
        )
            .into_response()
    }
}
