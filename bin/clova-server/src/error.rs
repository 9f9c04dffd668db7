//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON-body HTTP
//! response with an appropriate status code.
//!
//! Runtime faults are logged with full detail; the caller only gets a short
//! message so file paths and backend internals never reach clients.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clova_core::RuntimeError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// All errors that can occur in the clova-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the model runtime.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// The body was not valid JSON or did not match the request schema.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),

    /// The caller sent a well-formed but unacceptable request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the buffering limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The request body could not be read off the connection.
    #[error("failed to read request body: {0}")]
    BodyUnreadable(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::InvalidBody(rejection) => {
                warn!(error = %rejection, "rejected request body");
                (rejection.status(), rejection.body_text())
            }
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::BodyTooLarge { .. } => {
                warn!(error = %self, "rejected request body");
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::BodyUnreadable(_) => {
                warn!(error = %self, "rejected request body");
                (StatusCode::BAD_REQUEST, self.to_string())
            }

            ServerError::Runtime(e) => match e {
                RuntimeError::EmptyMessages
                | RuntimeError::InvalidMaxLength { .. }
                | RuntimeError::PromptTooLong { .. } => {
                    warn!(error = %e, "generation request rejected");
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                RuntimeError::WorkerShutdown => {
                    error!(error = %e, "generation runtime error");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "generation worker unavailable".to_owned(),
                    )
                }
                // Template errors name the offending message order.
                RuntimeError::Template(_) => {
                    error!(error = %e, "generation runtime error");
                    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                }
                _ => {
                    error!(error = %e, "generation runtime error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "generation failed".to_owned(),
                    )
                }
            },
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}
