//! Text generation endpoint.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::generate::{GenerateRequest, GenerateResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(generate),
    components(schemas(
        GenerateRequest,
        GenerateResponse,
        clova_core::ChatMessage,
        clova_core::Role
    ))
)]
pub struct GenerateApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/generate", post(generate))
}

/// Generate a continuation of a conversation.
///
/// The reply is the whole decoded sequence (rendered prompt included) with
/// control markers kept. Requests are queued and served one at a time in
/// arrival order; closing the connection withdraws the request.
#[utoipa::path(
    post,
    path = "/generate",
    tag = "generate",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Decoded sequence", body = GenerateResponse),
        (status = 400, description = "Non-positive max_length, prompt longer than max_length, or malformed JSON"),
        (status = 413, description = "Request body too large"),
        (status = 422, description = "Body does not match the schema (e.g. unknown role)"),
        (status = 500, description = "Rendering or inference failed"),
        (status = 503, description = "Generation worker unavailable")
    )
)]
pub async fn generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ServerError> {
    let Json(req) = payload?;

    if req.messages.is_empty() {
        debug!("empty conversation; nothing to generate");
        return Ok(Json(GenerateResponse {
            text: String::new(),
        }));
    }
    let max_length = usize::try_from(req.max_length)
        .ok()
        .filter(|&n| n > 0)
        .ok_or_else(|| {
            ServerError::BadRequest(format!(
                "max_length must be a positive integer, got {}",
                req.max_length
            ))
        })?;

    let generation = state.engine.generate(req.messages, max_length).await?;
    Ok(Json(GenerateResponse {
        text: generation.text,
    }))
}
