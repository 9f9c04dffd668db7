//! Request / response types for `POST /generate`.

use clova_core::ChatMessage;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_MAX_LENGTH: i64 = 1024;

fn default_max_length() -> i64 {
    DEFAULT_MAX_LENGTH
}

/// Request body for `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateRequest {
    /// Conversation history in order. Roles are `tool_list`, `system`,
    /// `user` and `assistant`.
    pub messages: Vec<ChatMessage>,
    /// Cap on prompt plus generated tokens (default 1024). Must be positive
    /// unless `messages` is empty.
    #[serde(default = "default_max_length")]
    pub max_length: i64,
}

/// Response body for `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateResponse {
    /// The whole decoded sequence: rendered prompt, continuation and any
    /// control markers.
    pub text: String,
}
