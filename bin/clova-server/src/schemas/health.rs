use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response body for `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"` once the server is accepting requests.
    pub status: String,
    /// Hub identifier of the loaded model.
    pub model: String,
}
