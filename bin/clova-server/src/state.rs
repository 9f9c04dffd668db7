//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use clova_core::GenerationEngine;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Serialized handle to the loaded model.
    pub engine: GenerationEngine,
}
