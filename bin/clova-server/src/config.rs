//! Server configuration, loaded from environment variables at startup.

use clova_core::{DevicePreference, LoadOptions};

/// Runtime configuration for clova-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// Hugging Face Hub repository of the model to serve.
    pub model_id: String,

    /// `auto`, `cpu`, `cuda` or `metal`.
    pub device: DevicePreference,

    /// Weight dtype override (`bf16`, `f16`, `f32`).
    pub dtype: Option<String>,

    /// Base sampling seed.
    pub seed: u64,

    /// How many generation requests may wait in the queue.
    pub queue_capacity: usize,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_openapi: bool,
}

pub const DEFAULT_MODEL_ID: &str = "naver-hyperclovax/HyperCLOVAX-SEED-Text-Instruct-1.5B";

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_owned(),
            model_id: DEFAULT_MODEL_ID.to_owned(),
            device: DevicePreference::Auto,
            dtype: None,
            seed: LoadOptions::DEFAULT_SEED,
            queue_capacity: 64,
            log_level: "info".to_owned(),
            log_json: false,
            cors_allowed_origins: None,
            enable_openapi: true,
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_address: env_or("CLOVA_BIND", &defaults.bind_address),
            model_id: env_or("CLOVA_MODEL_ID", &defaults.model_id),
            device: parse_env("CLOVA_DEVICE", defaults.device),
            dtype: env_opt("CLOVA_DTYPE"),
            seed: parse_env("CLOVA_SEED", defaults.seed),
            queue_capacity: parse_env("CLOVA_QUEUE_CAPACITY", defaults.queue_capacity),
            log_level: env_or("CLOVA_LOG", &defaults.log_level),
            log_json: env_flag("CLOVA_LOG_JSON", defaults.log_json),
            cors_allowed_origins: env_opt("CLOVA_CORS_ORIGINS"),
            enable_openapi: env_flag("CLOVA_ENABLE_OPENAPI", defaults.enable_openapi),
        }
    }

    /// Options handed to the model loader.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            model_id: self.model_id.clone(),
            device: self.device,
            dtype: self.dtype.clone(),
            seed: self.seed,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| parse_flag(&v).unwrap_or(default))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
