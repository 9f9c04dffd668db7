use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the model or running a generation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to initialize the model hub client")]
    HubInit {
        #[source]
        source: hf_hub::api::sync::ApiError,
    },

    #[error("Failed to fetch {file} for {model_id}")]
    HubFetch {
        model_id: String,
        file: String,
        #[source]
        source: hf_hub::api::sync::ApiError,
    },

    #[error("Failed to read {path}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Model {model_id} ships no chat template")]
    MissingChatTemplate { model_id: String },

    #[error("Unsupported dtype {dtype}")]
    UnsupportedDtype { dtype: String },

    #[error("Failed to load tokenizer from {path}")]
    LoadTokenizer {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Chat template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("Failed to tokenize prompt")]
    TokenizeFailed {
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to decode token ids")]
    DetokenizeFailed {
        #[source]
        source: anyhow::Error,
    },

    #[error("Tensor backend error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Generation requires at least one message")]
    EmptyMessages,

    #[error("Invalid max_length {max_length} (must be > 0)")]
    InvalidMaxLength { max_length: usize },

    #[error("Prompt is {prompt_tokens} tokens but max_length is {max_length}")]
    PromptTooLong {
        prompt_tokens: usize,
        max_length: usize,
    },

    #[error("Generation panicked: {message}")]
    GenerationPanicked { message: String },

    #[error("Generation cancelled by caller")]
    Cancelled,

    #[error("Generation worker shut down unexpectedly")]
    WorkerShutdown,

    #[error("Failed to spawn generation worker thread")]
    SpawnWorkerFailed {
        #[source]
        source: std::io::Error,
    },
}
