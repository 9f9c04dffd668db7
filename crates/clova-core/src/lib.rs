//! Model runtime for clova-server.
//!
//! Owns the locally loaded causal language model and turns a chat history
//! into decoded text:
//!
//! 1. render the history with the model's own chat template,
//! 2. tokenize onto the model's device,
//! 3. decode autoregressively under a total-length cap and stop markers,
//! 4. detokenize the whole sequence with control tokens kept.
//!
//! [`GenerationEngine`] serializes all calls onto a single worker thread.

pub mod decode;
pub mod sampling;
pub mod stop;
pub mod template;

mod engine;
mod error;
mod generator;
mod hub;
mod message;
mod model;

pub use engine::GenerationEngine;
pub use error::RuntimeError;
pub use generator::{Generation, TextGenerator};
pub use hub::ModelFiles;
pub use message::{ChatMessage, Role};
pub use model::{DevicePreference, LoadOptions, ModelHandle};
pub use stop::{FinishReason, StopCondition, DEFAULT_STOP_STRINGS};
