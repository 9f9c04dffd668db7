use crate::error::RuntimeError;
use crate::message::ChatMessage;
use crate::stop::FinishReason;

/// Output of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// The full decoded sequence (prompt and continuation, control tokens
    /// included).
    pub text: String,
    pub prompt_tokens: usize,
    pub total_tokens: usize,
    pub finish_reason: FinishReason,
}

/// Something that turns a conversation into text.
///
/// Implementations are not required to be thread-safe: the
/// [`GenerationEngine`](crate::GenerationEngine) moves the generator onto a
/// single worker thread and calls it for one request at a time.
pub trait TextGenerator: Send + 'static {
    /// Identifier of the loaded model, reported by the health check.
    fn model_id(&self) -> &str;

    /// Render, tokenize, generate and decode.
    ///
    /// `cancelled` should be polled between decoding steps; once it returns
    /// `true` the call should stop and return [`RuntimeError::Cancelled`].
    fn generate(
        &mut self,
        messages: &[ChatMessage],
        max_length: usize,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<Generation, RuntimeError>;
}
