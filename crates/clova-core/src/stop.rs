//! Early-termination policy for the decode loop.

use serde::Serialize;
use strum::{AsRefStr, Display};

/// Literal markers that end an assistant turn.
pub const DEFAULT_STOP_STRINGS: [&str; 2] = ["<|endofturn|>", "<|stop|>"];

/// Why a generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    /// The continuation ended with a stop string.
    Stop,
    /// The model emitted an end-of-sequence token.
    Eos,
    /// The total token cap was reached.
    Length,
}

#[derive(Debug, Clone)]
pub struct StopCondition {
    stop_strings: Vec<String>,
    eos_token_ids: Vec<u32>,
    /// Tokens to decode when looking for a stop-string suffix.
    window: usize,
}

impl StopCondition {
    pub fn new(stop_strings: Vec<String>, eos_token_ids: Vec<u32>) -> Self {
        let window = stop_strings.iter().map(String::len).max().unwrap_or(0);
        Self {
            stop_strings,
            eos_token_ids,
            window,
        }
    }

    /// The default stop strings plus the model's end-of-sequence ids.
    pub fn with_eos(eos_token_ids: Vec<u32>) -> Self {
        Self::new(
            DEFAULT_STOP_STRINGS.iter().map(|s| (*s).to_owned()).collect(),
            eos_token_ids,
        )
    }

    pub fn is_eos(&self, token: u32) -> bool {
        self.eos_token_ids.contains(&token)
    }

    /// How many trailing generated tokens must be decoded to see any stop
    /// string. Every token decodes to at least one byte, so a suffix of `n`
    /// bytes always lies within the last `n` tokens.
    pub fn window(&self) -> usize {
        self.window
    }

    /// `true` when `tail` ends with one of the stop strings.
    pub fn matches_suffix(&self, tail: &str) -> bool {
        self.stop_strings.iter().any(|s| tail.ends_with(s.as_str()))
    }
}
