//! The model's default decoding configuration (`generation_config.json`).

use std::path::Path;

use candle_transformers::generation::{LogitsProcessor, Sampling};
use serde::Deserialize;

use crate::error::RuntimeError;
use crate::hub::read_json;

const DEFAULT_TEMPERATURE: f64 = 1.0;
const DEFAULT_TOP_K: usize = 50;
const DEFAULT_TOP_P: f64 = 1.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TokenIds {
    One(u32),
    Many(Vec<u32>),
}

/// Decoding defaults shipped with the model. Absent fields take the usual
/// defaults: greedy decoding unless `do_sample` is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub do_sample: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub repetition_penalty: Option<f32>,
    #[serde(default)]
    eos_token_id: Option<TokenIds>,
}

impl GenerationConfig {
    pub fn from_path(path: &Path) -> Result<Self, RuntimeError> {
        read_json(path)
    }

    pub fn eos_token_ids(&self) -> Vec<u32> {
        match &self.eos_token_id {
            None => Vec::new(),
            Some(TokenIds::One(id)) => vec![*id],
            Some(TokenIds::Many(ids)) => ids.clone(),
        }
    }

    pub fn sampling(&self) -> Sampling {
        if !self.do_sample.unwrap_or(false) {
            return Sampling::ArgMax;
        }
        let temperature = self.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if temperature <= 0.0 {
            return Sampling::ArgMax;
        }
        let k = self.top_k.unwrap_or(DEFAULT_TOP_K);
        let p = self.top_p.unwrap_or(DEFAULT_TOP_P);
        match (k > 0, p < 1.0) {
            (true, true) => Sampling::TopKThenTopP { k, p, temperature },
            (true, false) => Sampling::TopK { k, temperature },
            (false, true) => Sampling::TopP { p, temperature },
            (false, false) => Sampling::All { temperature },
        }
    }

    pub fn logits_processor(&self, seed: u64) -> LogitsProcessor {
        LogitsProcessor::from_sampling(seed, self.sampling())
    }

    /// The penalty to apply, or `None` when it would be a no-op.
    pub fn repeat_penalty(&self) -> Option<f32> {
        self.repetition_penalty
            .filter(|p| (*p - 1.0).abs() > f32::EPSILON)
    }
}
