//! The accelerator-resident model: weights, tokenizer and chat template.

use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Cache, Config, Llama, LlamaConfig, LlamaEosToks};
use strum::{Display, EnumString};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use crate::decode;
use crate::error::RuntimeError;
use crate::generator::{Generation, TextGenerator};
use crate::hub::{read_json, ModelFiles};
use crate::message::ChatMessage;
use crate::sampling::GenerationConfig;
use crate::stop::StopCondition;
use crate::template::{ChatTemplate, TokenizerConfig};

/// Where to place the weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DevicePreference {
    /// CUDA if present, then Metal, then CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub model_id: String,
    pub device: DevicePreference,
    /// `bf16`, `f16` or `f32`; `None` picks bf16 on accelerators and f32 on CPU.
    pub dtype: Option<String>,
    /// Base sampling seed, advanced once per generation.
    pub seed: u64,
}

impl LoadOptions {
    pub const DEFAULT_SEED: u64 = 299_792_458;

    /// Options for `model_id` with every other setting at its default.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            device: DevicePreference::default(),
            dtype: None,
            seed: Self::DEFAULT_SEED,
        }
    }
}

/// The loaded model. Created once at startup and never reloaded.
pub struct ModelHandle {
    model_id: String,
    model: Llama,
    config: Config,
    tokenizer: Tokenizer,
    template: ChatTemplate,
    generation: GenerationConfig,
    stop: StopCondition,
    device: Device,
    dtype: DType,
    seed: u64,
    calls: u64,
    clean_up_spaces: bool,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model_id", &self.model_id)
            .field("device", &self.device)
            .field("dtype", &self.dtype)
            .finish()
    }
}

impl ModelHandle {
    /// Fetch and load everything. Blocking; any failure is fatal to startup.
    pub fn load(options: &LoadOptions) -> Result<Self, RuntimeError> {
        let model_id = options.model_id.as_str();
        info!(model_id, "loading model");

        let files = ModelFiles::fetch(model_id)?;
        let device = select_device(options.device)?;
        let dtype = match options.dtype.as_deref() {
            Some(name) => parse_dtype(name)?,
            None if device.is_cpu() => DType::F32,
            None => DType::BF16,
        };

        let tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| RuntimeError::LoadTokenizer {
                path: files.tokenizer.clone(),
                source: anyhow::anyhow!(e),
            })?;

        let standalone = files
            .chat_template
            .as_ref()
            .map(|path| {
                std::fs::read_to_string(path).map_err(|source| RuntimeError::ReadFile {
                    path: path.clone(),
                    source,
                })
            })
            .transpose()?;
        let tokenizer_config = TokenizerConfig::from_path(&files.tokenizer_config)?;
        let clean_up_spaces = tokenizer_config.clean_up_tokenization_spaces();
        let template =
            ChatTemplate::from_tokenizer_config(tokenizer_config, standalone, model_id)?;

        let generation = match &files.generation_config {
            Some(path) => GenerationConfig::from_path(path)?,
            None => GenerationConfig::default(),
        };

        let config = read_json::<LlamaConfig>(&files.config)?.into_config(false);

        let mut eos_token_ids = generation.eos_token_ids();
        if eos_token_ids.is_empty() {
            eos_token_ids = match &config.eos_token_id {
                Some(LlamaEosToks::Single(id)) => vec![*id],
                Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
                None => Vec::new(),
            };
        }
        debug!(?eos_token_ids, sampling = ?generation.sampling(), "generation defaults");

        // SAFETY: the hub cache files are not modified while they are mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };
        let model = Llama::load(vb, &config)?;

        info!(model_id, ?device, ?dtype, "model loaded");

        Ok(Self {
            model_id: model_id.to_owned(),
            model,
            config,
            tokenizer,
            template,
            generation,
            stop: StopCondition::with_eos(eos_token_ids),
            device,
            dtype,
            seed: options.seed,
            calls: 0,
            clean_up_spaces,
        })
    }

    fn detokenize(tokenizer: &Tokenizer, ids: &[u32]) -> Result<String, RuntimeError> {
        tokenizer
            .decode(ids, false)
            .map_err(|e| RuntimeError::DetokenizeFailed {
                source: anyhow::anyhow!(e),
            })
    }
}

impl TextGenerator for ModelHandle {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn generate(
        &mut self,
        messages: &[ChatMessage],
        max_length: usize,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<Generation, RuntimeError> {
        if messages.is_empty() {
            return Err(RuntimeError::EmptyMessages);
        }
        if max_length == 0 {
            return Err(RuntimeError::InvalidMaxLength { max_length });
        }

        let prompt = self.template.render(messages)?;
        let encoding = self
            .tokenizer
            .encode(prompt.as_str(), false)
            .map_err(|e| RuntimeError::TokenizeFailed {
                source: anyhow::anyhow!(e),
            })?;
        let prompt_ids = encoding.get_ids().to_vec();

        let cap = max_length.min(self.config.max_position_embeddings);
        if cap < max_length {
            warn!(
                max_length,
                max_position_embeddings = self.config.max_position_embeddings,
                "max_length exceeds the model context; clamping"
            );
        }

        let seed = self.seed.wrapping_add(self.calls);
        self.calls += 1;

        let mut cache = Cache::new(true, self.dtype, &self.config, &self.device)?;
        let mut logits_processor = self.generation.logits_processor(seed);
        let repeat_penalty = self.generation.repeat_penalty();
        let model = &self.model;
        let device = &self.device;
        let tokenizer = &self.tokenizer;

        let output = decode::run(
            prompt_ids,
            cap,
            &self.stop,
            |tokens, pos| {
                let input = Tensor::new(&tokens[pos..], device)?.unsqueeze(0)?;
                let logits = model.forward(&input, pos, &mut cache)?.squeeze(0)?;
                let logits = match repeat_penalty {
                    Some(penalty) => {
                        candle_transformers::utils::apply_repeat_penalty(&logits, penalty, tokens)?
                    }
                    None => logits,
                };
                Ok(logits_processor.sample(&logits)?)
            },
            |ids| Self::detokenize(tokenizer, ids),
            cancelled,
        )?;

        let mut text = Self::detokenize(tokenizer, &output.tokens)?;
        if self.clean_up_spaces {
            text = clean_up_tokenization(&text);
        }
        Ok(Generation {
            text,
            prompt_tokens: output.prompt_tokens,
            total_tokens: output.tokens.len(),
            finish_reason: output.finish_reason,
        })
    }
}

fn select_device(preference: DevicePreference) -> Result<Device, RuntimeError> {
    let device = match preference {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => Device::new_cuda(0)?,
        DevicePreference::Metal => Device::new_metal(0)?,
        DevicePreference::Auto if cuda_is_available() => Device::new_cuda(0)?,
        DevicePreference::Auto if metal_is_available() => Device::new_metal(0)?,
        DevicePreference::Auto => {
            warn!("no accelerator available; running on CPU");
            Device::Cpu
        }
    };
    Ok(device)
}

/// Undo the spaces word-level tokenizers leave before punctuation and
/// English contractions (`"it 's ."` becomes `"it's."`).
fn clean_up_tokenization(text: &str) -> String {
    const REPLACEMENTS: [(&str, &str); 10] = [
        (" .", "."),
        (" ?", "?"),
        (" !", "!"),
        (" ,", ","),
        (" ' ", "'"),
        (" n't", "n't"),
        (" 'm", "'m"),
        (" 's", "'s"),
        (" 've", "'ve"),
        (" 're", "'re"),
    ];
    REPLACEMENTS
        .iter()
        .fold(text.to_owned(), |acc, (from, to)| acc.replace(from, to))
}

fn parse_dtype(name: &str) -> Result<DType, RuntimeError> {
    match name.to_ascii_lowercase().as_str() {
        "bf16" => Ok(DType::BF16),
        "f16" => Ok(DType::F16),
        "f32" => Ok(DType::F32),
        _ => Err(RuntimeError::UnsupportedDtype {
            dtype: name.to_owned(),
        }),
    }
}
