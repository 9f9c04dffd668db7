//! Fetching model artifacts by repository id.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::RuntimeError;

const SINGLE_WEIGHTS: &str = "model.safetensors";
const WEIGHTS_INDEX: &str = "model.safetensors.index.json";

/// Local paths of everything needed to build a [`ModelHandle`](crate::ModelHandle).
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub tokenizer_config: PathBuf,
    pub generation_config: Option<PathBuf>,
    pub chat_template: Option<PathBuf>,
    pub weights: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SafetensorsIndex {
    weight_map: HashMap<String, String>,
}

impl ModelFiles {
    /// Download (or reuse from the local hub cache) all artifacts of
    /// `model_id`. Blocking.
    pub fn fetch(model_id: &str) -> Result<Self, RuntimeError> {
        let api = ApiBuilder::from_env()
            .build()
            .map_err(|source| RuntimeError::HubInit { source })?;
        let repo = api.model(model_id.to_owned());
        let get = |file: &str| fetch_file(&repo, model_id, file);

        let config = get("config.json")?;
        let tokenizer = get("tokenizer.json")?;
        let tokenizer_config = get("tokenizer_config.json")?;
        let generation_config = get("generation_config.json")
            .inspect_err(|e| debug!(error = %e, "no generation_config.json; using defaults"))
            .ok();
        let chat_template = get("chat_template.jinja").ok();

        let weights = match get(SINGLE_WEIGHTS) {
            Ok(path) => vec![path],
            Err(_) => {
                let index = get(WEIGHTS_INDEX)?;
                shard_names(&read_json::<SafetensorsIndex>(&index)?)
                    .iter()
                    .map(|shard| get(shard.as_str()))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        info!(model_id, shards = weights.len(), "model artifacts ready");

        Ok(Self {
            config,
            tokenizer,
            tokenizer_config,
            generation_config,
            chat_template,
            weights,
        })
    }
}

fn fetch_file(repo: &ApiRepo, model_id: &str, file: &str) -> Result<PathBuf, RuntimeError> {
    repo.get(file).map_err(|source| RuntimeError::HubFetch {
        model_id: model_id.to_owned(),
        file: file.to_owned(),
        source,
    })
}

/// Distinct shard file names, in a stable order.
fn shard_names(index: &SafetensorsIndex) -> Vec<String> {
    index
        .weight_map
        .values()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, RuntimeError> {
    let raw = std::fs::read(path).map_err(|source| RuntimeError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&raw).map_err(|source| RuntimeError::ParseFile {
        path: path.to_path_buf(),
        source,
    })
}
