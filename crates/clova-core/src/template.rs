//! Chat-template rendering.
//!
//! The prompt format belongs to the model artifact: the Jinja template shipped
//! in `tokenizer_config.json` (or `chat_template.jinja`) decides where each
//! role goes, including `tool_list`. [`ChatTemplate`] only evaluates it.

use std::fmt::Write;
use std::path::Path;

use chrono::Local;
use minijinja::{context, Environment, ErrorKind};
use serde::Deserialize;

use crate::error::RuntimeError;
use crate::hub::read_json;
use crate::message::ChatMessage;

const TEMPLATE_NAME: &str = "chat";

/// The subset of `tokenizer_config.json` needed for prompt construction.
#[derive(Debug, Default, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default)]
    chat_template: Option<TemplateField>,
    #[serde(default)]
    bos_token: Option<TokenField>,
    #[serde(default)]
    eos_token: Option<TokenField>,
    #[serde(default)]
    clean_up_tokenization_spaces: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TemplateField {
    Single(String),
    Named(Vec<NamedTemplate>),
}

#[derive(Debug, Deserialize)]
struct NamedTemplate {
    name: String,
    template: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenField {
    Plain(String),
    Added { content: String },
}

impl TokenField {
    fn into_content(self) -> String {
        match self {
            TokenField::Plain(s) => s,
            TokenField::Added { content } => content,
        }
    }
}

impl TokenizerConfig {
    pub fn from_path(path: &Path) -> Result<Self, RuntimeError> {
        read_json(path)
    }

    /// Whether decoded text should have spaces before punctuation removed.
    pub fn clean_up_tokenization_spaces(&self) -> bool {
        self.clean_up_tokenization_spaces
    }

    /// The template source, preferring the `default` entry of a named list.
    pub fn chat_template(&self) -> Option<&str> {
        match self.chat_template.as_ref()? {
            TemplateField::Single(s) => Some(s),
            TemplateField::Named(list) => list
                .iter()
                .find(|t| t.name == "default")
                .or_else(|| list.first())
                .map(|t| t.template.as_str()),
        }
    }
}

/// A compiled chat template plus the special tokens it may reference.
#[derive(Debug)]
pub struct ChatTemplate {
    env: Environment<'static>,
    bos_token: String,
    eos_token: String,
}

impl ChatTemplate {
    pub fn new(
        source: impl Into<String>,
        bos_token: impl Into<String>,
        eos_token: impl Into<String>,
    ) -> Result<Self, RuntimeError> {
        let mut env = Environment::new();
        // Matches the environment the templates are authored against.
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_unknown_method_callback(minijinja_contrib::pycompat::unknown_method_callback);
        env.add_function("raise_exception", raise_exception);
        env.add_function("strftime_now", strftime_now);
        env.add_template_owned(TEMPLATE_NAME, source.into())?;

        Ok(Self {
            env,
            bos_token: bos_token.into(),
            eos_token: eos_token.into(),
        })
    }

    /// Build from a parsed tokenizer config, falling back to a standalone
    /// template file when the config carries none.
    pub fn from_tokenizer_config(
        config: TokenizerConfig,
        standalone: Option<String>,
        model_id: &str,
    ) -> Result<Self, RuntimeError> {
        let source = config
            .chat_template()
            .map(str::to_owned)
            .or(standalone)
            .ok_or_else(|| RuntimeError::MissingChatTemplate {
                model_id: model_id.to_owned(),
            })?;
        let bos = config.bos_token.map(TokenField::into_content).unwrap_or_default();
        let eos = config.eos_token.map(TokenField::into_content).unwrap_or_default();
        Self::new(source, bos, eos)
    }

    /// Render the conversation followed by the assistant-turn opener.
    pub fn render(&self, messages: &[ChatMessage]) -> Result<String, RuntimeError> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let prompt = template.render(context! {
            messages => messages,
            add_generation_prompt => true,
            bos_token => &self.bos_token,
            eos_token => &self.eos_token,
        })?;
        Ok(prompt)
    }
}

fn raise_exception(message: String) -> Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, message))
}

fn strftime_now(format: String) -> Result<String, minijinja::Error> {
    let mut out = String::new();
    write!(out, "{}", Local::now().format(&format)).map_err(|_| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid strftime format {format:?}"),
        )
    })?;
    Ok(out)
}
