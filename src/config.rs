//! Application configuration.
//!
//! Layers, lowest priority first:
//! 1. Built-in defaults
//! 2. An optional file (`PAGEWISE_CONFIG`, or an explicit path); format by
//!    extension
//! 3. Environment variables `PAGEWISE_<SECTION>__<KEY>`, e.g.
//!    `PAGEWISE_LLM__MODEL=qwen3:8b`
//!
//! `.env` is loaded first, so its values count as environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::llm::{EndpointType, LlmSettings};
use crate::page::PageSettings;

const ENV_PREFIX: &str = "PAGEWISE";
const CONFIG_FILE_ENV: &str = "PAGEWISE_CONFIG";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub cache: CacheConfig,
    pub page: PageConfig,
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    pub endpoint: String,
    pub endpoint_type: EndpointType,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("endpoint", &self.endpoint)
            .field("endpoint_type", &self.endpoint_type)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LlmConfig {
    pub fn settings(&self) -> LlmSettings {
        LlmSettings {
            endpoint: self.endpoint.clone(),
            endpoint_type: self.endpoint_type,
            model: self.model.clone(),
            api_key: self.api_key.clone().filter(|k| !k.trim().is_empty()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub base_prompt: String,
    pub heartbeat_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    /// JSON tool-server document, read on every turn.
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    pub handshake_timeout_secs: u64,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    /// JSON file backing the cache and chat history; in memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PageConfig {
    pub min_content_chars: usize,
    pub max_content_chars: usize,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl PageConfig {
    pub fn settings(&self) -> PageSettings {
        PageSettings {
            min_content_chars: self.min_content_chars,
            max_content_chars: self.max_content_chars,
            retry_attempts: self.retry_attempts,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }
}

impl AppConfig {
    /// Load from `.env`, the file named by `PAGEWISE_CONFIG` (if any), and
    /// the environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let path = std::env::var(CONFIG_FILE_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load with an explicit config file. A missing given file is an error.
    pub fn load_from(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("llm.endpoint", "http://localhost:11434")?
            .set_default("llm.endpoint_type", "standard")?
            .set_default("llm.model", "llama3.2")?
            .set_default("llm.temperature", 0.7)?
            .set_default("llm.timeout_secs", 60)?
            .set_default("agent.max_iterations", 5)?
            .set_default("agent.base_prompt", crate::agent::DEFAULT_BASE_PROMPT)?
            .set_default("agent.heartbeat_secs", 15)?
            .set_default("tools.handshake_timeout_secs", 8)?
            .set_default("tools.call_timeout_secs", 15)?
            .set_default("cache.enabled", true)?
            .set_default("cache.ttl_secs", 86_400)?
            .set_default("page.min_content_chars", 100)?
            .set_default("page.max_content_chars", 12_000)?
            .set_default("page.retry_attempts", 3)?
            .set_default("page.retry_base_delay_ms", 300)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.llm.endpoint.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "llm.endpoint cannot be empty".to_string(),
            ));
        }
        if self.llm.model.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "llm.model cannot be empty".to_string(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(config::ConfigError::Message(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.page.min_content_chars > self.page.max_content_chars {
            return Err(config::ConfigError::Message(
                "page.min_content_chars exceeds page.max_content_chars".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve [`LlmSettings`] straight from `LLM_*` environment variables.
///
/// `LLM_ENDPOINT` and `LLM_MODEL` are required; `LLM_API_KEY`,
/// `LLM_ENDPOINT_TYPE`, `LLM_TEMPERATURE`, `LLM_MAX_TOKENS` and
/// `LLM_TIMEOUT_SECS` are optional.
pub fn load_llm_settings() -> Result<LlmSettings, config::ConfigError> {
    let endpoint = required_env("LLM_ENDPOINT")?;
    let model = required_env("LLM_MODEL")?;

    let api_key = std::env::var("LLM_API_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty());

    let endpoint_type = std::env::var("LLM_ENDPOINT_TYPE")
        .map(|s| EndpointType::from_setting(&s))
        .unwrap_or_default();

    let mut settings = LlmSettings::local(model);
    settings.endpoint = endpoint;
    settings.endpoint_type = endpoint_type;
    settings.api_key = api_key;

    if let Some(t) = parsed_env::<f32>("LLM_TEMPERATURE")? {
        settings.temperature = Some(t);
    }
    settings.max_tokens = parsed_env::<u32>("LLM_MAX_TOKENS")?;
    if let Some(secs) = parsed_env::<u64>("LLM_TIMEOUT_SECS")? {
        settings.timeout = Duration::from_secs(secs);
    }

    Ok(settings)
}

fn required_env(name: &str) -> Result<String, config::ConfigError> {
    let value = std::env::var(name)
        .map_err(|_| config::ConfigError::Message(format!("Missing required env var: {name}")))?;
    if value.trim().is_empty() {
        return Err(config::ConfigError::Message(format!(
            "{name} cannot be empty"
        )));
    }
    Ok(value)
}

fn parsed_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, config::ConfigError> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| config::ConfigError::Message(format!("{name} is not a valid value"))),
        _ => Ok(None),
    }
}
