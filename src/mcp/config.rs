//! Tool-server configuration documents and their sources.
//!
//! Documents list servers under `mcpServers` with optional per-server
//! `mcpEnabled` flags. Header values may reference the environment as
//! `${VAR}`.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::ConfigError;

/// One configured tool server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolServerEntry {
    pub name: String,
    pub url: Option<String>,
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ServerBody {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NamedServer {
    name: String,
    #[serde(flatten)]
    body: ServerBody,
}

/// Tool-server configuration as stored: the raw document plus enable flags
/// set from the settings screen.
#[derive(Debug, Clone, Default)]
pub struct RawToolConfig {
    pub document: Option<String>,
    pub enabled: HashMap<String, bool>,
}

/// Parsed configuration, servers in config order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolServersConfig {
    pub servers: Vec<ToolServerEntry>,
    pub enabled: HashMap<String, bool>,
}

impl ToolServersConfig {
    /// Servers default to enabled when no flag is stored.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }

    /// Parse a raw config. Flags in `raw.enabled` override those in the
    /// document's `mcpEnabled`.
    pub fn from_raw(raw: &RawToolConfig) -> Result<Self, ConfigError> {
        let mut cfg = match raw.document.as_deref().map(str::trim) {
            None | Some("") => Self::default(),
            Some(doc) => parse_document(doc)?,
        };
        cfg.enabled
            .extend(raw.enabled.iter().map(|(k, v)| (k.clone(), *v)));
        Ok(cfg)
    }
}

/// Parse `{"mcpServers": {..} | [..], "mcpEnabled": {..}}` or a bare server
/// array. Object order is config order.
pub fn parse_document(doc: &str) -> Result<ToolServersConfig, ConfigError> {
    let v: Value = serde_json::from_str(doc)?;

    let (servers_value, enabled_value) = match v {
        arr @ Value::Array(_) => (arr, None),
        Value::Object(mut obj) => {
            let servers = obj
                .remove("mcpServers")
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            (servers, obj.remove("mcpEnabled"))
        }
        _ => {
            return Err(ConfigError::Shape(
                "expected an object or an array of servers".to_string(),
            ));
        }
    };

    let servers = match servers_value {
        Value::Object(map) => map
            .into_iter()
            .map(|(name, body)| {
                let body: ServerBody = serde_json::from_value(body)?;
                Ok(entry(name, body))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?,
        Value::Array(items) => items
            .into_iter()
            .map(|item| {
                let named: NamedServer = serde_json::from_value(item)?;
                Ok(entry(named.name, named.body))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?,
        _ => {
            return Err(ConfigError::Shape(
                "mcpServers must be an object or an array".to_string(),
            ));
        }
    };

    let enabled = match enabled_value {
        None | Some(Value::Null) => HashMap::new(),
        Some(v) => serde_json::from_value(v)?,
    };

    Ok(ToolServersConfig { servers, enabled })
}

fn entry(name: String, body: ServerBody) -> ToolServerEntry {
    ToolServerEntry {
        name,
        url: body
            .url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty()),
        headers: expand_env_map(&body.headers),
    }
}

/// Expand "${VAR}" placeholders from the process environment.
/// Missing variables leave the placeholder unchanged.
pub fn expand_env_placeholders(input: &str) -> String {
    let mut out = input.to_string();
    for (k, v) in std::env::vars() {
        let needle = format!("${{{k}}}");
        if out.contains(&needle) {
            out = out.replace(&needle, &v);
        }
    }
    out
}

pub fn expand_env_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_placeholders(v)))
        .collect()
}

/// Where the registry reads its configuration from, on every turn.
#[async_trait]
pub trait ToolConfigSource: Send + Sync + std::fmt::Debug {
    async fn load(&self) -> Result<RawToolConfig, ConfigError>;
}

/// In-memory configuration, mutable between turns.
#[derive(Debug, Default)]
pub struct StaticToolConfig {
    inner: RwLock<RawToolConfig>,
}

impl StaticToolConfig {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(RawToolConfig {
                document: Some(document.into()),
                enabled: HashMap::new(),
            }),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub async fn set_document(&self, document: impl Into<String>) {
        self.inner.write().await.document = Some(document.into());
    }

    pub async fn set_enabled(&self, server: impl Into<String>, enabled: bool) {
        self.inner.write().await.enabled.insert(server.into(), enabled);
    }
}

#[async_trait]
impl ToolConfigSource for StaticToolConfig {
    async fn load(&self) -> Result<RawToolConfig, ConfigError> {
        Ok(self.inner.read().await.clone())
    }
}

/// Configuration read from a JSON file each time it is loaded. A missing
/// file means no servers.
#[derive(Debug, Clone)]
pub struct FileToolConfig {
    path: PathBuf,
}

impl FileToolConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ToolConfigSource for FileToolConfig {
    async fn load(&self) -> Result<RawToolConfig, ConfigError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(document) => Ok(RawToolConfig {
                document: Some(document),
                enabled: HashMap::new(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RawToolConfig::default()),
            Err(e) => Err(e.into()),
        }
    }
}
