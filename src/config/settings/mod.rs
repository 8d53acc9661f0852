
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::cache::CacheConfig;
use crate::embeddings::chunking::ChunkingConfig;
use crate::index::IndexConfig;
use crate::retrieval::RetrievalConfig;
use crate::store::StoreConfig;
use crate::web::WebConfig;

pub const ENV_DATA_DIR: &str = "YO_DATA_DIR";
pub const ENV_MODEL: &str = "YO_MODEL";
pub const ENV_EMBED_MODEL: &str = "YO_EMBED_MODEL";
pub const ENV_DB_PATH: &str = "YO_DB_PATH";
pub const ENV_NAMESPACE: &str = "YO_NAMESPACE";

const CONFIG_FILE_NAME: &str = "config.toml";
const SUPPORTED_PROVIDER: &str = "ollama";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
    /// Database path forced through `YO_DB_PATH`.
    #[serde(skip)]
    pub database_override: Option<PathBuf>,
    /// Namespace forced through `YO_NAMESPACE`.
    #[serde(skip)]
    pub namespace_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embed_model: String,
    pub chat_model: String,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embed_model: "nomic-embed-text".to_string(),
            chat_model: "llama3".to_string(),
            timeout_secs: 120,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Data directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Unsupported model provider '{0}' (only 'ollama' is available)")]
    UnsupportedProvider(String),
    #[error("Invalid HTTP timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid chunk size: {0} (must be between 50 and 8192 characters)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid context budget: {0} (must be at least 200 characters)")]
    InvalidContextBudget(usize),
    #[error("Invalid backup count: {0} (must be between 1 and 100)")]
    InvalidKeepBackups(usize),
    #[error("Invalid cache TTL: {0} hours (must be greater than 0)")]
    InvalidTtl(u64),
    #[error("Invalid index list limit: {0} (must be between 1 and 4096)")]
    InvalidMaxLists(usize),
    #[error("Invalid probe count: {0} (must be at least 1)")]
    InvalidProbes(usize),
    #[error("Invalid snippet limit: {0} (must be between 1 and 50)")]
    InvalidMaxSnippets(usize),
    #[error("Invalid file name for {0}: cannot be empty")]
    EmptyFileName(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Split a `provider:model` spec. A bare name means the default provider.
#[inline]
pub fn parse_model_spec(spec: &str) -> Result<(String, String), ConfigError> {
    let cleaned = spec.trim();
    let (provider, name) = match cleaned.split_once(':') {
        // "llama3:8b" and "nomic-embed-text:latest" are model tags, not providers
        Some((provider, name)) if !is_tag(name) => {
            (provider.trim().to_lowercase(), name.trim().to_string())
        }
        _ => (SUPPORTED_PROVIDER.to_string(), cleaned.to_string()),
    };

    if name.is_empty() {
        return Err(ConfigError::InvalidModel(spec.to_string()));
    }
    if provider != SUPPORTED_PROVIDER {
        return Err(ConfigError::UnsupportedProvider(provider));
    }
    Ok((provider, name))
}

fn is_tag(tag: &str) -> bool {
    tag == "latest"
        || tag
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_digit())
}

impl Config {
    /// Resolve the data directory: `YO_DATA_DIR`, then the platform data dir, then `./data`.
    #[inline]
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = env::var_os(ENV_DATA_DIR).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::data_local_dir()
            .map(|data| data.join("yo"))
            .unwrap_or_else(|| PathBuf::from("data")))
    }

    #[inline]
    pub fn load() -> Result<Self> {
        let data_dir = Self::data_dir().context("Failed to resolve data directory")?;
        Self::load_from(data_dir)
    }

    #[inline]
    pub fn load_from<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let config_path = data_dir.join(CONFIG_FILE_NAME);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            debug!("No config file at {}, using defaults", config_path.display());
            Config::default()
        };
        config.base_dir = data_dir.to_path_buf();

        config
            .apply_env_overrides()
            .context("Invalid environment override")?;
        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Apply `YO_MODEL`, `YO_EMBED_MODEL`, `YO_DB_PATH` and `YO_NAMESPACE`.
    #[inline]
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(spec) = non_empty_env(ENV_MODEL) {
            let (_, model) = parse_model_spec(&spec)?;
            self.ollama.chat_model = model;
        }
        if let Some(spec) = non_empty_env(ENV_EMBED_MODEL) {
            let (_, model) = parse_model_spec(&spec)?;
            self.ollama.embed_model = model;
        }
        if let Some(path) = non_empty_env(ENV_DB_PATH) {
            self.database_override = Some(PathBuf::from(path));
        }
        if let Some(namespace) = non_empty_env(ENV_NAMESPACE) {
            self.namespace_override = Some(namespace.trim().to_string());
        }
        Ok(())
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let data_dir = self.get_base_dir();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_storage()?;
        self.validate_retrieval()?;
        self.web.validate()?;
        Ok(())
    }

    fn validate_storage(&self) -> Result<(), ConfigError> {
        if self.store.database_file.trim().is_empty() {
            return Err(ConfigError::EmptyFileName("store.database_file"));
        }
        if self.store.recovery_dir.trim().is_empty() {
            return Err(ConfigError::EmptyFileName("store.recovery_dir"));
        }
        if !(1..=100).contains(&self.store.keep_backups) {
            return Err(ConfigError::InvalidKeepBackups(self.store.keep_backups));
        }
        if self.cache.file.trim().is_empty() {
            return Err(ConfigError::EmptyFileName("cache.file"));
        }
        if self.cache.ttl_hours == 0 {
            return Err(ConfigError::InvalidTtl(self.cache.ttl_hours));
        }
        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if !(50..=8192).contains(&chunking.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(chunking.chunk_size));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                chunking.chunk_overlap,
                chunking.chunk_size,
            ));
        }

        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }
        if self.retrieval.max_context_chars < 200 {
            return Err(ConfigError::InvalidContextBudget(
                self.retrieval.max_context_chars,
            ));
        }

        if !(1..=4096).contains(&self.index.max_lists) {
            return Err(ConfigError::InvalidMaxLists(self.index.max_lists));
        }
        if self.index.probes == 0 {
            return Err(ConfigError::InvalidProbes(self.index.probes));
        }
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Path of the single embedded database file
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.database_override
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join(&self.store.database_file))
    }

    /// Path of the external context cache file
    #[inline]
    pub fn cache_path(&self) -> PathBuf {
        let file = Path::new(&self.cache.file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.get_base_dir().join(file)
        }
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.embed_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embed_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_embed_model(&mut self, spec: &str) -> Result<(), ConfigError> {
        let (_, model) = parse_model_spec(spec)?;
        self.embed_model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, spec: &str) -> Result<(), ConfigError> {
        let (_, model) = parse_model_spec(spec)?;
        self.chat_model = model;
        Ok(())
    }
}
