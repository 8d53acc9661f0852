use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, YoError>;

#[derive(Error, Debug)]
pub enum YoError {
    #[error("Namespace '{0}' not found")]
    NamespaceNotFound(String),

    #[error("Invalid namespace name '{0}' (use 1-64 characters from A-Z, a-z, 0-9, '_' or '-')")]
    InvalidNamespace(String),

    #[error("Store at {} is locked by another process: {detail}", path.display())]
    StoreLocked { path: PathBuf, detail: String },

    #[error("Store at {} is corrupt: {detail}", path.display())]
    StoreCorrupt { path: PathBuf, detail: String },

    #[error(
        "Embedding dimension mismatch in namespace '{namespace}': expected {expected}, got {actual}"
    )]
    DimensionMismatch {
        namespace: String,
        expected: usize,
        actual: usize,
    },

    #[error("Embedding failed for {target}: {detail}")]
    EmbeddingFailure { target: String, detail: String },

    #[error("Compaction of {} failed: {detail}", path.display())]
    CompactionFailure { path: PathBuf, detail: String },

    #[error("Cache file {} is unreadable: {detail}", path.display())]
    CacheCorruption { path: PathBuf, detail: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for YoError {
    #[inline]
    fn from(error: sqlx::Error) -> Self {
        Self::Database(error.to_string())
    }
}

impl From<config::ConfigError> for YoError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

pub mod assistant;
pub mod cache;
pub mod commands;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod namespace;
pub mod retrieval;
pub mod store;
pub mod web;
