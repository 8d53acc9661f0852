#[cfg(test)]
mod tests;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::config::Config;
use crate::{Result, YoError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file name; relative paths live in the data directory
    pub file: String,
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    #[inline]
    fn default() -> Self {
        Self {
            file: "web_cache.json".to_string(),
            ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CacheEntry {
    snippets: Vec<String>,
    created_at: DateTime<Utc>,
}

type CacheFile = BTreeMap<String, CacheEntry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedQuery {
    pub query: String,
    pub age: TimeDelta,
    pub stale: bool,
}

/// File-backed cache of external snippets keyed by normalized query.
///
/// Entries older than the TTL read as absent but stay on disk until
/// overwritten or cleared. Every change replaces the file atomically.
#[derive(Debug, Clone)]
pub struct ContextCache {
    path: PathBuf,
    ttl: TimeDelta,
}

/// Cache key for `query`: trimmed and lowercased.
#[inline]
pub fn normalize_key(query: &str) -> String {
    query.trim().to_lowercase()
}

impl ContextCache {
    #[inline]
    pub fn new(path: impl Into<PathBuf>, ttl: TimeDelta) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Self {
        let hours = i64::try_from(config.cache.ttl_hours).unwrap_or(i64::MAX);
        Self::new(
            config.cache_path(),
            TimeDelta::try_hours(hours).unwrap_or(TimeDelta::MAX),
        )
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn get(&self, query: &str) -> Option<Vec<String>> {
        self.get_at(query, Utc::now())
    }

    /// Snippets for `query` unless missing or older than the TTL at `now`.
    #[inline]
    pub fn get_at(&self, query: &str, now: DateTime<Utc>) -> Option<Vec<String>> {
        let key = normalize_key(query);
        let entry = self.load().remove(&key)?;
        if self.is_stale(&entry, now) {
            debug!("Cache entry for {:?} is stale", key);
            return None;
        }
        Some(entry.snippets)
    }

    #[inline]
    pub fn put(&self, query: &str, snippets: Vec<String>) -> Result<()> {
        self.put_at(query, snippets, Utc::now())
    }

    /// Store `snippets` for `query`, replacing any previous entry.
    #[inline]
    pub fn put_at(&self, query: &str, snippets: Vec<String>, now: DateTime<Utc>) -> Result<()> {
        let mut entries = self.load();
        entries.insert(
            normalize_key(query),
            CacheEntry {
                snippets,
                created_at: now,
            },
        );
        self.save(&entries)
    }

    #[inline]
    pub fn list(&self) -> Vec<CachedQuery> {
        self.list_at(Utc::now())
    }

    /// Every stored query with its age, oldest first, then by key.
    #[inline]
    pub fn list_at(&self, now: DateTime<Utc>) -> Vec<CachedQuery> {
        let mut listed: Vec<(DateTime<Utc>, CachedQuery)> = self
            .load()
            .into_iter()
            .map(|(query, entry)| {
                let listing = CachedQuery {
                    age: now - entry.created_at,
                    stale: self.is_stale(&entry, now),
                    query,
                };
                (entry.created_at, listing)
            })
            .collect();
        listed.sort_by(|(a_time, a), (b_time, b)| a_time.cmp(b_time).then_with(|| a.query.cmp(&b.query)));
        listed.into_iter().map(|(_, listing)| listing).collect()
    }

    /// Remove every entry; returns how many there were.
    #[inline]
    pub fn clear(&self) -> Result<usize> {
        let removed = self.load().len();
        self.save(&CacheFile::new())?;
        debug!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    fn is_stale(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at >= self.ttl
    }

    fn load(&self) -> CacheFile {
        match self.try_load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{}; treating the cache as empty", e);
                CacheFile::new()
            }
        }
    }

    fn try_load(&self) -> Result<CacheFile> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheFile::new()),
            Err(e) => return Err(self.corruption(e)),
        };
        if content.trim().is_empty() {
            return Ok(CacheFile::new());
        }
        serde_json::from_str(&content).map_err(|e| self.corruption(e))
    }

    fn corruption(&self, detail: impl std::fmt::Display) -> YoError {
        YoError::CacheCorruption {
            path: self.path.clone(),
            detail: detail.to_string(),
        }
    }

    fn save(&self, entries: &CacheFile) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(temp.as_file_mut(), entries)
            .map_err(|e| YoError::Other(e.into()))?;
        temp.as_file_mut().flush()?;
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| YoError::Io(e.error))?;
        Ok(())
    }
}
