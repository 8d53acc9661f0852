use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::store::lifecycle::{OpenOutcome, Opener, SqliteConnector};
use crate::store::queries::{ChunkQueries, NamespaceQueries};
use crate::{Result, YoError};


pub mod lifecycle;
pub mod models;
pub mod queries;

pub use lifecycle::{OpenState, rotate_backups};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file name inside the data directory
    pub database_file: String,
    /// Recovery snapshot directory; relative paths sit next to the database file
    pub recovery_dir: String,
    pub keep_backups: usize,
    pub compaction_threshold_bytes: u64,
    pub busy_timeout_ms: u64,
    pub retry_backoff_ms: u64,
}

impl Default for StoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            database_file: "yo.db".to_string(),
            recovery_dir: "recoveries".to_string(),
            keep_backups: 5,
            compaction_threshold_bytes: 100 * 1024 * 1024,
            busy_timeout_ms: 1000,
            retry_backoff_ms: 250,
        }
    }
}

impl StoreConfig {
    /// Where recovery snapshots of the database at `database_path` go.
    #[inline]
    pub fn recovery_dir_for(&self, database_path: &Path) -> PathBuf {
        let dir = Path::new(&self.recovery_dir);
        if dir.is_absolute() {
            return dir.to_path_buf();
        }
        database_path
            .parent()
            .map_or_else(|| dir.to_path_buf(), |parent| parent.join(dir))
    }
}

/// Before and after sizes of one compaction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionReport {
    pub before: u64,
    pub after: u64,
    pub performed: bool,
}

impl CompactionReport {
    #[inline]
    pub fn reclaimed(&self) -> u64 {
        self.before.saturating_sub(self.after)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub path: PathBuf,
    pub file_size: u64,
    pub namespaces: i64,
    pub chunks: i64,
}

/// Holds the writer mutex and a shared gate guard for the duration of one write.
pub struct WriteSection<'a> {
    _gate: RwLockReadGuard<'a, ()>,
    _writer: MutexGuard<'a, ()>,
}

/// Owner of the single database file and the only path to its connection pool.
///
/// Reads and writes share the gate; compaction takes it exclusively.
/// Writes are additionally serialized through one mutex.
pub struct StoreManager {
    path: PathBuf,
    pool: SqlitePool,
    config: StoreConfig,
    outcome: OpenOutcome,
    gate: RwLock<()>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for StoreManager {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreManager")
            .field("path", &self.path)
            .field("state", &self.outcome.state())
            .finish_non_exhaustive()
    }
}

impl StoreManager {
    /// Open the store configured in `config`.
    #[inline]
    pub async fn open_from_config(config: &Config) -> Result<Self> {
        Self::open(config.database_path(), &config.store).await
    }

    /// Open (or create) the database at `path`, recovering from a locked or corrupt file.
    ///
    /// # Arguments
    /// * `path` - Database file location
    /// * `config` - Recovery, rotation and timeout settings
    ///
    /// # Returns
    /// * `Result<Self>` - A live store, or `StoreLocked`/`StoreCorrupt` after one failed retry
    pub async fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let connector = SqliteConnector {
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            ..SqliteConnector::default()
        };
        let opener = Opener::new(
            &connector,
            &path,
            config.recovery_dir_for(&path),
            config.keep_backups,
            Duration::from_millis(config.retry_backoff_ms),
        );

        let (pool, outcome) = opener.open().await.inspect_err(|e| {
            error!("Failed to open store at {}: {}", path.display(), e);
        })?;
        info!("Opened store at {}", path.display());

        Ok(Self {
            path,
            pool,
            config: config.clone(),
            outcome,
            gate: RwLock::new(()),
            writer: Mutex::new(()),
        })
    }

    #[inline]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Transitions taken while opening, and the recovery snapshot if one was made
    #[inline]
    pub fn open_outcome(&self) -> &OpenOutcome {
        &self.outcome
    }

    #[inline]
    pub fn recovery_dir(&self) -> PathBuf {
        self.config.recovery_dir_for(&self.path)
    }

    #[inline]
    pub async fn read_section(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    #[inline]
    pub async fn write_section(&self) -> WriteSection<'_> {
        let gate = self.gate.read().await;
        let writer = self.writer.lock().await;
        WriteSection {
            _gate: gate,
            _writer: writer,
        }
    }

    #[inline]
    pub fn file_size(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    /// Compact only when the file has grown past `threshold_bytes`.
    #[inline]
    pub async fn maybe_compact(&self, threshold_bytes: u64) -> Result<CompactionReport> {
        let size = self.file_size()?;
        if size <= threshold_bytes {
            debug!(
                "Store is {} bytes, under the {} byte compaction threshold",
                size, threshold_bytes
            );
            return Ok(CompactionReport {
                before: size,
                after: size,
                performed: false,
            });
        }
        self.compact().await
    }

    /// Rewrite the database file with `VACUUM`, holding the gate exclusively.
    ///
    /// Chunk ids and content are untouched and the file never grows.
    pub async fn compact(&self) -> Result<CompactionReport> {
        let _exclusive = self.gate.write().await;
        let before = self.file_size()?;

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .map_err(|e| YoError::CompactionFailure {
                path: self.path.clone(),
                detail: e.to_string(),
            })?;

        let after = self.file_size()?;
        info!(
            "Compacted store at {}: {} -> {} bytes",
            self.path.display(),
            before,
            after
        );
        Ok(CompactionReport {
            before,
            after,
            performed: true,
        })
    }

    #[inline]
    pub async fn stats(&self) -> Result<StoreStats> {
        let _read = self.read_section().await;
        let namespaces = NamespaceQueries::count(&self.pool).await?;
        let chunks = ChunkQueries::count_all(&self.pool).await?;
        Ok(StoreStats {
            path: self.path.clone(),
            file_size: self.file_size()?,
            namespaces,
            chunks,
        })
    }

    /// Close every pooled connection.
    #[inline]
    pub async fn close(self) {
        self.pool.close().await;
        debug!("Closed store at {}", self.path.display());
    }
}
