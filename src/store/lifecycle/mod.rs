
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use sqlx::SqlitePool;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::YoError;

pub(crate) static MIGRATOR: Migrator = sqlx::migrate!("src/store/migrations");

/// Files SQLite may keep next to the main database file.
pub const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Why a connection attempt did not produce a usable handle.
#[derive(Debug)]
pub enum ConnectFailure {
    Locked(String),
    Corrupt(String),
    Other(anyhow::Error),
}

impl ConnectFailure {
    fn into_error(self, path: &Path) -> YoError {
        match self {
            Self::Locked(detail) => YoError::StoreLocked {
                path: path.to_path_buf(),
                detail,
            },
            Self::Corrupt(detail) => YoError::StoreCorrupt {
                path: path.to_path_buf(),
                detail,
            },
            Self::Other(error) => YoError::Database(format!("{error:#}")),
        }
    }

    /// Same kind of failure with a different explanation.
    fn with_detail(&self, detail: String) -> Self {
        match self {
            Self::Corrupt(_) => Self::Corrupt(detail),
            _ => Self::Locked(detail),
        }
    }
}

/// Opens a store file and reports lock or corruption problems in a typed way.
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: Send;

    async fn connect(&self, path: &Path) -> Result<Self::Handle, ConnectFailure>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenState {
    Closed,
    Opening,
    Recovering,
    Open,
    Failed,
}

/// What happened while a store was being opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOutcome {
    pub transitions: Vec<OpenState>,
    pub snapshot: Option<PathBuf>,
    pub pruned: Vec<PathBuf>,
}

impl Default for OpenOutcome {
    #[inline]
    fn default() -> Self {
        Self {
            transitions: vec![OpenState::Closed],
            snapshot: None,
            pruned: Vec::new(),
        }
    }
}

impl OpenOutcome {
    #[inline]
    pub fn state(&self) -> OpenState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(OpenState::Closed)
    }

    #[inline]
    pub fn recovered(&self) -> bool {
        self.transitions.contains(&OpenState::Recovering)
    }

    fn enter(&mut self, state: OpenState) {
        debug!("Store state {:?} -> {:?}", self.state(), state);
        self.transitions.push(state);
    }
}

/// Drives `Closed -> Opening -> {Open | Recovering -> Open | Failed}`.
pub struct Opener<'a, C: Connector> {
    connector: &'a C,
    path: PathBuf,
    recovery_dir: PathBuf,
    keep_backups: usize,
    backoff: Duration,
}

impl<'a, C: Connector> Opener<'a, C> {
    #[inline]
    pub fn new(
        connector: &'a C,
        path: impl Into<PathBuf>,
        recovery_dir: impl Into<PathBuf>,
        keep_backups: usize,
        backoff: Duration,
    ) -> Self {
        Self {
            connector,
            path: path.into(),
            recovery_dir: recovery_dir.into(),
            keep_backups,
            backoff,
        }
    }

    /// Connect, and on a locked or corrupt file run one recovery plus one retry.
    ///
    /// The original file is moved aside only once. A file created by the failed
    /// recovery attempt is discarded before the retry, never snapshotted.
    ///
    /// # Returns
    /// * `Result<(C::Handle, OpenOutcome), YoError>` - The live handle and the transitions taken
    pub async fn open(&self) -> Result<(C::Handle, OpenOutcome), YoError> {
        let mut outcome = OpenOutcome::default();
        outcome.enter(OpenState::Opening);

        let mut failure = match self.connector.connect(&self.path).await {
            Ok(handle) => {
                outcome.enter(OpenState::Open);
                return Ok((handle, outcome));
            }
            Err(ConnectFailure::Other(error)) => {
                outcome.enter(OpenState::Failed);
                return Err(ConnectFailure::Other(error).into_error(&self.path));
            }
            Err(failure) => failure,
        };

        outcome.enter(OpenState::Recovering);
        warn!(
            "Store at {} is unusable ({:?}), moving it aside",
            self.path.display(),
            failure
        );

        let mut set_aside = false;
        for attempt in 0..2 {
            if attempt > 0 {
                tokio::time::sleep(self.backoff).await;
            }
            match self.recover_once(&failure, &mut set_aside, &mut outcome).await {
                Ok(handle) => {
                    outcome.enter(OpenState::Open);
                    info!("Store at {} reopened after recovery", self.path.display());
                    return Ok((handle, outcome));
                }
                Err(ConnectFailure::Other(error)) => {
                    outcome.enter(OpenState::Failed);
                    return Err(ConnectFailure::Other(error).into_error(&self.path));
                }
                Err(next) => {
                    debug!("Recovery attempt {} failed: {:?}", attempt + 1, next);
                    failure = next;
                }
            }
        }

        outcome.enter(OpenState::Failed);
        Err(failure.into_error(&self.path))
    }

    async fn recover_once(
        &self,
        failure: &ConnectFailure,
        set_aside: &mut bool,
        outcome: &mut OpenOutcome,
    ) -> Result<C::Handle, ConnectFailure> {
        if *set_aside {
            discard_store_files(&self.path)
                .map_err(|e| failure.with_detail(format!("could not discard fresh store: {e}")))?;
        } else {
            if self.path.exists() {
                self.set_aside(failure, outcome)?;
            }
            *set_aside = true;
        }

        self.connector.connect(&self.path).await
    }

    fn set_aside(
        &self,
        failure: &ConnectFailure,
        outcome: &mut OpenOutcome,
    ) -> Result<(), ConnectFailure> {
        let snapshot = snapshot_aside(&self.path, &self.recovery_dir, Utc::now())
            .map_err(|e| failure.with_detail(format!("could not move store aside: {e}")))?;
        warn!(
            "Recovered store snapshot saved to {}",
            snapshot.display()
        );
        outcome.snapshot = Some(snapshot);

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match rotate_backups(&self.recovery_dir, &file_name, self.keep_backups) {
                Ok(pruned) => outcome.pruned.extend(pruned),
            Err(e) => warn!(
                "Failed to rotate recovery snapshots in {}: {}",
                self.recovery_dir.display(),
                e
            ),
        }
        Ok(())
    }
}

/// Remove a store file this opener created, with its sidecars.
fn discard_store_files(path: &Path) -> io::Result<()> {
    let sidecars = SIDECAR_SUFFIXES.iter().map(|suffix| with_suffix(path, suffix));
    for file in std::iter::once(path.to_path_buf()).chain(sidecars) {
        match fs::remove_file(&file) {
            Ok(()) => debug!("Discarded {}", file.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Move `path` and its sidecars into `recovery_dir` under a UTC timestamped name.
///
/// The snapshot's modification time is set to the recovery time.
#[inline]
pub fn snapshot_aside(path: &Path, recovery_dir: &Path, now: DateTime<Utc>) -> io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "store path has no file name"))?
        .to_string_lossy()
        .into_owned();
    fs::create_dir_all(recovery_dir)?;

    let stamp = now.format("%Y%m%dT%H%M%S%6fZ");
    let mut snapshot = recovery_dir.join(format!("{file_name}.{stamp}"));
    let mut counter = 1;
    while snapshot.exists() {
        snapshot = recovery_dir.join(format!("{file_name}.{stamp}.{counter}"));
        counter += 1;
    }

    fs::rename(path, &snapshot)?;
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = with_suffix(path, suffix);
        if sidecar.exists() {
            fs::rename(&sidecar, with_suffix(&snapshot, suffix))?;
        }
    }

    File::options()
        .write(true)
        .open(&snapshot)?
        .set_modified(SystemTime::now())?;

    Ok(snapshot)
}

/// Keep the `keep_n` most recent snapshots of `file_name` in `recovery_dir`, deleting the rest.
///
/// Only entries named like [`snapshot_aside`] output (`<file_name>.<stamp>`,
/// optionally `.N`, plus sidecars) are considered. Anything else is left alone.
/// Snapshots are ordered by modification time, then by file name, so the
/// lexicographically smaller of two equally old snapshots goes first.
/// Sidecar files are removed together with their snapshot.
///
/// # Returns
/// * `io::Result<Vec<PathBuf>>` - The snapshots that were deleted
#[inline]
pub fn rotate_backups(recovery_dir: &Path, file_name: &str, keep_n: usize) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(recovery_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut groups: BTreeMap<String, (SystemTime, Vec<PathBuf>)> = BTreeMap::new();
    for entry in entries {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let base = strip_sidecar_suffix(&name).to_string();
        if !is_snapshot_name(&base, file_name) {
            continue;
        }
        let modified = metadata.modified()?;

        let group = groups
            .entry(base)
            .or_insert((SystemTime::UNIX_EPOCH, Vec::new()));
        group.0 = group.0.max(modified);
        group.1.push(entry.path());
    }

    let excess = groups.len().saturating_sub(keep_n);
    let doomed = groups
        .into_iter()
        .sorted_by(|(a_name, (a_time, _)), (b_name, (b_time, _))| {
            a_time.cmp(b_time).then_with(|| a_name.cmp(b_name))
        })
        .take(excess)
        .collect::<Vec<_>>();

    let mut pruned = Vec::with_capacity(doomed.len());
    for (base, (_, files)) in doomed {
        for file in files {
            fs::remove_file(&file)?;
        }
        debug!("Pruned recovery snapshot {}", base);
        pruned.push(recovery_dir.join(base));
    }
    Ok(pruned)
}

/// `<file_name>.<YYYYMMDDTHHMMSSffffffZ>` with an optional `.N` collision counter.
fn is_snapshot_name(name: &str, file_name: &str) -> bool {
    let Some(rest) = name
        .strip_prefix(file_name)
        .and_then(|rest| rest.strip_prefix('.'))
    else {
        return false;
    };
    let (stamp, counter) = match rest.split_once('.') {
        Some((stamp, counter)) => (stamp, Some(counter)),
        None => (rest, None),
    };

    let bytes = stamp.as_bytes();
    let stamp_ok = bytes.len() == 22
        && bytes[8] == b'T'
        && bytes[21] == b'Z'
        && bytes[..8].iter().all(u8::is_ascii_digit)
        && bytes[9..21].iter().all(u8::is_ascii_digit);
    let counter_ok = counter.is_none_or(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()));
    stamp_ok && counter_ok
}

fn strip_sidecar_suffix(name: &str) -> &str {
    SIDECAR_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}

/// The production connector: a SQLite pool in rollback-journal mode, probed for locks.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl Default for SqliteConnector {
    #[inline]
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(1000),
            max_connections: 4,
        }
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    type Handle = SqlitePool;

    async fn connect(&self, path: &Path) -> Result<SqlitePool, ConnectFailure> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ConnectFailure::Other(e.into()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(self.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.busy_timeout + Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(classify)?;

        if let Err(e) = probe_write_lock(&pool).await {
            pool.close().await;
            return Err(classify(e));
        }

        if let Err(e) = MIGRATOR.run(&pool).await {
            pool.close().await;
            return Err(match e {
                MigrateError::Execute(inner) => classify(inner),
                other => ConnectFailure::Other(anyhow::Error::new(other)),
            });
        }

        debug!("Connected to store at {}", path.display());
        Ok(pool)
    }
}

/// Take and release the write lock so a held lock surfaces now, not mid-ingest.
async fn probe_write_lock(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    sqlx::query("ROLLBACK").execute(&mut *conn).await?;
    Ok(())
}

/// Sort a SQLite error into locked, corrupt or anything else.
#[inline]
pub fn classify(error: sqlx::Error) -> ConnectFailure {
    if let sqlx::Error::Database(db_error) = &error {
        let message = db_error.message().to_string();
        let primary = db_error
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| code & 0xff);

        // SQLITE_BUSY, SQLITE_LOCKED
        if matches!(primary, Some(5 | 6)) || message.contains("locked") {
            return ConnectFailure::Locked(message);
        }
        // SQLITE_CORRUPT, SQLITE_NOTADB
        if matches!(primary, Some(11 | 26))
            || message.contains("malformed")
            || message.contains("not a database")
        {
            return ConnectFailure::Corrupt(message);
        }
    }
    ConnectFailure::Other(anyhow::Error::new(error))
}
