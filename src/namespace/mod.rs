#[cfg(test)]
mod tests;

use tracing::{debug, info};

use crate::store::StoreManager;
use crate::store::models::{NamespaceRow, NamespaceSummary};
use crate::store::queries::{NamespaceQueries, StateQueries};
use crate::{Result, YoError};

pub const DEFAULT_NAMESPACE: &str = "default";
const ACTIVE_NAMESPACE_KEY: &str = "active_namespace";
const MAX_NAME_LEN: usize = 64;

/// The persisted chunks of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: i64,
    pub namespace: String,
    /// Fixed by the first chunk written; `None` while the collection is empty
    pub dimension: Option<usize>,
}

impl From<NamespaceRow> for Collection {
    #[inline]
    fn from(row: NamespaceRow) -> Self {
        Self {
            id: row.id,
            namespace: row.name,
            dimension: row.dimension.and_then(|d| usize::try_from(d).ok()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceLookup {
    Found(Collection),
    NotFound,
}

impl NamespaceLookup {
    #[inline]
    pub fn into_collection(self, name: &str) -> Result<Collection> {
        match self {
            Self::Found(collection) => Ok(collection),
            Self::NotFound => Err(YoError::NamespaceNotFound(name.to_string())),
        }
    }
}

/// Check a namespace name: 1-64 characters from `[A-Za-z0-9_-]`.
#[inline]
pub fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(YoError::InvalidNamespace(name.to_string()))
    }
}

/// Which namespaces exist, what they hold, and which one is active.
#[derive(Debug, Clone, Copy)]
pub struct NamespaceRegistry<'a> {
    store: &'a StoreManager,
}

impl<'a> NamespaceRegistry<'a> {
    #[inline]
    pub fn new(store: &'a StoreManager) -> Self {
        Self { store }
    }

    #[inline]
    pub async fn list(&self) -> Result<Vec<NamespaceSummary>> {
        let _read = self.store.read_section().await;
        Ok(NamespaceQueries::list_summaries(self.store.pool()).await?)
    }

    #[inline]
    pub async fn lookup(&self, name: &str) -> Result<NamespaceLookup> {
        let _read = self.store.read_section().await;
        let row = NamespaceQueries::get_by_name(self.store.pool(), name).await?;
        Ok(row.map_or(NamespaceLookup::NotFound, |row| {
            NamespaceLookup::Found(row.into())
        }))
    }

    /// Create the namespace if needed and return its collection.
    pub async fn ensure(&self, name: &str) -> Result<Collection> {
        validate_name(name)?;
        let _write = self.store.write_section().await;

        if let Some(row) = NamespaceQueries::get_by_name(self.store.pool(), name).await? {
            return Ok(row.into());
        }
        let row = NamespaceQueries::create(self.store.pool(), name).await?;
        info!("Created namespace '{}'", name);
        Ok(row.into())
    }

    /// Delete a namespace with its chunks and index.
    ///
    /// If it was the active namespace, `default` becomes active when it still exists,
    /// otherwise the oldest remaining namespace, otherwise `default`.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let _write = self.store.write_section().await;
        let pool = self.store.pool();

        if !NamespaceQueries::delete(pool, name).await? {
            return Err(YoError::NamespaceNotFound(name.to_string()));
        }
        info!("Deleted namespace '{}'", name);

        let active = StateQueries::get(pool, ACTIVE_NAMESPACE_KEY).await?;
        if active.as_deref() == Some(name) {
            let remaining = NamespaceQueries::list_summaries(pool).await?;
            let fallback = remaining
                .iter()
                .find(|ns| ns.name == DEFAULT_NAMESPACE)
                .or_else(|| remaining.first())
                .map_or(DEFAULT_NAMESPACE, |ns| ns.name.as_str());
            StateQueries::set(pool, ACTIVE_NAMESPACE_KEY, fallback).await?;
            debug!("Active namespace fell back to '{}'", fallback);
        }
        Ok(())
    }

    /// The namespace commands use when none is given.
    #[inline]
    pub async fn active(&self) -> Result<String> {
        let _read = self.store.read_section().await;
        Ok(StateQueries::get(self.store.pool(), ACTIVE_NAMESPACE_KEY)
            .await?
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()))
    }

    /// Make an existing namespace the active one.
    #[inline]
    pub async fn switch(&self, name: &str) -> Result<()> {
        let _write = self.store.write_section().await;
        if NamespaceQueries::get_by_name(self.store.pool(), name)
            .await?
            .is_none()
        {
            return Err(YoError::NamespaceNotFound(name.to_string()));
        }
        StateQueries::set(self.store.pool(), ACTIVE_NAMESPACE_KEY, name).await?;
        info!("Switched active namespace to '{}'", name);
        Ok(())
    }
}
