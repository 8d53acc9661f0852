
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::index::{self, IndexConfig, IndexInfo};
use crate::namespace::NamespaceRegistry;
use crate::store::StoreManager;
use crate::{Result, YoError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Character budget for the assembled context block
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 3,
            max_context_chars: 4000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub source: String,
    pub text: String,
    /// L2 distance to the query; smaller is closer
    pub score: f32,
}

/// Embeds queries and runs nearest-neighbor search inside one namespace.
pub struct Retriever<'a, E: EmbeddingProvider> {
    store: &'a StoreManager,
    embedder: E,
    index: IndexConfig,
}

impl<'a, E: EmbeddingProvider> Retriever<'a, E> {
    #[inline]
    pub fn new(store: &'a StoreManager, embedder: E, config: &Config) -> Self {
        Self {
            store,
            embedder,
            index: config.index.clone(),
        }
    }

    /// Best `top_k` chunks for `query`, closest first.
    ///
    /// # Errors
    /// `NamespaceNotFound` if nothing was ever ingested into `namespace`,
    /// `EmbeddingFailure` if the query cannot be embedded.
    pub async fn search(&self, namespace: &str, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let collection = NamespaceRegistry::new(self.store)
            .lookup(namespace)
            .await?
            .into_collection(namespace)?;

        let vector = self
            .embedder
            .embed(query)
            .map_err(|e| YoError::EmbeddingFailure {
                target: format!("query '{query}'"),
                detail: format!("{e:#}"),
            })?;

        let hits: Vec<SearchHit> =
            index::search(self.store, &collection, &vector, top_k, &self.index)
                .await?
                .into_iter()
                .map(|neighbor| SearchHit {
                    chunk_id: neighbor.chunk_id,
                    source: neighbor.source,
                    text: neighbor.content,
                    score: neighbor.distance,
                })
                .collect();

        debug!(
            "Search in '{}' returned {} hits for {:?}",
            namespace,
            hits.len(),
            query
        );
        Ok(hits)
    }

    /// Throw away and rebuild the namespace's index.
    #[inline]
    pub async fn reindex(&self, namespace: &str) -> Result<Option<IndexInfo>> {
        let collection = NamespaceRegistry::new(self.store)
            .lookup(namespace)
            .await?
            .into_collection(namespace)?;
        index::rebuild(self.store, &collection, &self.index).await
    }
}
