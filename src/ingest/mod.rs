
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;
use crate::embeddings::chunking::ChunkingConfig;
use crate::index::{self, IndexConfig};
use crate::namespace::{Collection, NamespaceRegistry};
use crate::store::models::NewChunk;
use crate::store::queries::{ChunkQueries, NamespaceQueries};
use crate::store::{CompactionReport, StoreManager};
use crate::{Result, YoError};

/// Plain text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub text: String,
}

impl Document {
    #[inline]
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// One chunk that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub source: String,
    pub chunk_index: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub namespace: String,
    pub documents: usize,
    pub chunks_written: usize,
    pub failures: Vec<ChunkFailure>,
    pub duration: Duration,
    pub compaction: Option<CompactionReport>,
    pub compaction_error: Option<String>,
}

/// Chunks, embeds and stores documents in a namespace.
pub struct Ingestor<'a, E: EmbeddingProvider> {
    store: &'a StoreManager,
    embedder: E,
    chunking: ChunkingConfig,
    index: IndexConfig,
    compaction_threshold: u64,
}

impl<'a, E: EmbeddingProvider> Ingestor<'a, E> {
    #[inline]
    pub fn new(store: &'a StoreManager, embedder: E, config: &Config) -> Self {
        Self {
            store,
            embedder,
            chunking: config.chunking.clone(),
            index: config.index.clone(),
            compaction_threshold: config.store.compaction_threshold_bytes,
        }
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    pub fn with_compaction_threshold(mut self, threshold_bytes: u64) -> Self {
        self.compaction_threshold = threshold_bytes;
        self
    }

    /// Ingest `documents` into `namespace`, creating it on first use.
    ///
    /// Every chunk is written on its own, so an interrupted run keeps what it
    /// already stored. Chunks whose embedding fails or has the wrong dimension
    /// are listed in the report and skipped. Afterwards the namespace metadata
    /// is updated, the index is built if missing, and the store is compacted
    /// when it has outgrown the threshold.
    ///
    /// # Returns
    /// * `Result<IngestReport>` - Counts, per-chunk failures and compaction outcome
    pub async fn ingest(&self, namespace: &str, documents: &[Document]) -> Result<IngestReport> {
        let started = Instant::now();
        let collection = NamespaceRegistry::new(self.store).ensure(namespace).await?;

        let mut chunks_written = 0;
        let mut documents_written = 0;
        let mut failures = Vec::new();

        for document in documents {
            let mut written_here = 0;
            for (chunk_index, text) in self.chunking.chunks(&document.text)?.enumerate() {
                match self.write_chunk(&collection, document, chunk_index, text).await {
                    Ok(id) => {
                        debug!("Stored chunk {} of {} as {}", chunk_index, document.source, id);
                        written_here += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Skipping chunk {} of {}: {}",
                            chunk_index, document.source, e
                        );
                        failures.push(ChunkFailure {
                            source: document.source.clone(),
                            chunk_index,
                            error: e.to_string(),
                        });
                    }
                }
            }
            if written_here > 0 {
                documents_written += 1;
            }
            chunks_written += written_here;
        }

        {
            let _write = self.store.write_section().await;
            NamespaceQueries::record_ingest(
                self.store.pool(),
                collection.id,
                documents_written,
                Utc::now(),
            )
            .await?;
        }
        index::ensure(self.store, &collection, &self.index).await?;

        let (compaction, compaction_error) =
            match self.store.maybe_compact(self.compaction_threshold).await {
                Ok(report) => (Some(report), None),
                Err(e) => {
                    warn!("Compaction after ingest failed: {}", e);
                    (None, Some(e.to_string()))
                }
            };

        let report = IngestReport {
            namespace: collection.namespace,
            documents: documents_written,
            chunks_written,
            failures,
            duration: started.elapsed(),
            compaction,
            compaction_error,
        };
        info!(
            "Ingested {} chunks from {} documents into '{}' ({} skipped) in {:?}",
            report.chunks_written,
            report.documents,
            report.namespace,
            report.failures.len(),
            report.duration
        );
        Ok(report)
    }

    async fn write_chunk(
        &self,
        collection: &Collection,
        document: &Document,
        chunk_index: usize,
        text: &str,
    ) -> Result<i64> {
        let embedding = self
            .embedder
            .embed(text)
            .map_err(|e| YoError::EmbeddingFailure {
                target: format!("{} chunk {}", document.source, chunk_index),
                detail: format!("{e:#}"),
            })?;
        if embedding.is_empty() {
            return Err(YoError::EmbeddingFailure {
                target: format!("{} chunk {}", document.source, chunk_index),
                detail: "empty embedding".to_string(),
            });
        }

        let _write = self.store.write_section().await;
        let mut tx = self.store.pool().begin().await?;

        let row = NamespaceQueries::get_by_id(&mut *tx, collection.id)
            .await?
            .ok_or_else(|| YoError::NamespaceNotFound(collection.namespace.clone()))?;
        match row.dimension {
            Some(expected) if expected as usize != embedding.len() => {
                return Err(YoError::DimensionMismatch {
                    namespace: collection.namespace.clone(),
                    expected: expected as usize,
                    actual: embedding.len(),
                });
            }
            Some(_) => {}
            None => NamespaceQueries::set_dimension(&mut *tx, collection.id, embedding.len()).await?,
        }

        let list_no = index::assign_new(&mut *tx, collection.id, &embedding).await?;
        let id = ChunkQueries::insert(
            &mut *tx,
            &NewChunk {
                namespace_id: collection.id,
                source: &document.source,
                chunk_index,
                content: text,
                embedding: &embedding,
            },
            list_no,
        )
        .await?;
        tx.commit().await?;
        Ok(id)
    }
}

const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// Read a text file, or every `.txt`/`.md` file under a directory, as documents.
///
/// Directory entries are visited in path order. Empty files are skipped.
#[inline]
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let mut files = Vec::new();
    if path.is_dir() {
        collect_text_files(path, &mut files)?;
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let text = fs::read_to_string(&file)?;
        if text.trim().is_empty() {
            debug!("Skipping empty file {}", file.display());
            continue;
        }
        documents.push(Document::new(file.display().to_string(), text));
    }
    Ok(documents)
}

fn collect_text_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_text_files(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        {
            files.push(path);
        }
    }
    Ok(())
}
