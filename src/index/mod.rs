//! Inverted-file (IVF-flat) approximate nearest-neighbor index.
//!
//! Chunks are clustered around `sqrt(n)` k-means centroids. A query scans the
//! chunks of its `probes` nearest lists plus every chunk written after the last
//! build that has no list yet, then ranks them by exact L2 distance.


use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Sqlite, SqlitePool};
use std::cmp::Ordering;
use tracing::{debug, info};

use crate::namespace::Collection;
use crate::store::StoreManager;
use crate::store::models::{IndexRow, decode_embedding};
use crate::store::queries::{ChunkQueries, IndexQueries};
use crate::{Result, YoError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexConfig {
    /// Upper bound on the number of inverted lists
    pub max_lists: usize,
    /// Lists scanned per query
    pub probes: usize,
    pub kmeans_iterations: usize,
}

impl Default for IndexConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_lists: 256,
            probes: 8,
            kmeans_iterations: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexInfo {
    pub dimension: usize,
    pub list_count: usize,
    pub indexed_chunks: usize,
}

impl From<IndexRow> for IndexInfo {
    #[inline]
    fn from(row: IndexRow) -> Self {
        Self {
            dimension: usize::try_from(row.dimension).unwrap_or_default(),
            list_count: usize::try_from(row.list_count).unwrap_or_default(),
            indexed_chunks: usize::try_from(row.indexed_chunks).unwrap_or_default(),
        }
    }
}

/// A ranked candidate from [`search`].
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub chunk_id: i64,
    pub source: String,
    pub content: String,
    pub distance: f32,
}

/// `floor(sqrt(n))`, kept within `1..=max_lists`.
#[inline]
pub fn list_count(chunks: usize, max_lists: usize) -> usize {
    chunks.isqrt().clamp(1, max_lists.max(1))
}

#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Index of the closest centroid; the lowest index wins ties.
#[inline]
pub fn nearest_list(centroids: &[Vec<f32>], vector: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (list, centroid) in centroids.iter().enumerate() {
        let distance = l2_distance(centroid, vector);
        if best.is_none_or(|(_, closest)| distance < closest) {
            best = Some((list, distance));
        }
    }
    best.map(|(list, _)| list)
}

/// The `probes` closest centroids, closest first.
#[inline]
pub fn nearest_lists(centroids: &[Vec<f32>], vector: &[f32], probes: usize) -> Vec<usize> {
    let mut ranked: Vec<(usize, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(list, centroid)| (list, l2_distance(centroid, vector)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(probes).map(|(list, _)| list).collect()
}

/// Deterministic k-means over `vectors` in insertion order.
///
/// Seeds are evenly spaced input vectors. An emptied list keeps its previous
/// centroid. Stops early once assignments no longer change.
///
/// # Returns
/// * `(Vec<Vec<f32>>, Vec<usize>)` - Centroids and the list of every input vector
#[inline]
pub fn train(vectors: &[Vec<f32>], lists: usize, iterations: usize) -> (Vec<Vec<f32>>, Vec<usize>) {
    let n = vectors.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let lists = lists.clamp(1, n);
    let dimension = vectors[0].len();

    let mut centroids: Vec<Vec<f32>> = (0..lists).map(|i| vectors[i * n / lists].clone()).collect();
    let mut assignments = assign_all(&centroids, vectors);

    for iteration in 0..iterations {
        let mut sums = vec![vec![0.0_f32; dimension]; lists];
        let mut counts = vec![0_usize; lists];
        for (vector, &list) in vectors.iter().zip(&assignments) {
            counts[list] += 1;
            for (sum, value) in sums[list].iter_mut().zip(vector) {
                *sum += value;
            }
        }
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            if count > 0 {
                *centroid = sum.into_iter().map(|s| s / count as f32).collect();
            }
        }

        let next = assign_all(&centroids, vectors);
        if next == assignments {
            debug!("k-means converged after {} iterations", iteration + 1);
            break;
        }
        assignments = next;
    }

    (centroids, assignments)
}

fn assign_all(centroids: &[Vec<f32>], vectors: &[Vec<f32>]) -> Vec<usize> {
    vectors
        .iter()
        .map(|vector| nearest_list(centroids, vector).unwrap_or_default())
        .collect()
}

/// Build the index unless the collection already has one that still fits.
///
/// An existing index is retrained once the collection has grown enough that
/// [`list_count`] would at least double.
#[inline]
pub async fn ensure(
    store: &StoreManager,
    collection: &Collection,
    config: &IndexConfig,
) -> Result<Option<IndexInfo>> {
    let _write = store.write_section().await;
    if let Some(existing) = IndexQueries::get(store.pool(), collection.id).await? {
        let existing = IndexInfo::from(existing);
        let chunks = ChunkQueries::count(store.pool(), collection.id).await?;
        let chunks = usize::try_from(chunks).unwrap_or_default();
        if !outgrown(&existing, chunks, config) {
            return Ok(Some(existing));
        }
        debug!(
            "Index for '{}' has {} lists for {} chunks, retraining",
            collection.namespace, existing.list_count, chunks
        );
    }
    build_locked(store.pool(), collection, config).await
}

/// Whether `chunks` now call for at least twice the lists `index` was built with.
#[inline]
pub fn outgrown(index: &IndexInfo, chunks: usize, config: &IndexConfig) -> bool {
    list_count(chunks, config.max_lists) >= index.list_count.max(1) * 2
}

/// Rebuild the index from every chunk in the collection.
///
/// # Returns
/// * `Result<Option<IndexInfo>>` - `None` when the collection holds no chunks
#[inline]
pub async fn rebuild(
    store: &StoreManager,
    collection: &Collection,
    config: &IndexConfig,
) -> Result<Option<IndexInfo>> {
    let _write = store.write_section().await;
    build_locked(store.pool(), collection, config).await
}

async fn build_locked(
    pool: &SqlitePool,
    collection: &Collection,
    config: &IndexConfig,
) -> Result<Option<IndexInfo>> {
    let chunks = ChunkQueries::list_for_namespace(pool, collection.id).await?;
    if chunks.is_empty() {
        debug!("Namespace '{}' is empty, no index built", collection.namespace);
        return Ok(None);
    }

    let vectors: Vec<Vec<f32>> = chunks.iter().map(|chunk| chunk.vector()).collect();
    let dimension = vectors[0].len();
    let lists = list_count(vectors.len(), config.max_lists);
    let (centroids, assignments) = train(&vectors, lists, config.kmeans_iterations);

    let mut tx = pool.begin().await?;
    IndexQueries::clear_centroids(&mut *tx, collection.id).await?;
    IndexQueries::upsert(
        &mut *tx,
        &IndexRow {
            namespace_id: collection.id,
            dimension: dimension as i64,
            list_count: centroids.len() as i64,
            indexed_chunks: chunks.len() as i64,
            built_at: Utc::now(),
        },
    )
    .await?;
    for (list, centroid) in centroids.iter().enumerate() {
        IndexQueries::insert_centroid(&mut *tx, collection.id, list as i64, centroid).await?;
    }
    for (chunk, list) in chunks.iter().zip(&assignments) {
        ChunkQueries::assign_list(&mut *tx, chunk.id, *list as i64).await?;
    }
    tx.commit().await?;

    info!(
        "Built index for namespace '{}': {} chunks in {} lists",
        collection.namespace,
        chunks.len(),
        centroids.len()
    );
    Ok(Some(IndexInfo {
        dimension,
        list_count: centroids.len(),
        indexed_chunks: chunks.len(),
    }))
}

/// List a freshly written vector belongs to, if the collection has an index.
#[inline]
pub async fn assign_new<'e, E>(executor: E, namespace_id: i64, vector: &[f32]) -> Result<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let centroids = load_centroids(executor, namespace_id).await?;
    Ok(nearest_list(&centroids, vector).map(|list| list as i64))
}

async fn load_centroids<'e, E>(executor: E, namespace_id: i64) -> Result<Vec<Vec<f32>>>
where
    E: Executor<'e, Database = Sqlite>,
{
    Ok(IndexQueries::centroids(executor, namespace_id)
        .await?
        .into_iter()
        .map(|row| decode_embedding(&row.centroid))
        .collect())
}

/// Top `top_k` chunks by ascending L2 distance, ties broken by chunk id.
///
/// Builds the index first when the collection has none.
pub async fn search(
    store: &StoreManager,
    collection: &Collection,
    query: &[f32],
    top_k: usize,
    config: &IndexConfig,
) -> Result<Vec<Neighbor>> {
    match collection.dimension {
        Some(expected) if expected != query.len() => {
            return Err(YoError::DimensionMismatch {
                namespace: collection.namespace.clone(),
                expected,
                actual: query.len(),
            });
        }
        _ => {}
    }
    if top_k == 0 {
        return Ok(Vec::new());
    }

    let has_index = {
        let _read = store.read_section().await;
        IndexQueries::get(store.pool(), collection.id).await?.is_some()
    };
    if !has_index {
        ensure(store, collection, config).await?;
    }

    let _read = store.read_section().await;
    let pool = store.pool();
    let centroids = load_centroids(pool, collection.id).await?;
    let lists: Vec<i64> = nearest_lists(&centroids, query, config.probes)
        .into_iter()
        .map(|list| list as i64)
        .collect();
    let candidates = ChunkQueries::candidates(pool, collection.id, &lists).await?;
    debug!(
        "Scanning {} candidates from {} of {} lists in '{}'",
        candidates.len(),
        lists.len(),
        centroids.len(),
        collection.namespace
    );

    let mut ranked: Vec<Neighbor> = candidates
        .into_iter()
        .map(|chunk| {
            let distance = l2_distance(&chunk.vector(), query);
            Neighbor {
                chunk_id: chunk.id,
                source: chunk.source,
                content: chunk.content,
                distance,
            }
        })
        .collect();
    ranked.sort_by(|a, b| match a.distance.total_cmp(&b.distance) {
        Ordering::Equal => a.chunk_id.cmp(&b.chunk_id),
        other => other,
    });
    ranked.truncate(top_k);
    Ok(ranked)
}
