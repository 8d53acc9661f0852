#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use sqlx::{Executor, Sqlite};

const NAMESPACE_COLUMNS: &str =
    "id, name, dimension, document_count, created_at, last_ingest_at";
const CHUNK_COLUMNS: &str = "id, namespace_id, source, chunk_index, content, embedding, list_no";

pub struct NamespaceQueries;

impl NamespaceQueries {
    #[inline]
    pub async fn create<'e, E>(executor: E, name: &str) -> Result<NamespaceRow>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, NamespaceRow>(&format!(
            "INSERT INTO namespaces (name, created_at) VALUES (?, ?) RETURNING {NAMESPACE_COLUMNS}"
        ))
        .bind(name)
        .bind(Utc::now())
        .fetch_one(executor)
        .await
        .with_context(|| format!("Failed to create namespace '{name}'"))
    }

    #[inline]
    pub async fn get_by_name<'e, E>(executor: E, name: &str) -> Result<Option<NamespaceRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, NamespaceRow>(&format!(
            "SELECT {NAMESPACE_COLUMNS} FROM namespaces WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("Failed to get namespace '{name}'"))
    }

    #[inline]
    pub async fn get_by_id<'e, E>(executor: E, id: i64) -> Result<Option<NamespaceRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, NamespaceRow>(&format!(
            "SELECT {NAMESPACE_COLUMNS} FROM namespaces WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("Failed to get namespace by id")
    }

    /// Summaries in creation order, with live chunk counts.
    #[inline]
    pub async fn list_summaries<'e, E>(executor: E) -> Result<Vec<NamespaceSummary>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, NamespaceSummary>(
            r#"
            SELECT n.name,
                   n.document_count,
                   (SELECT COUNT(*) FROM chunks c WHERE c.namespace_id = n.id) AS chunk_count,
                   n.last_ingest_at
            FROM namespaces n
            ORDER BY n.id
            "#,
        )
        .fetch_all(executor)
        .await
        .context("Failed to list namespaces")
    }

    #[inline]
    pub async fn delete<'e, E>(executor: E, name: &str) -> Result<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM namespaces WHERE name = ?")
            .bind(name)
            .execute(executor)
            .await
            .with_context(|| format!("Failed to delete namespace '{name}'"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Fix the dimension on first insert; an already set dimension is left alone.
    #[inline]
    pub async fn set_dimension<'e, E>(executor: E, id: i64, dimension: usize) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE namespaces SET dimension = ? WHERE id = ? AND dimension IS NULL")
            .bind(dimension as i64)
            .bind(id)
            .execute(executor)
            .await
            .context("Failed to set namespace dimension")?;
        Ok(())
    }

    #[inline]
    pub async fn record_ingest<'e, E>(
        executor: E,
        id: i64,
        documents: usize,
        at: DateTime<Utc>,
    ) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE namespaces SET document_count = document_count + ?, last_ingest_at = ? WHERE id = ?",
        )
        .bind(documents as i64)
        .bind(at)
        .bind(id)
        .execute(executor)
        .await
        .context("Failed to record ingest metadata")?;
        Ok(())
    }

    #[inline]
    pub async fn count<'e, E>(executor: E) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM namespaces")
            .fetch_one(executor)
            .await
            .context("Failed to count namespaces")
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    #[inline]
    pub async fn insert<'e, E>(
        executor: E,
        chunk: &NewChunk<'_>,
        list_no: Option<i64>,
    ) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = sqlx::query(
            r#"
            INSERT INTO chunks (namespace_id, source, chunk_index, content, embedding, list_no, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chunk.namespace_id)
        .bind(chunk.source)
        .bind(chunk.chunk_index as i64)
        .bind(chunk.content)
        .bind(encode_embedding(chunk.embedding))
        .bind(list_no)
        .bind(Utc::now())
        .execute(executor)
        .await
        .context("Failed to insert chunk")?
        .last_insert_rowid();

        Ok(id)
    }

    #[inline]
    pub async fn list_for_namespace<'e, E>(executor: E, namespace_id: i64) -> Result<Vec<ChunkRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, ChunkRow>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE namespace_id = ? ORDER BY id"
        ))
        .bind(namespace_id)
        .fetch_all(executor)
        .await
        .context("Failed to list chunks")
    }

    /// Chunks in the given inverted lists plus every chunk not yet assigned to one.
    #[inline]
    pub async fn candidates<'e, E>(
        executor: E,
        namespace_id: i64,
        lists: &[i64],
    ) -> Result<Vec<ChunkRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = if lists.is_empty() {
            format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks WHERE namespace_id = ? AND list_no IS NULL ORDER BY id"
            )
        } else {
            let placeholders = std::iter::repeat_n("?", lists.len()).join(", ");
            format!(
                "SELECT {CHUNK_COLUMNS} FROM chunks WHERE namespace_id = ? AND (list_no IS NULL OR list_no IN ({placeholders})) ORDER BY id"
            )
        };

        let mut query = sqlx::query_as::<_, ChunkRow>(&sql).bind(namespace_id);
        for list in lists {
            query = query.bind(*list);
        }
        query
            .fetch_all(executor)
            .await
            .context("Failed to load candidate chunks")
    }

    #[inline]
    pub async fn count<'e, E>(executor: E, namespace_id: i64) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE namespace_id = ?")
            .bind(namespace_id)
            .fetch_one(executor)
            .await
            .context("Failed to count chunks")
    }

    #[inline]
    pub async fn count_all<'e, E>(executor: E) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(executor)
            .await
            .context("Failed to count chunks")
    }

    #[inline]
    pub async fn assign_list<'e, E>(executor: E, id: i64, list_no: i64) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE chunks SET list_no = ? WHERE id = ?")
            .bind(list_no)
            .bind(id)
            .execute(executor)
            .await
            .context("Failed to assign chunk to list")?;
        Ok(())
    }
}

pub struct IndexQueries;

impl IndexQueries {
    #[inline]
    pub async fn get<'e, E>(executor: E, namespace_id: i64) -> Result<Option<IndexRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, IndexRow>(
            "SELECT namespace_id, dimension, list_count, indexed_chunks, built_at FROM ann_indexes WHERE namespace_id = ?",
        )
        .bind(namespace_id)
        .fetch_optional(executor)
        .await
        .context("Failed to get index metadata")
    }

    #[inline]
    pub async fn centroids<'e, E>(executor: E, namespace_id: i64) -> Result<Vec<CentroidRow>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, CentroidRow>(
            "SELECT list_no, centroid FROM ann_centroids WHERE namespace_id = ? ORDER BY list_no",
        )
        .bind(namespace_id)
        .fetch_all(executor)
        .await
        .context("Failed to load centroids")
    }

    #[inline]
    pub async fn upsert<'e, E>(executor: E, index: &IndexRow) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO ann_indexes (namespace_id, dimension, list_count, indexed_chunks, built_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(namespace_id) DO UPDATE SET
                dimension = excluded.dimension,
                list_count = excluded.list_count,
                indexed_chunks = excluded.indexed_chunks,
                built_at = excluded.built_at
            "#,
        )
        .bind(index.namespace_id)
        .bind(index.dimension)
        .bind(index.list_count)
        .bind(index.indexed_chunks)
        .bind(index.built_at)
        .execute(executor)
        .await
        .context("Failed to save index metadata")?;
        Ok(())
    }

    #[inline]
    pub async fn clear_centroids<'e, E>(executor: E, namespace_id: i64) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("DELETE FROM ann_centroids WHERE namespace_id = ?")
            .bind(namespace_id)
            .execute(executor)
            .await
            .context("Failed to clear centroids")?;
        Ok(())
    }

    #[inline]
    pub async fn insert_centroid<'e, E>(
        executor: E,
        namespace_id: i64,
        list_no: i64,
        centroid: &[f32],
    ) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("INSERT INTO ann_centroids (namespace_id, list_no, centroid) VALUES (?, ?, ?)")
            .bind(namespace_id)
            .bind(list_no)
            .bind(encode_embedding(centroid))
            .execute(executor)
            .await
            .context("Failed to save centroid")?;
        Ok(())
    }
}

/// Small key/value table for registry-wide settings such as the active namespace.
pub struct StateQueries;

impl StateQueries {
    #[inline]
    pub async fn get<'e, E>(executor: E, key: &str) -> Result<Option<String>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_scalar("SELECT value FROM registry_state WHERE key = ?")
            .bind(key)
            .fetch_optional(executor)
            .await
            .with_context(|| format!("Failed to read registry state '{key}'"))
    }

    #[inline]
    pub async fn set<'e, E>(executor: E, key: &str, value: &str) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO registry_state (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(executor)
        .await
        .with_context(|| format!("Failed to write registry state '{key}'"))?;
        Ok(())
    }
}
