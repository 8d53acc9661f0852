
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NamespaceRow {
    pub id: i64,
    pub name: String,
    pub dimension: Option<i64>,
    pub document_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_ingest_at: Option<DateTime<Utc>>,
}

/// Registry view of a namespace, as printed by `yo ns list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NamespaceSummary {
    pub name: String,
    pub document_count: i64,
    pub chunk_count: i64,
    pub last_ingest_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ChunkRow {
    pub id: i64,
    pub namespace_id: i64,
    pub source: String,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<u8>,
    pub list_no: Option<i64>,
}

impl ChunkRow {
    #[inline]
    pub fn vector(&self) -> Vec<f32> {
        decode_embedding(&self.embedding)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk<'a> {
    pub namespace_id: i64,
    pub source: &'a str,
    pub chunk_index: usize,
    pub content: &'a str,
    pub embedding: &'a [f32],
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct IndexRow {
    pub namespace_id: i64,
    pub dimension: i64,
    pub list_count: i64,
    pub indexed_chunks: i64,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CentroidRow {
    pub list_no: i64,
    pub centroid: Vec<u8>,
}

/// Little-endian f32 encoding used for embedding and centroid BLOBs.
#[inline]
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

#[inline]
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        .collect()
}
