use super::*;
use crate::store::{StoreConfig, StoreManager};
use tempfile::TempDir;

async fn create_test_store() -> Result<(TempDir, StoreManager)> {
    let temp_dir = TempDir::new()?;
    let store = StoreManager::open(temp_dir.path().join("yo.db"), &StoreConfig::default()).await?;
    Ok((temp_dir, store))
}

fn chunk<'a>(namespace_id: i64, content: &'a str, embedding: &'a [f32]) -> NewChunk<'a> {
    NewChunk {
        namespace_id,
        source: "notes.txt",
        chunk_index: 0,
        content,
        embedding,
    }
}

#[tokio::test]
async fn namespace_crud() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let pool = store.pool();

    let created = NamespaceQueries::create(pool, "research").await?;
    assert_eq!(created.name, "research");
    assert_eq!(created.dimension, None);
    assert_eq!(created.document_count, 0);

    let fetched = NamespaceQueries::get_by_name(pool, "research").await?;
    assert_eq!(fetched, Some(created.clone()));
    assert_eq!(
        NamespaceQueries::get_by_id(pool, created.id).await?,
        Some(created)
    );

    assert!(NamespaceQueries::create(pool, "research").await.is_err());
    assert!(NamespaceQueries::delete(pool, "research").await?);
    assert!(!NamespaceQueries::delete(pool, "research").await?);
    assert_eq!(NamespaceQueries::count(pool).await?, 0);
    Ok(())
}

#[tokio::test]
async fn dimension_is_only_set_once() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let pool = store.pool();
    let namespace = NamespaceQueries::create(pool, "default").await?;

    NamespaceQueries::set_dimension(pool, namespace.id, 3).await?;
    NamespaceQueries::set_dimension(pool, namespace.id, 5).await?;

    let row = NamespaceQueries::get_by_id(pool, namespace.id)
        .await?
        .expect("namespace exists");
    assert_eq!(row.dimension, Some(3));
    Ok(())
}

#[tokio::test]
async fn summaries_count_chunks_in_creation_order() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let pool = store.pool();
    let zeta = NamespaceQueries::create(pool, "zeta").await?;
    let alpha = NamespaceQueries::create(pool, "alpha").await?;

    ChunkQueries::insert(pool, &chunk(zeta.id, "one", &[1.0]), None).await?;
    ChunkQueries::insert(pool, &chunk(zeta.id, "two", &[2.0]), None).await?;
    NamespaceQueries::record_ingest(pool, zeta.id, 1, Utc::now()).await?;

    let summaries = NamespaceQueries::list_summaries(pool).await?;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].name, "zeta");
    assert_eq!(summaries[0].chunk_count, 2);
    assert_eq!(summaries[0].document_count, 1);
    assert!(summaries[0].last_ingest_at.is_some());
    assert_eq!(summaries[1].name, "alpha");
    assert_eq!(summaries[1].chunk_count, 0);
    assert!(summaries[1].last_ingest_at.is_none());
    assert_eq!(ChunkQueries::count(pool, alpha.id).await?, 0);
    Ok(())
}

#[tokio::test]
async fn candidates_include_unassigned_chunks() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let pool = store.pool();
    let namespace = NamespaceQueries::create(pool, "default").await?;

    let in_zero = ChunkQueries::insert(pool, &chunk(namespace.id, "a", &[0.0]), Some(0)).await?;
    let in_one = ChunkQueries::insert(pool, &chunk(namespace.id, "b", &[1.0]), Some(1)).await?;
    let loose = ChunkQueries::insert(pool, &chunk(namespace.id, "c", &[2.0]), None).await?;

    let ids = |rows: Vec<ChunkRow>| rows.into_iter().map(|row| row.id).collect::<Vec<_>>();
    assert_eq!(
        ids(ChunkQueries::candidates(pool, namespace.id, &[1]).await?),
        vec![in_one, loose]
    );
    assert_eq!(
        ids(ChunkQueries::candidates(pool, namespace.id, &[]).await?),
        vec![loose]
    );

    ChunkQueries::assign_list(pool, loose, 0).await?;
    assert_eq!(
        ids(ChunkQueries::candidates(pool, namespace.id, &[0]).await?),
        vec![in_zero, loose]
    );
    Ok(())
}

#[tokio::test]
async fn deleting_namespace_cascades() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let pool = store.pool();
    let namespace = NamespaceQueries::create(pool, "gone").await?;
    ChunkQueries::insert(pool, &chunk(namespace.id, "x", &[1.0, 2.0]), None).await?;
    IndexQueries::upsert(
        pool,
        &IndexRow {
            namespace_id: namespace.id,
            dimension: 2,
            list_count: 1,
            indexed_chunks: 1,
            built_at: Utc::now(),
        },
    )
    .await?;
    IndexQueries::insert_centroid(pool, namespace.id, 0, &[1.0, 2.0]).await?;

    NamespaceQueries::delete(pool, "gone").await?;

    assert_eq!(ChunkQueries::count_all(pool).await?, 0);
    assert!(IndexQueries::get(pool, namespace.id).await?.is_none());
    assert!(IndexQueries::centroids(pool, namespace.id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn registry_state_upserts() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let pool = store.pool();

    assert_eq!(StateQueries::get(pool, "active_namespace").await?, None);
    StateQueries::set(pool, "active_namespace", "default").await?;
    StateQueries::set(pool, "active_namespace", "research").await?;
    assert_eq!(
        StateQueries::get(pool, "active_namespace").await?.as_deref(),
        Some("research")
    );
    Ok(())
}
