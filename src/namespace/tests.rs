use super::*;
use crate::store::StoreConfig;
use anyhow::Result;
use tempfile::TempDir;

async fn create_test_store() -> Result<(TempDir, StoreManager)> {
    let temp_dir = TempDir::new()?;
    let store = StoreManager::open(temp_dir.path().join("yo.db"), &StoreConfig::default()).await?;
    Ok((temp_dir, store))
}

#[test]
fn name_validation() {
    assert!(validate_name("default").is_ok());
    assert!(validate_name("work_notes-2026").is_ok());
    assert!(validate_name(&"a".repeat(64)).is_ok());

    assert!(matches!(validate_name(""), Err(YoError::InvalidNamespace(_))));
    assert!(validate_name(&"a".repeat(65)).is_err());
    assert!(validate_name("has space").is_err());
    assert!(validate_name("dots.not.allowed").is_err());
    assert!(validate_name("ünïcode").is_err());
}

#[tokio::test]
async fn lookup_is_typed() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let registry = NamespaceRegistry::new(&store);

    assert_eq!(registry.lookup("default").await?, NamespaceLookup::NotFound);
    assert!(matches!(
        registry
            .lookup("default")
            .await?
            .into_collection("default"),
        Err(YoError::NamespaceNotFound(name)) if name == "default"
    ));

    let created = registry.ensure("default").await?;
    assert_eq!(
        registry.lookup("default").await?,
        NamespaceLookup::Found(created)
    );
    Ok(())
}

#[tokio::test]
async fn ensure_is_idempotent() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let registry = NamespaceRegistry::new(&store);

    let first = registry.ensure("research").await?;
    let second = registry.ensure("research").await?;

    assert_eq!(first, second);
    assert_eq!(first.dimension, None);
    assert_eq!(registry.list().await?.len(), 1);
    assert!(matches!(
        registry.ensure("bad name").await,
        Err(YoError::InvalidNamespace(_))
    ));
    Ok(())
}

#[tokio::test]
async fn list_is_in_creation_order() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let registry = NamespaceRegistry::new(&store);

    for name in ["work", "archive", "default"] {
        registry.ensure(name).await?;
    }

    let names: Vec<String> = registry
        .list()
        .await?
        .into_iter()
        .map(|ns| ns.name)
        .collect();
    assert_eq!(names, vec!["work", "archive", "default"]);
    Ok(())
}

#[tokio::test]
async fn delete_missing_namespace_fails() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let registry = NamespaceRegistry::new(&store);

    assert!(matches!(
        registry.delete("ghost").await,
        Err(YoError::NamespaceNotFound(name)) if name == "ghost"
    ));
    Ok(())
}

#[tokio::test]
async fn switch_requires_existing_namespace() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let registry = NamespaceRegistry::new(&store);

    assert_eq!(registry.active().await?, DEFAULT_NAMESPACE);
    assert!(registry.switch("work").await.is_err());

    registry.ensure("work").await?;
    registry.switch("work").await?;
    assert_eq!(registry.active().await?, "work");
    Ok(())
}

#[tokio::test]
async fn deleting_active_namespace_falls_back() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let registry = NamespaceRegistry::new(&store);
    for name in ["work", "default", "archive"] {
        registry.ensure(name).await?;
    }

    registry.switch("work").await?;
    registry.delete("work").await?;
    assert_eq!(registry.active().await?, "default");

    registry.switch("archive").await?;
    registry.delete("default").await?;
    assert_eq!(registry.active().await?, "archive");

    registry.delete("archive").await?;
    assert_eq!(registry.active().await?, DEFAULT_NAMESPACE);
    assert!(registry.list().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn deleting_inactive_namespace_keeps_active() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;
    let registry = NamespaceRegistry::new(&store);
    registry.ensure("work").await?;
    registry.ensure("scratch").await?;
    registry.switch("work").await?;

    registry.delete("scratch").await?;

    assert_eq!(registry.active().await?, "work");
    Ok(())
}
