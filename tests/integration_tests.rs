#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end flows through ingest, retrieval, answering and the web cache
// with deterministic in-process embedding and generation.

use chrono::{TimeDelta, Utc};
use std::cell::RefCell;
use tempfile::TempDir;

use yo_brain::assistant::{Assistant, Generator};
use yo_brain::cache::ContextCache;
use yo_brain::config::Config;
use yo_brain::embeddings::EmbeddingProvider;
use yo_brain::ingest::{Document, Ingestor};
use yo_brain::namespace::NamespaceRegistry;
use yo_brain::retrieval::Retriever;
use yo_brain::store::StoreManager;
use yo_brain::web::SearchProvider;
use yo_brain::YoError;

/// Hashed bag of words over 64 buckets
struct BagOfWords;

impl EmbeddingProvider for BagOfWords {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vector = vec![0.0_f32; 64];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(17_usize, |hash, b| hash.wrapping_mul(31).wrapping_add(b as usize));
            vector[bucket % 64] += 1.0;
        }
        Ok(vector)
    }
}

/// Records every prompt and answers with a fixed line
#[derive(Default)]
struct RecordingGenerator {
    prompts: RefCell<Vec<String>>,
}

impl Generator for RecordingGenerator {
    fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        Ok("Yo remembers your notes.".to_string())
    }
}

struct FixedSearch(Vec<String>);

impl SearchProvider for FixedSearch {
    fn fetch(&self, _query: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Create a configuration rooted in a temporary data directory
async fn create_test_setup() -> anyhow::Result<(Config, StoreManager, TempDir)> {
    let temp_dir = TempDir::new()?;
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    let store = StoreManager::open_from_config(&config).await?;
    Ok((config, store, temp_dir))
}

#[tokio::test]
async fn ingest_then_search_round_trip() -> anyhow::Result<()> {
    let (config, store, _temp_dir) = create_test_setup().await?;

    let report = Ingestor::new(&store, BagOfWords, &config)
        .ingest(
            "default",
            &[Document::new("yo.txt", "Yo is a local second brain.")],
        )
        .await?;
    assert_eq!(report.chunks_written, 1);

    let hits = Retriever::new(&store, BagOfWords, &config)
        .search("default", "What does Yo do?", 1)
        .await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "Yo is a local second brain.");
    assert_eq!(hits[0].source, "yo.txt");

    let summaries = NamespaceRegistry::new(&store).list().await?;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "default");
    assert_eq!(summaries[0].chunk_count, 1);
    Ok(())
}

#[tokio::test]
async fn namespaces_are_isolated() -> anyhow::Result<()> {
    let (config, store, _temp_dir) = create_test_setup().await?;
    let ingestor = Ingestor::new(&store, BagOfWords, &config);
    ingestor
        .ingest("work", &[Document::new("work.txt", "Quarterly planning notes")])
        .await?;
    ingestor
        .ingest("home", &[Document::new("home.txt", "Garden watering schedule")])
        .await?;

    let retriever = Retriever::new(&store, BagOfWords, &config);
    let work = retriever.search("work", "garden watering", 10).await?;
    assert_eq!(work.len(), 1);
    assert_eq!(work[0].source, "work.txt");

    let registry = NamespaceRegistry::new(&store);
    registry.switch("home").await?;
    registry.delete("home").await?;
    assert!(matches!(
        retriever.search("home", "garden", 3).await,
        Err(YoError::NamespaceNotFound(_))
    ));
    assert_eq!(registry.active().await?, "work");
    assert_eq!(retriever.search("work", "planning", 3).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn data_survives_reopen() -> anyhow::Result<()> {
    let (config, store, _temp_dir) = create_test_setup().await?;
    Ingestor::new(&store, BagOfWords, &config)
        .ingest("default", &[Document::new("a.txt", "Persistent memory")])
        .await?;
    store.close().await;

    let reopened = StoreManager::open_from_config(&config).await?;
    assert!(!reopened.open_outcome().recovered());
    let hits = Retriever::new(&reopened, BagOfWords, &config)
        .search("default", "memory", 3)
        .await?;
    assert_eq!(hits.len(), 1);
    Ok(())
}

#[tokio::test]
async fn ask_uses_memory_and_caches_web_snippets() -> anyhow::Result<()> {
    let (config, store, _temp_dir) = create_test_setup().await?;
    Ingestor::new(&store, BagOfWords, &config)
        .ingest(
            "default",
            &[Document::new("yo.txt", "Yo is a local second brain.")],
        )
        .await?;
    let generator = RecordingGenerator::default();
    let assistant = Assistant::new(&store, BagOfWords, &generator, &config);
    let web = FixedSearch(vec!["Second brains store notes.".to_string()]);

    let first = assistant
        .ask("default", "What does Yo do?", Some(&web))
        .await?;
    let second = assistant
        .ask("default", "  what does yo do?  ", Some(&web))
        .await?;

    assert_eq!(first.text, "Yo remembers your notes.");
    assert!(!first.web_from_cache);
    assert!(second.web_from_cache);
    assert!(first.context.starts_with("Memory Results:\nYo is a local second brain."));
    assert!(first.context.contains("Web Results:\nSecond brains store notes."));
    let prompts = generator.prompts.borrow();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].ends_with("Question: What does Yo do?\nAnswer:"));

    let cached = ContextCache::from_config(&config).list();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].query, "what does yo do?");
    Ok(())
}

#[test]
fn cache_entries_expire_after_ttl() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("web_cache.json");
    let cache = ContextCache::new(&path, TimeDelta::hours(24));
    let stored_at = Utc::now() - TimeDelta::hours(30);

    cache.put_at("rust ownership", vec!["Borrowing rules".to_string()], stored_at)?;

    let reloaded = ContextCache::new(&path, TimeDelta::hours(24));
    assert_eq!(
        reloaded.get_at("Rust Ownership", stored_at + TimeDelta::hours(1)),
        Some(vec!["Borrowing rules".to_string()])
    );
    assert_eq!(reloaded.get("rust ownership"), None);
    let listed = reloaded.list();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].stale);
    assert_eq!(reloaded.clear()?, 1);
    assert!(reloaded.list().is_empty());
    Ok(())
}
