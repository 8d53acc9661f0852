use anyhow::{Context, Result};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::assistant::Assistant;
use crate::cache::ContextCache;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::ingest::{Ingestor, load_documents};
use crate::namespace::NamespaceRegistry;
use crate::retrieval::Retriever;
use crate::store::StoreManager;
use crate::web::{DuckDuckGoClient, SearchProvider};

async fn open_store(config: &Config) -> Result<StoreManager> {
    let store = StoreManager::open_from_config(config)
        .await
        .context("Failed to open store")?;

    let outcome = store.open_outcome();
    if let Some(snapshot) = &outcome.snapshot {
        println!("⚠️  Store was unusable and has been replaced with a fresh one.");
        println!("   Previous file saved as {}", snapshot.display());
    }
    for pruned in &outcome.pruned {
        info!("Pruned old recovery snapshot {}", pruned.display());
    }
    Ok(store)
}

/// Explicit name, then `YO_NAMESPACE`, then the persisted active namespace.
async fn resolve_namespace(
    config: &Config,
    store: &StoreManager,
    explicit: Option<String>,
) -> Result<String> {
    if let Some(namespace) = explicit.or_else(|| config.namespace_override.clone()) {
        return Ok(namespace);
    }
    Ok(NamespaceRegistry::new(store).active().await?)
}

fn spinner(message: String) -> Result<ProgressBar> {
    if !console::user_attended_stderr() {
        return Ok(ProgressBar::hidden());
    }
    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")?)
        .with_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    Ok(bar)
}

/// Ingest a text file or a directory of `.txt`/`.md` files
#[inline]
pub async fn add_documents(path: &Path, namespace: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let documents = load_documents(path)
        .with_context(|| format!("Failed to read documents from {}", path.display()))?;
    if documents.is_empty() {
        println!("No text documents found at {}", path.display());
        return Ok(());
    }

    let store = open_store(&config).await?;
    let namespace = resolve_namespace(&config, &store, namespace).await?;
    let client = OllamaClient::new(&config.ollama)?;

    let bar = spinner(format!(
        "Ingesting {} documents into '{}'",
        documents.len(),
        namespace
    ))?;
    let result = Ingestor::new(&store, &client, &config)
        .ingest(&namespace, &documents)
        .await;
    bar.finish_and_clear();
    let report = result.context("Ingestion failed")?;

    println!(
        "✅ Stored {} chunks from {} documents in '{}' ({:.1}s)",
        report.chunks_written,
        report.documents,
        report.namespace,
        report.duration.as_secs_f64()
    );
    if !report.failures.is_empty() {
        println!("⚠️  {} chunks were skipped:", report.failures.len());
        for failure in &report.failures {
            println!(
                "   {} chunk {}: {}",
                failure.source, failure.chunk_index, failure.error
            );
        }
    }
    match (&report.compaction, &report.compaction_error) {
        (Some(compaction), _) if compaction.performed => println!(
            "🧹 Compacted store: {} -> {} bytes",
            compaction.before, compaction.after
        ),
        (_, Some(error)) => println!("⚠️  Compaction failed: {}", error),
        _ => {}
    }

    store.close().await;
    Ok(())
}

/// Answer a question from memory, optionally with web context
#[inline]
pub async fn ask(question: &str, namespace: Option<String>, web: bool) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;
    let namespace = resolve_namespace(&config, &store, namespace).await?;
    let client = OllamaClient::new(&config.ollama)?;

    let search = if web {
        Some(DuckDuckGoClient::new(&config.web)?)
    } else {
        None
    };

    let bar = spinner("Thinking".to_string())?;
    let result = Assistant::new(&store, &client, &client, &config)
        .ask(
            &namespace,
            question,
            search.as_ref().map(|client| client as &dyn SearchProvider),
        )
        .await;
    bar.finish_and_clear();
    let answer = result.context("Failed to answer question")?;

    println!("{}", answer.text);
    println!();
    if answer.hits.is_empty() {
        println!("📭 No memories matched in '{}'", namespace);
    } else {
        println!("📚 Sources from '{}':", namespace);
        for hit in &answer.hits {
            println!("   {} (distance {:.4})", hit.source, hit.score);
        }
    }
    if let Some(snippets) = &answer.web_snippets {
        let origin = if answer.web_from_cache { "cache" } else { "web" };
        println!("🌐 {} web snippets ({})", snippets.len(), origin);
    }

    store.close().await;
    Ok(())
}

/// Show the closest chunks for a query without generating an answer
#[inline]
pub async fn search(query: &str, namespace: Option<String>, top_k: Option<usize>) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;
    let namespace = resolve_namespace(&config, &store, namespace).await?;
    let client = OllamaClient::new(&config.ollama)?;
    let top_k = top_k.unwrap_or(config.retrieval.top_k);

    let hits = Retriever::new(&store, &client, &config)
        .search(&namespace, query, top_k)
        .await
        .context("Search failed")?;

    if hits.is_empty() {
        println!("No results in '{}'", namespace);
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} (distance {:.4}, chunk {})",
            rank + 1,
            hit.source,
            hit.score,
            hit.chunk_id
        );
        println!("   {}", hit.text.replace('\n', " "));
        println!();
    }

    store.close().await;
    Ok(())
}

#[inline]
pub async fn list_namespaces() -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;
    let registry = NamespaceRegistry::new(&store);
    let active = registry.active().await?;
    let summaries = registry.list().await?;

    if summaries.is_empty() {
        println!("No namespaces yet.");
        println!("Use 'yo add <path>' to ingest some notes.");
        store.close().await;
        return Ok(());
    }

    println!("Namespaces ({} total):", summaries.len());
    println!();
    for summary in &summaries {
        let marker = if summary.name == active { "*" } else { " " };
        println!("{} 🗂️  {}", marker, summary.name);
        println!("     Documents: {}", summary.document_count);
        println!("     Chunks: {}", summary.chunk_count);
        match summary.last_ingest_at {
            Some(at) => println!("     Last Ingest: {}", at.format("%Y-%m-%d %H:%M:%S")),
            None => println!("     Last Ingest: never"),
        }
    }

    store.close().await;
    Ok(())
}

#[inline]
pub async fn switch_namespace(name: &str) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;
    NamespaceRegistry::new(&store).switch(name).await?;
    println!("✅ Active namespace is now '{}'", name);
    if config.namespace_override.is_some() {
        warn!("YO_NAMESPACE is set and takes precedence over the active namespace");
    }
    store.close().await;
    Ok(())
}

/// Delete a namespace and everything stored in it
#[inline]
pub async fn delete_namespace(name: &str, yes: bool) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;
    let registry = NamespaceRegistry::new(&store);

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete namespace '{}' and all of its chunks? This cannot be undone.",
                name
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            store.close().await;
            return Ok(());
        }
    }

    registry.delete(name).await?;
    println!("🗑️  Deleted namespace '{}'", name);
    println!("   Active namespace: {}", registry.active().await?);

    store.close().await;
    Ok(())
}

#[inline]
pub fn list_cache() -> Result<()> {
    let config = Config::load()?;
    let cache = ContextCache::from_config(&config);
    let entries = cache.list();

    if entries.is_empty() {
        println!("Web cache is empty ({})", cache.path().display());
        return Ok(());
    }

    println!("Cached web queries ({} total):", entries.len());
    for entry in &entries {
        let status = if entry.stale { "stale" } else { "fresh" };
        println!(
            "   {} [{}, {}h old]",
            entry.query,
            status,
            entry.age.num_hours()
        );
    }
    Ok(())
}

#[inline]
pub fn clear_cache() -> Result<()> {
    let config = Config::load()?;
    let removed = ContextCache::from_config(&config).clear()?;
    println!("🧹 Removed {} cached web queries", removed);
    Ok(())
}

#[inline]
pub async fn compact_store() -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;
    let report = store.compact().await.context("Compaction failed")?;
    println!(
        "🧹 Compacted {}: {} -> {} bytes ({} reclaimed)",
        store.path().display(),
        report.before,
        report.after,
        report.reclaimed()
    );
    store.close().await;
    Ok(())
}

#[inline]
pub async fn show_stats() -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;
    let stats = store.stats().await?;

    println!("📊 Store Status");
    println!("{}", "=".repeat(40));
    println!("   Path: {}", stats.path.display());
    println!("   Size: {} bytes", stats.file_size);
    println!("   Namespaces: {}", stats.namespaces);
    println!("   Chunks: {}", stats.chunks);
    println!("   Recovery Dir: {}", store.recovery_dir().display());
    println!(
        "   Compaction Threshold: {} bytes",
        config.store.compaction_threshold_bytes
    );

    store.close().await;
    Ok(())
}

/// Rebuild the nearest-neighbor index of a namespace
#[inline]
pub async fn reindex(namespace: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;
    let namespace = resolve_namespace(&config, &store, namespace).await?;
    let client = OllamaClient::new(&config.ollama)?;

    match Retriever::new(&store, &client, &config)
        .reindex(&namespace)
        .await?
    {
        Some(info) => println!(
            "✅ Rebuilt index for '{}': {} chunks in {} lists",
            namespace, info.indexed_chunks, info.list_count
        ),
        None => println!("Namespace '{}' has no chunks to index", namespace),
    }

    store.close().await;
    Ok(())
}
