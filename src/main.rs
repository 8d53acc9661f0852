use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use yo_brain::commands::{
    add_documents, ask, clear_cache, compact_store, delete_namespace, list_cache,
    list_namespaces, reindex, search, show_stats, switch_namespace,
};
use yo_brain::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "yo")]
#[command(about = "A local second brain: ingest notes, then ask questions about them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and store maintenance
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest a text file or a directory of .txt/.md files
    Add {
        path: PathBuf,
        /// Target namespace (defaults to the active one)
        #[arg(long)]
        ns: Option<String>,
    },
    /// Ask a question answered from your notes
    Ask {
        question: String,
        #[arg(long)]
        ns: Option<String>,
        /// Blend in web search results
        #[arg(long)]
        web: bool,
    },
    /// Show the closest stored chunks for a query
    Search {
        query: String,
        #[arg(long)]
        ns: Option<String>,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Manage namespaces
    Ns {
        #[command(subcommand)]
        action: NsAction,
    },
    /// Inspect or clear the web result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Store maintenance
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand)]
enum NsAction {
    /// List namespaces with document and chunk counts
    List,
    /// Make a namespace the default for later commands
    Switch { name: String },
    /// Delete a namespace and its chunks
    Delete {
        name: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    List,
    Clear,
}

#[derive(Subcommand)]
enum StoreAction {
    /// Reclaim free space in the database file
    Compact,
    /// Show store size and counts
    Stats,
    /// Rebuild the search index of a namespace
    Reindex {
        #[arg(long)]
        ns: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Add { path, ns } => {
            add_documents(&path, ns).await?;
        }
        Commands::Ask { question, ns, web } => {
            ask(&question, ns, web).await?;
        }
        Commands::Search { query, ns, top_k } => {
            search(&query, ns, top_k).await?;
        }
        Commands::Ns { action } => match action {
            NsAction::List => list_namespaces().await?,
            NsAction::Switch { name } => switch_namespace(&name).await?,
            NsAction::Delete { name, yes } => delete_namespace(&name, yes).await?,
        },
        Commands::Cache { action } => match action {
            CacheAction::List => list_cache()?,
            CacheAction::Clear => clear_cache()?,
        },
        Commands::Store { action } => match action {
            StoreAction::Compact => compact_store().await?,
            StoreAction::Stats => show_stats().await?,
            StoreAction::Reindex { ns } => reindex(ns).await?,
        },
    }

    Ok(())
}
