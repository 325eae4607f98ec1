use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docdex_core::bootstrap::{Embedders, build_indexer, build_retriever};
use docdex_core::{Config, DocIndexer, QueryHandler, ReindexService};
use docdex_index::IndexWatcher;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

#[derive(Debug, Parser)]
#[command(name = "docdex", version, about = "Hybrid code and documentation index")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, env = "DOCDEX_CONFIG", default_value = "config/docdex.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Bring the index up to date with the tracked files and exit.
    Index,
    /// Print the retrieved context for a query.
    Search { query: String },
    /// Print the prompt built for a single message.
    Prompt { message: String },
    /// Index, watch the docs dir, and turn each stdin line into a prompt.
    Run,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let embedders = Embedders::from_config(&config.embedding)?;

    let mut indexer = build_indexer(&config, &embedders)?;
    let report = indexer.index_all().await;
    indexer.persist().context("failed to write index cache")?;

    match cli.command {
        Command::Index => {
            println!(
                "indexed {} documents ({} from cache, {} failed)",
                report.indexed + report.loaded_from_cache,
                report.loaded_from_cache,
                report.failed
            );
        }
        Command::Search { query } => {
            let handler = query_handler(&config, &embedders, &indexer)?;
            println!("{}", handler.context(&query).await?);
        }
        Command::Prompt { message } => {
            let handler = query_handler(&config, &embedders, &indexer)?;
            println!("{}", handler.handle(&message).await?);
        }
        Command::Run => run(&cli.config, &config, &embedders, indexer).await?,
    }
    Ok(())
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn query_handler(
    config: &Config,
    embedders: &Embedders,
    indexer: &DocIndexer,
) -> anyhow::Result<QueryHandler<docdex_llm::AnyEmbedder>> {
    let retriever = build_retriever(config, embedders, indexer.handle())?;
    Ok(QueryHandler::new(retriever, config.prompt.clone()))
}

async fn run(
    config_path: &Path,
    config: &Config,
    embedders: &Embedders,
    indexer: DocIndexer,
) -> anyhow::Result<()> {
    let handler = query_handler(config, embedders, &indexer)?;
    let docs_root = indexer.docs_root().to_path_buf();
    let indexer = Arc::new(Mutex::new(indexer));

    let _watcher = if config.index.watch {
        let service = ReindexService::new(Arc::clone(&indexer), config_path.to_path_buf());
        match IndexWatcher::start(&docs_root, service, config.index.debounce()) {
            Ok(w) => {
                tracing::info!(root = %docs_root.display(), "index watcher started");
                Some(w)
            }
            Err(e) => {
                tracing::warn!("index watcher failed to start: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::error!("failed to listen for ctrl-c: {e:#}");
                }
                tracing::info!("received shutdown signal");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match handler.handle(&line).await {
            Ok(prompt) => println!("{prompt}"),
            Err(e) => tracing::error!("query failed: {e:#}"),
        }
    }

    // Let an in-flight batch finish before exiting.
    let _guard = indexer.lock().await;
    Ok(())
}
