use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ragdesk_core::config::expand_path;
use ragdesk_core::db::PgPool;
use ragdesk_core::embeddings::EmbeddingBackend;
use ragdesk_core::generator::{ChatBackend, LlamaChatClient};
use ragdesk_core::records::ChunkRepository;
use ragdesk_core::sync_bridge::NoopPublisher;
use ragdesk_core::vector_store::VectorStore;
use ragdesk_core::RagdeskConfig;
use ragdesk_ingest::IngestPipeline;
use ragdesk_server::http::{start_http_server, HttpState};
use ragdesk_server::subsystems::bootstrap::{ensure_collection, BootstrapOutcome};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "ragdesk.toml", env = "RAGDESK_CONFIG")]
    config: String,

    /// Check the configuration, vector store and database, then exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; real environment variables take precedence
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match RagdeskConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG wins, [service] log_level is the fallback
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.service.log_level)),
        )
        .init();

    let store_path = expand_path(&config.vector_store.path);
    let store = Arc::new(
        VectorStore::open(&store_path)
            .with_context(|| format!("failed to open vector store at {}", store_path.display()))?,
    );

    let pool = match &config.database {
        Some(db) => Some(ragdesk_core::db::connect(db).await.context("failed to connect to database")?),
        None => None,
    };

    if args.health {
        return run_health_check(&config, &store, pool.as_ref()).await;
    }

    // Models are loaded exactly once and shared by every request
    let embedder: Arc<dyn EmbeddingBackend> = Arc::from(
        ragdesk_core::embeddings::create_backend(&config.embedding).context("failed to load embedding model")?,
    );
    let chat: Arc<dyn ChatBackend> = Arc::new(LlamaChatClient::new(config.generator.clone()).context("failed to build LLM client")?);

    let pipeline = IngestPipeline::new(&config.ingest)?;
    let records = pool.map(|p| ChunkRepository::new(p, Arc::new(NoopPublisher)));
    let source = config.ingest.source_document.as_deref().map(expand_path);

    let outcome = ensure_collection(
        &store,
        &config.vector_store.collection,
        embedder.as_ref(),
        source.as_deref(),
        &pipeline,
        records.as_ref(),
    )
    .await?;
    match outcome {
        BootstrapOutcome::Reused { points } => {
            tracing::info!(points, "Loaded existing knowledge base");
        }
        BootstrapOutcome::Rebuilt { points } => {
            tracing::info!(points, "Rebuilt knowledge base from chunk records");
        }
        BootstrapOutcome::BulkLoaded { points, record_ids } => {
            tracing::info!(points, record_ids, "Built new knowledge base");
        }
        BootstrapOutcome::CreatedEmpty => {
            tracing::info!("Serving with an empty knowledge base");
        }
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let state = Arc::new(HttpState {
        config,
        embedder,
        chat,
        store,
    });
    start_http_server(state, tx.subscribe()).await
}

async fn run_health_check(
    config: &RagdeskConfig,
    store: &VectorStore,
    pool: Option<&PgPool>,
) -> anyhow::Result<()> {
    println!("✅ Config loaded (collection '{}')", config.vector_store.collection);

    match store.info(&config.vector_store.collection) {
        Ok(info) => println!(
            "✅ Vector store at {}: {} points, {} dimensions",
            store.root().display(),
            info.points,
            info.vector_size
        ),
        Err(e) => println!("⚠️  Vector store at {}: {}", store.root().display(), e),
    }

    match pool {
        Some(pool) => match ragdesk_core::db::health_check(pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        },
        None => println!("ℹ️  No database configured"),
    }

    println!("✅ ragdesk health check passed");
    Ok(())
}
