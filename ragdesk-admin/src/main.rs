//! ragdesk-admin — operator CLI for the authoritative chunk records
//!
//! Every chunk mutation made here goes through `ChunkRepository`, which fires
//! the sync bridge so the server's vector index follows the records.
//!
//! # Subcommands
//! - `upload <file>`                       — ingest a PDF/DOCX into chunk records
//! - `chunks list [--limit] [--offset]`    — page through chunk records
//! - `chunks show <id>`                    — print one record in full
//! - `chunks edit <id> [--text] [--keywords]`
//! - `chunks delete <id>`
//! - `documents list`                      — uploaded document audit trail
//! - `resync`                              — replay every record as an update
//! - `status`                              — show server health

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use ragdesk_core::config::expand_path;
use ragdesk_core::db::PgPool;
use ragdesk_core::models::chunk::split_keywords;
use ragdesk_core::{
    ChunkEvent, ChunkQuery, ChunkRecord, ChunkRepository, DocumentRepository, HttpSyncBridge, NewChunk,
    RagdeskConfig, UploadedDocument,
};
use ragdesk_ingest::IngestPipeline;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LIST_LIMIT: i64 = 50;
const STATUS_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "ragdesk-admin", version, about = "ragdesk knowledge base administration")]
struct Cli {
    #[arg(short, long, default_value = "ragdesk.toml", env = "RAGDESK_CONFIG")]
    config: String,

    /// ragdesk server URL for `status` (defaults to the configured [http] address)
    #[arg(long, env = "RAGDESK_HTTP_URL")]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract, chunk and register a PDF or DOCX document
    Upload {
        file: PathBuf,
    },

    /// Inspect and edit chunk records
    #[command(subcommand)]
    Chunks(ChunkCommands),

    /// Inspect uploaded documents
    #[command(subcommand)]
    Documents(DocumentCommands),

    /// Re-send every chunk record to the vector index as an update
    Resync,

    /// Show ragdesk server status
    Status,
}

#[derive(Debug, Subcommand)]
enum ChunkCommands {
    List {
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,

        /// Case-insensitive filter on text or keywords
        #[arg(long)]
        search: Option<String>,
    },

    Show {
        id: i64,
    },

    Edit {
        id: i64,

        #[arg(long)]
        text: Option<String>,

        /// Comma-separated keyword list
        #[arg(long)]
        keywords: Option<String>,
    },

    Delete {
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum DocumentCommands {
    List,
}

// ============================================================================
// Output formatting
// ============================================================================

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// One listing row: id, keyword preview, text preview on the next line.
pub fn chunk_row(record: &ChunkRecord) -> String {
    format!(
        "#{:<6} {}  [{}]\n        {}",
        record.id,
        format_timestamp(&record.updated_at),
        record.keywords_preview(),
        record.text_preview().replace('\n', " ")
    )
}

pub fn chunk_detail(record: &ChunkRecord) -> String {
    format!(
        "Chunk #{}\nCreated:  {}\nUpdated:  {}\nKeywords: {}\n\n{}",
        record.id,
        format_timestamp(&record.created_at),
        format_timestamp(&record.updated_at),
        record.keywords,
        record.text
    )
}

pub fn document_row(doc: &UploadedDocument) -> String {
    format!(
        "#{:<4} {}  {:>4} chunks  {}  ({})",
        doc.id,
        format_timestamp(&doc.uploaded_at),
        doc.chunk_count,
        doc.filename,
        doc.file_path
    )
}

/// Where an upload is stored: `dir/filename`, or `dir/<stem>_<timestamp>.<ext>`
/// if that name is already taken.
pub fn upload_destination(dir: &Path, filename: &str, now: DateTime<Utc>) -> PathBuf {
    let plain = dir.join(filename);
    if !plain.exists() {
        return plain;
    }

    let name = Path::new(filename);
    let stem = name.file_stem().and_then(|s| s.to_str()).unwrap_or("upload");
    let stamp = now.format("%Y%m%d%H%M%S");
    match name.extension().and_then(|e| e.to_str()) {
        Some(ext) => dir.join(format!("{stem}_{stamp}.{ext}")),
        None => dir.join(format!("{stem}_{stamp}")),
    }
}

/// Server base URL for `status`: explicit flag, else the configured listener.
pub fn server_url(explicit: Option<&str>, config: &RagdeskConfig) -> String {
    match explicit {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => format!("http://{}:{}", config.http.host, config.http.port),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn connect_database(config: &RagdeskConfig) -> anyhow::Result<PgPool> {
    let Some(db) = &config.database else {
        bail!("no [database] section configured; chunk records are unavailable");
    };
    Ok(ragdesk_core::db::connect(db).await?)
}

fn chunk_repository(pool: PgPool, config: &RagdeskConfig) -> anyhow::Result<ChunkRepository> {
    let bridge = HttpSyncBridge::new(&config.sync).context("failed to build sync client")?;
    Ok(ChunkRepository::new(pool, Arc::new(bridge)))
}

async fn do_upload(config: &RagdeskConfig, source: &Path) -> anyhow::Result<()> {
    let filename = source
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", source.display()))?
        .to_string();

    let pipeline = IngestPipeline::new(&config.ingest)?;
    let chunks = pipeline
        .prepare_upload(source)
        .await
        .with_context(|| format!("failed to process {}", source.display()))?;
    tracing::info!(file = %filename, chunks = chunks.len(), "Document prepared");

    let pool = connect_database(config).await?;
    let records = chunk_repository(pool.clone(), config)?;
    let documents = DocumentRepository::new(pool);

    let mut created = 0usize;
    for chunk in chunks {
        let record = records.create(&NewChunk::from(chunk)).await?;
        tracing::debug!(id = record.id, "Chunk registered");
        created += 1;
    }

    let uploads_dir = expand_path(&config.ingest.uploads_dir);
    tokio::fs::create_dir_all(&uploads_dir)
        .await
        .with_context(|| format!("failed to create {}", uploads_dir.display()))?;
    let destination = upload_destination(&uploads_dir, &filename, Utc::now());
    tokio::fs::copy(source, &destination)
        .await
        .with_context(|| format!("failed to store {}", destination.display()))?;

    let chunk_count = i32::try_from(created).context("chunk count out of range")?;
    let doc = documents
        .record(&filename, &destination.to_string_lossy(), chunk_count)
        .await?;

    println!("Uploaded {} as document #{}: {} chunks", filename, doc.id, created);
    Ok(())
}

async fn do_chunks(config: &RagdeskConfig, command: ChunkCommands) -> anyhow::Result<()> {
    let pool = connect_database(config).await?;
    let records = chunk_repository(pool, config)?;

    match command {
        ChunkCommands::List { limit, offset, search } => {
            let total = records.count().await?;
            let page = records.list(&ChunkQuery { limit, offset, search }).await?;
            if page.is_empty() {
                eprintln!("No chunk records found");
                return Ok(());
            }
            for record in &page {
                println!("{}", chunk_row(record));
            }
            println!("\n{} of {} records (offset {})", page.len(), total, offset);
        }
        ChunkCommands::Show { id } => match records.get(id).await? {
            Some(record) => println!("{}", chunk_detail(&record)),
            None => bail!("chunk #{id} not found"),
        },
        ChunkCommands::Edit { id, text, keywords } => {
            if text.is_none() && keywords.is_none() {
                bail!("nothing to change: pass --text and/or --keywords");
            }
            let keywords = keywords.as_deref().map(split_keywords);
            match records.update(id, text.as_deref(), keywords.as_deref()).await? {
                Some(record) => println!("Updated chunk #{}: {}", record.id, record.label()),
                None => bail!("chunk #{id} not found"),
            }
        }
        ChunkCommands::Delete { id } => {
            if !records.delete(id).await? {
                bail!("chunk #{id} not found");
            }
            println!("Deleted chunk #{id}");
        }
    }
    Ok(())
}

async fn do_documents(config: &RagdeskConfig) -> anyhow::Result<()> {
    let pool = connect_database(config).await?;
    let docs = DocumentRepository::new(pool).list().await?;
    if docs.is_empty() {
        eprintln!("No documents uploaded yet");
    }
    for doc in &docs {
        println!("{}", document_row(doc));
    }
    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub synced: usize,
    pub failed: Vec<i64>,
}

/// Send every record as an `update`. Failures are collected, not fatal.
pub async fn replay_records(bridge: &HttpSyncBridge, records: Vec<ChunkRecord>) -> ResyncReport {
    let mut report = ResyncReport::default();
    for record in records {
        let id = record.id;
        match bridge.send(&ChunkEvent::Updated(record)).await {
            Ok(_) => report.synced += 1,
            Err(e) => {
                tracing::warn!(id, error = %e, "Resync failed for chunk");
                report.failed.push(id);
            }
        }
    }
    report
}

async fn do_resync(config: &RagdeskConfig) -> anyhow::Result<()> {
    let pool = connect_database(config).await?;
    // Reads only; the bridge is driven directly below.
    let records = ChunkRepository::new(pool, Arc::new(ragdesk_core::NoopPublisher)).all().await?;
    let bridge = HttpSyncBridge::new(&config.sync)?;

    println!("Replaying {} chunk records to {}", records.len(), bridge.endpoint());
    let report = replay_records(&bridge, records).await;
    println!("Synced: {}", report.synced);
    if !report.failed.is_empty() {
        bail!("{} chunks failed to sync: {:?}", report.failed.len(), report.failed);
    }
    Ok(())
}

pub async fn fetch_health(server: &str) -> anyhow::Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(STATUS_TIMEOUT_SECS))
        .build()?;
    let url = format!("{}/health", server);
    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("cannot reach {url}"))?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    if !status.is_success() {
        bail!(
            "server unhealthy (HTTP {}): {}",
            status,
            body["detail"].as_str().unwrap_or("no detail")
        );
    }
    Ok(body)
}

async fn do_status(server: &str) -> anyhow::Result<()> {
    let body = fetch_health(server).await?;
    println!("ragdesk server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
    println!("Collection:     {}", body["collection"].as_str().unwrap_or("?"));
    println!("Points:         {}", body["points"]);
    println!("Vector size:    {}", body["vector_size"]);
    println!("Embedder:       {}", body["embedder"].as_str().unwrap_or("?"));
    println!("Generator:      {}", body["generator"].as_str().unwrap_or("?"));
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match RagdeskConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ragdesk-admin: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Upload { file } => do_upload(&config, &file).await,
        Commands::Chunks(command) => do_chunks(&config, command).await,
        Commands::Documents(DocumentCommands::List) => do_documents(&config).await,
        Commands::Resync => do_resync(&config).await,
        Commands::Status => do_status(&server_url(cli.server.as_deref(), &config)).await,
    };

    if let Err(e) = result {
        eprintln!("ragdesk-admin: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ragdesk_core::config::SyncConfig;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(id: i64, text: &str, keywords: &str) -> ChunkRecord {
        let ts = Utc.with_ymd_and_hms(2026, 6, 20, 9, 30, 0).unwrap();
        ChunkRecord {
            id,
            text: text.to_string(),
            keywords: keywords.to_string(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_chunk_row_previews() {
        let long = format!("{}\n{}", "а".repeat(150), "б".repeat(150));
        let row = chunk_row(&record(12, &long, "a, b, c, d, e, f, g"));

        assert!(row.starts_with("#12 "));
        assert!(row.contains("2026-06-20 09:30"));
        assert!(row.contains("[a, b, c, d, e]"), "keyword preview is capped at 5: {row}");
        assert!(!row.contains(", f"));
        let text_line = row.lines().nth(1).unwrap().trim();
        assert_eq!(text_line.chars().count(), 200, "text preview is capped at 200 chars");
    }

    #[test]
    fn test_chunk_detail_shows_full_text() {
        let detail = chunk_detail(&record(3, "полный текст", "приём"));
        assert!(detail.starts_with("Chunk #3"));
        assert!(detail.ends_with("полный текст"));
        assert!(detail.contains("Keywords: приём"));
    }

    #[test]
    fn test_upload_destination_avoids_collisions() {
        let dir = tempfile::TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 6, 20, 9, 30, 15).unwrap();

        let first = upload_destination(dir.path(), "rules.docx", now);
        assert_eq!(first, dir.path().join("rules.docx"));

        std::fs::write(&first, b"x").unwrap();
        let second = upload_destination(dir.path(), "rules.docx", now);
        assert_eq!(second, dir.path().join("rules_20260620093015.docx"));
    }

    #[test]
    fn test_server_url_prefers_flag() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(
            file.path(),
            "[http]\nport = 9100\n[embedding]\nmodel_path = \"m.onnx\"\n[generator]\nbase_url = \"http://llm\"\nmodel = \"m\"\n",
        )
        .unwrap();
        let config = RagdeskConfig::load(file.path().to_str().unwrap()).unwrap();

        assert_eq!(server_url(None, &config), "http://127.0.0.1:9100");
        assert_eq!(server_url(Some("http://rag:8000/"), &config), "http://rag:8000");
    }

    #[tokio::test]
    async fn test_replay_sends_updates_and_collects_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/sync_chunk"))
            .and(body_partial_json(serde_json::json!({ "action": "update", "id": 2 })))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({ "detail": "boom" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/admin/sync_chunk"))
            .and(body_partial_json(serde_json::json!({ "action": "update" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "upserted" })))
            .mount(&server)
            .await;

        let bridge = HttpSyncBridge::new(&SyncConfig {
            endpoint: format!("{}/admin/sync_chunk", server.uri()),
        })
        .unwrap();

        let report = replay_records(
            &bridge,
            vec![record(1, "one", "a"), record(2, "two", "b"), record(3, "three", "")],
        )
        .await;
        assert_eq!(
            report,
            ResyncReport {
                synced: 2,
                failed: vec![2]
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "healthy", "points": 42 })),
            )
            .mount(&server)
            .await;

        let body = fetch_health(&server.uri()).await.unwrap();
        assert_eq!(body["points"], 42);
    }

    #[tokio::test]
    async fn test_fetch_health_reports_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(serde_json::json!({ "status": "unhealthy", "detail": "collection missing" })),
            )
            .mount(&server)
            .await;

        let err = fetch_health(&server.uri()).await.unwrap_err();
        assert!(err.to_string().contains("collection missing"));
    }
}
