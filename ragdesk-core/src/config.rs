use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Default prompt sent to the local LLM. `{context}` and `{question}` are substituted.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Пожалуйста, ответьте на вопрос на основе следующего контекста:\n\nКонтекст: {context}\n\nВопрос: {question}\nОтвет:";

#[derive(Debug, Deserialize, Clone)]
pub struct RagdeskConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Relational chunk records. Optional for the query server.
    pub database: Option<DatabaseConfig>,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub model_path: String,
    /// Defaults to `<model stem>-tokenizer.json` next to the model.
    #[serde(default)]
    pub tokenizer_path: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub intra_threads: Option<usize>,
}

fn default_dimensions() -> usize {
    crate::embeddings::DEFAULT_DIMENSIONS
}

fn default_max_tokens() -> usize {
    512
}

fn default_batch_size() -> usize {
    32
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub path: String,
    pub collection: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            path: "./vector_data".to_string(),
            collection: "admission_chunks".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: Option<u64>,
}

fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    /// Document loaded into an empty vector store on first start.
    pub source_document: Option<String>,
    pub chunk_size: usize,
    pub keyword_count: usize,
    pub ocr_language: String,
    pub ocr_dpi: u32,
    pub tesseract_cmd: String,
    pub pdftoppm_cmd: String,
    pub uploads_dir: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_document: None,
            chunk_size: 2048,
            keyword_count: 5,
            ocr_language: "rus".to_string(),
            ocr_dpi: 300,
            tesseract_cmd: "tesseract".to_string(),
            pdftoppm_cmd: "pdftoppm".to_string(),
            uploads_dir: "./uploaded_documents".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub endpoint: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000/admin/sync_chunk".to_string(),
        }
    }
}

impl RagdeskConfig {
    /// Load from a TOML file, then apply `RAGDESK__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("RAGDESK").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}

/// Expand `~` and `$VAR` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!(path = raw, error = %e, "Path expansion failed, using it verbatim");
            PathBuf::from(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        file.write_all(body.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let file = write_config(
            r#"
[embedding]
model_path = "/models/rubert-tiny2.onnx"

[generator]
base_url = "http://127.0.0.1:8080"
model = "llama-3.1-8b-instruct"
"#,
        );

        let config = RagdeskConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.http.port, 8000);
        assert_eq!(config.vector_store.collection, "admission_chunks");
        assert_eq!(config.embedding.dimensions, 312);
        assert_eq!(config.embedding.max_tokens, 512);
        assert_eq!(config.ingest.keyword_count, 5);
        assert_eq!(config.ingest.ocr_language, "rus");
        assert!(config.database.is_none());
        assert!(config.generator.prompt_template.contains("{context}"));
        assert_eq!(config.sync.endpoint, "http://localhost:8000/admin/sync_chunk");
    }

    #[test]
    fn test_missing_required_section_is_an_error() {
        let file = write_config("[http]\nhost = \"0.0.0.0\"\nport = 9000\n");
        assert!(RagdeskConfig::load(file.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let file = write_config(
            r#"
[embedding]
model_path = "/models/rubert-tiny2.onnx"

[generator]
base_url = "http://127.0.0.1:8080"
model = "llama"

[ingest]
chunk_size = 512
source_document = "~/docs/priem.pdf"

[http]
port = 9000
"#,
        );

        let config = RagdeskConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.ingest.chunk_size, 512);
        assert_eq!(config.ingest.keyword_count, 5);
        assert_eq!(config.ingest.ocr_dpi, 300);
        assert_eq!(config.ingest.source_document.as_deref(), Some("~/docs/priem.pdf"));
        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.port, 9000);
        assert!(config.database.is_none());
    }

    #[test]
    fn test_expand_path_leaves_plain_paths_alone() {
        assert_eq!(expand_path("/srv/vector_data"), PathBuf::from("/srv/vector_data"));
    }

    #[test]
    fn test_expand_path_resolves_env_vars() {
        std::env::set_var("RAGDESK_TEST_DATA_ROOT", "/data");
        assert_eq!(
            expand_path("$RAGDESK_TEST_DATA_ROOT/vectors"),
            PathBuf::from("/data/vectors")
        );
    }
}
