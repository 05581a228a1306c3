//! Configuration for the ingestion pipeline
//!
//! Secrets and the index name come from the environment; everything else has
//! defaults and may be overridden from a TOML settings file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{Metric, SourceFile};

/// API key for the embedding service
pub const ENV_EMBEDDING_API_KEY: &str = "EMBEDDING_API_KEY";
/// API key for the vector index service
pub const ENV_INDEX_API_KEY: &str = "INDEX_SERVICE_API_KEY";
/// Environment (region) of the vector index service
pub const ENV_INDEX_ENVIRONMENT: &str = "INDEX_SERVICE_ENVIRONMENT";
/// Name of the target index
pub const ENV_INDEX_NAME: &str = "INDEX_NAME";

/// Fully resolved configuration, built once at startup
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Service credentials (environment only)
    pub credentials: Credentials,
    /// Target index name (environment only)
    pub index_name: String,
    /// Non-secret settings
    pub settings: IngestSettings,
}

/// Service credentials. `Debug` never prints the keys.
#[derive(Clone)]
pub struct Credentials {
    pub embedding_api_key: String,
    pub index_api_key: String,
    pub index_environment: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("embedding_api_key", &"<redacted>")
            .field("index_api_key", &"<redacted>")
            .field("index_environment", &self.index_environment)
            .finish()
    }
}

/// Settings that may come from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Input documents
    pub input: InputConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding service configuration
    pub embeddings: EmbeddingConfig,
    /// Vector index configuration
    pub index: IndexConfig,
    /// Concurrency configuration
    pub processing: ProcessingConfig,
}

/// Input document list
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory the file names are resolved under
    pub base_dir: PathBuf,
    /// Ordered list of file names
    pub files: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("tmp_docs"),
            files: vec![
                "Manual de Cumplimiento - VIZUM.docx".to_string(),
                "Metodología PLD-FT - VIZUM.docx".to_string(),
                "Matriz de Riesgos Clientes - VIZUM.xlsx".to_string(),
                "Metodología EBR - VIZUM.xlsx".to_string(),
            ],
        }
    }
}

impl InputConfig {
    /// Resolve the configured names into source files, keeping order
    pub fn source_files(&self) -> Vec<SourceFile> {
        self.files
            .iter()
            .map(|name| SourceFile::new(&self.base_dir, name.clone()))
            .collect()
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name
    pub model: String,
    /// Embedding dimensions; every vector must have exactly this many values
    pub dimensions: usize,
    /// Service base URL
    pub base_url: String,
    /// Texts per embedding request
    pub batch_size: usize,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries for transient failures
    pub max_retries: u32,
    /// First backoff delay in milliseconds (doubles per retry)
    pub retry_base_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-ada-002".to_string(),
            dimensions: 1536,
            base_url: "https://api.openai.com/v1".to_string(),
            batch_size: 32,
            timeout_secs: 60,
            max_retries: 5,
            retry_base_delay_ms: 500,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Distance metric used when the index is created
    pub metric: Metric,
    /// Records per upsert request
    pub upsert_batch_size: usize,
    /// Extra attempts for a failed upsert batch
    pub upsert_retries: u32,
    /// How long to wait for a newly created index to become ready
    pub ready_timeout_secs: u64,
    /// Poll interval while waiting for readiness
    pub ready_poll_interval_secs: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Control-plane URL; derived from the environment when unset
    pub controller_url: Option<String>,
    /// Namespace to write into
    pub namespace: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            metric: Metric::Cosine,
            upsert_batch_size: 100,
            upsert_retries: 1,
            ready_timeout_secs: 300,
            ready_poll_interval_secs: 5,
            timeout_secs: 60,
            controller_url: None,
            namespace: None,
        }
    }
}

/// Concurrency configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Files extracted concurrently (default: CPU count, max 8)
    pub parallel_files: Option<usize>,
    /// Embedding requests in flight (default: 8, clamped to 1..=20)
    pub parallel_embeddings: Option<usize>,
}

impl ProcessingConfig {
    pub fn parallel_files(&self) -> usize {
        self.parallel_files
            .unwrap_or_else(|| num_cpus::get().min(8))
            .max(1)
    }

    pub fn parallel_embeddings(&self) -> usize {
        self.parallel_embeddings.unwrap_or(8).clamp(1, 20)
    }
}

impl IngestSettings {
    /// Read settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| {
            Error::Config(format!("invalid settings file {}: {}", path.display(), e))
        })
    }
}

impl IngestConfig {
    /// Load settings (optionally from a file) and credentials from the process environment
    pub fn load(settings_path: Option<&Path>) -> Result<Self> {
        let settings = match settings_path {
            Some(path) => IngestSettings::from_file(path)?,
            None => IngestSettings::default(),
        };
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    /// Build from settings and an environment lookup.
    ///
    /// Every missing or blank variable is reported in a single error.
    pub fn from_lookup<F>(settings: IngestSettings, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut require = |key: &'static str| -> String {
            match lookup(key).map(|v| v.trim().to_string()) {
                Some(value) if !value.is_empty() => value,
                _ => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let embedding_api_key = require(ENV_EMBEDDING_API_KEY);
        let index_api_key = require(ENV_INDEX_API_KEY);
        let index_environment = require(ENV_INDEX_ENVIRONMENT);
        let index_name = require(ENV_INDEX_NAME);

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let config = Self {
            credentials: Credentials {
                embedding_api_key,
                index_api_key,
                index_environment,
            },
            index_name,
            settings,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let s = &self.settings;
        if s.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be positive".into()));
        }
        if s.chunking.chunk_overlap >= s.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                s.chunking.chunk_overlap, s.chunking.chunk_size
            )));
        }
        if s.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be positive".into()));
        }
        if s.embeddings.batch_size == 0 || s.index.upsert_batch_size == 0 {
            return Err(Error::Config("batch sizes must be positive".into()));
        }
        if s.input.files.is_empty() {
            return Err(Error::Config("input.files is empty".into()));
        }
        Ok(())
    }

    /// Control-plane URL of the index service
    pub fn controller_url(&self) -> String {
        self.settings.index.controller_url.clone().unwrap_or_else(|| {
            format!(
                "https://controller.{}.pinecone.io",
                self.credentials.index_environment
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> impl Fn(&str) -> Option<String> {
        env(&[
            (ENV_EMBEDDING_API_KEY, "sk-test"),
            (ENV_INDEX_API_KEY, "pc-test"),
            (ENV_INDEX_ENVIRONMENT, "us-west1-gcp"),
            (ENV_INDEX_NAME, "vizum"),
        ])
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(IngestSettings::default(), full_env()).unwrap();
        assert_eq!(config.index_name, "vizum");
        assert_eq!(config.settings.chunking.chunk_size, 500);
        assert_eq!(config.settings.chunking.chunk_overlap, 100);
        assert_eq!(config.settings.embeddings.dimensions, 1536);
        assert_eq!(config.settings.index.metric, Metric::Cosine);
        assert_eq!(config.settings.input.files.len(), 4);
        assert_eq!(
            config.controller_url(),
            "https://controller.us-west1-gcp.pinecone.io"
        );
    }

    #[test]
    fn test_missing_variables_reported_together() {
        let lookup = env(&[(ENV_EMBEDDING_API_KEY, "sk-test"), (ENV_INDEX_NAME, "  ")]);
        let err = IngestConfig::from_lookup(IngestSettings::default(), lookup).unwrap_err();
        let msg = err.to_string();
        assert!(err.is_fatal());
        assert!(msg.contains(ENV_INDEX_API_KEY));
        assert!(msg.contains(ENV_INDEX_ENVIRONMENT));
        assert!(msg.contains(ENV_INDEX_NAME));
        assert!(!msg.contains(ENV_EMBEDDING_API_KEY));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let mut settings = IngestSettings::default();
        settings.chunking.chunk_overlap = 500;
        assert!(IngestConfig::from_lookup(settings, full_env()).is_err());
    }

    #[test]
    fn test_settings_from_toml() {
        let settings: IngestSettings = toml::from_str(
            r#"
            [input]
            base_dir = "docs"
            files = ["a.docx"]

            [chunking]
            chunk_size = 800

            [index]
            metric = "dotproduct"
            "#,
        )
        .unwrap();
        assert_eq!(settings.input.base_dir, PathBuf::from("docs"));
        assert_eq!(settings.chunking.chunk_size, 800);
        assert_eq!(settings.chunking.chunk_overlap, 100);
        assert_eq!(settings.index.metric, Metric::DotProduct);
        assert_eq!(settings.embeddings.model, "text-embedding-ada-002");
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let config = IngestConfig::from_lookup(IngestSettings::default(), full_env()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-test"));
        assert!(!debug.contains("pc-test"));
    }
}
