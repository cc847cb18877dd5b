//! Configuration loading, validation, and defaults.
//!
//! A single JSON file configures the crawler, indexing, retrieval, and the
//! embedding/generation collaborators. Missing fields fall back to defaults;
//! a missing file yields the default config and writes a template for the
//! default path.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_user_agent() -> String {
    "webrag-bot/0.3 (+https://github.com/webrag/webrag)".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_max_pages() -> usize {
    50
}

fn default_max_depth() -> usize {
    3
}

fn default_crawl_delay_ms() -> u64 {
    500
}

fn default_index_path() -> String {
    "./webrag.idx".to_string()
}

fn default_meta_path() -> String {
    "./meta.json".to_string()
}

fn default_chunk_size() -> usize {
    800
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_top_k() -> usize {
    5
}

fn default_dimensions() -> usize {
    384
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_summary_min_words() -> usize {
    50
}

fn default_summary_max_words() -> usize {
    200
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Refuse all fetches when robots.txt cannot be loaded or parsed.
    /// Default is permissive: a site whose robots.txt is unreachable is
    /// treated as allowing everything.
    #[serde(default)]
    pub robots_fail_closed: bool,

    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_crawl_delay_ms")]
    pub crawl_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_index_path")]
    pub index_path: String,

    #[serde(default = "default_meta_path")]
    pub meta_path: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible embeddings API. When absent the
    /// deterministic mock embedder is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Environment variable holding the API key for the remote endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible chat API. When absent answers come
    /// from the local extractive summarizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default = "default_summary_min_words")]
    pub summary_min_words: usize,

    #[serde(default = "default_summary_max_words")]
    pub summary_max_words: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            robots_fail_closed: false,
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            crawl_delay_ms: default_crawl_delay_ms(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            meta_path: default_meta_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            api_key_env: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_generation_model(),
            api_key_env: None,
            summary_min_words: default_summary_min_words(),
            summary_max_words: default_summary_max_words(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`. A missing file
    /// yields the default config; the default path additionally gets a
    /// template written so the options are discoverable.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !std::path::Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.indexing.chunk_size > 0,
            "indexing.chunk_size must be positive"
        );
        anyhow::ensure!(
            self.indexing.chunk_overlap < self.indexing.chunk_size,
            "indexing.chunk_overlap must be smaller than chunk_size"
        );
        anyhow::ensure!(self.retrieval.top_k > 0, "retrieval.top_k must be positive");
        anyhow::ensure!(
            self.embedding.dimensions > 0,
            "embedding.dimensions must be positive"
        );
        anyhow::ensure!(
            self.crawler.max_pages > 0,
            "crawler.max_pages must be positive"
        );
        anyhow::ensure!(
            self.generation.summary_min_words <= self.generation.summary_max_words,
            "generation.summary_min_words must not exceed summary_max_words"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.indexing.chunk_size, 800);
        assert_eq!(config.indexing.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.crawler.max_pages, 50);
        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.crawler.crawl_delay_ms, 500);
        assert!(!config.crawler.robots_fail_closed);
        assert!(config.embedding.endpoint.is_none());
        assert!(config.generation.endpoint.is_none());
    }

    #[test]
    fn test_load_partial_json() {
        let json = r#"{"indexing": {"chunk_size": 1000}, "listen_addr": "0.0.0.0:9000"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.indexing.chunk_size, 1000);
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        // Untouched fields keep their defaults.
        assert_eq!(config.indexing.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.indexing.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_overlap_must_be_smaller() {
        let mut config = Config::default();
        config.indexing.chunk_size = 100;
        config.indexing.chunk_overlap = 100;
        assert!(config.validate().is_err());

        config.indexing.chunk_overlap = 99;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_dimensions() {
        let mut config = Config::default();
        config.embedding.dimensions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.indexing.chunk_size, config.indexing.chunk_size);
        assert_eq!(parsed.crawler.user_agent, config.crawler.user_agent);
        assert_eq!(parsed.listen_addr, config.listen_addr);
    }
}
