//! The crawl → index → ask session.
//!
//! A [`Pipeline`] owns everything one logical session mutates: the page
//! table, the vector index handle, and the embedder/generator collaborators.
//! Callers exposing it to concurrent requests must serialize access (the
//! serve surface wraps it in a mutex); the pipeline itself is synchronous and
//! single-threaded.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::chunker::{self, ChunkError};
use crate::config::Config;
use crate::crawler::{CrawlLimits, CrawlerError, SiteCrawler};
use crate::embedder::mock::MockEmbedder;
use crate::embedder::remote::RemoteEmbedder;
use crate::embedder::{Embedder, EmbedderError};
use crate::extractor;
use crate::qa::{Answer, Generator, QaEngine, QaError, RemoteGenerator, Summarizer};
use crate::store::{ChunkMeta, IndexError, VectorIndex};

/// A crawled page after content extraction. Raw fetched HTML is kept so the
/// page can be re-extracted without another fetch.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CrawlReport {
    pub page_count: usize,
    pub skipped_count: usize,
    pub urls: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IndexReport {
    pub vector_count: usize,
    pub errors: Vec<String>,
}

/// Reply to an ask operation. `NotReady` is an expected caller-sequencing
/// state, not an error, and carries no timings.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AskReply {
    NotReady { error: String },
    Answer(Answer),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Crawler(#[from] CrawlerError),

    #[error(transparent)]
    Chunking(#[from] ChunkError),

    #[error(transparent)]
    Embedding(#[from] EmbedderError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Qa(#[from] QaError),

    #[error("failed to construct collaborator: {0}")]
    Collaborator(String),
}

pub struct Pipeline {
    config: Config,
    embedder: Arc<dyn Embedder>,
    generator: Generator,
    pages: Vec<Page>,
    page_positions: HashMap<String, usize>,
    index: Option<VectorIndex>,
}

impl Pipeline {
    /// Build a session from configuration. The embedder and generator are
    /// chosen here, once: remote clients when endpoints are configured, the
    /// mock embedder and extractive summarizer otherwise.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        let timeout = Duration::from_secs(config.crawler.fetch_timeout_secs.max(30));

        let embedder: Arc<dyn Embedder> = match &config.embedding.endpoint {
            Some(endpoint) => {
                let api_key = read_api_key(config.embedding.api_key_env.as_deref());
                Arc::new(
                    RemoteEmbedder::new(
                        endpoint,
                        config.embedding.model.clone(),
                        config.embedding.dimensions,
                        api_key.as_deref(),
                        timeout,
                    )
                    .map_err(|e| PipelineError::Collaborator(format!("{e:#}")))?,
                )
            }
            None => {
                info!("no embedding endpoint configured, using mock embedder");
                Arc::new(MockEmbedder::new(config.embedding.dimensions))
            }
        };

        let generator = match &config.generation.endpoint {
            Some(endpoint) => {
                let api_key = read_api_key(config.generation.api_key_env.as_deref());
                Generator::Remote(
                    RemoteGenerator::new(
                        endpoint,
                        config.generation.model.clone(),
                        api_key.as_deref(),
                        timeout,
                    )
                    .map_err(|e| PipelineError::Collaborator(format!("{e:#}")))?,
                )
            }
            None => {
                info!("no generation endpoint configured, using extractive summarizer");
                Generator::Extractive(Summarizer {
                    min_words: config.generation.summary_min_words,
                    max_words: config.generation.summary_max_words,
                })
            }
        };

        Ok(Self {
            config,
            embedder,
            generator,
            pages: Vec::new(),
            page_positions: HashMap::new(),
            index: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Crawl a site and merge the fetched pages into the page table.
    ///
    /// A later crawl of an already-known URL overwrites its entry in place;
    /// `urls` reports the cumulative page table in insertion order.
    pub fn crawl(
        &mut self,
        seed_url: &str,
        limits: &CrawlLimits,
    ) -> Result<CrawlReport, PipelineError> {
        let crawler = SiteCrawler::new(seed_url, &self.config.crawler)?;
        let (fetched, skipped_count) = crawler.crawl(limits);
        let page_count = fetched.len();

        for page in fetched {
            let extracted = extractor::extract(&page.html, &page.url);
            self.upsert_page(Page {
                url: page.url,
                title: extracted.title,
                text: extracted.text,
                html: page.html,
            });
        }

        info!(
            "crawl of {seed_url} recorded {page_count} pages ({skipped_count} skipped), table now {}",
            self.pages.len()
        );
        Ok(CrawlReport {
            page_count,
            skipped_count,
            urls: self.pages.iter().map(|p| p.url.clone()).collect(),
        })
    }

    fn upsert_page(&mut self, page: Page) {
        match self.page_positions.get(&page.url) {
            Some(&position) => self.pages[position] = page,
            None => {
                self.page_positions
                    .insert(page.url.clone(), self.pages.len());
                self.pages.push(page);
            }
        }
    }

    /// Chunk every non-empty page, embed the chunks, and build a fresh index.
    ///
    /// Re-indexing clears and rebuilds rather than appending, so repeated
    /// calls never accumulate duplicate rows. Chunk ids are derived from
    /// `(url, start offset)` and are therefore globally unique within a run.
    /// Both index artifacts are rewritten on success.
    pub fn build_index(
        &mut self,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IndexReport, PipelineError> {
        let mut ids: Vec<String> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        let mut metas: Vec<ChunkMeta> = Vec::new();

        for page in &self.pages {
            if page.text.is_empty() {
                continue;
            }
            for chunk in chunker::chunk_text(&page.text, chunk_size, chunk_overlap)? {
                ids.push(format!("{}#{}", page.url, chunk.start));
                metas.push(ChunkMeta {
                    url: page.url.clone(),
                    chunk_text: chunk.text.clone(),
                    page_title: page.title.clone(),
                    start: chunk.start,
                    end: chunk.end,
                });
                texts.push(chunk.text);
            }
        }

        if texts.is_empty() {
            return Ok(IndexReport {
                vector_count: 0,
                errors: vec!["no chunks to index".to_string()],
            });
        }

        let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&text_refs)?;

        let mut index = VectorIndex::new(self.embedder.dimensions());
        index.add(&ids, &vectors, &metas)?;
        index.save(
            &self.config.indexing.index_path,
            &self.config.indexing.meta_path,
        )?;

        let vector_count = index.len();
        self.index = Some(index);

        info!("indexed {vector_count} chunks from {} pages", self.pages.len());
        Ok(IndexReport {
            vector_count,
            errors: Vec::new(),
        })
    }

    /// Restore a previously saved index from the configured paths.
    pub fn load_index(&mut self) -> Result<usize, PipelineError> {
        let index = VectorIndex::load(
            &self.config.indexing.index_path,
            &self.config.indexing.meta_path,
        )?;
        let count = index.len();
        self.index = Some(index);
        Ok(count)
    }

    /// Answer a question from the current index.
    pub fn ask(&self, question: &str, top_k: usize) -> Result<AskReply, PipelineError> {
        let Some(index) = &self.index else {
            return Ok(AskReply::NotReady {
                error: "index not built; call /index first".to_string(),
            });
        };

        let engine = QaEngine::new(index, self.embedder.as_ref(), &self.generator);
        Ok(AskReply::Answer(engine.ask(question, top_k)?))
    }
}

fn read_api_key(env_var: Option<&str>) -> Option<String> {
    let var = env_var?;
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ => {
            tracing::warn!("API key environment variable {var} is unset or empty");
            None
        }
    }
}
