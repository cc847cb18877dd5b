//! Retrieval orchestration: embed the question, search the index, gate on
//! relevance, and synthesize an answer with source attribution and timings.
use std::time::{Duration, Instant};

use anyhow::{Context, Result as AnyResult};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

use crate::embedder::{Embedder, EmbedderError};
use crate::store::{IndexError, VectorIndex};

/// Hits scoring below this are dropped before answer synthesis.
pub const MIN_RELEVANCE: f32 = 0.3;

/// Per-chunk cap when building the generation context.
const CONTEXT_CHUNK_CHARS: usize = 1000;
/// Cap for the snippet echoed back in each source attribution.
const SOURCE_SNIPPET_CHARS: usize = 400;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub snippet: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timings {
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub timings: Timings,
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error(transparent)]
    Embedding(#[from] EmbedderError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("answer generation failed: {0}")]
    Generation(String),
}

// ── Generators ───────────────────────────────────────────────────────

/// How answers get synthesized from retrieved context. Chosen once at
/// construction; there is no runtime fallback from one variant to the other.
pub enum Generator {
    /// Delegate to an external chat-completion service.
    Remote(RemoteGenerator),
    /// Local extractive summarization bounded to a word window.
    Extractive(Summarizer),
}

impl Generator {
    /// Produce an answer from the retrieved context and the question.
    pub fn produce(&self, context: &str, question: &str) -> Result<String, QaError> {
        match self {
            Generator::Remote(remote) => remote
                .generate(&format!("Context:\n{context}\n\nQuestion: {question}"))
                .map_err(|e| QaError::Generation(format!("{e:#}"))),
            Generator::Extractive(summarizer) => Ok(summarizer.summarize(context)),
        }
    }
}

/// Blocking client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct RemoteGenerator {
    client: Client,
    endpoint: String,
    model: String,
}

impl RemoteGenerator {
    pub fn new(
        base_url: &str,
        model: String,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> AnyResult<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing generation model name");

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let auth = format!("Bearer {}", key.trim());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth).context("invalid generation API key")?,
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build generation HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model,
        })
    }

    fn generate(&self, prompt: &str) -> AnyResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "Answer the question using only the provided context. \
                              Say so when the context does not contain the answer.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .context("failed to call chat completions")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("generation endpoint returned {status}: {text}");
        }
        let parsed: ChatResponse = resp.json().context("failed to parse generation response")?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(answer)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: String,
}

// ── Local summarizer ─────────────────────────────────────────────────

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?。]\s+|\n").expect("static regex"));

/// Deterministic extractive summarizer: leading sentences of the context,
/// bounded to a `[min_words, max_words]` window.
pub struct Summarizer {
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for Summarizer {
    fn default() -> Self {
        Self {
            min_words: 50,
            max_words: 200,
        }
    }
}

impl Summarizer {
    pub fn summarize(&self, text: &str) -> String {
        let mut out: Vec<&str> = Vec::new();
        let mut words = 0usize;

        for sentence in split_sentences(text) {
            let sentence_words = sentence.split_whitespace().count();
            if sentence_words == 0 {
                continue;
            }
            if words >= self.min_words && words + sentence_words > self.max_words {
                break;
            }
            out.push(sentence);
            words += sentence_words;
            if words >= self.max_words {
                break;
            }
        }

        let summary = out.join(" ");
        // A sentence may have pushed past the cap; trim to whole words.
        let capped: Vec<&str> = summary.split_whitespace().take(self.max_words).collect();
        capped.join(" ")
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END.find_iter(text) {
        let piece = text[start..m.end()].trim();
        if !piece.is_empty() {
            sentences.push(piece);
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

// ── Retrieval engine ─────────────────────────────────────────────────

/// Borrows the session's index and collaborators for the duration of one
/// question.
pub struct QaEngine<'a, E: Embedder + ?Sized> {
    index: &'a VectorIndex,
    embedder: &'a E,
    generator: &'a Generator,
}

impl<'a, E: Embedder + ?Sized> QaEngine<'a, E> {
    pub fn new(index: &'a VectorIndex, embedder: &'a E, generator: &'a Generator) -> Self {
        Self {
            index,
            embedder,
            generator,
        }
    }

    /// Answer `question` from the `top_k` nearest chunks.
    ///
    /// Hits below [`MIN_RELEVANCE`] are discarded; when none survive this is
    /// a terminal "not enough information" answer, not an error.
    pub fn ask(&self, question: &str, top_k: usize) -> Result<Answer, QaError> {
        let started = Instant::now();

        let query = self.embedder.embed(question)?;
        let hits = self.index.search(&query, top_k)?;
        let relevant: Vec<_> = hits
            .into_iter()
            .filter(|(_, score)| *score >= MIN_RELEVANCE)
            .collect();
        let retrieval_ms = started.elapsed().as_millis() as u64;

        if relevant.is_empty() {
            return Ok(Answer {
                answer: "not enough information".to_string(),
                sources: Vec::new(),
                timings: Timings {
                    retrieval_ms,
                    generation_ms: 0,
                    total_ms: retrieval_ms,
                },
            });
        }

        // Context keeps the index's descending-score order.
        let context = relevant
            .iter()
            .map(|(entry, _)| truncate_chars(&entry.meta.chunk_text, CONTEXT_CHUNK_CHARS))
            .collect::<Vec<_>>()
            .join("\n\n");

        let generation_started = Instant::now();
        let raw = self.generator.produce(&context, question)?;
        let generation_ms = generation_started.elapsed().as_millis() as u64;

        let sources = relevant
            .iter()
            .map(|(entry, score)| Source {
                url: entry.meta.url.clone(),
                snippet: truncate_chars(&entry.meta.chunk_text, SOURCE_SNIPPET_CHARS).to_string(),
                score: *score,
            })
            .collect();

        Ok(Answer {
            answer: raw.trim().to_string(),
            sources,
            timings: Timings {
                retrieval_ms,
                generation_ms,
                total_ms: started.elapsed().as_millis() as u64,
            },
        })
    }
}

/// Prefix of `s` holding at most `max_chars` characters.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_offset, _)) => &s[..byte_offset],
        None => s,
    }
}
