//! Collaborators the retrieval engine depends on, and the implementations
//! the binary wires in.
//!
//! | Trait | Role | Implementation |
//! |-------|------|----------------|
//! | [`EmbeddingProvider`] | text → vector | [`OpenAiEmbedder`] |
//! | [`PageTextLookup`] | (source, page) → text | [`PagedTextDir`] |
//! | [`Ingestor`] | rebuild the corpus snapshot | [`PageIngestor`] |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::corpus::{CorpusIndex, Embedding, SnapshotRecord};
use crate::utils::{source_stem, split_pages};

/// Turns text into an embedding vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// Returns the extracted text of one page of a source document.
#[async_trait]
pub trait PageTextLookup: Send + Sync {
    async fn page_text(&self, source: &str, id: u32) -> Result<String>;
}

/// Regenerates the persisted corpus snapshot at `snapshot`.
///
/// Returns the number of records written.
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn rebuild_corpus(&self, snapshot: &Path) -> Result<usize>;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f64>,
}

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    max_chars: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &Config) -> Self {
        OpenAiEmbedder {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
            max_chars: config.embedding_max_tokens * 4,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            bail!("invalid input text for embedding");
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY not set"))?;

        let char_count = text.chars().count();
        let input = if char_count > self.max_chars {
            warn!(chars = char_count, limit = self.max_chars, "truncating text before embedding");
            let end = text
                .char_indices()
                .nth(self.max_chars)
                .map_or(text.len(), |(i, _)| i);
            &text[..end]
        } else {
            text
        };

        let response: EmbeddingResponse = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input,
            })
            .send()
            .await
            .context("embedding request failed")?
            .error_for_status()
            .context("embedding endpoint returned an error")?
            .json()
            .await
            .context("malformed embedding response")?;

        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedding response contained no vectors"))?;
        Ok(Array1::from(data.embedding))
    }
}

/// Page text read from `<dir>/<source stem>.txt`, pages separated by form
/// feeds as written by `pdftotext`.
pub struct PagedTextDir {
    dir: PathBuf,
}

impl PagedTextDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        PagedTextDir { dir: dir.into() }
    }

    pub fn text_path(&self, source: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", source_stem(source)))
    }

    async fn read_pages(&self, source: &str) -> Result<String> {
        let path = self.text_path(source);
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read page text from {:?}", path))
    }
}

#[async_trait]
impl PageTextLookup for PagedTextDir {
    async fn page_text(&self, source: &str, id: u32) -> Result<String> {
        let content = self.read_pages(source).await?;
        let pages = split_pages(&content);
        let index = (id as usize)
            .checked_sub(1)
            .ok_or_else(|| anyhow!("page numbers start at 1"))?;
        pages
            .get(index)
            .map(|page| page.to_string())
            .ok_or_else(|| anyhow!("{} has {} pages, no page {}", source, pages.len(), id))
    }
}

/// Builds the corpus snapshot by embedding every substantial page of each
/// configured source document.
pub struct PageIngestor {
    pages: PagedTextDir,
    sources: Vec<String>,
    embedder: Arc<dyn EmbeddingProvider>,
    min_page_chars: usize,
}

impl PageIngestor {
    pub fn new(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        PageIngestor {
            pages: PagedTextDir::new(&config.data_dir),
            sources: config.sources.clone(),
            embedder,
            min_page_chars: config.min_page_chars,
        }
    }
}

#[async_trait]
impl Ingestor for PageIngestor {
    async fn rebuild_corpus(&self, snapshot: &Path) -> Result<usize> {
        let mut records = Vec::new();

        for source in &self.sources {
            let content = self.pages.read_pages(source).await?;
            let pages = split_pages(&content);
            info!(source = %source, pages = pages.len(), "ingesting source");

            for (i, page) in pages.iter().enumerate() {
                let page_num = i as u32 + 1;
                if page.trim().chars().count() < self.min_page_chars {
                    debug!(source = %source, page = page_num, "skipping near-empty page");
                    continue;
                }

                match self.embedder.embed(page).await {
                    Ok(embedding) => records.push(SnapshotRecord {
                        page_num,
                        file: source.clone(),
                        embedding: embedding.to_vec(),
                    }),
                    Err(e) => {
                        warn!(source = %source, page = page_num, error = %format!("{e:#}"), "failed to embed page, skipping");
                    }
                }
            }
        }

        if records.is_empty() {
            bail!("failed to generate embeddings: no pages ingested");
        }

        CorpusIndex::save(snapshot, &records)
            .await
            .with_context(|| format!("failed to write snapshot to {:?}", snapshot))?;
        info!(records = records.len(), snapshot = ?snapshot, "saved corpus snapshot");
        Ok(records.len())
    }
}
