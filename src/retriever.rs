//! Retrieval orchestrator: query → embedding → scored, filtered, ranked and
//! hydrated passages, memoized per query text.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::BoundedCache;
use crate::corpus::{CorpusIndex, CorpusStore, Embedding};
use crate::error::{Result, RetrievalError};
use crate::providers::{EmbeddingProvider, PageTextLookup};
use crate::similarity;

/// A passage returned for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    /// Page number of the passage within `source`.
    pub id: u32,
    pub source: String,
    /// Relevance in `[0, 1]`.
    pub score: f64,
    pub text: String,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    pages: Arc<dyn PageTextLookup>,
    corpus: CorpusStore,
    embedding_cache: BoundedCache<Embedding>,
    result_cache: BoundedCache<Vec<RankedResult>>,
}

impl Retriever {
    /// Builds a retriever whose two caches each hold `cache_capacity` queries.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        pages: Arc<dyn PageTextLookup>,
        corpus: CorpusStore,
        cache_capacity: usize,
    ) -> Result<Self> {
        Ok(Retriever {
            embedder,
            pages,
            corpus,
            embedding_cache: BoundedCache::new(cache_capacity)?,
            result_cache: BoundedCache::new(cache_capacity)?,
        })
    }

    /// Returns up to `top_n` passages scoring strictly above `threshold`,
    /// best first, ties in ingestion order.
    ///
    /// A repeated query is answered from the result cache without calling
    /// the embedding provider or the page text lookup.
    pub async fn retrieve(
        &self,
        query: &str,
        top_n: usize,
        threshold: f64,
    ) -> Result<Vec<RankedResult>> {
        if top_n == 0 {
            return Ok(Vec::new());
        }

        if let Some(mut cached) = self.result_cache.get(query) {
            debug!(query, "result cache hit");
            cached.truncate(top_n);
            return Ok(cached);
        }

        let query_embedding = self
            .embedding_cache
            .get_or_try_insert_with(query, || async {
                debug!(query, "embedding cache miss");
                self.embedder
                    .embed(query)
                    .await
                    .map_err(|e| RetrievalError::ProviderFailure {
                        reason: format!("{e:#}"),
                    })
            })
            .await?;

        let index = self.corpus.index().await?;
        let ranked = rank(&index, &query_embedding, top_n, threshold);
        let results = self.hydrate(&index, ranked).await?;

        info!(
            query,
            corpus = index.len(),
            results = results.len(),
            "retrieval complete"
        );
        Ok(self.result_cache.insert(query, results))
    }

    /// Fetches text for each ranked record, dropping records whose lookup
    /// fails. Fails only if every lookup fails.
    async fn hydrate(
        &self,
        index: &CorpusIndex,
        ranked: Vec<(usize, f64)>,
    ) -> Result<Vec<RankedResult>> {
        let attempted = ranked.len();
        let mut results = Vec::with_capacity(attempted);

        for (position, score) in ranked {
            let record = &index.records()[position];
            match self.pages.page_text(&record.source, record.id).await {
                Ok(text) => results.push(RankedResult {
                    id: record.id,
                    source: record.source.clone(),
                    score,
                    text,
                }),
                Err(e) => warn!(
                    source = %record.source,
                    page = record.id,
                    error = %format!("{e:#}"),
                    "failed to load page text, dropping result"
                ),
            }
        }

        if attempted > 0 && results.is_empty() {
            return Err(RetrievalError::HydrationFailure { attempted });
        }
        Ok(results)
    }

    /// Empties both caches. The next query for any text recomputes.
    pub fn clear_all_caches(&self) {
        self.embedding_cache.clear();
        self.result_cache.clear();
        info!("query caches cleared");
    }

    /// Rebuilds the corpus snapshot and swaps in the new index. Cached
    /// results refer to the old corpus, so caches are cleared too.
    pub async fn reload_corpus(&self) -> Result<usize> {
        let index = self.corpus.reload().await?;
        self.clear_all_caches();
        Ok(index.len())
    }

    /// Entry counts of the embedding and result caches.
    pub fn cache_len(&self) -> (usize, usize) {
        (self.embedding_cache.len(), self.result_cache.len())
    }
}

/// Scores every record against `query_embedding` and returns
/// `(position, score)` for the best `top_n` strictly above `threshold`.
fn rank(
    index: &CorpusIndex,
    query_embedding: &Embedding,
    top_n: usize,
    threshold: f64,
) -> Vec<(usize, f64)> {
    let mut mismatched = 0usize;

    let mut scored: Vec<(usize, f64)> = index
        .records()
        .iter()
        .enumerate()
        .filter_map(|(position, record)| {
            match similarity::score(query_embedding.view(), record.embedding.view()) {
                Ok(score) => Some((position, score)),
                Err(_) => {
                    mismatched += 1;
                    None
                }
            }
        })
        .filter(|(_, score)| *score > threshold)
        .collect();

    if mismatched > 0 {
        warn!(
            skipped = mismatched,
            query_dims = query_embedding.len(),
            corpus_dims = ?index.dims(),
            "skipped records with mismatched embedding dimensions"
        );
    }

    // Stable: equal scores keep ingestion order.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_n);
    scored
}
