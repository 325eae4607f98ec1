//! Hybrid retrieval over the text, code and comment stores.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use docdex_llm::{Classification, EmbedProvider, RelevanceClassifier, ScoredCandidates};

use crate::chunk::Chunk;
use crate::error::Result;
use crate::store::StoreHandle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    /// Hits fetched from each store.
    pub top_k: usize,
    pub max_results: usize,
    /// Queries at or below this doc relevance get no context.
    pub need_doc_threshold: f32,
    pub classifier_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 6,
            max_results: 6,
            need_doc_threshold: 0.5,
            classifier_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-store hits with their cosine distance, nearest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreHits {
    pub text: Vec<(Chunk, f32)>,
    pub code: Vec<(Chunk, f32)>,
    pub comment: Vec<(Chunk, f32)>,
}

impl StoreHits {
    fn candidates(&self) -> ScoredCandidates {
        let strip = |hits: &[(Chunk, f32)]| {
            hits.iter()
                .map(|(c, d)| (c.content.clone(), *d))
                .collect::<Vec<_>>()
        };
        ScoredCandidates {
            text: strip(&self.text),
            code: strip(&self.code),
            comment: strip(&self.comment),
        }
    }
}

pub struct HybridRetriever<P: EmbedProvider> {
    stores: StoreHandle,
    text_embedder: Arc<P>,
    code_embedder: Arc<P>,
    classifier: Option<Arc<dyn RelevanceClassifier>>,
    config: RetrievalConfig,
}

impl<P: EmbedProvider> HybridRetriever<P> {
    #[must_use]
    pub fn new(
        stores: StoreHandle,
        text_embedder: Arc<P>,
        code_embedder: Arc<P>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            stores,
            text_embedder,
            code_embedder,
            classifier: None,
            config,
        }
    }

    /// Enable classifier-driven reranking.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn RelevanceClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Fetch the nearest `top_k` chunks from each store of the current
    /// snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query fails.
    pub async fn candidates(&self, query: &str) -> Result<StoreHits> {
        let text_query = self.text_embedder.embed(query).await?;
        let code_query = if Arc::ptr_eq(&self.text_embedder, &self.code_embedder) {
            text_query.clone()
        } else {
            self.code_embedder.embed(query).await?
        };

        let snapshot = self.stores.snapshot();
        let k = self.config.top_k;
        Ok(StoreHits {
            text: snapshot.text.similarity_search(&text_query, k),
            code: snapshot.code.similarity_search(&code_query, k),
            comment: snapshot.comment.similarity_search(&text_query, k),
        })
    }

    /// Retrieve context chunks for `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query fails. Classifier failures
    /// fall back to round-robin.
    pub async fn search(&self, query: &str) -> Result<Vec<Chunk>> {
        let hits = self.candidates(query).await?;
        let Some(classifier) = &self.classifier else {
            return Ok(round_robin(hits, self.config.max_results));
        };

        let candidates = hits.candidates();
        let verdict = tokio::time::timeout(
            self.config.classifier_timeout,
            classifier.classify(query, &candidates),
        )
        .await;
        match verdict {
            Ok(Ok(verdict)) => {
                if !verdict.needs_docs(self.config.need_doc_threshold) {
                    tracing::debug!(
                        doc_relevance = verdict.doc_relevance,
                        "query judged unanswerable from docs"
                    );
                    return Ok(Vec::new());
                }
                Ok(rerank(hits, verdict, self.config.max_results))
            }
            Ok(Err(e)) => {
                tracing::warn!("classifier failed, using round-robin: {e}");
                Ok(round_robin(hits, self.config.max_results))
            }
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.classifier_timeout.as_secs(),
                    "classifier timed out, using round-robin"
                );
                Ok(round_robin(hits, self.config.max_results))
            }
        }
    }
}

/// Take one hit per store per round, in text, code, comment order.
#[must_use]
pub fn round_robin(hits: StoreHits, max: usize) -> Vec<Chunk> {
    let mut sources = [
        hits.text.into_iter(),
        hits.code.into_iter(),
        hits.comment.into_iter(),
    ];
    let mut out = Vec::new();
    while out.len() < max {
        let mut progressed = false;
        for source in &mut sources {
            if let Some((chunk, _)) = source.next() {
                out.push(chunk);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    out.truncate(max);
    out
}

/// Score code and comment hits by `code_weight`, prose by the remainder,
/// and keep the best `max`.
#[must_use]
pub fn rerank(hits: StoreHits, verdict: Classification, max: usize) -> Vec<Chunk> {
    let code_weight = verdict.code_weight;
    let text_weight = 1.0 - code_weight;
    let mut scored: Vec<(f32, Chunk)> = hits
        .text
        .into_iter()
        .map(|(c, d)| (text_weight * (1.0 - d), c))
        .chain(
            hits.code
                .into_iter()
                .chain(hits.comment)
                .map(|(c, d)| (code_weight * (1.0 - d), c)),
        )
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().take(max).map(|(_, c)| c).collect()
}
