//! Query relevance classification used to rerank hybrid search results.
//!
//! A classifier looks at the query (and, if it wants, the candidate hits)
//! and answers two questions: is the corpus likely to answer this at all,
//! and how much should code outweigh prose when ranking.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::LlmError;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Share of ranking weight the classifier may hand to code. Prose always
/// keeps the remainder.
pub const MAX_CODE_WEIGHT: f32 = 0.8;

/// Candidate texts with their similarity distance, one list per store.
#[derive(Debug, Clone, Default)]
pub struct ScoredCandidates {
    pub text: Vec<(String, f32)>,
    pub code: Vec<(String, f32)>,
    pub comment: Vec<(String, f32)>,
}

/// Classifier verdict for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// Probability that the corpus can answer the query.
    pub doc_relevance: f32,
    /// Fraction of ranking weight given to code and comment hits.
    pub code_weight: f32,
}

impl Classification {
    /// Build a verdict from raw `[code, doc]` logits.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MalformedLogits`] if fewer than two logits are given.
    pub fn from_logits(logits: &[f32]) -> Result<Self, LlmError> {
        let [code, doc, ..] = logits else {
            return Err(LlmError::MalformedLogits { got: logits.len() });
        };
        Ok(Self {
            doc_relevance: sigmoid(*doc),
            code_weight: sigmoid(*code) * MAX_CODE_WEIGHT,
        })
    }

    /// Whether the query should be answered from the corpus at all.
    #[must_use]
    pub fn needs_docs(&self, threshold: f32) -> bool {
        self.doc_relevance > threshold
    }
}

pub trait RelevanceClassifier: Send + Sync {
    fn classify<'a>(
        &'a self,
        query: &'a str,
        candidates: &'a ScoredCandidates,
    ) -> BoxFuture<'a, Result<Classification, LlmError>>;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    query: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    logits: Vec<f32>,
}

/// Sequence classifier served over HTTP.
///
/// Posts `{"query": ...}` and expects `{"logits": [code, doc]}` back.
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpClassifier {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl RelevanceClassifier for HttpClassifier {
    fn classify<'a>(
        &'a self,
        query: &'a str,
        _candidates: &'a ScoredCandidates,
    ) -> BoxFuture<'a, Result<Classification, LlmError>> {
        Box::pin(async move {
            let response: ClassifyResponse = self
                .client
                .post(&self.url)
                .json(&ClassifyRequest { query })
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            tracing::debug!(logits = ?response.logits, "classifier response");
            Classification::from_logits(&response.logits)
        })
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
