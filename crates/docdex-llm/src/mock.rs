//! Test-only mock embedding provider and classifier.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::LlmError;
use crate::classifier::{BoxFuture, Classification, RelevanceClassifier, ScoredCandidates};
use crate::provider::EmbedProvider;

#[derive(Debug, Clone)]
pub struct MockProvider {
    pub embedding: Vec<f32>,
    pub fail_embed: bool,
    calls: Arc<AtomicUsize>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            embedding: vec![0.0; 384],
            fail_embed: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_embed: true,
            ..Self::default()
        }
    }

    /// Number of `embed` calls served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbedProvider for MockProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(LlmError::Other("mock embed error".into()));
        }
        Ok(self.embedding.clone())
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

#[derive(Debug, Clone)]
pub struct MockClassifier {
    pub verdict: Classification,
    pub fail: bool,
    /// Sleep before answering.
    pub delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl MockClassifier {
    #[must_use]
    pub fn new(doc_relevance: f32, code_weight: f32) -> Self {
        Self {
            verdict: Classification {
                doc_relevance,
                code_weight,
            },
            fail: false,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(1.0, 0.5)
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RelevanceClassifier for MockClassifier {
    fn classify<'a>(
        &'a self,
        _query: &'a str,
        _candidates: &'a ScoredCandidates,
    ) -> BoxFuture<'a, Result<Classification, LlmError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(LlmError::Unavailable);
            }
            Ok(self.verdict)
        })
    }
}
