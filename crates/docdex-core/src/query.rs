//! Turning a user message into a prompt, with retrieved documentation
//! prepended when there is any.

use std::io::Write;

use anyhow::Context;
use docdex_index::{HybridRetriever, format_as_context};
use docdex_llm::EmbedProvider;

use crate::config::PromptConfig;

pub struct QueryHandler<P: EmbedProvider> {
    retriever: HybridRetriever<P>,
    prompt: PromptConfig,
}

impl<P: EmbedProvider> QueryHandler<P> {
    #[must_use]
    pub fn new(retriever: HybridRetriever<P>, prompt: PromptConfig) -> Self {
        Self { retriever, prompt }
    }

    /// Retrieve and format context for `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub async fn context(&self, query: &str) -> anyhow::Result<String> {
        let chunks = self
            .retriever
            .search(query)
            .await
            .context("retrieval failed")?;
        Ok(format_as_context(&chunks))
    }

    /// Build the prompt for one message.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails.
    pub async fn handle(&self, message: &str) -> anyhow::Result<String> {
        let msg = message.trim();
        if self.prompt.log_queries
            && let Err(e) = self.log_query(msg)
        {
            tracing::warn!(path = %self.prompt.query_log_path.display(), "failed to log query: {e}");
        }

        let question = &self.prompt.question_prompt;
        let prompt = if let Some(rest) = msg.strip_prefix(self.prompt.raw_prefix.as_str()) {
            format!("{question}{rest}")
        } else {
            let context = self.context(msg).await?;
            if context.trim().is_empty() {
                format!("{question}{msg}")
            } else {
                format!("{}\n{context}\n{question}{msg}", self.prompt.reference_prompt)
            }
        };

        if self.prompt.debug {
            tracing::info!(%prompt, "built prompt");
        }
        Ok(prompt)
    }

    fn log_query(&self, msg: &str) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.prompt.query_log_path)?;
        writeln!(
            file,
            "[{}] Query: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            msg.replace('\n', "\\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use docdex_index::store::{StoreEntry, StoreSet};
    use docdex_index::{Chunk, RetrievalConfig, StoreHandle};
    use docdex_llm::mock::MockProvider;

    use super::*;

    fn prompt_config() -> PromptConfig {
        PromptConfig {
            reference_prompt: "REF".into(),
            question_prompt: "Q: ".into(),
            ..PromptConfig::default()
        }
    }

    fn handler(stores: StoreSet, prompt: PromptConfig) -> QueryHandler<MockProvider> {
        let embedder = Arc::new(MockProvider::with_embedding(vec![1.0, 0.0]));
        let retriever = HybridRetriever::new(
            StoreHandle::new(stores),
            Arc::clone(&embedder),
            embedder,
            RetrievalConfig::default(),
        );
        QueryHandler::new(retriever, prompt)
    }

    fn one_chunk() -> StoreSet {
        let mut set = StoreSet::default();
        set.text.push(StoreEntry {
            id: "guide.md-0".into(),
            vector: vec![1.0, 0.0],
            chunk: Chunk::prose("Run docdex index.", "guide.md"),
        });
        set
    }

    #[tokio::test]
    async fn context_is_prepended() {
        let h = handler(one_chunk(), prompt_config());
        let prompt = h.handle("  how do I index?  ").await.unwrap();
        assert_eq!(prompt, "REF\n\nRun docdex index.\n\nQ: how do I index?");
    }

    #[tokio::test]
    async fn empty_context_gives_bare_question() {
        let h = handler(StoreSet::default(), prompt_config());
        assert_eq!(h.handle("hello").await.unwrap(), "Q: hello");
    }

    #[tokio::test]
    async fn raw_prefix_skips_retrieval() {
        let h = handler(one_chunk(), prompt_config());
        assert_eq!(h.handle("*raw just chat").await.unwrap(), "Q:  just chat");
    }

    #[tokio::test]
    async fn queries_are_logged_with_escaped_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("queries.log");
        let config = PromptConfig {
            log_queries: true,
            query_log_path: log.clone(),
            ..prompt_config()
        };
        let h = handler(StoreSet::default(), config);
        h.handle("line one\nline two").await.unwrap();
        h.handle("second").await.unwrap();

        let text = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] Query: line one\\nline two"));
        assert_eq!(&lines[0][20..22], "] ");
    }

    #[tokio::test]
    async fn retrieval_failure_is_an_error() {
        let embedder = Arc::new(MockProvider::failing());
        let retriever = HybridRetriever::new(
            StoreHandle::default(),
            Arc::clone(&embedder),
            embedder,
            RetrievalConfig::default(),
        );
        let h = QueryHandler::new(retriever, prompt_config());
        assert!(h.handle("anything").await.is_err());
        assert_eq!(h.handle("*raw still fine").await.unwrap(), "Q:  still fine");
    }
}
