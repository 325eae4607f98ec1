//! Applies watcher batches to the shared indexer and persists the result.

use std::path::PathBuf;
use std::sync::Arc;

use docdex_index::indexer::ChangeOp;
use docdex_index::{Indexer, ReindexHandler};
use docdex_llm::EmbedProvider;
use tokio::sync::Mutex;

use crate::config::save_tracked_files;

pub struct ReindexService<P: EmbedProvider> {
    indexer: Arc<Mutex<Indexer<P>>>,
    config_path: PathBuf,
}

impl<P: EmbedProvider> ReindexService<P> {
    #[must_use]
    pub fn new(indexer: Arc<Mutex<Indexer<P>>>, config_path: PathBuf) -> Self {
        Self {
            indexer,
            config_path,
        }
    }
}

impl<P: EmbedProvider + 'static> ReindexHandler for ReindexService<P> {
    async fn reindex(&self, batch: Vec<(PathBuf, ChangeOp)>) {
        let mut indexer = self.indexer.lock().await;
        let report = indexer.reindex(batch).await;
        if let Err(e) = indexer.persist() {
            tracing::warn!("failed to persist index cache: {e:#}");
        }
        if let Err(e) = save_tracked_files(&self.config_path, indexer.tracked_files()) {
            tracing::warn!(path = %self.config_path.display(), "failed to save file list: {e:#}");
        }
        tracing::debug!(?report, "batch persisted");
    }
}

#[cfg(test)]
mod tests {
    use docdex_index::{IndexerConfig, TrackedFile};
    use docdex_llm::mock::MockProvider;
    use serial_test::serial;

    use super::*;
    use crate::config::Config;

    #[tokio::test]
    #[serial]
    async fn batch_updates_cache_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let docs_dir = dir.path().join("docs");
        std::fs::create_dir_all(&docs_dir).unwrap();
        std::fs::write(docs_dir.join("a.md"), "Alpha docs.").unwrap();
        let config_path = dir.path().join("docdex.toml");
        std::fs::write(&config_path, "[index]\nchunk_size = 300\nfiles = []\n").unwrap();

        let cache_path = dir.path().join("data").join("indices.json");
        let provider = Arc::new(MockProvider::with_embedding(vec![1.0, 0.0]));
        let indexer = Indexer::new(
            IndexerConfig {
                docs_dir: docs_dir.clone(),
                data_dir: dir.path().join("data"),
                cache_path: cache_path.clone(),
                ..IndexerConfig::default()
            },
            Vec::new(),
            Arc::clone(&provider),
            provider,
        )
        .unwrap();
        let indexer = Arc::new(Mutex::new(indexer));
        let service = ReindexService::new(Arc::clone(&indexer), config_path.clone());

        let doc = std::path::absolute(docs_dir.join("a.md")).unwrap();
        service.reindex(vec![(doc, ChangeOp::Add)]).await;

        assert!(cache_path.exists());
        let text = std::fs::read_to_string(&cache_path).unwrap();
        assert!(text.contains("a.md-0"));

        let saved = Config::load(&config_path).unwrap();
        assert_eq!(saved.index.files, vec![TrackedFile::Path("a.md".into())]);
        assert_eq!(saved.index.chunk_size, 300);
        assert_eq!(indexer.lock().await.handle().snapshot().text.len(), 1);
    }
}
