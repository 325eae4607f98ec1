//! Building embedders, the indexer and the retriever from `Config`.

use std::sync::Arc;

use anyhow::Context;
use docdex_index::{HybridRetriever, Indexer, StoreHandle, StoreKind};
use docdex_llm::AnyEmbedder;
use docdex_llm::RelevanceClassifier;
use docdex_llm::classifier::HttpClassifier;
use docdex_llm::ollama::OllamaProvider;

use crate::config::{ClassifierConfig, Config, EmbeddingConfig, EmbeddingProviderKind, IndexConfig};

pub type DocIndexer = Indexer<AnyEmbedder>;

/// One embedder per logical collection. Shared when both use the same model.
#[derive(Debug, Clone)]
pub struct Embedders {
    pub text: Arc<AnyEmbedder>,
    pub code: Arc<AnyEmbedder>,
}

impl Embedders {
    /// # Errors
    ///
    /// Returns an error if the configured provider is unavailable in this build.
    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        match config.provider {
            EmbeddingProviderKind::Ollama => {
                let text = Arc::new(AnyEmbedder::Ollama(OllamaProvider::new(
                    &config.base_url,
                    config.text_model.clone(),
                )));
                let code = if config.code_model == config.text_model {
                    Arc::clone(&text)
                } else {
                    Arc::new(AnyEmbedder::Ollama(OllamaProvider::new(
                        &config.base_url,
                        config.code_model.clone(),
                    )))
                };
                Ok(Self { text, code })
            }
            #[cfg(feature = "mock")]
            EmbeddingProviderKind::Mock => {
                let mock = Arc::new(AnyEmbedder::Mock(docdex_llm::mock::MockProvider::default()));
                Ok(Self {
                    text: Arc::clone(&mock),
                    code: mock,
                })
            }
            #[cfg(not(feature = "mock"))]
            EmbeddingProviderKind::Mock => {
                anyhow::bail!("mock embedding provider requires the `mock` feature")
            }
        }
    }
}

/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn build_classifier(
    config: &ClassifierConfig,
) -> anyhow::Result<Option<Arc<dyn RelevanceClassifier>>> {
    if !config.enabled {
        return Ok(None);
    }
    let classifier = HttpClassifier::new(
        config.url.clone(),
        std::time::Duration::from_secs(config.timeout_secs),
    )
    .context("failed to build classifier client")?;
    tracing::info!(url = %config.url, "relevance classifier enabled");
    Ok(Some(Arc::new(classifier)))
}

/// Create the per-kind store directories under the data dir.
///
/// # Errors
///
/// Returns an error if a directory cannot be created.
pub fn ensure_data_dirs(config: &IndexConfig) -> anyhow::Result<()> {
    for kind in StoreKind::ALL {
        let dir = config.data_dir.join(kind.dir_name());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// # Errors
///
/// Returns an error if the data dirs cannot be created or the docs root
/// cannot be resolved.
pub fn build_indexer(config: &Config, embedders: &Embedders) -> anyhow::Result<DocIndexer> {
    ensure_data_dirs(&config.index)?;
    let indexer = Indexer::new(
        config.index.indexer_config(),
        config.index.files.clone(),
        Arc::clone(&embedders.text),
        Arc::clone(&embedders.code),
    )
    .context("failed to create indexer")?;
    Ok(indexer)
}

/// # Errors
///
/// Returns an error if the classifier is enabled but cannot be built.
pub fn build_retriever(
    config: &Config,
    embedders: &Embedders,
    stores: StoreHandle,
) -> anyhow::Result<HybridRetriever<AnyEmbedder>> {
    let retriever = HybridRetriever::new(
        stores,
        Arc::clone(&embedders.text),
        Arc::clone(&embedders.code),
        config.retrieval_config(),
    );
    Ok(match build_classifier(&config.classifier)? {
        Some(classifier) => retriever.with_classifier(classifier),
        None => retriever,
    })
}
