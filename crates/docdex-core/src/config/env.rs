use std::path::PathBuf;

use super::{Config, EmbeddingProviderKind, SplitMode};

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_index();
        self.apply_env_overrides_models();
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("DOCDEX_DOCS_DIR") {
            self.index.docs_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCDEX_DATA_DIR") {
            self.index.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOCDEX_MODE") {
            match v.parse::<SplitMode>() {
                Ok(mode) => self.index.mode = mode,
                Err(_) => tracing::warn!("ignoring invalid DOCDEX_MODE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DOCDEX_CHUNK_SIZE") {
            match v.parse::<usize>() {
                Ok(size) if size > 0 => self.index.chunk_size = size,
                _ => tracing::warn!("ignoring invalid DOCDEX_CHUNK_SIZE value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DOCDEX_CHUNK_OVERLAP") {
            match v.parse::<usize>() {
                Ok(overlap) => self.index.chunk_overlap = overlap,
                Err(_) => tracing::warn!("ignoring invalid DOCDEX_CHUNK_OVERLAP value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DOCDEX_DEBOUNCE_MS") {
            match v.parse::<u64>() {
                Ok(ms) => self.index.debounce_ms = ms,
                Err(_) => tracing::warn!("ignoring invalid DOCDEX_DEBOUNCE_MS value: {v}"),
            }
        }
    }

    fn apply_env_overrides_models(&mut self) {
        if let Ok(v) = std::env::var("DOCDEX_EMBEDDING_PROVIDER") {
            match v.as_str() {
                "ollama" => self.embedding.provider = EmbeddingProviderKind::Ollama,
                "mock" => self.embedding.provider = EmbeddingProviderKind::Mock,
                _ => tracing::warn!("ignoring invalid DOCDEX_EMBEDDING_PROVIDER value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DOCDEX_EMBEDDING_BASE_URL") {
            self.embedding.base_url = v;
        }
        if let Ok(v) = std::env::var("DOCDEX_TEXT_MODEL") {
            self.embedding.text_model = v;
        }
        if let Ok(v) = std::env::var("DOCDEX_CODE_MODEL") {
            self.embedding.code_model = v;
        }
        if let Ok(v) = std::env::var("DOCDEX_CLASSIFIER_ENABLED") {
            match v.parse::<bool>() {
                Ok(enabled) => self.classifier.enabled = enabled,
                Err(_) => tracing::warn!("ignoring invalid DOCDEX_CLASSIFIER_ENABLED value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DOCDEX_CLASSIFIER_URL") {
            self.classifier.url = v;
        }
        if let Ok(v) = std::env::var("DOCDEX_NEED_DOC_THRESHOLD") {
            match v.parse::<f32>() {
                Ok(t) if (0.0..=1.0).contains(&t) => self.classifier.need_doc_threshold = t,
                _ => tracing::warn!("ignoring invalid DOCDEX_NEED_DOC_THRESHOLD value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("DOCDEX_LOG_QUERIES") {
            match v.parse::<bool>() {
                Ok(enabled) => self.prompt.log_queries = enabled,
                Err(_) => tracing::warn!("ignoring invalid DOCDEX_LOG_QUERIES value: {v}"),
            }
        }
    }
}
