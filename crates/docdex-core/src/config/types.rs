use std::path::PathBuf;
use std::time::Duration;

pub use docdex_index::{SplitMode, TrackedFile};
use docdex_index::{IndexerConfig, SplitterConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Default split mode for markdown documents.
    #[serde(default)]
    pub mode: SplitMode,
    #[serde(default)]
    pub files: Vec<TrackedFile>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_code_context_length")]
    pub code_context_length: usize,
    #[serde(default = "default_watch")]
    pub watch: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/indices.json")
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_code_context_length() -> usize {
    1
}

fn default_watch() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    5000
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            data_dir: default_data_dir(),
            cache_path: default_cache_path(),
            mode: SplitMode::default(),
            files: Vec::new(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            code_context_length: default_code_context_length(),
            watch: default_watch(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            docs_dir: self.docs_dir.clone(),
            data_dir: self.data_dir.clone(),
            cache_path: self.cache_path.clone(),
            mode: self.mode,
            splitter: SplitterConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
                code_context_length: self.code_context_length,
            },
        }
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Embedding backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Ollama,
    /// Fixed vectors. Requires the `mock` feature.
    Mock,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model for prose and comments.
    #[serde(default = "default_embedding_model")]
    pub text_model: String,
    #[serde(default = "default_embedding_model")]
    pub code_model: String,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            base_url: default_base_url(),
            text_model: default_embedding_model(),
            code_model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_top_k() -> usize {
    6
}

fn default_max_results() -> usize {
    6
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_classifier_url")]
    pub url: String,
    #[serde(default = "default_need_doc_threshold")]
    pub need_doc_threshold: f32,
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_classifier_url() -> String {
    "http://localhost:8088/classify".into()
}

fn default_need_doc_threshold() -> f32 {
    0.5
}

fn default_classifier_timeout_secs() -> u64 {
    10
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_classifier_url(),
            need_doc_threshold: default_need_doc_threshold(),
            timeout_secs: default_classifier_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PromptConfig {
    #[serde(default = "default_reference_prompt")]
    pub reference_prompt: String,
    #[serde(default = "default_question_prompt")]
    pub question_prompt: String,
    /// Messages starting with this skip retrieval.
    #[serde(default = "default_raw_prefix")]
    pub raw_prefix: String,
    #[serde(default)]
    pub log_queries: bool,
    #[serde(default = "default_query_log_path")]
    pub query_log_path: PathBuf,
    /// Print every built prompt.
    #[serde(default)]
    pub debug: bool,
}

fn default_reference_prompt() -> String {
    "Answer using the following documentation excerpts where relevant:".into()
}

fn default_question_prompt() -> String {
    "Question: ".into()
}

fn default_raw_prefix() -> String {
    "*raw".into()
}

fn default_query_log_path() -> PathBuf {
    PathBuf::from("user_queries.log")
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            reference_prompt: default_reference_prompt(),
            question_prompt: default_question_prompt(),
            raw_prefix: default_raw_prefix(),
            log_queries: false,
            query_log_path: default_query_log_path(),
            debug: false,
        }
    }
}

impl Config {
    #[must_use]
    pub fn retrieval_config(&self) -> docdex_index::RetrievalConfig {
        docdex_index::RetrievalConfig {
            top_k: self.retrieval.top_k,
            max_results: self.retrieval.max_results,
            need_doc_threshold: self.classifier.need_doc_threshold,
            classifier_timeout: Duration::from_secs(self.classifier.timeout_secs),
        }
    }
}
