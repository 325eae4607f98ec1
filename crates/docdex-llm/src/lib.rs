//! Embedding providers and query relevance classifiers.

pub mod any;
pub mod classifier;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod provider;

pub use any::AnyEmbedder;
pub use classifier::{Classification, RelevanceClassifier, ScoredCandidates};
pub use error::LlmError;
pub use provider::EmbedProvider;
