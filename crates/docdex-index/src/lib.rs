//! Document splitting, incremental indexing and hybrid retrieval.
//!
//! Loaders tag chunks as prose or code, the `DocumentSplitter` routes them
//! through comment-aware code splitting or recursive text splitting, and the
//! `Indexer` embeds them into three in-memory stores (text, code, comment)
//! persisted per document. A debounced watcher keeps the stores current and
//! the `HybridRetriever` fans queries out across all three.

pub mod cache;
pub mod chunk;
pub mod code_splitter;
pub mod context;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod loader;
pub mod retriever;
pub mod splitter;
pub mod store;
pub mod text_splitter;
pub mod watcher;

pub use chunk::Chunk;
pub use context::format_as_context;
pub use error::{IndexError, Result};
pub use indexer::{ChangeOp, IndexReport, Indexer, IndexerConfig, TrackedFile};
pub use retriever::{HybridRetriever, RetrievalConfig};
pub use splitter::{DocumentSplitter, SplitMode, SplitterConfig};
pub use store::{StoreHandle, StoreKind};
pub use watcher::{Debouncer, IndexWatcher, ReindexHandler};
