//! Configuration, wiring and the query surface for docdex.

pub mod bootstrap;
pub mod config;
pub mod query;
pub mod reindex;

pub use bootstrap::{DocIndexer, Embedders};
pub use config::Config;
pub use query::QueryHandler;
pub use reindex::ReindexService;
