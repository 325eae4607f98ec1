use std::future::Future;

use crate::LlmError;

/// A capability that turns text into an embedding vector.
///
/// One instance backs one logical collection: prose and code comments share
/// a prose model, code gets its own.
pub trait EmbedProvider: Send + Sync {
    /// Embed a single piece of text.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or returns no vector.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    fn name(&self) -> &str;
}
