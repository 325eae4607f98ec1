#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::provider::EmbedProvider;

macro_rules! delegate_embedder {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyEmbedder::Ollama($p) => $expr,
            #[cfg(feature = "mock")]
            AnyEmbedder::Mock($p) => $expr,
        }
    };
}

/// Runtime-selected embedding backend.
#[derive(Debug, Clone)]
pub enum AnyEmbedder {
    Ollama(OllamaProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl EmbedProvider for AnyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, crate::LlmError> {
        delegate_embedder!(self, |p| p.embed(text).await)
    }

    fn name(&self) -> &str {
        delegate_embedder!(self, |p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_variant_reports_name() {
        let any = AnyEmbedder::Ollama(OllamaProvider::new(
            "http://localhost:11434",
            "nomic-embed-text".into(),
        ));
        assert_eq!(any.name(), "ollama");
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn embed_delegates_to_mock() {
        let any = AnyEmbedder::Mock(MockProvider::with_embedding(vec![0.5, 0.5]));
        let vector = any.embed("anything").await.unwrap();
        assert_eq!(vector, vec![0.5, 0.5]);
    }
}
