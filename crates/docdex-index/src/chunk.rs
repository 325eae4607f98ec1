//! The unit of text flowing from loaders through splitters into stores.

use serde::{Deserialize, Serialize};

use crate::languages::Lang;

/// A piece of a document with routing and context metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub is_code: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Lang>,
    /// Path of the originating document, relative to the docs root.
    pub source: String,
    /// Comments attributed to this code chunk, newline-joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    /// Code this chunk was derived from. Set on comment-store chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl Chunk {
    #[must_use]
    pub fn prose(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_code: false,
            language: None,
            source: source.into(),
            comments: None,
            code: None,
            prev_context: None,
            next_context: None,
            id: None,
        }
    }

    #[must_use]
    pub fn code_block(
        content: impl Into<String>,
        language: Option<Lang>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            is_code: true,
            language,
            ..Self::prose(content, source)
        }
    }

    /// Copy of this chunk's metadata carrying different content.
    ///
    /// Context, comments and id are reset; splitters fill them in again.
    #[must_use]
    pub fn derive(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_code: self.is_code,
            language: self.language,
            source: self.source.clone(),
            ..Self::prose(String::new(), String::new())
        }
    }

    /// Text shown to the answering model: the source code for comment chunks,
    /// the content otherwise.
    #[must_use]
    pub fn display_text(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.content)
    }
}
