//! Mode-driven routing of loaded chunks to the code or text splitter.

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::code_splitter::CodeSplitter;
use crate::text_splitter::TextSplitter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SplitMode {
    TextOnly,
    CodeOnly,
    #[default]
    TextCode,
}

impl std::str::FromStr for SplitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text-only" => Ok(Self::TextOnly),
            "code-only" => Ok(Self::CodeOnly),
            "text-code" => Ok(Self::TextCode),
            other => Err(format!("unknown split mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Neighbouring sub-chunks attached as context in `text-code` mode.
    pub code_context_length: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            code_context_length: 1,
        }
    }
}

#[derive(Debug)]
pub struct DocumentSplitter {
    code: CodeSplitter,
    text: TextSplitter,
    code_context_length: usize,
}

impl DocumentSplitter {
    #[must_use]
    pub fn new(config: SplitterConfig) -> Self {
        Self {
            code: CodeSplitter::new(config.chunk_size, config.chunk_overlap),
            text: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            code_context_length: config.code_context_length,
        }
    }

    /// Split loaded chunks into a flat sequence in document order.
    #[must_use]
    pub fn split_documents(&self, chunks: &[Chunk], mode: SplitMode) -> Vec<Chunk> {
        match mode {
            SplitMode::TextOnly => chunks.iter().flat_map(|c| self.text.split(c)).collect(),
            SplitMode::CodeOnly => chunks.iter().flat_map(|c| self.code.split(c)).collect(),
            SplitMode::TextCode => self.split_text_code(chunks),
        }
    }

    fn split_text_code(&self, chunks: &[Chunk]) -> Vec<Chunk> {
        let mut groups: Vec<Vec<Chunk>> = chunks
            .iter()
            .map(|chunk| {
                if chunk.is_code && chunk.language.is_some() {
                    self.code.split(chunk)
                } else {
                    if chunk.is_code {
                        tracing::warn!(
                            source = %chunk.source,
                            "unrecognized code language, splitting as text"
                        );
                    }
                    self.text.split(chunk)
                }
            })
            .collect();

        let n = self.code_context_length;
        if n > 0 {
            let contexts: Vec<(Option<String>, Option<String>)> = (0..groups.len())
                .map(|i| {
                    let prev = i
                        .checked_sub(1)
                        .and_then(|p| joined(&groups[p][groups[p].len().saturating_sub(n)..]));
                    let next = groups
                        .get(i + 1)
                        .and_then(|g| joined(&g[..n.min(g.len())]));
                    (prev, next)
                })
                .collect();

            for (group, (prev, next)) in groups.iter_mut().zip(contexts) {
                if let Some(first) = group.first_mut()
                    && prev.is_some()
                {
                    first.prev_context = prev;
                }
                if let Some(last) = group.last_mut()
                    && next.is_some()
                {
                    last.next_context = next;
                }
            }
        }

        groups.into_iter().flatten().collect()
    }
}

fn joined(chunks: &[Chunk]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    let text = chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    (!text.is_empty()).then_some(text)
}
