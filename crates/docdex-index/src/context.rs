//! Rendering retrieved chunks as prompt context.

use crate::chunk::Chunk;

pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Render each chunk with its surrounding context and join them.
///
/// Comment chunks show the code they describe rather than the comment.
#[must_use]
pub fn format_as_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            format!(
                "{}\n{}\n{}",
                chunk.prev_context.as_deref().unwrap_or_default(),
                chunk.display_text(),
                chunk.next_context.as_deref().unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_renders_empty() {
        assert_eq!(format_as_context(&[]), "");
    }

    #[test]
    fn chunks_are_wrapped_in_context_and_separated() {
        let mut first = Chunk::prose("body", "a.md");
        first.prev_context = Some("before".into());
        first.next_context = Some("after".into());
        let second = Chunk::prose("plain", "a.md");
        assert_eq!(
            format_as_context(&[first, second]),
            "before\nbody\nafter\n---\n\nplain\n"
        );
    }

    #[test]
    fn comment_chunks_show_their_code() {
        let mut chunk = Chunk::prose("# adds", "a.md");
        chunk.code = Some("x = 1 + 1".into());
        assert_eq!(format_as_context(&[chunk]), "\nx = 1 + 1\n");
    }
}
