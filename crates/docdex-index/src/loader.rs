//! Turning raw document text into tagged chunks.

use std::path::Path;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::chunk::Chunk;
use crate::error::Result;
use crate::languages::{Lang, detect_language};

/// Fenced blocks without a tag are assumed to hold this language.
pub const DEFAULT_FENCE_LANG: Lang = Lang::Python;

pub trait DocumentLoader: Send + Sync {
    /// Split `text` into chunks attributed to `source`.
    fn parse(&self, text: &str, source: &str) -> Vec<Chunk>;

    /// Read `path` from disk and parse it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn load(&self, path: &Path, source: &str) -> Result<Vec<Chunk>> {
        let bytes = std::fs::read(path)?;
        Ok(self.parse(&String::from_utf8_lossy(&bytes), source))
    }
}

/// Splits markdown into alternating prose and fenced-code chunks, in
/// document order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownLoader;

/// Loads a whole file as one chunk. The language comes from the extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericFileLoader;

/// Pick the loader for a document path.
#[must_use]
pub fn loader_for(path: &Path) -> &'static dyn DocumentLoader {
    if is_markdown(path) {
        &MarkdownLoader
    } else {
        &GenericFileLoader
    }
}

#[must_use]
pub fn is_markdown(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md" | "markdown")
    )
}

fn push_prose(out: &mut Vec<Chunk>, text: &str, source: &str) {
    let text = text.trim();
    if !text.is_empty() {
        out.push(Chunk::prose(text, source));
    }
}

/// Whether the raw block text ends with its own closing fence. An
/// unterminated fence runs to the end of the document in CommonMark.
fn has_closing_fence<'a>(raw: &'a str) -> bool {
    let mut lines = raw.trim_end().lines();
    let Some(open) = lines.next() else {
        return false;
    };
    let Some(last) = lines.last() else {
        return false;
    };
    let strip = |line: &'a str| line.trim_start_matches(|c: char| c == '>' || c.is_whitespace());
    let open = strip(open);
    let last = strip(last).trim_end();
    let Some(marker) = open.chars().next() else {
        return false;
    };
    let open_len = open.chars().take_while(|&c| c == marker).count();
    last.len() >= open_len && last.chars().all(|c| c == marker)
}

struct FencedBlock {
    tag: String,
    start: usize,
    code: String,
}

impl DocumentLoader for MarkdownLoader {
    fn parse(&self, text: &str, source: &str) -> Vec<Chunk> {
        let mut out = Vec::new();
        let mut prose_start = 0;
        let mut block: Option<FencedBlock> = None;

        for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
            match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                    block = Some(FencedBlock {
                        tag: info.split_whitespace().next().unwrap_or("").to_owned(),
                        start: range.start,
                        code: String::new(),
                    });
                }
                Event::Text(code) => {
                    if let Some(block) = block.as_mut() {
                        block.code.push_str(&code);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    let Some(done) = block.take() else {
                        continue;
                    };
                    if !has_closing_fence(&text[done.start..range.end]) {
                        // Unterminated fence: the rest of the file stays prose.
                        break;
                    }
                    push_prose(&mut out, &text[prose_start..done.start], source);
                    prose_start = range.end;

                    let code = done.code.trim_matches('\n');
                    if code.trim().is_empty() {
                        continue;
                    }
                    let language = if done.tag.is_empty() {
                        Some(DEFAULT_FENCE_LANG)
                    } else {
                        Lang::from_tag(&done.tag)
                    };
                    if language.is_none() {
                        tracing::debug!(source, tag = %done.tag, "unrecognized fence language");
                    }
                    out.push(Chunk::code_block(code, language, source));
                }
                _ => {}
            }
        }

        push_prose(&mut out, &text[prose_start..], source);
        out
    }
}

impl DocumentLoader for GenericFileLoader {
    fn parse(&self, text: &str, source: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let language = detect_language(Path::new(source)).unwrap_or_else(|| {
            tracing::warn!(source, "unknown file extension, treating as text");
            Lang::Text
        });
        vec![Chunk::code_block(text, Some(language), source)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_preserves_document_order() {
        let md = "# Title\n\nIntro text.\n\n```rust\nfn main() {}\n```\n\nMore prose.\n\n```js\nlet x = 1;\n```\n";
        let chunks = MarkdownLoader.parse(md, "guide.md");
        assert_eq!(chunks.len(), 4);
        assert!(!chunks[0].is_code);
        assert_eq!(chunks[0].content, "# Title\n\nIntro text.");
        assert!(chunks[1].is_code);
        assert_eq!(chunks[1].language, Some(Lang::Rust));
        assert_eq!(chunks[1].content, "fn main() {}");
        assert_eq!(chunks[2].content, "More prose.");
        assert_eq!(chunks[3].language, Some(Lang::JavaScript));
        assert!(chunks.iter().all(|c| c.source == "guide.md"));
    }

    #[test]
    fn untagged_fence_defaults_to_python() {
        let chunks = MarkdownLoader.parse("```\nprint(1)\n```", "a.md");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].language, Some(DEFAULT_FENCE_LANG));
    }

    #[test]
    fn unknown_fence_tag_is_code_without_language() {
        let chunks = MarkdownLoader.parse("```cobol\nDISPLAY 'HI'.\n```", "a.md");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_code);
        assert_eq!(chunks[0].language, None);
    }

    #[test]
    fn unterminated_fence_is_prose() {
        let md = "Intro\n```python\nprint(1)\n";
        let chunks = MarkdownLoader.parse(md, "a.md");
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].is_code);
        assert!(chunks[0].content.contains("print(1)"));
    }

    #[test]
    fn tilde_fences_are_code() {
        let chunks = MarkdownLoader.parse("Intro\n\n~~~rust\nfn a() {}\n~~~\n", "a.md");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Chunk::prose("Intro", "a.md"));
        assert!(chunks[1].is_code);
        assert_eq!(chunks[1].language, Some(Lang::Rust));
        assert_eq!(chunks[1].content, "fn a() {}");
    }

    #[test]
    fn longer_fence_wraps_inner_backticks() {
        let md = "Intro\n\n````md\n```python\nprint(1)\n```\n````\n\nOutro";
        let chunks = MarkdownLoader.parse(md, "a.md");
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "Intro");
        assert!(chunks[1].is_code);
        assert_eq!(chunks[1].content, "```python\nprint(1)\n```");
        assert_eq!(chunks[1].language, None);
        assert_eq!(chunks[2], Chunk::prose("Outro", "a.md"));
    }

    #[test]
    fn info_string_uses_first_word() {
        let chunks = MarkdownLoader.parse("```js title=\"x\"\nlet a = 1;\n```", "a.md");
        assert_eq!(chunks[0].language, Some(Lang::JavaScript));
    }

    #[test]
    fn indented_code_stays_prose() {
        let md = "Intro\n\n    let x = 1;\n\nOutro";
        let chunks = MarkdownLoader.parse(md, "a.md");
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].is_code);
    }

    #[test]
    fn empty_code_blocks_are_dropped() {
        let chunks = MarkdownLoader.parse("text\n```rust\n```\n", "a.md");
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].is_code);
    }

    #[test]
    fn generic_loader_tags_language_from_extension() {
        let chunks = GenericFileLoader.parse("fn main() {}\n", "src/main.rs");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_code);
        assert_eq!(chunks[0].language, Some(Lang::Rust));
        assert_eq!(chunks[0].content, "fn main() {}\n");
    }

    #[test]
    fn generic_loader_unknown_extension_is_text() {
        let chunks = GenericFileLoader.parse("whatever", "notes.xyz");
        assert_eq!(chunks[0].language, Some(Lang::Text));
    }

    #[test]
    fn generic_loader_skips_blank_files() {
        assert!(GenericFileLoader.parse("  \n", "a.rs").is_empty());
    }

    #[test]
    fn loader_for_dispatches_on_extension() {
        let md = loader_for(Path::new("docs/guide.md")).parse("```rust\nfn a() {}\n```", "guide.md");
        assert_eq!(md[0].content, "fn a() {}");
        let raw = loader_for(Path::new("src/lib.rs")).parse("fn a() {}", "lib.rs");
        assert_eq!(raw[0].content, "fn a() {}");
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("guide.md");
        std::fs::write(&file, "Hello docs.").unwrap();
        let chunks = MarkdownLoader.load(&file, "guide.md").unwrap();
        assert_eq!(chunks, vec![Chunk::prose("Hello docs.", "guide.md")]);
    }
}
