//! Comment-aware line splitting for code chunks.
//!
//! Tree-sitter is only used to locate comments. Boundaries fall on blank
//! lines or lines that start with a comment, with a hard cap at twice the
//! chunk size.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use tree_sitter::{Node, Parser};

use crate::chunk::Chunk;
use crate::languages::{Lang, is_comment_kind};
use crate::text_splitter::TextSplitter;

/// A comment found in a code chunk. `line` and `column` are zero-based,
/// `column` in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSpan {
    pub line: usize,
    pub column: usize,
    pub text: String,
}

pub struct CodeSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    fallback: TextSplitter,
    /// Parsers are built on first use and reused per language.
    parsers: Mutex<HashMap<Lang, Parser>>,
}

impl std::fmt::Debug for CodeSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeSplitter")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish_non_exhaustive()
    }
}

impl CodeSplitter {
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
            fallback: TextSplitter::new(chunk_size, chunk_overlap),
            parsers: Mutex::new(HashMap::new()),
        }
    }

    /// Split a code chunk. Never fails: without a usable parser the chunk
    /// goes through the paragraph splitter instead.
    #[must_use]
    pub fn split(&self, chunk: &Chunk) -> Vec<Chunk> {
        let comments = chunk
            .language
            .and_then(|lang| self.comments(lang, &chunk.content));

        if char_len(&chunk.content) <= self.chunk_size {
            let mut whole = chunk.clone();
            if let Some(spans) = comments
                && !spans.is_empty()
            {
                whole.comments = Some(join_comments(&spans));
            }
            return vec![whole];
        }

        let Some(comments) = comments else {
            tracing::debug!(
                source = %chunk.source,
                language = ?chunk.language,
                "no syntax analysis available, splitting as text"
            );
            return self.fallback.split(chunk);
        };
        self.split_lines(chunk, &comments)
    }

    /// Parse `source` and collect its comments in document order.
    ///
    /// Returns `None` if the language has no grammar or parsing fails.
    #[must_use]
    pub fn comments(&self, lang: Lang, source: &str) -> Option<Vec<CommentSpan>> {
        let grammar = lang.grammar()?;
        let mut parsers = self.parsers.lock().unwrap_or_else(PoisonError::into_inner);
        let parser = match parsers.entry(lang) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let mut parser = Parser::new();
                if let Err(err) = parser.set_language(&grammar) {
                    tracing::warn!(language = %lang, "set_language failed: {err}");
                    return None;
                }
                e.insert(parser)
            }
        };
        let tree = parser.parse(source, None)?;
        Some(collect_comments(tree.root_node(), source))
    }

    fn split_lines(&self, chunk: &Chunk, comments: &[CommentSpan]) -> Vec<Chunk> {
        let lines: Vec<&str> = chunk.content.split('\n').collect();
        let bounds = self.line_bounds(&lines, comments);
        let mut pending = comments.iter().peekable();
        let mut out = Vec::with_capacity(bounds.len());

        for (idx, &(start, end)) in bounds.iter().enumerate() {
            let mut part = chunk.derive(lines[start..end].join("\n"));

            let mut attributed = Vec::new();
            while let Some(comment) = pending.next_if(|c| c.line < end) {
                attributed.push(comment.text.as_str());
            }
            if !attributed.is_empty() {
                part.comments = Some(attributed.join("\n"));
            }

            part.prev_context = if idx == 0 {
                chunk.prev_context.clone()
            } else {
                let (prev_start, prev_end) = bounds[idx - 1];
                self.overlap_tail(&lines[prev_start..prev_end])
            };
            if idx + 1 == bounds.len() {
                part.next_context.clone_from(&chunk.next_context);
            }
            out.push(part);
        }
        out
    }

    /// Half-open line ranges covering every line exactly once.
    fn line_bounds(&self, lines: &[&str], comments: &[CommentSpan]) -> Vec<(usize, usize)> {
        let leading: HashSet<usize> = comments
            .iter()
            .filter(|c| lines.get(c.line).is_some_and(|l| indent_width(l) == c.column))
            .map(|c| c.line)
            .collect();
        let soft = self.chunk_size / 2;
        let hard = self.chunk_size.saturating_mul(2);

        let mut bounds = Vec::new();
        let mut start = 0;
        let mut running = 0;
        for (i, line) in lines.iter().enumerate() {
            let boundary = line.trim().is_empty() || leading.contains(&i);
            if i > start && boundary && running > soft {
                bounds.push((start, i));
                start = i;
                running = 0;
            }
            running += char_len(line) + 1;
            if running > hard {
                bounds.push((start, i + 1));
                start = i + 1;
                running = 0;
            }
        }

        if start < lines.len() {
            let blank_tail = lines[start..].iter().all(|l| l.trim().is_empty());
            match bounds.last_mut() {
                Some(last) if blank_tail => last.1 = lines.len(),
                _ => bounds.push((start, lines.len())),
            }
        }
        bounds
    }

    fn overlap_tail(&self, prev: &[&str]) -> Option<String> {
        if self.chunk_overlap == 0 {
            return None;
        }
        let mut taken = Vec::new();
        let mut total = 0;
        for line in prev.iter().rev() {
            taken.push(*line);
            total += char_len(line) + 1;
            if total > self.chunk_overlap {
                break;
            }
        }
        taken.reverse();
        let tail = taken.join("\n");
        (!tail.trim().is_empty()).then_some(tail)
    }
}

fn collect_comments(root: Node<'_>, source: &str) -> Vec<CommentSpan> {
    let mut spans = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if is_comment_kind(node.kind()) {
            if let Ok(text) = node.utf8_text(source.as_bytes()) {
                let start = node.start_position();
                spans.push(CommentSpan {
                    line: start.row,
                    column: start.column,
                    text: text.trim_end().to_owned(),
                });
            }
            continue;
        }
        let count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
        for i in (0..count).rev() {
            if let Some(child) = node.named_child(i) {
                stack.push(child);
            }
        }
    }
    spans.sort_by_key(|s| (s.line, s.column));
    spans
}

fn join_comments(spans: &[CommentSpan]) -> String {
    spans
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
