//! Paragraph-boundary text chunker.
//!
//! Splits document text on blank lines (CRLF and whitespace-only lines
//! included) and greedily packs paragraphs into
//! chunks of at most `max_chars` characters. A paragraph that alone exceeds
//! the budget is emitted whole as an oversized chunk; it is never split
//! mid-sentence. Chunks shorter than `min_chars` are dropped.
//!
//! [`Chunker::chunks`] is lazy and borrows the input, so the same text can
//! be chunked again from the start at any time.

use regex::{Regex, Split};
use std::sync::OnceLock;

use crate::config::ChunkingConfig;
use crate::models::TextChunk;

/// Joins paragraphs packed into one chunk.
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// A line break followed by a line holding nothing but spaces or tabs.
fn blank_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\r?\n[ \t]*\r?\n").expect("blank line pattern compiles"))
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
    min_chars: usize,
}

impl Chunker {
    pub fn new(max_chars: usize, min_chars: usize) -> Self {
        Self {
            max_chars,
            min_chars,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.max_chars, config.min_chars)
    }

    /// Lazily yield chunk texts in document order.
    pub fn chunks<'a>(&self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        let min_chars = self.min_chars;
        Paragraphs {
            paragraphs: blank_line().split(text),
            buffer: String::new(),
            buffer_chars: 0,
            max_chars: self.max_chars,
            done: false,
        }
        .filter(move |chunk| chunk.chars().count() >= min_chars)
    }

    /// Chunk one document, numbering the surviving chunks from 0.
    pub fn chunk_document<'a>(
        &self,
        document_id: &'a str,
        chapter_label: &'a str,
        text: &'a str,
    ) -> impl Iterator<Item = TextChunk> + 'a {
        self.chunks(text)
            .enumerate()
            .map(move |(sequence, text)| TextChunk {
                document_id: document_id.to_string(),
                chapter_label: chapter_label.to_string(),
                sequence,
                text,
            })
    }
}

struct Paragraphs<'a> {
    paragraphs: Split<'static, 'a>,
    buffer: String,
    buffer_chars: usize,
    max_chars: usize,
    done: bool,
}

impl Paragraphs<'_> {
    fn take_buffer(&mut self) -> String {
        self.buffer_chars = 0;
        std::mem::take(&mut self.buffer)
    }
}

impl Iterator for Paragraphs<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }

        for para in self.paragraphs.by_ref() {
            let trimmed = para.trim();
            if trimmed.is_empty() {
                continue;
            }
            let para_chars = trimmed.chars().count();

            // +2 for the \n\n separator
            let would_be = if self.buffer.is_empty() {
                para_chars
            } else {
                self.buffer_chars + 2 + para_chars
            };

            if would_be > self.max_chars && !self.buffer.is_empty() {
                let flushed = self.take_buffer();
                self.buffer.push_str(trimmed);
                self.buffer_chars = para_chars;
                return Some(flushed);
            }

            if !self.buffer.is_empty() {
                self.buffer.push_str(PARAGRAPH_SEPARATOR);
            }
            self.buffer.push_str(trimmed);
            self.buffer_chars = would_be;
        }

        self.done = true;
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take_buffer())
        }
    }
}

/// Human-readable chapter label from a file name.
///
/// `chapter-5-about-management.txt` becomes `Chapter 5 About Management`.
pub fn chapter_label(filename: &str) -> String {
    let stem = filename.strip_suffix(".txt").unwrap_or(filename);
    stem.split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collection title from a folder name (`Mythical-Man-Month` → `Mythical Man Month`).
pub fn collection_title(collection: &str) -> String {
    collection.replace(['-', '_'], " ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn para(c: char, len: usize) -> String {
        std::iter::repeat(c).take(len).collect()
    }

    #[test]
    fn test_short_text_discarded() {
        let chunker = Chunker::new(800, 100);
        assert_eq!(chunker.chunks("Hello, world!").count(), 0);
    }

    #[test]
    fn test_empty_text() {
        let chunker = Chunker::new(800, 100);
        assert_eq!(chunker.chunks("").count(), 0);
        assert_eq!(chunker.chunks("\n\n\n\n").count(), 0);
    }

    #[test]
    fn test_paragraphs_packed_under_budget() {
        let chunker = Chunker::new(800, 10);
        let text = format!("{}\n\n{}\n\n{}", para('a', 200), para('b', 200), para('c', 200));
        let chunks: Vec<String> = chunker.chunks(&text).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 604);
    }

    #[test]
    fn test_flush_when_budget_exceeded() {
        let chunker = Chunker::new(800, 10);
        let text = format!("{}\n\n{}\n\n{}", para('a', 500), para('b', 400), para('c', 100));
        let chunks: Vec<String> = chunker.chunks(&text).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], para('a', 500));
        assert!(chunks[1].starts_with('b'));
        assert!(chunks[1].ends_with('c'));
    }

    #[test]
    fn test_oversized_paragraph_kept_whole() {
        let chunker = Chunker::new(800, 100);
        let big = para('x', 2000);
        let text = format!("{}\n\n{}\n\n{}", para('a', 150), big, para('b', 150));
        let chunks: Vec<String> = chunker.chunks(&text).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1], big);
    }

    #[test]
    fn test_every_chunk_meets_minimum() {
        let chunker = Chunker::new(120, 50);
        let text = (0..40)
            .map(|i| format!("Paragraph number {} has a little bit of text.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks: Vec<String> = chunker.chunks(&text).collect();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.chars().count() >= 50, "chunk too small: {:?}", c);
            assert!(!c.trim().is_empty());
        }
    }

    #[test]
    fn test_chunks_are_subsequence_of_source() {
        let chunker = Chunker::new(100, 20);
        let text = "First paragraph here.\n\nSecond paragraph is here.\n\n\n\nThird one follows along nicely.\n\nFourth.";
        let mut cursor = 0;
        for chunk in chunker.chunks(text) {
            for piece in chunk.split(PARAGRAPH_SEPARATOR) {
                let found = text[cursor..].find(piece).expect("piece out of order");
                cursor += found + piece.len();
            }
        }
    }

    #[test]
    fn test_restartable_and_deterministic() {
        let chunker = Chunker::new(60, 10);
        let text = "Alpha paragraph text.\n\nBeta paragraph text.\n\nGamma paragraph text.";
        let a: Vec<String> = chunker.chunks(text).collect();
        let b: Vec<String> = chunker.chunks(text).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sequence_numbers_contiguous() {
        let chunker = Chunker::new(30, 5);
        let text = (0..20)
            .map(|i| format!("Paragraph {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks: Vec<TextChunk> = chunker.chunk_document("doc1", "Ch 1", &text).collect();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence, i, "Index mismatch at position {}", i);
            assert_eq!(c.document_id, "doc1");
        }
    }

    #[test]
    fn test_crlf_and_whitespace_blank_lines_split() {
        let chunker = Chunker::new(800, 100);
        let paras = [para('a', 500), para('b', 500), para('c', 500)];

        let lf: Vec<String> = chunker.chunks(&paras.join("\n\n")).collect();
        let crlf: Vec<String> = chunker.chunks(&paras.join("\r\n\r\n")).collect();
        let spaced: Vec<String> = chunker.chunks(&paras.join("\n \t\n")).collect();

        assert_eq!(lf.len(), 3);
        assert_eq!(crlf, lf);
        assert_eq!(spaced, lf);
        for c in &crlf {
            assert!(c.chars().count() <= 800);
        }
    }

    #[test]
    fn test_chapter_label() {
        assert_eq!(
            chapter_label("chapter-5-about-management.txt"),
            "Chapter 5 About Management"
        );
        assert_eq!(chapter_label("Ch4.txt"), "Ch4");
        assert_eq!(collection_title("Mythical-Man-Month"), "Mythical Man Month");
    }
}
