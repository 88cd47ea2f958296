//! Core data models used throughout groundwork.
//!
//! These types flow through both pipelines: the retrieval side
//! (catalog → chunks → embedding records) and the grading side
//! (response items → citations → grades).

use std::fmt;
use std::path::PathBuf;

/// Sentinel written to the dataset when resolution was attempted and failed.
pub const NOT_FOUND: &str = "NOT_FOUND";

/// One addressable source file in the corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Path relative to the corpus root, always `/`-separated.
    pub relative_path: String,
    pub filename: String,
    /// First path segment under the root (e.g. the book folder).
    pub collection: String,
    pub absolute_path: PathBuf,
}

/// A paragraph-aligned segment of one source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub document_id: String,
    pub chapter_label: String,
    pub sequence: usize,
    pub text: String,
}

/// Metadata that travels with an embedded chunk or item.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMetadata {
    /// Book or talk title.
    pub title: String,
    /// Chapter label or speaker.
    pub section: String,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
}

/// An embedded unit loaded from (or destined for) the vector table.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub metadata: RecordMetadata,
    pub vector: Vec<f32>,
}

/// Terminal outcome of citation resolution.
///
/// An item whose citation is `None` has not been resolved yet; `NotFound`
/// means resolution ran and found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Citation {
    Resolved(String),
    NotFound,
}

impl Citation {
    /// Parse the dataset representation (`path` or `NOT_FOUND`).
    pub fn from_field(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == NOT_FOUND {
            Citation::NotFound
        } else {
            Citation::Resolved(trimmed.to_string())
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Citation::Resolved(p) => Some(p),
            Citation::NotFound => None,
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Citation::Resolved(p) => f.write_str(p),
            Citation::NotFound => f.write_str(NOT_FOUND),
        }
    }
}

/// A graded result for one response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grade {
    Scored { score: u32, justification: String },
    /// Grading failed or the judge output for this item could not be parsed.
    Error { message: String },
}

impl Grade {
    pub fn error(message: impl Into<String>) -> Self {
        Grade::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Grade::Error { .. })
    }

    pub fn score(&self) -> Option<u32> {
        match self {
            Grade::Scored { score, .. } => Some(*score),
            Grade::Error { .. } => None,
        }
    }

    /// Parse the dataset representation (`score|justification` or `ERROR|message`).
    pub fn from_field(value: &str) -> Self {
        let (head, tail) = match value.split_once('|') {
            Some((h, t)) => (h.trim(), t.trim()),
            None => (value.trim(), ""),
        };
        if head == "ERROR" {
            return Grade::error(tail);
        }
        match head.parse::<u32>() {
            Ok(score) => Grade::Scored {
                score,
                justification: tail.to_string(),
            },
            Err(_) => Grade::error(format!("unparseable stored grade: {}", value)),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Scored {
                score,
                justification,
            } => write!(f, "{}|{}", score, justification),
            Grade::Error { message } => write!(f, "ERROR|{}", message),
        }
    }
}

/// One risk/mitigation answer of one student to one question.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseItem {
    pub student: String,
    pub question: u32,
    pub question_prompt: String,
    pub risk: u32,
    pub response_text: String,
    pub ai_usage: String,
    pub citation: Option<Citation>,
    pub grade: Option<Grade>,
}

impl ResponseItem {
    /// Resolved source path, if any.
    pub fn grounding_path(&self) -> Option<&str> {
        self.citation.as_ref().and_then(Citation::path)
    }

    pub fn has_answer(&self) -> bool {
        !self.response_text.trim().is_empty()
    }
}
