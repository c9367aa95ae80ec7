//! Core data models used throughout Codevo.
//!
//! These types represent the loaded files, chunks, search hits, and
//! conversation turns that flow through the load → index → ask pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One text file produced by a connector.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    /// Path relative to the repository or upload root (`src/main.py`).
    pub path: String,
    /// UTF-8 decoded file body.
    pub content: String,
    /// Web-browsable URL, if the file came from a hosted repository.
    pub url: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            url: None,
        }
    }
}

/// A named set of files: one repository checkout or one batch of uploads.
#[derive(Debug, Clone)]
pub struct SourceSet {
    /// Display name, e.g. `owner/repo@main` or `uploaded_files`.
    pub name: String,
    pub files: Vec<SourceFile>,
}

impl SourceSet {
    pub fn new(name: impl Into<String>, files: Vec<SourceFile>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// SHA-256 over the sorted `(path, content)` pairs.
    ///
    /// Independent of file order and of the display name, so two loads of
    /// the same content hash identically.
    pub fn content_hash(&self) -> String {
        let mut files: Vec<&SourceFile> = self.files.iter().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut hasher = Sha256::new();
        for file in files {
            hasher.update(file.path.as_bytes());
            hasher.update([0u8]);
            hasher.update(file.content.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Concatenate every file into one text blob, each preceded by a
    /// `📂 FILE: <path>` header and a dashed rule.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for file in &self.files {
            text.push_str(&file_header(&file.path));
            text.push_str(&file.content);
            text.push('\n');
        }
        text
    }
}

/// The delimiter placed before each file in [`SourceSet::to_text`].
pub fn file_header(path: &str) -> String {
    format!("\n\n📂 FILE: {}\n{}\n", path, "-".repeat(50))
}

/// A bounded slice of one source, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// File path, or the collection name when the whole set was split as one blob.
    pub source_id: String,
    /// Zero-based position among the chunks of `source_id`.
    pub position_index: usize,
    /// Number of chunks produced from `source_id`.
    pub sibling_count: usize,
    /// Length of `text` in characters.
    pub size: usize,
    /// Character offset of `text` within the source.
    pub start_offset: usize,
    /// Web URL of the source file, if known.
    pub url: Option<String>,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query, in `[-1.0, 1.0]`.
    pub score: f32,
}

/// One question/answer exchange in an interactive session.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub cited_chunks: Vec<Chunk>,
}
