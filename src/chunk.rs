//! Recursive, language-aware text chunker.
//!
//! Splits file contents into overlapping [`Chunk`]s of at most
//! `chunk_size` characters, sharing up to `chunk_overlap` characters with
//! the previous chunk so context is not lost at the boundaries.
//!
//! # Algorithm
//!
//! 1. Pick the first separator in the cascade that occurs in the text
//!    (for plain text: paragraph → line → space → character).
//! 2. Split on it, keeping the separator at the start of each piece.
//! 3. Pieces shorter than `chunk_size` are merged greedily into chunks;
//!    when a chunk is full, the merge window slides forward until at most
//!    `chunk_overlap` characters remain, and those open the next chunk.
//! 4. Pieces that are still too long recurse with the rest of the cascade.
//!
//! Source files with a recognised extension use a cascade that starts with
//! language constructs (`\nclass `, `\ndef `, `\nfn `, …) so chunks tend to
//! begin at a definition rather than mid-function.
//!
//! Chunks from one source are returned in document order with
//! `position_index` / `sibling_count` set, and `start_offset` pointing at
//! the chunk's first character in the source.
//!
//! # Example
//!
//! ```rust
//! use codevo::chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(20, 5);
//! let pieces = splitter.split_text("one two three four five six seven");
//! assert!(pieces.len() > 1);
//! assert!(pieces.iter().all(|p| p.chars().count() <= 20));
//! ```

use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, SourceSet};

const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Languages with a dedicated separator cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Js,
    Java,
    Cpp,
    CSharp,
    Go,
    Rust,
    Ruby,
    Php,
    Scala,
    Kotlin,
    Solidity,
    Markdown,
    Html,
}

impl Language {
    /// Guess the language from a file path's extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next().unwrap_or(path);
        let ext = name.rsplit_once('.')?.1.to_lowercase();
        let lang = match ext.as_str() {
            "py" => Language::Python,
            "js" | "jsx" | "ts" | "tsx" | "mjs" => Language::Js,
            "java" => Language::Java,
            "c" | "h" | "cpp" | "cc" | "hpp" => Language::Cpp,
            "cs" => Language::CSharp,
            "go" => Language::Go,
            "rs" => Language::Rust,
            "rb" => Language::Ruby,
            "php" => Language::Php,
            "scala" => Language::Scala,
            "kt" => Language::Kotlin,
            "sol" => Language::Solidity,
            "md" | "rst" => Language::Markdown,
            "html" | "htm" => Language::Html,
            _ => return None,
        };
        Some(lang)
    }

    /// Separator cascade, most structural first.
    pub fn separators(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["\nclass ", "\ndef ", "\n\tdef ", "\n\n", "\n", " ", ""],
            Language::Js => &[
                "\nfunction ", "\nconst ", "\nlet ", "\nvar ", "\nclass ", "\nif ", "\nfor ",
                "\nwhile ", "\nswitch ", "\ncase ", "\ndefault ", "\n\n", "\n", " ", "",
            ],
            Language::Java => &[
                "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nif ",
                "\nfor ", "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Cpp => &[
                "\nclass ", "\nvoid ", "\nint ", "\nfloat ", "\ndouble ", "\nif ", "\nfor ",
                "\nwhile ", "\nswitch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::CSharp => &[
                "\ninterface ", "\nenum ", "\nimplements ", "\ndelegate ", "\nevent ", "\nclass ",
                "\nabstract ", "\npublic ", "\nprotected ", "\nprivate ", "\nstatic ", "\nreturn ",
                "\nif ", "\ncontinue ", "\nfor ", "\nforeach ", "\nwhile ", "\nswitch ", "\nbreak ",
                "\ncase ", "\nelse ", "\ntry ", "\nthrow ", "\nfinally ", "\ncatch ", "\n\n", "\n",
                " ", "",
            ],
            Language::Go => &[
                "\nfunc ", "\nvar ", "\nconst ", "\ntype ", "\nif ", "\nfor ", "\nswitch ",
                "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Rust => &[
                "\nfn ", "\npub fn ", "\nimpl ", "\nconst ", "\nlet ", "\nif ", "\nwhile ",
                "\nfor ", "\nloop ", "\nmatch ", "\n\n", "\n", " ", "",
            ],
            Language::Ruby => &[
                "\ndef ", "\nclass ", "\nif ", "\nunless ", "\nwhile ", "\nfor ", "\ndo ",
                "\nbegin ", "\nrescue ", "\n\n", "\n", " ", "",
            ],
            Language::Php => &[
                "\nfunction ", "\nclass ", "\nif ", "\nforeach ", "\nwhile ", "\ndo ", "\nswitch ",
                "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Scala => &[
                "\nclass ", "\nobject ", "\ndef ", "\nval ", "\nvar ", "\nif ", "\nfor ",
                "\nwhile ", "\nmatch ", "\ncase ", "\n\n", "\n", " ", "",
            ],
            Language::Kotlin => &[
                "\nclass ", "\npublic ", "\nprotected ", "\nprivate ", "\ninternal ",
                "\ncompanion ", "\nfun ", "\nval ", "\nvar ", "\nif ", "\nfor ", "\nwhile ",
                "\nwhen ", "\ncase ", "\nelse ", "\n\n", "\n", " ", "",
            ],
            Language::Solidity => &[
                "\npragma ", "\nusing ", "\ncontract ", "\ninterface ", "\nlibrary ",
                "\nconstructor ", "\ntype ", "\nfunction ", "\nevent ", "\nmodifier ", "\nerror ",
                "\nstruct ", "\nenum ", "\nif ", "\nfor ", "\nwhile ", "\ndo while ",
                "\nassembly ", "\n\n", "\n", " ", "",
            ],
            Language::Markdown => &[
                "\n# ", "\n## ", "\n### ", "\n#### ", "\n##### ", "\n###### ", "```\n",
                "\n***\n", "\n---\n", "\n___\n", "\n\n", "\n", " ", "",
            ],
            Language::Html => &[
                "<body", "<div", "<p", "<br", "<li", "<h1", "<h2", "<h3", "<h4", "<h5", "<h6",
                "<span", "<table", "<tr", "<td", "<th", "<ul", "<ol", "<header", "<footer",
                "<nav", "<head", "<style", "<script", "<meta", "<title", "",
            ],
        }
    }
}

/// Recursive separator-cascade splitter.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &'static [&'static str],
}

/// A slice of the source text together with its byte offset in that text.
#[derive(Debug, Clone, Copy)]
struct Span<'a> {
    start: usize,
    text: &'a str,
}

impl<'a> Span<'a> {
    fn end(&self) -> usize {
        self.start + self.text.len()
    }

    /// The span without surrounding whitespace, or `None` if nothing is left.
    fn trimmed(self) -> Option<Span<'a>> {
        let text = self.text.trim();
        if text.is_empty() {
            return None;
        }
        let lead = self.text.len() - self.text.trim_start().len();
        Some(Span {
            start: self.start + lead,
            text,
        })
    }
}

impl TextSplitter {
    /// Generic splitter: paragraph → line → space → character.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS,
        }
    }

    /// Splitter for `language`, or the generic one when `None`.
    pub fn for_language(language: Option<Language>, chunk_size: usize, chunk_overlap: usize) -> Self {
        let mut splitter = Self::new(chunk_size, chunk_overlap);
        if let Some(lang) = language {
            splitter.separators = lang.separators();
        }
        splitter
    }

    /// Split `text` into trimmed, non-empty pieces in document order.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|span| span.text.to_string())
            .collect()
    }

    fn split_spans<'a>(&self, text: &'a str) -> Vec<Span<'a>> {
        self.split_recursive(text, Span { start: 0, text }, self.separators)
    }

    fn split_recursive<'a>(
        &self,
        source: &'a str,
        span: Span<'a>,
        separators: &[&str],
    ) -> Vec<Span<'a>> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                break;
            }
            if span.text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut final_chunks = Vec::new();
        let mut good: Vec<Span<'a>> = Vec::new();

        for piece in split_keeping_separator(span, separator) {
            if char_len(piece.text) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                final_chunks.extend(self.merge_splits(source, &good));
                good.clear();
            }
            if remaining.is_empty() {
                final_chunks.extend(piece.trimmed());
            } else {
                final_chunks.extend(self.split_recursive(source, piece, remaining));
            }
        }

        if !good.is_empty() {
            final_chunks.extend(self.merge_splits(source, &good));
        }

        final_chunks
    }

    /// Greedily join consecutive small pieces, carrying an overlap tail.
    ///
    /// `splits` are adjacent in `source`, so a run of them is one slice.
    fn merge_splits<'a>(&self, source: &'a str, splits: &[Span<'a>]) -> Vec<Span<'a>> {
        let mut docs = Vec::new();
        let mut current: VecDeque<Span<'a>> = VecDeque::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece.text);
            if total + len > self.chunk_size && !current.is_empty() {
                docs.extend(joined(source, &current));
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(first) => total -= char_len(first.text),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        docs.extend(joined(source, &current));
        docs
    }
}

fn joined<'a>(source: &'a str, current: &VecDeque<Span<'a>>) -> Option<Span<'a>> {
    let (first, last) = (current.front()?, current.back()?);
    Span {
        start: first.start,
        text: &source[first.start..last.end()],
    }
    .trimmed()
}

/// Split on `separator`, attaching each occurrence to the piece that follows it.
/// An empty separator splits into single characters.
fn split_keeping_separator<'a>(span: Span<'a>, separator: &str) -> Vec<Span<'a>> {
    let text = span.text;
    let at = move |from: usize, to: usize| Span {
        start: span.start + from,
        text: &text[from..to],
    };

    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| at(i, i + c.len_utf8()))
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(at(start, idx));
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(at(start, text.len()));
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Chunk one source and attach position metadata.
///
/// Returns an empty vector for empty or whitespace-only text.
pub fn chunk_source(
    source_id: &str,
    text: &str,
    url: Option<&str>,
    splitter: &TextSplitter,
) -> Vec<Chunk> {
    let spans = splitter.split_spans(text);
    let sibling_count = spans.len();

    let mut chunks = Vec::with_capacity(sibling_count);
    let mut counted_bytes = 0usize;
    let mut counted_chars = 0usize;

    for (position_index, span) in spans.into_iter().enumerate() {
        // Count forward from the previous start unless this one is earlier.
        if span.start >= counted_bytes {
            counted_chars += char_len(&text[counted_bytes..span.start]);
        } else {
            counted_chars = char_len(&text[..span.start]);
        }
        counted_bytes = span.start;

        chunks.push(Chunk {
            text: span.text.to_string(),
            size: char_len(span.text),
            source_id: source_id.to_string(),
            position_index,
            sibling_count,
            start_offset: counted_chars,
            url: url.map(str::to_string),
        });
    }

    chunks
}

/// Chunk every file of a source set with the configured splitter.
///
/// With `per_file` enabled each file is split on its own using its
/// language's cascade. Otherwise the set is rendered as one text blob
/// ([`SourceSet::to_text`]) and split generically under the set's name.
pub fn chunk_source_set(set: &SourceSet, config: &ChunkingConfig) -> Vec<Chunk> {
    if !config.per_file {
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap);
        return chunk_source(&set.name, &set.to_text(), None, &splitter);
    }

    let mut chunks = Vec::new();
    for file in &set.files {
        let splitter = TextSplitter::for_language(
            Language::from_path(&file.path),
            config.chunk_size,
            config.chunk_overlap,
        );
        chunks.extend(chunk_source(
            &file.path,
            &file.content,
            file.url.as_deref(),
            &splitter,
        ));
    }
    chunks
}
