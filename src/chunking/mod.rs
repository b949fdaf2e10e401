//! Document chunking: fixed-size character windows with overlap, nudged back
//! to the nearest natural boundary when one is close to the cut.

pub mod boundary;

use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use crate::models::{Chunk, Document};

/// Splits documents into overlapping windows of at most `max_chars` characters.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Chunker {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self> {
        if max_chars == 0 {
            return Err(RagError::Config("max_chars must be > 0".into()));
        }
        if overlap_chars >= max_chars {
            return Err(RagError::Config(format!(
                "overlap_chars ({overlap_chars}) must be < max_chars ({max_chars})"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.max_chars, config.overlap_chars)
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn overlap_chars(&self) -> usize {
        self.overlap_chars
    }

    /// Lazily iterate the chunks of `document`. Calling this again restarts
    /// the sequence and yields identical chunks.
    pub fn windows<'a>(&self, document: &'a Document) -> ChunkWindows<'a> {
        ChunkWindows::new(document, self.max_chars, self.overlap_chars)
    }

    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        self.windows(document).collect()
    }
}

/// Split `document` into chunks of at most `max_chars` characters where
/// consecutive chunks share exactly `overlap_chars` characters.
pub fn split(document: &Document, max_chars: usize, overlap_chars: usize) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(max_chars, overlap_chars)?.split(document))
}

/// Iterator over the chunk windows of one document.
pub struct ChunkWindows<'a> {
    document: &'a Document,
    chars: Vec<char>,
    /// Byte offset of every char, plus the total length as a sentinel.
    offsets: Vec<usize>,
    max_chars: usize,
    overlap_chars: usize,
    start: usize,
    index: usize,
    done: bool,
}

impl<'a> ChunkWindows<'a> {
    fn new(document: &'a Document, max_chars: usize, overlap_chars: usize) -> Self {
        let text = document.text.as_str();
        let mut offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        offsets.push(text.len());
        let chars: Vec<char> = text.chars().collect();
        let done = chars.is_empty();

        Self {
            document,
            chars,
            offsets,
            max_chars,
            overlap_chars,
            start: 0,
            index: 0,
            done,
        }
    }

    /// Lowest acceptable end for a softened cut. Keeps every window strictly
    /// longer than the overlap so the sweep always advances.
    fn tolerance(&self) -> usize {
        ((self.max_chars - self.overlap_chars) / 4).min(boundary::MAX_TOLERANCE)
    }
}

impl Iterator for ChunkWindows<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let total = self.chars.len();
        let hard_end = (self.start + self.max_chars).min(total);
        let end = if hard_end == total {
            total
        } else {
            let lower = hard_end - self.tolerance();
            boundary::find_break(&self.chars, lower, hard_end).unwrap_or(hard_end)
        };

        let text = &self.document.text[self.offsets[self.start]..self.offsets[end]];
        let chunk = Chunk {
            source: self.document.source.clone(),
            index: self.index,
            text: text.to_string(),
            start: self.start,
            end,
        };

        if end == total {
            self.done = true;
        } else {
            self.start = end - self.overlap_chars;
            self.index += 1;
        }

        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the document from each chunk's non-overlapping prefix.
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            match chunks.get(i + 1) {
                Some(next) => {
                    let keep = next.start - chunk.start;
                    out.extend(chunk.text.chars().take(keep));
                }
                None => out.push_str(&chunk.text),
            }
        }
        out
    }

    fn sample_text() -> String {
        let para = "The Eiffel Tower is in Paris. It was completed in 1889! Who designed it? \
                    Gustave Eiffel's company did.";
        (0..12)
            .map(|i| format!("{para} Section {i}."))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_short_document_is_single_chunk() {
        let doc = Document::new("doc_0", "Paris is the capital of France.");
        let chunks = split(&doc, 1000, 200).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, doc.text);
        assert_eq!(chunks[0].source, "doc_0");
    }

    #[test]
    fn test_document_exactly_max_is_single_chunk() {
        let doc = Document::new("d", "x".repeat(50));
        let chunks = split(&doc, 50, 10).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_empty_document_yields_nothing() {
        let doc = Document::new("d", "");
        assert!(split(&doc, 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let doc = Document::new("d", "text");
        assert!(matches!(split(&doc, 0, 0), Err(RagError::Config(_))));
        assert!(matches!(split(&doc, 10, 10), Err(RagError::Config(_))));
        assert!(matches!(split(&doc, 10, 11), Err(RagError::Config(_))));
    }

    #[test]
    fn test_reconstructs_document_and_respects_max() {
        let doc = Document::new("d", sample_text());
        for (max, overlap) in [(200, 40), (120, 0), (75, 74), (333, 100)] {
            let chunks = split(&doc, max, overlap).unwrap();
            assert_eq!(reconstruct(&chunks), doc.text, "max={max} overlap={overlap}");
            for chunk in &chunks {
                let len = chunk.text.chars().count();
                assert!(len > 0 && len <= max, "len {len} for max {max}");
            }
        }
    }

    #[test]
    fn test_consecutive_chunks_overlap_by_configured_amount() {
        let doc = Document::new("d", sample_text());
        let chunks = split(&doc, 200, 40).unwrap();
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 40);
            let tail: String = pair[0].text.chars().skip(pair[0].char_len() - 40).collect();
            let head: String = pair[1].text.chars().take(40).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let first = "a".repeat(90);
        let second = "b".repeat(90);
        let doc = Document::new("d", format!("{first}\n\n{second}"));
        let chunks = split(&doc, 100, 0).unwrap();
        assert_eq!(chunks[0].text, format!("{first}\n\n"));
        assert_eq!(chunks[1].text, second);
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let doc = Document::new("d", "z".repeat(250));
        let chunks = split(&doc, 100, 20).unwrap();
        assert_eq!(chunks[0].char_len(), 100);
        assert_eq!(chunks[1].start, 80);
        assert_eq!(reconstruct(&chunks), doc.text);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let doc = Document::new("d", "巴黎是法国的首都。".repeat(30));
        let chunks = split(&doc, 40, 8).unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), doc.text);
    }

    #[test]
    fn test_windows_restartable() {
        let doc = Document::new("d", sample_text());
        let chunker = Chunker::new(150, 30).unwrap();
        let first: Vec<Chunk> = chunker.windows(&doc).collect();
        let second: Vec<Chunk> = chunker.windows(&doc).collect();
        assert_eq!(first, second);
        assert!(first.iter().enumerate().all(|(i, c)| c.index == i));
    }
}
