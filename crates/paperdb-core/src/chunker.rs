//! Splits a document into overlapping text segments with positional
//! metadata. Overlap between consecutive chunks reduces recall loss at
//! chunk boundaries.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::types::{Chunk, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkUnit {
    Words,
    Sentences,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window length, in units.
    pub size: usize,
    /// Units shared between consecutive windows. Must be < `size`.
    pub overlap: usize,
    pub unit: ChunkUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { size: 200, overlap: 40, unit: ChunkUnit::Words }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(SearchError::InvalidConfig(
                "chunking.size must be > 0".to_string(),
            ));
        }
        if self.overlap >= self.size {
            return Err(SearchError::InvalidConfig(format!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Produce the ordered chunk sequence for one document.
    ///
    /// Invariants: ordinals are contiguous from 0, and the union of `span`
    /// byte ranges equals the full text. A document shorter than one window
    /// yields exactly one chunk. Empty or whitespace-only text is an
    /// `InvalidDocument`.
    pub fn chunk(&self, doc: &Document) -> Result<Vec<Chunk>> {
        if doc.text.trim().is_empty() {
            return Err(SearchError::InvalidDocument {
                doc_id: doc.id.clone(),
                reason: "document text is empty".to_string(),
            });
        }
        let units = match self.config.unit {
            ChunkUnit::Words => word_spans(&doc.text),
            ChunkUnit::Sentences => sentence_spans(&doc.text),
        };

        let step = self.config.size - self.config.overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut ordinal = 0usize;
        loop {
            let end = (start + self.config.size).min(units.len());
            let span = (units[start].0, units[end - 1].1);
            chunks.push(Chunk {
                id: Chunk::make_id(&doc.id, ordinal),
                doc_id: doc.id.clone(),
                ordinal,
                span,
                text: doc.text[span.0..span.1].to_string(),
                meta: doc.meta.clone(),
            });
            if end >= units.len() {
                break;
            }
            start += step;
            ordinal += 1;
        }

        // Spans of adjacent chunks overlap on unit boundaries but can leave
        // inter-chunk whitespace uncovered; widen them so the union equals
        // the document.
        if let Some(first) = chunks.first_mut() {
            first.span.0 = 0;
        }
        if let Some(last) = chunks.last_mut() {
            last.span.1 = doc.text.len();
        }
        for i in 1..chunks.len() {
            let prev_end = chunks[i - 1].span.1;
            if chunks[i].span.0 > prev_end {
                chunks[i].span.0 = prev_end;
            }
        }
        Ok(chunks)
    }
}

/// Byte ranges of whitespace-separated words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Byte ranges of sentences: a terminator run (`.`, `!`, `?`) followed by
/// whitespace or end of text closes a sentence. Text with no terminator is
/// one sentence.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut iter = text.char_indices().peekable();
    while let Some((i, ch)) = iter.next() {
        if start.is_none() && !ch.is_whitespace() {
            start = Some(i);
        }
        if matches!(ch, '.' | '!' | '?') {
            let at_boundary = match iter.peek() {
                None => true,
                Some((_, next)) => next.is_whitespace(),
            };
            if at_boundary {
                if let Some(s) = start.take() {
                    spans.push((s, i + ch.len_utf8()));
                }
            }
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocMeta;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn doc(text: &str) -> Document {
        Document {
            id: "d1".to_string(),
            text: text.to_string(),
            meta: DocMeta {
                title: "t".to_string(),
                authors: vec!["a".to_string()],
                category: "cs.LG".to_string(),
                published: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date"),
            },
        }
    }

    fn chunker(size: usize, overlap: usize, unit: ChunkUnit) -> Chunker {
        Chunker::new(ChunkingConfig { size, overlap, unit }).expect("valid config")
    }

    fn assert_covers(doc: &Document, chunks: &[Chunk]) {
        assert_eq!(chunks[0].span.0, 0);
        assert_eq!(chunks.last().expect("non-empty").span.1, doc.text.len());
        for w in chunks.windows(2) {
            assert!(w[1].span.0 <= w[0].span.1, "gap between consecutive spans");
        }
    }

    #[test]
    fn empty_document_is_rejected() {
        let c = chunker(10, 2, ChunkUnit::Words);
        assert!(matches!(
            c.chunk(&doc("   \n ")),
            Err(SearchError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let c = chunker(100, 20, ChunkUnit::Words);
        let chunks = c.chunk(&doc("just a few words")).expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].span, (0, 16));
    }

    #[test]
    fn windows_overlap_and_ordinals_are_contiguous() {
        let words: Vec<String> = (0..25).map(|i| format!("w{i}")).collect();
        let d = doc(&words.join(" "));
        let c = chunker(10, 3, ChunkUnit::Words);
        let chunks = c.chunk(&d).expect("chunks");
        assert!(chunks.len() > 1);
        for (i, ch) in chunks.iter().enumerate() {
            assert_eq!(ch.ordinal, i);
            assert_eq!(ch.id, format!("d1:{i}"));
        }
        // Consecutive chunks share the overlap words.
        assert!(chunks[1].text.starts_with("w7 w8 w9"));
        assert_covers(&d, &chunks);
    }

    #[test]
    fn zero_overlap_spans_still_cover_whitespace() {
        let d = doc("aa bb cc dd ee ff");
        let c = chunker(2, 0, ChunkUnit::Words);
        let chunks = c.chunk(&d).expect("chunks");
        assert_eq!(chunks.len(), 3);
        assert_covers(&d, &chunks);
    }

    #[test]
    fn sentence_unit_groups_sentences() {
        let d = doc("One sentence here. Another one! A third? And a fourth.");
        let c = chunker(2, 1, ChunkUnit::Sentences);
        let chunks = c.chunk(&d).expect("chunks");
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].text.ends_with("Another one!"));
        assert!(chunks[1].text.starts_with("Another one!"));
        assert_covers(&d, &chunks);
    }

    #[test]
    fn text_without_terminator_is_one_sentence() {
        let d = doc("no terminator at all");
        let c = chunker(5, 1, ChunkUnit::Sentences);
        let chunks = c.chunk(&d).expect("chunks");
        assert_eq!(chunks.len(), 1);
    }

    proptest! {
        #[test]
        fn span_union_covers_any_document(
            words in proptest::collection::vec("[a-z]{1,8}", 1..120),
            size in 1usize..40,
            overlap_frac in 0usize..10,
        ) {
            let overlap = (size * overlap_frac / 10).min(size.saturating_sub(1));
            let d = doc(&words.join(" "));
            let c = chunker(size, overlap, ChunkUnit::Words);
            let chunks = c.chunk(&d).expect("chunks");
            assert_covers(&d, &chunks);
            for (i, ch) in chunks.iter().enumerate() {
                prop_assert_eq!(ch.ordinal, i);
            }
        }
    }
}
