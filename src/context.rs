//! Context assembly for the answer prompt.
//!
//! Joins retrieved chunks into one provenance-tagged block, bounded by
//! `max_context_chars`. Chunks go in whole or not at all; once one doesn't
//! fit, the rest of the (lower-similarity) tail is dropped.

use crate::models::{Citation, RetrievedChunk};

const ENTRY_SEPARATOR: &str = "\n\n";

/// The assembled context block plus the citations it can support.
#[derive(Debug, Clone)]
pub struct ContextBlock {
    text: String,
    citations: Vec<Citation>,
    chunk_count: usize,
}

impl ContextBlock {
    /// No retrieved chunk made it into the block. Distinguishes "nothing to
    /// ground on" from a context that merely renders short.
    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Citations for the included chunks, deduplicated, in inclusion order.
    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// True when `(title, page)` is backed by an included chunk.
    pub fn supports(&self, citation: &Citation) -> bool {
        self.citations.contains(citation)
    }
}

/// Build the context block from chunks in retrieval order.
pub fn assemble(retrieved: &[RetrievedChunk], max_context_chars: usize) -> ContextBlock {
    let mut text = String::new();
    let mut citations: Vec<Citation> = Vec::new();
    let mut chunk_count = 0;

    for chunk in retrieved {
        let entry = format!(
            "[Source: {}, page {}]\n{}",
            chunk.document_title, chunk.page_number, chunk.content
        );
        let projected = if text.is_empty() {
            entry.len()
        } else {
            text.len() + ENTRY_SEPARATOR.len() + entry.len()
        };
        if projected > max_context_chars {
            break;
        }

        if !text.is_empty() {
            text.push_str(ENTRY_SEPARATOR);
        }
        text.push_str(&entry);
        chunk_count += 1;

        let citation = Citation {
            title: chunk.document_title.clone(),
            page: chunk.page_number,
        };
        if !citations.contains(&citation) {
            citations.push(citation);
        }
    }

    ContextBlock {
        text,
        citations,
        chunk_count,
    }
}
