//! Core data types shared across the pipeline.

use serde::Serialize;

/// Text of a single PDF page, 1-based page number.
#[derive(Debug, Clone)]
pub struct PageText {
    pub page_number: i64,
    pub text: String,
}

/// A document about to be registered in the store.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    /// Unique ingestion key. Re-ingesting the same filename is rejected.
    pub filename: String,
    pub total_pages: i64,
}

/// A stored document with its chunk count, as listed by `documents`.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub filename: String,
    pub total_pages: i64,
    pub chunk_count: i64,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

/// A chunk before embedding: provenance plus content, no vector yet.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub page_number: i64,
    /// Position within the document, strictly increasing across pages.
    pub chunk_index: i64,
    pub content: String,
}

/// A chunk draft paired with its embedding, ready to persist.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub draft: ChunkDraft,
    pub vector: Vec<f32>,
}

/// A chunk returned from similarity search, joined with its document title.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub document_title: String,
    pub page_number: i64,
    pub chunk_index: i64,
    pub content: String,
    /// Rescaled cosine similarity in [0, 1].
    pub similarity: f64,
}

/// A (title, page) reference backing part of an answer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Citation {
    pub title: String,
    pub page: i64,
}

/// A generated answer with the citations that survived validation.
/// Serializes for the CLI's `--json` output.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_serializes_with_citations() {
        let answer = Answer {
            text: "See the manual [Manual, page 3].".to_string(),
            citations: vec![Citation {
                title: "Manual".to_string(),
                page: 3,
            }],
        };
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["text"], "See the manual [Manual, page 3].");
        assert_eq!(json["citations"][0]["title"], "Manual");
        assert_eq!(json["citations"][0]["page"], 3);
    }
}
