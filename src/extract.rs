//! PDF page-text extraction.
//!
//! Thin wrapper over `pdf-extract` that turns raw PDF bytes into per-page
//! text with 1-based page numbers. Extraction is the only place the pipeline
//! touches PDF internals; everything downstream works on [`PageText`].
//!
//! No OCR is attempted: a scanned PDF comes back as empty pages and is
//! rejected later by the chunker with `ExtractionEmpty`.

use crate::error::{Error, Result};
use crate::models::PageText;

/// Extract per-page text from PDF bytes.
///
/// Returns one entry per page, in page order, including pages with no text
/// layer (empty string). Fails with [`Error::PdfExtract`] when the file is
/// corrupt, encrypted, or not a PDF at all.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| Error::PdfExtract(e.to_string()))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText {
            page_number: i as i64 + 1,
            text,
        })
        .collect())
}
