//! Page-aware text chunker.
//!
//! Splits extracted page text into [`ChunkDraft`]s bounded by a character
//! window. Each page is normalized first (whitespace collapse, control-char
//! strip, common PDF encoding artifacts), then split greedily on paragraph
//! boundaries; paragraphs larger than the window fall back to sentence
//! boundaries and finally a hard cut at whitespace.
//!
//! Chunks never span pages: a natural unit crossing a page boundary is split,
//! trading occasionally shorter chunks for exact page citations. The chunk
//! index counts up across the whole document, so index order reproduces the
//! document's extracted text with no content gaps.

use crate::error::{Error, Result};
use crate::models::{ChunkDraft, PageText};

/// Split a document's pages into bounded chunk drafts.
///
/// `source` names the document in the [`Error::ExtractionEmpty`] report when
/// every page turns out to be empty (no text layer, likely a scanned PDF).
pub fn chunk_pages(
    pages: &[PageText],
    window_max_chars: usize,
    source: &str,
) -> Result<Vec<ChunkDraft>> {
    let mut drafts = Vec::new();
    let mut index: i64 = 0;

    for page in pages {
        let text = normalize_text(&page.text);
        if text.is_empty() {
            continue;
        }
        for content in split_window(&text, window_max_chars) {
            drafts.push(ChunkDraft {
                page_number: page.page_number,
                chunk_index: index,
                content,
            });
            index += 1;
        }
    }

    if drafts.is_empty() {
        return Err(Error::ExtractionEmpty {
            filename: source.to_string(),
        });
    }
    Ok(drafts)
}

/// Normalize raw page text before chunking.
///
/// - unifies CRLF/CR line endings
/// - expands ligature codepoints and drops soft hyphens (common artifacts of
///   PDF text extraction)
/// - strips control characters other than newlines
/// - collapses runs of spaces/tabs to a single space and runs of blank lines
///   to a single paragraph break
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut newline_run: usize = 0;
    let mut pending_space = false;

    for ch in unified.chars() {
        match ch {
            '\n' => {
                newline_run += 1;
                pending_space = false;
                if newline_run <= 2 {
                    // trailing spaces before a line break carry no content
                    while out.ends_with(' ') {
                        out.pop();
                    }
                    out.push('\n');
                }
            }
            ' ' | '\t' | '\u{00A0}' => {
                pending_space = true;
            }
            '\u{00AD}' => {} // soft hyphen
            'ﬀ' => push_word(&mut out, "ff", &mut pending_space, &mut newline_run),
            'ﬁ' => push_word(&mut out, "fi", &mut pending_space, &mut newline_run),
            'ﬂ' => push_word(&mut out, "fl", &mut pending_space, &mut newline_run),
            'ﬃ' => push_word(&mut out, "ffi", &mut pending_space, &mut newline_run),
            'ﬄ' => push_word(&mut out, "ffl", &mut pending_space, &mut newline_run),
            c if c.is_control() => {}
            c => {
                let mut tmp = [0u8; 4];
                push_word(
                    &mut out,
                    c.encode_utf8(&mut tmp),
                    &mut pending_space,
                    &mut newline_run,
                );
            }
        }
    }

    out.trim().to_string()
}

fn push_word(out: &mut String, word: &str, pending_space: &mut bool, newline_run: &mut usize) {
    if *pending_space && !out.is_empty() && !out.ends_with('\n') {
        out.push(' ');
    }
    *pending_space = false;
    *newline_run = 0;
    out.push_str(word);
}

/// Greedily accumulate paragraphs into window-bounded pieces.
fn split_window(text: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n") {
        let para = para.trim();
        if para.is_empty() {
            continue;
        }

        let would_be = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };
        if would_be > max && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max {
            if !buf.is_empty() {
                pieces.push(std::mem::take(&mut buf));
            }
            split_oversized(para, max, &mut pieces);
        } else {
            if !buf.is_empty() {
                buf.push_str("\n\n");
            }
            buf.push_str(para);
        }
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }
    pieces
}

/// Split a paragraph larger than the window, preferring a sentence boundary,
/// then a line break, then a word boundary past the window midpoint, with a
/// hard cut as the last resort.
fn split_oversized(para: &str, max: usize, out: &mut Vec<String>) {
    let mut rest = para;
    while !rest.is_empty() {
        if rest.len() <= max {
            out.push(rest.to_string());
            break;
        }

        let mut end = max;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let window = &rest[..end];

        let cut = window
            .rfind(". ")
            .map(|p| p + 1)
            .filter(|&p| p > max / 2)
            .or_else(|| {
                window
                    .rfind('\n')
                    .map(|p| p + 1)
                    .filter(|&p| p > max / 2)
            })
            .or_else(|| window.rfind(' ').filter(|&p| p > max / 2))
            .unwrap_or(end);

        let (head, tail) = rest.split_at(cut);
        let head = head.trim();
        if !head.is_empty() {
            out.push(head.to_string());
        }
        rest = tail.trim_start();
    }
}
