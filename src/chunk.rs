//! Boundary-preferring text chunker.
//!
//! Splits per-page text into [`Chunk`]s that respect a configurable target
//! size, preferring to break at paragraph boundaries, then lines, then
//! sentence punctuation, then words, falling back to character-level splits
//! only when a piece has no usable boundary. A configurable overlap is
//! carried from the tail of each chunk into the next.
//!
//! # Guarantees
//!
//! - Every page yields at least one chunk: pages that failed extraction or
//!   had no extractable text produce a single placeholder chunk, so page
//!   numbering for citations stays stable.
//! - Chunk indices are contiguous per page: `0, 1, 2, …`.
//! - Each chunk carries `filename`, `page`, `chunk_index`, and the derived
//!   `source_tag` needed for citation rendering.

use crate::config::ChunkingConfig;
use crate::error::{PipelineError, Result};
use crate::models::Chunk;
use crate::pdf::PageExtract;

/// Split boundaries in preference order. Each separator stays attached to
/// the piece it terminates.
const SEPARATORS: &[&str] = &["\n\n", "\n", ".", "!", "?", ",", " "];

/// Chunk a document's pages, one group of chunks per page.
///
/// Pages with an extraction error or no extractable text are substituted
/// with a single placeholder chunk noting the page number and reason. A
/// page whose split unexpectedly yields nothing is kept whole as a single
/// chunk rather than dropped.
pub fn chunk_pages(
    pages: &[PageExtract],
    filename: &str,
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>> {
    if pages.is_empty() {
        return Err(PipelineError::Ingest(
            "no pages provided for chunking".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    for page in pages {
        if let Some(reason) = &page.error {
            chunks.push(Chunk::new(
                format!("[Page {} - Error extracting text: {}]", page.page, reason),
                filename,
                page.page,
                0,
            ));
            continue;
        }
        if !page.has_text() {
            chunks.push(Chunk::new(
                format!("[Page {} - No extractable text]", page.page),
                filename,
                page.page,
                0,
            ));
            continue;
        }

        let pieces = split_text(&page.text, config.chunk_size, config.chunk_overlap);
        if pieces.is_empty() {
            chunks.push(Chunk::new(
                page.text.trim().to_string(),
                filename,
                page.page,
                0,
            ));
            continue;
        }
        for (i, piece) in pieces.into_iter().enumerate() {
            chunks.push(Chunk::new(piece, filename, page.page, i as u32));
        }
    }

    if chunks.is_empty() {
        return Err(PipelineError::Ingest(
            "no chunks could be created from the document".to_string(),
        ));
    }
    Ok(chunks)
}

/// Split one page's text into pieces of at most `max_chars`, then merge
/// them into chunks, seeding each chunk after the first with the last
/// `overlap` characters of its predecessor.
pub fn split_text(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.len() <= max_chars {
        return vec![trimmed.to_string()];
    }

    let pieces = split_recursive(trimmed, max_chars, 0);

    let mut chunks = Vec::new();
    let mut buf = String::new();
    let mut seed_len = 0usize;
    for piece in pieces {
        if buf.len() > seed_len && buf.len() + piece.len() > max_chars {
            push_chunk(&mut chunks, &buf);
            buf = overlap_tail(&buf, overlap);
            seed_len = buf.len();
        }
        buf.push_str(&piece);
    }
    if buf.len() > seed_len {
        push_chunk(&mut chunks, &buf);
    }
    chunks
}

fn push_chunk(chunks: &mut Vec<String>, buf: &str) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn split_recursive(text: &str, max_chars: usize, sep_idx: usize) -> Vec<String> {
    if text.len() <= max_chars {
        return vec![text.to_string()];
    }
    if sep_idx >= SEPARATORS.len() {
        return hard_split(text, max_chars);
    }

    let sep = SEPARATORS[sep_idx];
    let parts: Vec<&str> = text.split_inclusive(sep).collect();
    if parts.len() <= 1 {
        return split_recursive(text, max_chars, sep_idx + 1);
    }

    let mut out = Vec::new();
    for part in parts {
        if part.len() <= max_chars {
            out.push(part.to_string());
        } else {
            out.extend(split_recursive(part, max_chars, sep_idx + 1));
        }
    }
    out
}

/// Last-resort split at character boundaries, `max_chars` bytes at a time.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = text;
    while rest.len() > max_chars {
        let mut split_at = snap_to_char_boundary(rest, max_chars);
        if split_at == 0 {
            // a single multi-byte char wider than the window; take it whole
            split_at = rest
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
        }
        out.push(rest[..split_at].to_string());
        rest = &rest[split_at..];
    }
    if !rest.is_empty() {
        out.push(rest.to_string());
    }
    out
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// The trailing `overlap` characters of `s`, snapped forward to a char
/// boundary. Chunks shorter than the overlap are carried whole.
fn overlap_tail(s: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    if s.len() <= overlap {
        return s.to_string();
    }
    let mut idx = s.len() - overlap;
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    s[idx..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, text: &str) -> PageExtract {
        PageExtract {
            page: number,
            text: text.to_string(),
            error: None,
        }
    }

    fn failed_page(number: u32, reason: &str) -> PageExtract {
        PageExtract {
            page: number,
            text: String::new(),
            error: Some(reason.to_string()),
        }
    }

    #[test]
    fn small_text_is_a_single_chunk() {
        let chunks = split_text("Hello, world!", 700, 80);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn splits_prefer_paragraph_boundaries() {
        let text = "First paragraph with some length.\n\nSecond paragraph, also long enough.";
        let chunks = split_text(text, 40, 0);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].starts_with("First paragraph"));
        assert!(chunks.iter().any(|c| c.starts_with("Second paragraph")));
    }

    #[test]
    fn splits_fall_back_to_sentences() {
        let text = "One sentence here. Another sentence there. And a third one closes.";
        let chunks = split_text(text, 30, 0);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn chunks_overlap_with_previous_tail() {
        let text = "aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii jjjj";
        let chunks = split_text(text, 20, 5);
        assert!(chunks.len() >= 2);
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(4).collect::<Vec<_>>()
                .into_iter().rev().collect();
            assert!(
                pair[1].starts_with(tail.trim_start()),
                "chunk {:?} should start with tail of {:?}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn multibyte_text_never_splits_inside_a_char() {
        let text = "日本語のテキスト。".repeat(40);
        let chunks = split_text(&text, 50, 10);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.is_char_boundary(0));
            assert!(!c.is_empty());
        }
    }

    #[test]
    fn deterministic_for_same_input() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota kappa lambda.";
        assert_eq!(split_text(text, 25, 5), split_text(text, 25, 5));
    }

    #[test]
    fn failed_page_becomes_single_placeholder() {
        let pages = vec![failed_page(1, "bad stream")];
        let chunks = chunk_pages(&pages, "doc.pdf", &ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].content,
            "[Page 1 - Error extracting text: bad stream]"
        );
        assert_eq!(chunks[0].source_tag, "1-0");
    }

    #[test]
    fn empty_middle_page_keeps_page_numbering() {
        let pages = vec![
            page(1, "Text on page one."),
            page(2, "   "),
            page(3, "Text on page three."),
        ];
        let chunks = chunk_pages(&pages, "doc.pdf", &ChunkingConfig::default()).unwrap();

        let by_page = |n: u32| chunks.iter().filter(|c| c.page == n).count();
        assert_eq!(by_page(1), 1);
        assert_eq!(by_page(2), 1);
        assert_eq!(by_page(3), 1);

        let placeholder = chunks.iter().find(|c| c.page == 2).unwrap();
        assert_eq!(placeholder.content, "[Page 2 - No extractable text]");
    }

    #[test]
    fn chunk_indices_are_contiguous_within_a_page() {
        let long = "Sentence one here. ".repeat(50);
        let pages = vec![page(1, &long)];
        let config = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 10,
        };
        let chunks = chunk_pages(&pages, "doc.pdf", &config).unwrap();
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as u32);
            assert_eq!(c.page, 1);
            assert_eq!(c.filename, "doc.pdf");
        }
    }

    #[test]
    fn no_pages_is_an_ingest_error() {
        let err = chunk_pages(&[], "doc.pdf", &ChunkingConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Ingest(_)));
    }
}
