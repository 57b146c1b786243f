//! Per-page PDF text extraction.
//!
//! Parses the uploaded bytes with `lopdf` and extracts text one page at a
//! time, so a single bad page degrades to a placeholder downstream instead
//! of aborting the whole document. Extracted text is normalized before
//! chunking: words hyphenated across line breaks are rejoined and
//! intra-paragraph newlines collapse to spaces, while blank-line paragraph
//! breaks survive.

use lopdf::Document;
use tracing::warn;

use crate::error::{PipelineError, Result};

/// Outcome of extracting one page. `error` is set when extraction failed;
/// `text` may still be empty for pages with no extractable content.
#[derive(Debug, Clone)]
pub struct PageExtract {
    /// 1-based page number.
    pub page: u32,
    pub text: String,
    pub error: Option<String>,
}

impl PageExtract {
    pub fn has_text(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

/// Parse a PDF and extract text per page.
///
/// Fails with [`PipelineError::Ingest`] if the bytes are not a parseable
/// PDF or the document has no pages. Page-level extraction failures are
/// captured in the returned [`PageExtract`] records, never propagated.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageExtract>> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| PipelineError::Ingest(format!("failed to parse PDF: {}", e)))?;

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Err(PipelineError::Ingest(
            "PDF file appears to be empty or corrupted".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(pages.len());
    for &number in pages.keys() {
        match doc.extract_text(&[number]) {
            Ok(raw) => out.push(PageExtract {
                page: number,
                text: normalize_page_text(&raw),
                error: None,
            }),
            Err(e) => {
                warn!(page = number, error = %e, "page text extraction failed");
                out.push(PageExtract {
                    page: number,
                    text: String::new(),
                    error: Some(e.to_string()),
                });
            }
        }
    }
    Ok(out)
}

/// Normalize raw extractor output into paragraph-shaped text.
///
/// Blank lines delimit paragraphs. Within a paragraph, a trailing hyphen
/// between word characters marks a line-break hyphenation and the word is
/// rejoined; all other line breaks become single spaces.
pub fn normalize_page_text(raw: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if current.is_empty() {
            current.push_str(line);
        } else if ends_with_hyphenated_word(&current) && starts_with_word(line) {
            current.pop();
            current.push_str(line);
        } else {
            current.push(' ');
            current.push_str(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n\n")
}

fn ends_with_hyphenated_word(s: &str) -> bool {
    let mut chars = s.chars().rev();
    chars.next() == Some('-') && chars.next().map(char::is_alphanumeric).unwrap_or(false)
}

fn starts_with_word(s: &str) -> bool {
    s.chars().next().map(char::is_alphanumeric).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_with_ingest_error() {
        let err = extract_pages(b"not a pdf at all").unwrap_err();
        assert!(matches!(err, PipelineError::Ingest(_)));
    }

    #[test]
    fn normalize_rejoins_hyphenated_words() {
        let raw = "The configu-\nration file lives here.";
        assert_eq!(
            normalize_page_text(raw),
            "The configuration file lives here."
        );
    }

    #[test]
    fn normalize_keeps_real_hyphens_before_breaks() {
        // "-" followed by a line starting with punctuation is not a split word
        let raw = "see section 3-\n(appendix)";
        assert_eq!(normalize_page_text(raw), "see section 3- (appendix)");
    }

    #[test]
    fn normalize_collapses_lines_but_keeps_paragraphs() {
        let raw = "First line\nsecond line\n\nNext paragraph\nhere";
        assert_eq!(
            normalize_page_text(raw),
            "First line second line\n\nNext paragraph here"
        );
    }

    #[test]
    fn normalize_trims_whitespace_only_input() {
        assert_eq!(normalize_page_text("  \n \n  "), "");
    }

    #[test]
    fn has_text_is_false_for_failed_and_empty_pages() {
        let failed = PageExtract {
            page: 1,
            text: String::new(),
            error: Some("boom".to_string()),
        };
        let empty = PageExtract {
            page: 2,
            text: "   ".to_string(),
            error: None,
        };
        assert!(!failed.has_text());
        assert!(!empty.has_text());
    }
}
