//! Per-page text extraction for every supported document format.
//!
//! Dispatches on file extension rather than sniffed content type: the
//! upload handler already runs `infer`-based magic-number validation
//! before a file reaches here, so extension mismatches are a client error
//! handled earlier. Each format returns a `Vec<Page>`; formats with no
//! native page concept (DOCX, plain text, HTML) yield a single page.

use std::path::Path;

use crate::domain::Page;
use crate::error::{CoreError, Result};

use super::ocr;

/// Below this average character count per page (over the first `min(5,
/// page_count)` pages), the document is treated as image-based and every
/// page is routed through OCR instead of direct text extraction. This is
/// a document-wide decision, not a per-page one.
pub const OCR_THRESHOLD_CHARS: usize = 100;

/// Loads a document's pages and reports whether OCR was invoked for it.
pub fn load(source: &str, bytes: &[u8]) -> Result<(Vec<Page>, bool)> {
    let ext = Path::new(source)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match ext.as_str() {
        "pdf" => load_pdf(source, bytes),
        "docx" => load_docx(source, bytes).map(|pages| (pages, false)),
        "txt" | "md" | "markdown" => load_plain_text(source, bytes).map(|pages| (pages, false)),
        "html" | "htm" => load_html(source, bytes).map(|pages| (pages, false)),
        other => Err(CoreError::UnsupportedFormat(other.to_string())),
    }
}

fn load_pdf(source: &str, bytes: &[u8]) -> Result<(Vec<Page>, bool)> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| CoreError::UnsupportedFormat(format!("invalid PDF: {e}")))?;

    let pages = doc.get_pages();
    let total_pages = pages.len();
    let page_numbers: Vec<u32> = pages.keys().copied().collect();

    let extracted: Vec<String> = page_numbers
        .iter()
        .map(|&page_number| doc.extract_text(&[page_number]).unwrap_or_default().trim().to_string())
        .collect();

    let sample_count = total_pages.min(5).max(1);
    let sample_chars: usize = extracted.iter().take(sample_count).map(|t| t.chars().count()).sum();
    let avg_chars_per_page = sample_chars as f64 / sample_count as f64;
    let needs_ocr = avg_chars_per_page < OCR_THRESHOLD_CHARS as f64;

    if needs_ocr && !cfg!(feature = "ocr") {
        return Err(CoreError::OcrUnavailable(format!(
            "document averages {avg_chars_per_page:.1} chars/page and requires OCR, \
             but the `ocr` feature is not compiled in"
        )));
    }

    let mut out = Vec::with_capacity(total_pages);
    for (page_index, (&page_number, direct_text)) in page_numbers.iter().zip(extracted.iter()).enumerate() {
        let text = if needs_ocr {
            match ocr::ocr_page(bytes, page_number, 200) {
                Ok(ocr_text) => ocr_text,
                Err(e) => {
                    tracing::warn!(source, page = page_number, error = %e, "OCR rasterization failed for page, emitting empty text");
                    String::new()
                }
            }
        } else {
            direct_text.clone()
        };

        out.push(Page {
            source: source.to_string(),
            page_index,
            total_pages,
            text,
        });
    }

    Ok((out, needs_ocr))
}

fn load_docx(source: &str, bytes: &[u8]) -> Result<Vec<Page>> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| CoreError::UnsupportedFormat(format!("invalid DOCX: {e:?}")))?;

    let mut text = String::new();
    for child in docx.document.children {
        collect_docx_text(&child, &mut text);
    }

    Ok(vec![Page {
        source: source.to_string(),
        page_index: 0,
        total_pages: 1,
        text: text.trim().to_string(),
    }])
}

fn collect_docx_text(node: &docx_rs::DocumentChild, out: &mut String) {
    if let docx_rs::DocumentChild::Paragraph(p) = node {
        for child in &p.children {
            if let docx_rs::ParagraphChild::Run(run) = child {
                for run_child in &run.children {
                    if let docx_rs::RunChild::Text(t) = run_child {
                        out.push_str(&t.text);
                    }
                }
            }
        }
        out.push('\n');
    }
}

fn load_plain_text(source: &str, bytes: &[u8]) -> Result<Vec<Page>> {
    let (text, _encoding, _had_errors) = encoding_rs::UTF_8.decode(bytes);

    Ok(vec![Page {
        source: source.to_string(),
        page_index: 0,
        total_pages: 1,
        text: text.trim().to_string(),
    }])
}

fn load_html(source: &str, bytes: &[u8]) -> Result<Vec<Page>> {
    let (raw, _encoding, _had_errors) = encoding_rs::UTF_8.decode(bytes);
    let text = extract_webpage_text(&raw);

    Ok(vec![Page {
        source: source.to_string(),
        page_index: 0,
        total_pages: 1,
        text,
    }])
}

/// Strips markup from a raw HTML document, keeping only visible body text.
/// Shared by the loader (uploaded `.html` files) and the webpage ingestion
/// handler (fetched URLs).
pub fn extract_webpage_text(html: &str) -> String {
    use scraper::{Html, Selector};

    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").unwrap();
    let skip_selector = Selector::parse("script, style, nav, footer, noscript").unwrap();

    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    let skip: std::collections::HashSet<_> = document
        .select(&skip_selector)
        .flat_map(|el| el.descendants().map(|d| d.id()))
        .collect();

    let mut text = String::new();
    for node in root.descendants() {
        if skip.contains(&node.id()) {
            continue;
        }
        if let Some(t) = node.value().as_text() {
            let trimmed = t.trim();
            if !trimmed.is_empty() {
                text.push_str(trimmed);
                text.push(' ');
            }
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = load("notes.xyz", b"hello").unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedFormat(_)));
    }

    #[test]
    fn plain_text_roundtrips_as_single_page() {
        let pages = load_plain_text("notes.txt", b"hello world").unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "hello world");
        assert_eq!(pages[0].total_pages, 1);
    }

    #[test]
    fn html_extraction_drops_script_and_style() {
        let html = r#"<html><body>
            <script>var x = 1;</script>
            <style>.a { color: red; }</style>
            <p>Visible paragraph text.</p>
        </body></html>"#;

        let text = extract_webpage_text(html);
        assert!(text.contains("Visible paragraph text."));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
    }
}
