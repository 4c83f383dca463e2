//! Token-bounded, metadata-enriched chunking.
//!
//! A pure function: same `Page`s plus the same settings always produce the
//! same `Chunk`s in the same order, with ids derived from content hashes
//! rather than counters, so re-ingesting an unchanged document is a no-op
//! at the vector store. Splitting itself is delegated to `text-splitter`'s
//! recursive separator search driven by a real `cl100k_base` tokenizer
//! rather than a character sliding window.

use once_cell::sync::Lazy;
use regex::Regex;
use text_splitter::{ChunkConfig, TextSplitter};
use xxhash_rust::xxh3::xxh3_64;

use crate::domain::{Chunk, ChunkMetadata, ContentType, Page};

pub struct ChunkerConfig {
    pub chunk_tokens: usize,
    pub overlap_tokens: usize,
    pub min_chars: usize,
    pub max_digit_ratio: f32,
}

static CHAPTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)chapter\s+(\d+)").expect("valid regex"));
static SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(\d+(?:\.\d+)+)\s+\S").expect("valid regex"));
static MATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[=∑∫√±≤≥≠^]|\\frac|\\sum|\b\d+\s*[+\-*/]\s*\d+").expect("valid regex"));
static PROBLEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(exercise|problem|question)\s*\d*[:.]?").expect("valid regex"));
static EXAMPLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bexample\s*\d*[:.]?").expect("valid regex"));
static INTRO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(introduction|overview|in this chapter)\b").expect("valid regex"));

pub fn chunk_pages(pages: &[Page], subject: Option<&str>, cfg: &ChunkerConfig) -> Vec<Chunk> {
    let tokenizer = tiktoken_rs::cl100k_base().expect("cl100k_base tokenizer data is bundled");

    let chunk_config = ChunkConfig::new(cfg.chunk_tokens)
        .with_sizer(tokenizer)
        .with_overlap(cfg.overlap_tokens)
        .expect("overlap must not exceed chunk size");
    let splitter = TextSplitter::new(chunk_config);

    let mut chunks = Vec::new();

    for page in pages {
        for text in splitter.chunks(&page.text) {
            let text = text.trim();
            if !passes_quality_filter(text, cfg) {
                continue;
            }

            let metadata = ChunkMetadata {
                source: page.source.clone(),
                page: page.page_index,
                // chunk_index/total_chunks are renumbered below, once every
                // page's surviving chunks for this document are known.
                chunk_index: 0,
                total_chunks: 0,
                subject: subject.map(str::to_string),
                chapter: CHAPTER_RE
                    .captures(text)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse().ok()),
                section: SECTION_RE
                    .captures(text)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string()),
                content_type: Some(classify_content(text)),
                has_math: MATH_RE.is_match(text),
            };

            chunks.push(Chunk {
                id: content_hash_id(&page.source, page.page_index, text),
                text: text.to_string(),
                metadata,
            });
        }
    }

    let total = chunks.len();
    for (chunk_index, chunk) in chunks.iter_mut().enumerate() {
        chunk.metadata.chunk_index = chunk_index;
        chunk.metadata.total_chunks = total;
    }

    chunks
}

fn passes_quality_filter(text: &str, cfg: &ChunkerConfig) -> bool {
    if text.chars().count() < cfg.min_chars {
        return false;
    }

    let alphanumeric = text.chars().filter(|c| c.is_alphanumeric()).count();
    if alphanumeric == 0 {
        return false;
    }
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    (digits as f32 / alphanumeric as f32) <= cfg.max_digit_ratio
}

fn classify_content(text: &str) -> ContentType {
    if PROBLEM_RE.is_match(text) {
        ContentType::Problem
    } else if EXAMPLE_RE.is_match(text) {
        ContentType::Example
    } else if INTRO_RE.is_match(text) {
        ContentType::Introduction
    } else {
        ContentType::Explanation
    }
}

/// Deterministic chunk id: the same source/page/text always hashes to the
/// same id, which is what makes re-ingestion an idempotent upsert.
fn content_hash_id(source: &str, page_index: usize, text: &str) -> String {
    let mut buf = String::with_capacity(source.len() + text.len() + 16);
    buf.push_str(source);
    buf.push('|');
    buf.push_str(&page_index.to_string());
    buf.push('|');
    buf.push_str(text);

    format!("{:016x}", xxh3_64(buf.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ChunkerConfig {
        ChunkerConfig {
            chunk_tokens: 50,
            overlap_tokens: 5,
            min_chars: 20,
            max_digit_ratio: 0.5,
        }
    }

    fn page(text: &str) -> Page {
        Page {
            source: "book.pdf".to_string(),
            page_index: 0,
            total_pages: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn same_input_yields_same_ids() {
        let pages = vec![page(
            "This is a reasonably long paragraph about photosynthesis and how plants convert light into chemical energy.",
        )];
        let a = chunk_pages(&pages, Some("biology"), &cfg());
        let b = chunk_pages(&pages, Some("biology"), &cfg());

        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.id, y.id);
        }
    }

    #[test]
    fn short_chunks_are_dropped() {
        let pages = vec![page("Too short.")];
        let chunks = chunk_pages(&pages, None, &cfg());
        assert!(chunks.is_empty());
    }

    #[test]
    fn digit_heavy_chunks_are_dropped() {
        let pages = vec![page("1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20")];
        let chunks = chunk_pages(&pages, None, &cfg());
        assert!(chunks.is_empty());
    }

    #[test]
    fn chapter_and_problem_markers_are_detected() {
        let pages = vec![page(
            "Chapter 3 covers kinematics. Exercise 1: compute the velocity of a ball dropped from 10 meters.",
        )];
        let chunks = chunk_pages(&pages, Some("physics"), &cfg());
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].metadata.chapter, Some(3));
        assert_eq!(chunks[0].metadata.content_type, Some(ContentType::Problem));
    }

    #[test]
    fn math_heavy_text_is_flagged() {
        let pages = vec![page("The integral ∫ x^2 dx = x^3/3 + C is a basic calculus result.")];
        let chunks = chunk_pages(&pages, None, &cfg());
        assert!(!chunks.is_empty());
        assert!(chunks[0].metadata.has_math);
    }
}
