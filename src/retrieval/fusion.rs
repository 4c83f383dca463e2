//! The FUSE state: combines PDF and web sources into the single plain-text
//! context the generator is prompted with.
//!
//! Rollback-truncation: sort by relevance, then trim from the lowest
//! ranked item until within budget. Output is a flat two-block, numbered-
//! label format rather than per-document XML-ish grouping.

use crate::domain::{RetrievedChunk, WebResult};

pub fn fuse(pdf_sources: &[RetrievedChunk], web_sources: &[WebResult], char_budget: usize) -> String {
    let mut pdf_lines: Vec<String> = pdf_sources
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let chapter = r
                .chunk
                .metadata
                .chapter
                .map(|c| format!(", chapter={c}"))
                .unwrap_or_default();
            format!(
                "({}) {} — source={}, page={}{}",
                i + 1,
                r.chunk.text,
                r.chunk.metadata.source,
                r.chunk.metadata.page,
                chapter
            )
        })
        .collect();

    let mut web_lines: Vec<String> = web_sources
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let date = r
                .published_date
                .as_deref()
                .map(|d| format!(" — {d}"))
                .unwrap_or_default();
            format!("(W{}) {} — {}{}\n     {}", i + 1, r.title, r.url, date, r.snippet)
        })
        .collect();

    truncate_lowest_ranked_first(&mut pdf_lines, &mut web_lines, char_budget);

    let mut out = String::new();
    if !pdf_lines.is_empty() {
        out.push_str("[TEXTBOOK SOURCES]\n");
        out.push_str(&pdf_lines.join("\n"));
        out.push('\n');
    }
    if !web_lines.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("[WEB SOURCES]\n");
        out.push_str(&web_lines.join("\n"));
        out.push('\n');
    }

    out
}

fn block_len(lines: &[String]) -> usize {
    lines.iter().map(|l| l.len() + 1).sum()
}

/// Drops the lowest-ranked (last) line from whichever block is currently
/// longer until the combined length fits the budget, so higher-relevance
/// items are preserved first in both blocks.
fn truncate_lowest_ranked_first(pdf_lines: &mut Vec<String>, web_lines: &mut Vec<String>, budget: usize) {
    while block_len(pdf_lines) + block_len(web_lines) > budget {
        if pdf_lines.is_empty() && web_lines.is_empty() {
            break;
        }
        if block_len(pdf_lines) >= block_len(web_lines) {
            if pdf_lines.pop().is_none() {
                web_lines.pop();
            }
        } else if web_lines.pop().is_none() {
            pdf_lines.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ChunkMetadata};

    fn pdf_source(text: &str, page: usize) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: "x".to_string(),
                text: text.to_string(),
                metadata: ChunkMetadata {
                    source: "book.pdf".to_string(),
                    page,
                    ..Default::default()
                },
            },
            score: 0.9,
        }
    }

    fn web_source(title: &str) -> WebResult {
        WebResult {
            title: title.to_string(),
            url: "https://example.com".to_string(),
            published_date: None,
            snippet: "snippet text".to_string(),
            score: 0.8,
        }
    }

    #[test]
    fn empty_sources_produce_empty_context() {
        assert_eq!(fuse(&[], &[], 1_000), "");
    }

    #[test]
    fn textbook_block_precedes_web_block() {
        let context = fuse(&[pdf_source("a rational number is...", 3)], &[web_source("quantum news")], 1_000);
        let pdf_pos = context.find("[TEXTBOOK SOURCES]").unwrap();
        let web_pos = context.find("[WEB SOURCES]").unwrap();
        assert!(pdf_pos < web_pos);
        assert!(context.contains("page=3"));
    }

    #[test]
    fn truncation_respects_char_budget() {
        let pdf = vec![pdf_source(&"x".repeat(500), 1), pdf_source(&"y".repeat(500), 2)];
        let context = fuse(&pdf, &[], 400);
        assert!(context.len() <= 500);
    }
}
