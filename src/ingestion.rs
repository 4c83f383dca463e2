//! Ingestion orchestrator: drives document loading, chunking, batched
//! embedding, and vector storage for a batch of submitted documents,
//! reporting a per-file outcome so a single bad document never aborts the
//! batch.
//!
//! A phased pipeline, with no progress callback (there is no WebSocket
//! progress channel to consume one). Chunks are collected across every
//! document in the batch before the single batched embedding call;
//! `vector_repo.add` is then called per source document so `chunks_added`
//! stays attributable to the file it came from.

use std::sync::Arc;

use serde::Serialize;

use crate::document::{self, chunker, ChunkerConfig};
use crate::domain::{Chunk, Page};
use crate::embedding::EmbeddingProvider;
use crate::vector::VectorRepository;

pub struct FileInput {
    pub source: String,
    pub bytes: Vec<u8>,
}

/// A document already reduced to pages, for callers that bypass the
/// extension-based loader dispatch (webpage ingestion already has page
/// text from the scraper, not raw bytes with a file extension).
struct LoadedDoc {
    source: String,
    pages: Vec<Page>,
    ocr_used: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub source: String,
    pub pages: usize,
    pub chunks_added: usize,
    pub ocr_used: bool,
    pub error: Option<String>,
}

pub struct IngestionOrchestrator {
    embedder: Arc<dyn EmbeddingProvider>,
    vector_repo: Arc<dyn VectorRepository>,
    chunker_cfg: ChunkerConfig,
}

impl IngestionOrchestrator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector_repo: Arc<dyn VectorRepository>,
        chunker_cfg: ChunkerConfig,
    ) -> Self {
        Self {
            embedder,
            vector_repo,
            chunker_cfg,
        }
    }

    /// Ingests every file in the batch, returning one outcome per input in
    /// the same order. A load/chunk failure for one file never prevents
    /// the others from being processed.
    pub async fn ingest_batch(&self, files: Vec<FileInput>) -> Vec<FileOutcome> {
        let mut loaded: Vec<Result<LoadedDoc, (String, crate::error::CoreError)>> = Vec::with_capacity(files.len());
        for file in files {
            match document::load(&file.source, &file.bytes) {
                Ok((pages, ocr_used)) => loaded.push(Ok(LoadedDoc { source: file.source, pages, ocr_used })),
                Err(e) => loaded.push(Err((file.source, e))),
            }
        }
        self.ingest_loaded(loaded).await
    }

    /// Ingests documents whose pages were already produced upstream (e.g.
    /// the webpage-ingestion handler, which extracts text via `scraper`
    /// directly rather than through the extension-based loader dispatch).
    pub async fn ingest_pages(&self, docs: Vec<(String, Vec<Page>)>) -> Vec<FileOutcome> {
        let loaded = docs
            .into_iter()
            .map(|(source, pages)| Ok(LoadedDoc { source, pages, ocr_used: false }))
            .collect();
        self.ingest_loaded(loaded).await
    }

    async fn ingest_loaded(
        &self,
        loaded: Vec<Result<LoadedDoc, (String, crate::error::CoreError)>>,
    ) -> Vec<FileOutcome> {
        let mut outcomes: Vec<FileOutcome> = Vec::with_capacity(loaded.len());
        let mut all_pairs: Vec<(Chunk, Vec<f32>)> = Vec::new();
        let mut ranges: Vec<Option<(usize, usize)>> = Vec::with_capacity(loaded.len());
        let mut all_chunks: Vec<Chunk> = Vec::new();

        for doc in loaded {
            match doc {
                Ok(doc) => {
                    let page_count = doc.pages.len();
                    let subject = infer_subject(&doc.source);
                    let chunks = chunker::chunk_pages(&doc.pages, subject.as_deref(), &self.chunker_cfg);

                    let start = all_chunks.len();
                    all_chunks.extend(chunks);
                    let end = all_chunks.len();
                    ranges.push(Some((start, end)));
                    outcomes.push(FileOutcome {
                        source: doc.source,
                        pages: page_count,
                        chunks_added: 0,
                        ocr_used: doc.ocr_used,
                        error: None,
                    });
                }
                Err((source, e)) => {
                    tracing::warn!(source = %source, error = %e, "ingestion failed before embedding");
                    ranges.push(None);
                    outcomes.push(FileOutcome {
                        source,
                        pages: 0,
                        chunks_added: 0,
                        ocr_used: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        if all_chunks.is_empty() {
            return outcomes;
        }

        let texts: Vec<String> = all_chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = match self.embedder.embed_batch(texts).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "ingestion embedding stage failed for the whole batch");
                for outcome in outcomes.iter_mut() {
                    if outcome.error.is_none() {
                        outcome.error = Some(format!("embedding failed: {e}"));
                    }
                }
                return outcomes;
            }
        };

        all_pairs.extend(all_chunks.into_iter().zip(embeddings));

        for (outcome, range) in outcomes.iter_mut().zip(ranges.into_iter()) {
            let Some((start, end)) = range else { continue };
            if start == end {
                continue;
            }
            let slice = all_pairs[start..end].to_vec();
            match self.vector_repo.add(slice).await {
                Ok(added) => outcome.chunks_added = added,
                Err(e) => {
                    tracing::warn!(source = %outcome.source, error = %e, "ingestion failed at vector-store stage");
                    outcome.error = Some(format!("vector store failed: {e}"));
                }
            }
        }

        outcomes
    }
}

/// Infers a subject tag from the document's path, e.g. `algebra/ch1.pdf`
/// → `Some("algebra")`. Returns `None` when the source has no meaningful
/// parent directory — a best-effort heuristic, not a classifier.
fn infer_subject(source: &str) -> Option<String> {
    std::path::Path::new(source)
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0, 0.0])
        }
        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            4
        }
    }

    struct FakeRepo {
        added: AtomicUsize,
    }

    #[async_trait]
    impl VectorRepository for FakeRepo {
        async fn add(&self, chunks: Vec<(Chunk, Vec<f32>)>) -> Result<usize> {
            let n = chunks.len();
            self.added.fetch_add(n, Ordering::SeqCst);
            Ok(n)
        }
        async fn search(&self, _q: &[f32], _k: usize, _t: f32) -> Result<Vec<crate::domain::RetrievedChunk>> {
            Ok(Vec::new())
        }
        async fn size(&self) -> usize {
            self.added.load(Ordering::SeqCst)
        }
        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    fn cfg() -> ChunkerConfig {
        ChunkerConfig {
            chunk_tokens: 200,
            overlap_tokens: 10,
            min_chars: 20,
            max_digit_ratio: 0.5,
        }
    }

    #[tokio::test]
    async fn one_bad_file_does_not_abort_the_batch() {
        let orchestrator = IngestionOrchestrator::new(
            Arc::new(FakeEmbedder),
            Arc::new(FakeRepo { added: AtomicUsize::new(0) }),
            cfg(),
        );

        let files = vec![
            FileInput { source: "notes.xyz".to_string(), bytes: b"garbage".to_vec() },
            FileInput {
                source: "book.txt".to_string(),
                bytes: b"This is a long enough paragraph of plain text content to survive the chunk quality filter easily."
                    .to_vec(),
            },
        ];

        let outcomes = orchestrator.ingest_batch(files).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].error.is_some());
        assert!(outcomes[1].error.is_none());
        assert_eq!(outcomes[1].chunks_added, 1);
    }

    #[test]
    fn subject_is_inferred_from_parent_directory() {
        assert_eq!(infer_subject("algebra/ch1.pdf"), Some("algebra".to_string()));
        assert_eq!(infer_subject("ch1.pdf"), None);
    }
}
