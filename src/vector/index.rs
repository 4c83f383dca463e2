//! In-memory HNSW approximate-nearest-neighbor index backed by
//! `instant-distance`: a `RwLock`-guarded graph rebuilt lazily on the next
//! search after a write, cosine similarity as the distance function,
//! swap-remove for O(1) deletion. The index additionally tracks content
//! hashes so ingestion can skip re-embedding chunks that already exist.

use std::collections::HashMap;

use instant_distance::{Builder, HnswMap, Point, Search};
use ordered_float::OrderedFloat;
use parking_lot::RwLock;

use crate::domain::{Chunk, RetrievedChunk};
use crate::error::{CoreError, Result};
use crate::utils::{cosine_similarity, relevance_score};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub content_hash: u64,
}

#[derive(Clone, Debug)]
struct EmbeddingPoint {
    embedding: Vec<f32>,
}

impl Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        1.0 - cosine_similarity(&self.embedding, &other.embedding).unwrap_or(0.0)
    }
}

struct State {
    entries: Vec<IndexEntry>,
    id_to_index: HashMap<String, usize>,
    hashes: HashMap<u64, String>,
    hnsw: Option<HnswMap<EmbeddingPoint, usize>>,
    dirty: bool,
}

impl State {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            id_to_index: HashMap::new(),
            hashes: HashMap::new(),
            hnsw: None,
            dirty: false,
        }
    }

    fn rebuild(&mut self) {
        if self.entries.is_empty() {
            self.hnsw = None;
            self.dirty = false;
            return;
        }

        let points: Vec<EmbeddingPoint> = self
            .entries
            .iter()
            .map(|e| EmbeddingPoint {
                embedding: e.embedding.clone(),
            })
            .collect();
        let indices: Vec<usize> = (0..self.entries.len()).collect();

        self.hnsw = Some(Builder::default().build(points, indices));
        self.dirty = false;
    }
}

pub struct HnswIndex {
    dimension: usize,
    state: RwLock<State>,
}

impl HnswIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: RwLock::new(State::new()),
        }
    }

    pub fn upsert(&self, chunk: Chunk, embedding: Vec<f32>, content_hash: u64) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(CoreError::VectorStoreFailed(format!(
                "embedding dimension {} does not match index dimension {}",
                embedding.len(),
                self.dimension
            )));
        }

        let mut state = self.state.write();
        let entry = IndexEntry {
            chunk: chunk.clone(),
            embedding,
            content_hash,
        };

        if let Some(&idx) = state.id_to_index.get(&chunk.id) {
            let old_hash = state.entries[idx].content_hash;
            state.hashes.remove(&old_hash);
            state.hashes.insert(content_hash, chunk.id.clone());
            state.entries[idx] = entry;
        } else {
            let idx = state.entries.len();
            state.id_to_index.insert(chunk.id.clone(), idx);
            state.hashes.insert(content_hash, chunk.id.clone());
            state.entries.push(entry);
        }

        state.dirty = true;
        Ok(())
    }

    pub fn contains_hash(&self, hash: u64) -> bool {
        self.state.read().hashes.contains_key(&hash)
    }

    pub fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<RetrievedChunk>> {
        if query.len() != self.dimension {
            return Err(CoreError::VectorStoreFailed(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut state = self.state.write();
        if state.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        if state.dirty || state.hnsw.is_none() {
            state.rebuild();
        }

        let Some(ref hnsw) = state.hnsw else {
            return Ok(Vec::new());
        };

        let query_point = EmbeddingPoint {
            embedding: query.to_vec(),
        };
        let mut search = Search::default();
        let mut results = Vec::new();

        for candidate in hnsw.search(&query_point, &mut search).take(top_k) {
            let idx = *candidate.value;
            let score = relevance_score(1.0 - candidate.distance);
            if score >= threshold {
                results.push(RetrievedChunk {
                    chunk: state.entries[idx].chunk.clone(),
                    score,
                });
            }
        }

        results.sort_by_key(|r| std::cmp::Reverse(OrderedFloat(r.score)));
        Ok(results)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.id_to_index.clear();
        state.hashes.clear();
        state.hnsw = None;
        state.dirty = false;
    }

    pub fn entries(&self) -> Vec<IndexEntry> {
        self.state.read().entries.clone()
    }

    pub fn load(&self, entries: Vec<IndexEntry>) -> Result<()> {
        let mut state = self.state.write();
        state.entries.clear();
        state.id_to_index.clear();
        state.hashes.clear();

        for (idx, entry) in entries.into_iter().enumerate() {
            if entry.embedding.len() != self.dimension {
                return Err(CoreError::VectorStoreFailed(format!(
                    "stored embedding dimension {} does not match index dimension {}",
                    entry.embedding.len(),
                    self.dimension
                )));
            }
            state.id_to_index.insert(entry.chunk.id.clone(), idx);
            state.hashes.insert(entry.content_hash, entry.chunk.id.clone());
            state.entries.push(entry);
        }

        state.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkMetadata;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn insert_and_search() {
        let index = HnswIndex::new(4);
        index.upsert(chunk("c1", "hello"), vec![1.0, 0.0, 0.0, 0.0], 1).unwrap();
        index.upsert(chunk("c2", "world"), vec![0.0, 1.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(index.len(), 2);
        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "c1");
    }

    #[test]
    fn update_existing_id_replaces_entry() {
        let index = HnswIndex::new(4);
        index.upsert(chunk("c1", "hello"), vec![1.0, 0.0, 0.0, 0.0], 1).unwrap();
        index.upsert(chunk("c1", "world"), vec![0.0, 1.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(index.len(), 1);
        let results = index.search(&[0.0, 1.0, 0.0, 0.0], 1, 0.0).unwrap();
        assert_eq!(results[0].chunk.text, "world");
    }

    #[test]
    fn dimension_mismatch_errors() {
        let index = HnswIndex::new(4);
        let err = index.upsert(chunk("c1", "hello"), vec![1.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, CoreError::VectorStoreFailed(_)));
    }

    #[test]
    fn threshold_filters_low_scores() {
        let index = HnswIndex::new(4);
        index.upsert(chunk("c1", "hello"), vec![1.0, 0.0, 0.0, 0.0], 1).unwrap();
        index.upsert(chunk("c2", "world"), vec![0.0, 1.0, 0.0, 0.0], 2).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0, 0.0], 10, 0.9).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "c1");
    }

    #[test]
    fn contains_hash_tracks_dedup_set() {
        let index = HnswIndex::new(4);
        assert!(!index.contains_hash(42));
        index.upsert(chunk("c1", "hello"), vec![1.0, 0.0, 0.0, 0.0], 42).unwrap();
        assert!(index.contains_hash(42));
    }

    #[test]
    fn clear_empties_the_index() {
        let index = HnswIndex::new(4);
        index.upsert(chunk("c1", "hello"), vec![1.0, 0.0, 0.0, 0.0], 1).unwrap();
        index.clear();
        assert!(index.is_empty());
    }
}
