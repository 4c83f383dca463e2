//! Vector repository: the in-memory index plus its durable backing store,
//! behind the async boundary the rest of the crate depends on.

use async_trait::async_trait;
use xxhash_rust::xxh3::xxh3_64;

use crate::domain::{Chunk, RetrievedChunk};
use crate::error::Result;

use super::index::HnswIndex;
use super::persistence::VectorPersistence;

#[async_trait]
pub trait VectorRepository: Send + Sync {
    async fn add(&self, chunks: Vec<(Chunk, Vec<f32>)>) -> Result<usize>;
    async fn search(&self, query_embedding: &[f32], top_k: usize, threshold: f32) -> Result<Vec<RetrievedChunk>>;
    async fn size(&self) -> usize;
    async fn clear(&self) -> Result<()>;
}

pub struct EmbeddedVectorRepository {
    index: HnswIndex,
    persistence: VectorPersistence,
}

impl EmbeddedVectorRepository {
    pub fn open(dimension: usize, persist_dir: &str) -> Result<Self> {
        let path = std::path::Path::new(persist_dir).join("vectors.redb");
        let persistence = VectorPersistence::open(path)?;
        let index = HnswIndex::new(dimension);

        let existing = persistence.load()?;
        if !existing.is_empty() {
            index.load(existing)?;
        }

        Ok(Self { index, persistence })
    }
}

#[async_trait]
impl VectorRepository for EmbeddedVectorRepository {
    async fn add(&self, chunks: Vec<(Chunk, Vec<f32>)>) -> Result<usize> {
        let mut inserted = 0;
        for (chunk, embedding) in chunks {
            let hash = xxh3_64(chunk.text.as_bytes());
            if self.index.contains_hash(hash) {
                continue;
            }
            self.index.upsert(chunk, embedding, hash)?;
            inserted += 1;
        }

        if inserted > 0 {
            self.persistence.save(&self.index.entries())?;
        }
        Ok(inserted)
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize, threshold: f32) -> Result<Vec<RetrievedChunk>> {
        self.index.search(query_embedding, top_k, threshold)
    }

    async fn size(&self) -> usize {
        self.index.len()
    }

    async fn clear(&self) -> Result<()> {
        self.index.clear();
        self.persistence.save(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChunkMetadata;
    use tempfile::tempdir;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            metadata: ChunkMetadata::default(),
        }
    }

    #[tokio::test]
    async fn add_skips_duplicate_content() {
        let dir = tempdir().unwrap();
        let repo = EmbeddedVectorRepository::open(4, dir.path().to_str().unwrap()).unwrap();

        let inserted = repo
            .add(vec![(chunk("c1", "hello world"), vec![1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(inserted, 1);

        let inserted_again = repo
            .add(vec![(chunk("c2", "hello world"), vec![1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(inserted_again, 0);
        assert_eq!(repo.size().await, 1);
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let dir = tempdir().unwrap();
        let repo = EmbeddedVectorRepository::open(4, dir.path().to_str().unwrap()).unwrap();

        repo.add(vec![(chunk("c1", "hello"), vec![1.0, 0.0, 0.0, 0.0])])
            .await
            .unwrap();
        repo.clear().await.unwrap();
        assert_eq!(repo.size().await, 0);
    }
}
