//! Durable single-file persistence for the HNSW index, backed by `redb`.
//!
//! One table keyed by chunk id, `serde_json`-serialized values, full-table
//! rewrite on every save. At this crate's scale (a single textbook's worth
//! of chunks) a full rewrite per ingestion batch is simpler than tracking
//! deltas and still sub-second.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::{CoreError, Result};
use crate::vector::index::IndexEntry;

const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

pub struct VectorPersistence {
    path: PathBuf,
    db: Database,
}

impl VectorPersistence {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::VectorStoreFailed(format!("create dir: {e}")))?;
        }

        let db = Database::create(&path)
            .map_err(|e| CoreError::VectorStoreFailed(format!("open redb: {e}")))?;

        Ok(Self { path, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, entries: &[IndexEntry]) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| CoreError::VectorStoreFailed(format!("begin write: {e}")))?;

        {
            let mut table = write_txn
                .open_table(ENTRIES_TABLE)
                .map_err(|e| CoreError::VectorStoreFailed(format!("open table: {e}")))?;

            let existing_keys: Vec<String> = table
                .iter()
                .map_err(|e| CoreError::VectorStoreFailed(format!("iter table: {e}")))?
                .filter_map(|r| r.ok())
                .map(|(k, _)| k.value().to_string())
                .collect();

            for key in existing_keys {
                table
                    .remove(key.as_str())
                    .map_err(|e| CoreError::VectorStoreFailed(format!("clear entry: {e}")))?;
            }

            for entry in entries {
                let serialized = serde_json::to_vec(entry)
                    .map_err(|e| CoreError::VectorStoreFailed(format!("serialize entry: {e}")))?;
                table
                    .insert(entry.chunk.id.as_str(), serialized.as_slice())
                    .map_err(|e| CoreError::VectorStoreFailed(format!("insert entry: {e}")))?;
            }
        }

        write_txn
            .commit()
            .map_err(|e| CoreError::VectorStoreFailed(format!("commit: {e}")))?;

        Ok(())
    }

    pub fn load(&self) -> Result<Vec<IndexEntry>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| CoreError::VectorStoreFailed(format!("begin read: {e}")))?;

        let table = match read_txn.open_table(ENTRIES_TABLE) {
            Ok(t) => t,
            Err(redb::TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::VectorStoreFailed(format!("open table: {e}"))),
        };

        let mut entries = Vec::new();
        for result in table
            .iter()
            .map_err(|e| CoreError::VectorStoreFailed(format!("iter table: {e}")))?
        {
            let (_, value) = result.map_err(|e| CoreError::VectorStoreFailed(format!("read row: {e}")))?;
            let entry: IndexEntry = serde_json::from_slice(value.value())
                .map_err(|e| CoreError::VectorStoreFailed(format!("deserialize entry: {e}")))?;
            entries.push(entry);
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ChunkMetadata};
    use tempfile::tempdir;

    fn entry(id: &str, text: &str) -> IndexEntry {
        IndexEntry {
            chunk: Chunk {
                id: id.to_string(),
                text: text.to_string(),
                metadata: ChunkMetadata::default(),
            },
            embedding: vec![1.0, 2.0, 3.0, 4.0],
            content_hash: 1,
        }
    }

    #[test]
    fn save_and_load_roundtrips() {
        let dir = tempdir().unwrap();
        let persistence = VectorPersistence::open(dir.path().join("test.redb")).unwrap();

        let entries = vec![entry("c1", "hello"), entry("c2", "world")];
        persistence.save(&entries).unwrap();

        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.len(), 2);
        let ids: Vec<_> = loaded.iter().map(|e| e.chunk.id.as_str()).collect();
        assert!(ids.contains(&"c1"));
        assert!(ids.contains(&"c2"));
    }

    #[test]
    fn load_on_empty_db_is_empty() {
        let dir = tempdir().unwrap();
        let persistence = VectorPersistence::open(dir.path().join("empty.redb")).unwrap();
        assert!(persistence.load().unwrap().is_empty());
    }

    #[test]
    fn save_overwrites_previous_entries() {
        let dir = tempdir().unwrap();
        let persistence = VectorPersistence::open(dir.path().join("test.redb")).unwrap();

        persistence.save(&[entry("c1", "hello")]).unwrap();
        persistence.save(&[entry("c1", "world")]).unwrap();

        let loaded = persistence.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].chunk.text, "world");
    }
}
