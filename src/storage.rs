//! File-backed identity registry: one postcard file per identity.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::registry::{
    CorruptRecord, IdentityRecord, IdentityRegistry, Snapshot, UpsertStatus, Upserted,
};
use crate::vector::Embedding;

const RECORD_EXT: &str = "bin";
// Keeps hex-encoded file names under common 255 byte limits.
const MAX_EXTERNAL_ID_BYTES: usize = 120;

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    id: Uuid,
    external_id: String,
    display_name: String,
    embedding: Vec<f64>,
}

pub struct FileRegistry {
    root: PathBuf,
    dimension: usize,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

enum Loaded {
    Missing,
    Record(IdentityRecord),
    Corrupt(CorruptRecord),
}

fn file_stem(external_id: &str) -> String {
    external_id.bytes().map(|b| format!("{b:02x}")).collect()
}

impl FileRegistry {
    pub fn open(root: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| Error::storage(format!("creating {}", root.display()), e))?;
        Ok(Self {
            root,
            dimension,
            key_locks: Mutex::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, external_id: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", file_stem(external_id), RECORD_EXT))
    }

    fn key_lock(&self, external_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(external_id.to_string()).or_default().clone()
    }

    /// Drop the key's lock entry once no other writer holds a handle to it.
    fn release_key_lock(&self, external_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One handle in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(external_id);
        }
    }

    #[cfg(test)]
    fn key_lock_count(&self) -> usize {
        self.key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn decode(&self, path: &Path, data: &[u8]) -> std::result::Result<IdentityRecord, String> {
        let stored: StoredRecord =
            postcard::from_bytes(data).map_err(|e| format!("undecodable record: {e}"))?;
        if path.file_stem().and_then(|s| s.to_str()) != Some(file_stem(&stored.external_id).as_str())
        {
            return Err(format!(
                "record for {:?} stored under the wrong key",
                stored.external_id
            ));
        }
        let embedding = Embedding::new(stored.embedding);
        embedding
            .validate(self.dimension)
            .map_err(|e| e.to_string())?;
        Ok(IdentityRecord {
            id: stored.id,
            external_id: stored.external_id,
            display_name: stored.display_name,
            embedding,
        })
    }

    fn load(&self, path: &Path) -> Result<Loaded> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Loaded::Missing),
            Err(e) => return Err(Error::storage(format!("reading {}", path.display()), e)),
        };
        Ok(match self.decode(path, &data) {
            Ok(record) => Loaded::Record(record),
            Err(reason) => Loaded::Corrupt(CorruptRecord {
                location: path.display().to_string(),
                reason,
            }),
        })
    }

    /// Write to a sibling temp file, then rename over the record so readers
    /// never observe a partial write.
    fn store(&self, path: &Path, record: &IdentityRecord) -> Result<()> {
        let stored = StoredRecord {
            id: record.id,
            external_id: record.external_id.clone(),
            display_name: record.display_name.clone(),
            embedding: record.embedding.as_slice().to_vec(),
        };
        let data = postcard::to_allocvec(&stored).map_err(|e| {
            Error::storage(
                format!("encoding record {}", record.external_id),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;

        let tmp = self
            .root
            .join(format!(".{}.tmp", Uuid::now_v7().simple()));
        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&data)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::storage(format!("writing {}", path.display()), e));
        }
        Ok(())
    }
}

impl IdentityRegistry for FileRegistry {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert(
        &self,
        external_id: &str,
        display_name: &str,
        embedding: Embedding,
    ) -> Result<Upserted> {
        if external_id.is_empty() || external_id.len() > MAX_EXTERNAL_ID_BYTES {
            return Err(Error::InvalidRequest(format!(
                "external identifier must be 1 to {MAX_EXTERNAL_ID_BYTES} bytes"
            )));
        }
        embedding.validate(self.dimension)?;

        let lock = self.key_lock(external_id);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.upsert_locked(external_id, display_name, embedding)
        };
        self.release_key_lock(external_id, lock);
        result
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| Error::storage(format!("listing {}", self.root.display()), e))?;

        let mut snapshot = Snapshot::default();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::storage(format!("listing {}", self.root.display()), e))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            match self.load(&path)? {
                Loaded::Record(record) => snapshot.records.push(record),
                // Replaced between listing and reading
                Loaded::Missing => {}
                Loaded::Corrupt(corrupt) => {
                    warn!(
                        "Skipping corrupt record {}: {}",
                        corrupt.location, corrupt.reason
                    );
                    snapshot.skipped.push(corrupt);
                }
            }
        }

        snapshot.records.sort_by_key(|r| r.id);
        Ok(snapshot)
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<IdentityRecord>> {
        match self.load(&self.record_path(external_id))? {
            Loaded::Missing => Ok(None),
            Loaded::Record(record) => Ok(Some(record)),
            Loaded::Corrupt(corrupt) => Err(Error::CorruptRecord {
                location: corrupt.location,
                reason: corrupt.reason,
            }),
        }
    }
}

impl FileRegistry {
    /// Caller holds the key lock for `external_id`.
    fn upsert_locked(
        &self,
        external_id: &str,
        display_name: &str,
        embedding: Embedding,
    ) -> Result<Upserted> {
        let path = self.record_path(external_id);
        let (id, status) = match self.load(&path)? {
            Loaded::Record(existing) => (existing.id, UpsertStatus::Updated),
            Loaded::Missing => (Uuid::now_v7(), UpsertStatus::Created),
            Loaded::Corrupt(corrupt) => {
                warn!(
                    "Replacing corrupt record {}: {}",
                    corrupt.location, corrupt.reason
                );
                (Uuid::now_v7(), UpsertStatus::Created)
            }
        };

        let record = IdentityRecord {
            id,
            external_id: external_id.to_string(),
            display_name: display_name.to_string(),
            embedding,
        };
        self.store(&path, &record)?;

        match status {
            UpsertStatus::Created => info!("Registered new face for {}", external_id),
            UpsertStatus::Updated => info!("Updated face embedding for {}", external_id),
        }
        Ok(Upserted { record, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_is_hex() {
        assert_eq!(file_stem("E1"), "4531");
        assert_eq!(file_stem("a/b"), "612f62");
        assert_eq!(file_stem(""), "");
    }

    #[test]
    fn test_key_locks_released_after_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::open(dir.path(), 1).unwrap();
        for i in 0..10 {
            registry
                .upsert(&format!("E{i}"), "name", Embedding::new(vec![1.0]))
                .unwrap();
        }
        // Rejected writes leave no entry behind
        assert!(registry.upsert("E0", "name", Embedding::new(vec![1.0, 2.0])).is_err());
        assert_eq!(registry.key_lock_count(), 0);
    }

    #[test]
    fn test_non_finite_stored_embedding_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::open(dir.path(), 2).unwrap();
        registry
            .upsert("E1", "Alice", Embedding::new(vec![0.5, 0.5]))
            .unwrap();
        let bad = IdentityRecord {
            id: Uuid::now_v7(),
            external_id: "E2".to_string(),
            display_name: "Bob".to_string(),
            embedding: Embedding::new(vec![f64::NAN, 0.0]),
        };
        registry.store(&registry.record_path("E2"), &bad).unwrap();

        let snapshot = registry.snapshot().unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].external_id, "E1");
        assert_eq!(snapshot.skipped.len(), 1);
        assert!(snapshot.skipped[0].reason.contains("not finite"));
        assert!(matches!(
            registry.find_by_external_id("E2"),
            Err(Error::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_unreadable_record_fails_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileRegistry::open(dir.path(), 1).unwrap();
        registry.upsert("E1", "Alice", Embedding::new(vec![1.0])).unwrap();
        // A directory where a record file should be cannot be read
        std::fs::create_dir(registry.record_path("E2")).unwrap();

        assert!(matches!(
            registry.snapshot(),
            Err(Error::StorageUnavailable { .. })
        ));
        assert!(matches!(
            registry.find_by_external_id("E2"),
            Err(Error::StorageUnavailable { .. })
        ));
    }
}
