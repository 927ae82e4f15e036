//! Identity registry: the single source of truth for matching.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::vector::Embedding;

/// One enrolled identity and its canonical embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Row id, assigned on creation and kept across updates. Time ordered.
    pub id: Uuid,
    pub external_id: String,
    pub display_name: String,
    pub embedding: Embedding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertStatus {
    Created,
    Updated,
}

impl UpsertStatus {
    pub fn http_status(self) -> u16 {
        match self {
            UpsertStatus::Created => 201,
            UpsertStatus::Updated => 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub record: IdentityRecord,
    pub status: UpsertStatus,
}

/// A stored entry that could not be read back during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptRecord {
    pub location: String,
    pub reason: String,
}

/// Consistent view of the registry, ordered by row id (creation order).
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: Vec<IdentityRecord>,
    pub skipped: Vec<CorruptRecord>,
}

/// Durable mapping from external identifier to canonical embedding.
///
/// `upsert` is atomic per key and with respect to `snapshot` readers.
pub trait IdentityRegistry: Send + Sync {
    /// Embedding length every record must have.
    fn dimension(&self) -> usize;

    /// Create the record for `external_id`, or overwrite its name and
    /// embedding in place, keeping the row id.
    fn upsert(&self, external_id: &str, display_name: &str, embedding: Embedding)
        -> Result<Upserted>;

    fn snapshot(&self) -> Result<Snapshot>;

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<IdentityRecord>>;
}

/// Process-local registry, mostly useful for tests and embedding.
pub struct MemoryRegistry {
    dimension: usize,
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    records: Vec<IdentityRecord>,
    index: HashMap<String, usize>,
}

impl MemoryRegistry {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::default(),
        }
    }
}

impl IdentityRegistry for MemoryRegistry {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn upsert(
        &self,
        external_id: &str,
        display_name: &str,
        embedding: Embedding,
    ) -> Result<Upserted> {
        embedding.validate(self.dimension)?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(&pos) = inner.index.get(external_id) {
            let record = &mut inner.records[pos];
            record.display_name = display_name.to_string();
            record.embedding = embedding;
            info!("Updated face embedding for {}", external_id);
            return Ok(Upserted {
                record: record.clone(),
                status: UpsertStatus::Updated,
            });
        }

        let record = IdentityRecord {
            id: Uuid::now_v7(),
            external_id: external_id.to_string(),
            display_name: display_name.to_string(),
            embedding,
        };
        let pos = inner.records.len();
        inner.records.push(record.clone());
        inner.index.insert(external_id.to_string(), pos);
        info!("Registered new face for {}", external_id);
        Ok(Upserted {
            record,
            status: UpsertStatus::Created,
        })
    }

    fn snapshot(&self) -> Result<Snapshot> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Snapshot {
            records: inner.records.clone(),
            skipped: Vec::new(),
        })
    }

    fn find_by_external_id(&self, external_id: &str) -> Result<Option<IdentityRecord>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .index
            .get(external_id)
            .map(|&pos| inner.records[pos].clone()))
    }
}
