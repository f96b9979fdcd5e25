use super::ExtractedRecord;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;

/// Computes a content hash of an extracted record
///
/// Fields are hashed in name order, so two records with the same values hash equally
/// regardless of rule order. Missing values hash differently from empty strings.
pub fn record_hash(record: &ExtractedRecord) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in record {
        hasher.update(name.as_bytes());
        hasher.update([0x1f]);
        match value {
            Some(v) => {
                hasher.update([0x01]);
                hasher.update(v.as_bytes());
            }
            None => hasher.update([0x00]),
        }
        hasher.update([0x1e]);
    }
    hex::encode(hasher.finalize())
}

/// Record hashes seen by one engine instance
#[derive(Debug, Default)]
pub struct SeenRecords {
    hashes: Mutex<HashSet<String>>,
}

impl SeenRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the hash, returning true if it had been seen before
    pub fn check_and_insert(&self, record: &ExtractedRecord) -> bool {
        let hash = record_hash(record);
        let mut hashes = self.hashes.lock().unwrap_or_else(|e| e.into_inner());
        !hashes.insert(hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
