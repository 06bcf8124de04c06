//! In-memory backend

use std::collections::HashMap;

use super::errors::BackendResult;
use super::{Backend, BackendRecord, RecordKey};

/// Backend holding records in a map. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: HashMap<RecordKey, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Backend for MemoryBackend {
    fn write_batch(&mut self, records: &[BackendRecord]) -> BackendResult<()> {
        for record in records {
            self.records.insert(record.key, record.body.clone());
        }
        Ok(())
    }

    fn read(&mut self, key: &RecordKey) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.records.get(key).cloned())
    }

    fn keys(&self) -> Vec<RecordKey> {
        let mut keys: Vec<_> = self.records.keys().copied().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::PersistentRootId;

    #[test]
    fn test_latest_write_wins() {
        let key = RecordKey::PersistentRoot(PersistentRootId::new());
        let mut backend = MemoryBackend::new();
        backend
            .write_batch(&[BackendRecord::new(key, b"v1".to_vec())])
            .unwrap();
        backend
            .write_batch(&[BackendRecord::new(key, b"v2".to_vec())])
            .unwrap();
        assert_eq!(backend.read(&key).unwrap(), Some(b"v2".to_vec()));
        assert_eq!(backend.len(), 1);
    }
}
