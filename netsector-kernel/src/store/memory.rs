use super::{Collection, RecordStore, StoreError, StoreInfo};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Store volatile, utilisé en repli quand le répertoire de données est inutilisable
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<Collection, Vec<serde_json::Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn read(&self, collection: Collection) -> Result<Vec<serde_json::Value>, StoreError> {
        Ok(self.data.lock().get(&collection).cloned().unwrap_or_default())
    }

    fn write(&self, collection: Collection, records: Vec<serde_json::Value>) -> Result<(), StoreError> {
        self.data.lock().insert(collection, records);
        Ok(())
    }

    fn info(&self) -> StoreInfo {
        StoreInfo {
            backend: "memory".to_string(),
            location: None,
        }
    }
}
