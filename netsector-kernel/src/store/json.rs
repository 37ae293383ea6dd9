/**
 * JSON FILE STORE - Persistance des collections en fichiers JSON
 *
 * FONCTIONNEMENT :
 * - Un fichier `<collection>.json` par collection dans le répertoire de données
 * - Cache mémoire chargé au démarrage, écriture immédiate (write-through)
 * - Fichier absent = collection vide, créé à `[]`
 */

use super::{Collection, RecordStore, StoreError, StoreInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct JsonFileStore {
    dir: PathBuf,
    cache: Mutex<HashMap<Collection, Vec<serde_json::Value>>>,
}

impl JsonFileStore {
    /// Ouvre (ou initialise) le store dans `dir`
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let store = Self {
            dir,
            cache: Mutex::new(HashMap::new()),
        };
        store.load_from_disk()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }

    fn load_from_disk(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.lock();
        for collection in Collection::ALL {
            let path = self.path_for(collection);
            if !path.exists() {
                fs::write(&path, "[]")?;
            }
            let content = fs::read_to_string(&path)?;
            let records: Vec<serde_json::Value> = if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            };
            debug!(collection = collection.name(), count = records.len(), "loaded collection");
            cache.insert(collection, records);
        }
        Ok(())
    }

    fn save_to_disk(&self, collection: Collection, records: &[serde_json::Value]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)?;
        // écriture via fichier temporaire pour ne jamais laisser un JSON tronqué
        let path = self.path_for(collection);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn read(&self, collection: Collection) -> Result<Vec<serde_json::Value>, StoreError> {
        Ok(self.cache.lock().get(&collection).cloned().unwrap_or_default())
    }

    fn write(&self, collection: Collection, records: Vec<serde_json::Value>) -> Result<(), StoreError> {
        let mut cache = self.cache.lock();
        self.save_to_disk(collection, &records)?;
        cache.insert(collection, records);
        Ok(())
    }

    fn info(&self) -> StoreInfo {
        StoreInfo {
            backend: "json-file".to_string(),
            location: Some(self.dir.display().to_string()),
        }
    }
}
