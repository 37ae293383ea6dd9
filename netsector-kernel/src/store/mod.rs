/**
 * RECORD STORE - Couche de persistance abstraite de NetSector
 *
 * RÔLE :
 * Le moteur n'a besoin que d'un stockage clé/collection. Ce module définit
 * le trait `RecordStore` et ses implémentations (fichiers JSON, mémoire).
 *
 * FONCTIONNEMENT :
 * - Collection = ensemble nommé d'enregistrements JSON (sectors, devices, edges, history)
 * - read/write travaillent sur la collection entière (les volumes sont petits)
 * - Les helpers typés `read_records` / `write_records` font la (dé)sérialisation
 *
 * Les overrides ne passent pas par ici : ils sont volontairement transitoires.
 */

pub mod json;
pub mod memory;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Erreurs possibles sur les stores (record store et topologie)
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unknown sector: {0}")]
    UnknownSector(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid record: {0}")]
    Invalid(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Sectors,
    Devices,
    Edges,
    History,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Sectors,
        Collection::Devices,
        Collection::Edges,
        Collection::History,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Sectors => "sectors",
            Collection::Devices => "devices",
            Collection::Edges => "edges",
            Collection::History => "history",
        }
    }
}

/// Description d'un backend, pour les logs de démarrage
#[derive(Debug, Clone)]
pub struct StoreInfo {
    pub backend: String,
    pub location: Option<String>,
}

/// Interface commune de persistance
pub trait RecordStore: Send + Sync {
    /// Lit tous les enregistrements d'une collection
    fn read(&self, collection: Collection) -> Result<Vec<serde_json::Value>, StoreError>;

    /// Remplace le contenu complet d'une collection
    fn write(&self, collection: Collection, records: Vec<serde_json::Value>) -> Result<(), StoreError>;

    fn info(&self) -> StoreInfo;
}

pub fn read_records<T: DeserializeOwned>(
    store: &dyn RecordStore,
    collection: Collection,
) -> Result<Vec<T>, StoreError> {
    store
        .read(collection)?
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(StoreError::from))
        .collect()
}

pub fn write_records<T: Serialize>(
    store: &dyn RecordStore,
    collection: Collection,
    records: &[T],
) -> Result<(), StoreError> {
    let values = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    store.write(collection, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DependencyEdge;

    #[test]
    fn typed_helpers_roundtrip_through_memory_store() {
        let store = MemoryStore::new();
        let edges = vec![DependencyEdge::new("CPD", "OLD")];
        write_records(&store, Collection::Edges, &edges).unwrap();
        let back: Vec<DependencyEdge> = read_records(&store, Collection::Edges).unwrap();
        assert_eq!(back, edges);
    }

    #[test]
    fn malformed_record_is_a_serialization_error() {
        let store = MemoryStore::new();
        store.write(Collection::Edges, vec![serde_json::json!({"from": 1})]).unwrap();
        let res: Result<Vec<DependencyEdge>, _> = read_records(&store, Collection::Edges);
        assert!(matches!(res, Err(StoreError::Serialization(_))));
    }

    #[test]
    fn collections_are_named_by_their_file_stem() {
        let names: Vec<_> = Collection::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["sectors", "devices", "edges", "history"]);
    }
}
