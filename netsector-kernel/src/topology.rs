/**
 * TOPOLOGY STORE - Secteurs, équipements et dépendances du site
 *
 * RÔLE :
 * CRUD typé au-dessus d'un `RecordStore`. Aucune logique métier ici, seulement
 * la forme des enregistrements et la cohérence référentielle.
 *
 * FONCTIONNEMENT :
 * - Les opérations CRUD explicites refusent une référence à un secteur inconnu
 * - `snapshot()` produit la vue figée utilisée par un tick : les références
 *   orphelines (secteur supprimé entre-temps) y sont écartées avec un warning
 * - Supprimer un secteur ne supprime rien d'autre : ses équipements et arêtes
 *   restent stockés mais ne sont plus surveillés
 */

use crate::models::{DependencyEdge, Device, Sector};
use crate::store::{read_records, write_records, Collection, RecordStore, StoreError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Vue cohérente de la configuration pour un tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    #[serde(default)]
    pub sectors: Vec<Sector>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub edges: Vec<DependencyEdge>,
}

impl TopologySnapshot {
    /// Écarte les doublons de secteurs et les références vers des secteurs inconnus
    pub fn validated(self) -> Self {
        let mut seen = HashSet::new();
        let mut sectors = Vec::with_capacity(self.sectors.len());
        for sector in self.sectors {
            if seen.insert(sector.id.clone()) {
                sectors.push(sector);
            } else {
                warn!(sector = %sector.id, "duplicate sector id dropped");
            }
        }

        let devices = self
            .devices
            .into_iter()
            .filter(|d| {
                let known = seen.contains(&d.sector_id);
                if !known {
                    warn!(device = %d.id, sector = %d.sector_id, "device references unknown sector, dropped");
                }
                known
            })
            .collect();

        let edges = self
            .edges
            .into_iter()
            .filter(|e| {
                let known = seen.contains(&e.from) && seen.contains(&e.to);
                if !known {
                    warn!(from = %e.from, to = %e.to, "dangling dependency edge dropped");
                }
                known
            })
            .collect();

        Self { sectors, devices, edges }
    }

    pub fn devices_of<'a>(&'a self, sector_id: &'a str) -> impl Iterator<Item = &'a Device> + 'a {
        self.devices.iter().filter(move |d| d.sector_id == sector_id)
    }
}

#[derive(Clone)]
pub struct TopologyStore {
    store: Arc<dyn RecordStore>,
    // sérialise les read-modify-write venant de l'API
    write_lock: Arc<Mutex<()>>,
}

impl TopologyStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn list_sectors(&self) -> Result<Vec<Sector>, StoreError> {
        read_records(self.store.as_ref(), Collection::Sectors)
    }

    pub fn get_sector(&self, id: &str) -> Result<Sector, StoreError> {
        self.list_sectors()?
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("sector {id}")))
    }

    /// Crée ou remplace un secteur (clé = id)
    pub fn upsert_sector(&self, sector: Sector) -> Result<Sector, StoreError> {
        let sector = normalize_sector(sector)?;
        let _guard = self.write_lock.lock();
        let mut sectors = self.list_sectors()?;
        match sectors.iter_mut().find(|s| s.id == sector.id) {
            Some(existing) => *existing = sector.clone(),
            None => sectors.push(sector.clone()),
        }
        write_records(self.store.as_ref(), Collection::Sectors, &sectors)?;
        info!(sector = %sector.id, "sector saved");
        Ok(sector)
    }

    /// Remplace toute la table des secteurs
    pub fn replace_sectors(&self, sectors: Vec<Sector>) -> Result<Vec<Sector>, StoreError> {
        let sectors = sectors
            .into_iter()
            .map(normalize_sector)
            .collect::<Result<Vec<_>, _>>()?;
        let mut ids = HashSet::new();
        if let Some(dup) = sectors.iter().find(|s| !ids.insert(s.id.as_str())) {
            return Err(StoreError::Invalid(format!("duplicate sector id {}", dup.id)));
        }

        let _guard = self.write_lock.lock();
        write_records(self.store.as_ref(), Collection::Sectors, &sectors)?;
        info!(count = sectors.len(), "sector table replaced");
        Ok(sectors)
    }

    pub fn remove_sector(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut sectors = self.list_sectors()?;
        let before = sectors.len();
        sectors.retain(|s| s.id != id);
        if sectors.len() == before {
            return Err(StoreError::NotFound(format!("sector {id}")));
        }
        write_records(self.store.as_ref(), Collection::Sectors, &sectors)?;
        info!(sector = %id, "sector removed from monitoring");
        Ok(())
    }

    pub fn list_devices(&self, sector_id: Option<&str>) -> Result<Vec<Device>, StoreError> {
        let devices: Vec<Device> = read_records(self.store.as_ref(), Collection::Devices)?;
        Ok(match sector_id {
            Some(id) => devices.into_iter().filter(|d| d.sector_id == id).collect(),
            None => devices,
        })
    }

    pub fn add_device(&self, mut device: Device) -> Result<Device, StoreError> {
        device.name = device.name.trim().to_string();
        device.address = device.address.trim().to_string();
        if device.name.is_empty() || device.address.is_empty() {
            return Err(StoreError::Invalid("device needs a name and an address".into()));
        }
        if device.id.trim().is_empty() {
            device.id = Uuid::new_v4().to_string();
        }

        let _guard = self.write_lock.lock();
        self.ensure_sector(&device.sector_id)?;
        let mut devices = self.list_devices(None)?;
        if devices.iter().any(|d| d.id == device.id) {
            return Err(StoreError::Invalid(format!("duplicate device id {}", device.id)));
        }
        devices.push(device.clone());
        write_records(self.store.as_ref(), Collection::Devices, &devices)?;
        info!(device = %device.id, sector = %device.sector_id, "device added");
        Ok(device)
    }

    pub fn remove_device(&self, sector_id: &str, device_id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut devices = self.list_devices(None)?;
        let before = devices.len();
        devices.retain(|d| !(d.sector_id == sector_id && d.id == device_id));
        if devices.len() == before {
            return Err(StoreError::NotFound(format!("device {device_id} in sector {sector_id}")));
        }
        write_records(self.store.as_ref(), Collection::Devices, &devices)?;
        info!(device = %device_id, sector = %sector_id, "device removed");
        Ok(())
    }

    pub fn list_edges(&self) -> Result<Vec<DependencyEdge>, StoreError> {
        read_records(self.store.as_ref(), Collection::Edges)
    }

    /// Ajoute une arête ; sans effet si elle existe déjà
    pub fn add_edge(&self, edge: DependencyEdge) -> Result<DependencyEdge, StoreError> {
        if edge.from == edge.to {
            return Err(StoreError::Invalid(format!("self dependency on {}", edge.from)));
        }
        let _guard = self.write_lock.lock();
        self.ensure_sector(&edge.from)?;
        self.ensure_sector(&edge.to)?;
        let mut edges = self.list_edges()?;
        if !edges.contains(&edge) {
            edges.push(edge.clone());
            write_records(self.store.as_ref(), Collection::Edges, &edges)?;
            info!(from = %edge.from, to = %edge.to, "dependency edge added");
        }
        Ok(edge)
    }

    pub fn remove_edge(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut edges = self.list_edges()?;
        let before = edges.len();
        edges.retain(|e| !(e.from == from && e.to == to));
        if edges.len() == before {
            return Err(StoreError::NotFound(format!("edge {from} -> {to}")));
        }
        write_records(self.store.as_ref(), Collection::Edges, &edges)?;
        Ok(())
    }

    /// Remplace toutes les arêtes ; celles vers des secteurs inconnus sont écartées
    pub fn replace_edges(&self, edges: Vec<DependencyEdge>) -> Result<Vec<DependencyEdge>, StoreError> {
        let _guard = self.write_lock.lock();
        let known: HashSet<String> = self.list_sectors()?.into_iter().map(|s| s.id).collect();
        let mut kept: Vec<DependencyEdge> = Vec::with_capacity(edges.len());
        for edge in edges {
            if !known.contains(&edge.from) || !known.contains(&edge.to) {
                warn!(from = %edge.from, to = %edge.to, "edge references unknown sector, dropped");
                continue;
            }
            if !kept.contains(&edge) {
                kept.push(edge);
            }
        }
        write_records(self.store.as_ref(), Collection::Edges, &kept)?;
        Ok(kept)
    }

    /// Configuration validée pour un tick
    pub fn snapshot(&self) -> Result<TopologySnapshot, StoreError> {
        let snapshot = TopologySnapshot {
            sectors: self.list_sectors()?,
            devices: self.list_devices(None)?,
            edges: self.list_edges()?,
        };
        Ok(snapshot.validated())
    }

    /// Initialise le store au premier démarrage ; retourne true si le seed a été écrit
    pub fn seed_if_empty(&self, seed: &TopologySnapshot) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        if !self.list_sectors()?.is_empty() || seed.sectors.is_empty() {
            return Ok(false);
        }
        let seed = seed.clone().validated();
        let devices: Vec<Device> = seed
            .devices
            .into_iter()
            .map(|mut d| {
                if d.id.trim().is_empty() {
                    d.id = Uuid::new_v4().to_string();
                }
                d
            })
            .collect();
        write_records(self.store.as_ref(), Collection::Sectors, &seed.sectors)?;
        write_records(self.store.as_ref(), Collection::Devices, &devices)?;
        write_records(self.store.as_ref(), Collection::Edges, &seed.edges)?;
        info!(
            sectors = seed.sectors.len(),
            devices = devices.len(),
            edges = seed.edges.len(),
            "topology seeded from configuration"
        );
        Ok(true)
    }

    fn ensure_sector(&self, id: &str) -> Result<(), StoreError> {
        if self.list_sectors()?.iter().any(|s| s.id == id) {
            Ok(())
        } else {
            Err(StoreError::UnknownSector(id.to_string()))
        }
    }
}

fn normalize_sector(mut sector: Sector) -> Result<Sector, StoreError> {
    sector.id = sector.id.trim().to_string();
    sector.name = sector.name.trim().to_string();
    if sector.id.is_empty() || sector.name.is_empty() {
        return Err(StoreError::Invalid("sector needs an id and a name".into()));
    }
    sector.address = sector
        .address
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());
    Ok(sector)
}
