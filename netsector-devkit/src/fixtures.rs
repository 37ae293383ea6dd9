/*!
Builders de topologie pour les tests

`plant_topology()` reproduit le site de référence : 9 switches et la chaîne
CPD -> OLD -> {COI, PCTS}.
*/

use netsector_kernel::models::{DependencyEdge, Device, Sector};
use netsector_kernel::topology::TopologySnapshot;

/// (id, adresse) des switches du site
pub const PLANT_SECTORS: [(&str, &str); 9] = [
    ("REFEITORIO", "192.168.39.1"),
    ("CPD", "192.168.36.53"),
    ("OLD", "192.168.36.60"),
    ("SUPERVISAO", "192.168.36.14"),
    ("COI", "192.168.36.15"),
    ("PCTS", "192.168.36.17"),
    ("BALANCA", "192.168.36.18"),
    ("PORTARIA", "192.168.36.19"),
    ("VINHACA", "192.168.36.20"),
];

pub const PLANT_EDGES: [(&str, &str); 3] = [("CPD", "OLD"), ("OLD", "COI"), ("OLD", "PCTS")];

/// Adresse d'un switch du site
pub fn plant_address(sector_id: &str) -> Option<&'static str> {
    PLANT_SECTORS.iter().find(|(id, _)| *id == sector_id).map(|(_, addr)| *addr)
}

#[derive(Debug, Default, Clone)]
pub struct TopologyBuilder {
    snapshot: TopologySnapshot,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sector(mut self, id: &str, address: &str) -> Self {
        self.snapshot.sectors.push(Sector {
            id: id.into(),
            name: id.into(),
            address: Some(address.into()),
            equipment: None,
        });
        self
    }

    /// Secteur sans switch sondable (seuls ses équipements comptent)
    pub fn sector_without_address(mut self, id: &str) -> Self {
        self.snapshot.sectors.push(Sector {
            id: id.into(),
            name: id.into(),
            address: None,
            equipment: None,
        });
        self
    }

    pub fn device(mut self, sector_id: &str, name: &str, address: &str) -> Self {
        self.snapshot.devices.push(Device {
            id: format!("{sector_id}-{name}").to_lowercase(),
            sector_id: sector_id.into(),
            name: name.into(),
            address: address.into(),
        });
        self
    }

    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.snapshot.edges.push(DependencyEdge::new(from, to));
        self
    }

    pub fn build(self) -> TopologySnapshot {
        self.snapshot
    }
}

pub fn plant_topology() -> TopologyBuilder {
    let builder = PLANT_SECTORS
        .iter()
        .fold(TopologyBuilder::new(), |b, (id, addr)| b.sector(id, addr));
    PLANT_EDGES.iter().fold(builder, |b, (from, to)| b.edge(from, to))
}
