use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Zone surveillée autour d'un switch (REFEITORIO, CPD, OLD...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Libellé matériel (ex: "01 Switch Mikrotik CSS326-24G-2S+RM")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
}

/// Équipement dépendant d'un secteur (imprimante, caméra...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    pub sector_id: String,
    pub name: String,
    pub address: String,
}

/// Arête orientée : une panne de `from` se propage vers `to`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
}

impl DependencyEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
}

impl Severity {
    pub fn is_ok(self) -> bool {
        matches!(self, Severity::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub id: String,
    pub name: String,
    pub address: String,
    pub online: bool,
    pub latency_ms: Option<f64>,
}

/// Résultat du moteur pour un secteur, recalculé à chaque tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub sector_id: String,
    pub name: String,
    pub address: Option<String>,
    pub host_online: bool,
    pub device_statuses: Vec<DeviceStatus>,
    pub severity: Severity,
    pub reason: String,
    pub cascaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascaded_from: Option<String>,
    /// true si un override forçait la panne pendant ce tick
    pub simulated: bool,
    pub latency_ms: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

/// Événement de dégradation (OK -> non-OK), immuable une fois écrit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub sector_id: String,
    pub severity: Severity,
    pub reason: String,
}

/// Jeu complet publié à la fin d'un tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub tick: u64,
    pub records: Vec<StatusRecord>,
}

impl StatusSnapshot {
    pub fn empty() -> Self {
        Self {
            generated_at: OffsetDateTime::now_utc(),
            tick: 0,
            records: Vec::new(),
        }
    }

    pub fn get(&self, sector_id: &str) -> Option<&StatusRecord> {
        self.records.iter().find(|r| r.sector_id == sector_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"CRITICAL\"");
        let parsed: Severity = serde_json::from_str("\"WARNING\"").unwrap();
        assert_eq!(parsed, Severity::Warning);
    }

    #[test]
    fn sector_optional_fields_default() {
        let s: Sector = serde_json::from_str(r#"{"id":"CPD","name":"CPD"}"#).unwrap();
        assert_eq!(s.address, None);
        assert_eq!(s.equipment, None);
    }
}
