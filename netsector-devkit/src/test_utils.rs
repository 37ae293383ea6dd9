/*!
Test Harness pour le moteur de statut NetSector

Assemble un moteur complet en mémoire :
- topologie seedée depuis un `TopologySnapshot`
- prober scripté (`ScriptedProber`)
- store à pannes injectables (`FlakyStore`)
et fournit des helpers de tick et d'assertion.
*/

use crate::probe_stub::ScriptedProber;
use anyhow::{bail, Result};
use netsector_kernel::engine::{StatusEngine, TickOutcome, TickSummary};
use netsector_kernel::history::{HistoryLog, DEFAULT_HISTORY_CAPACITY};
use netsector_kernel::models::{HistoryEntry, Severity, StatusRecord};
use netsector_kernel::overrides::OverrideStore;
use netsector_kernel::state::new_state;
use netsector_kernel::store::{Collection, MemoryStore, RecordStore, StoreError, StoreInfo};
use netsector_kernel::topology::{TopologySnapshot, TopologyStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store mémoire dont les lectures peuvent être mises en panne
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
        log::info!("[flaky-store] failing = {failing}");
    }
}

impl RecordStore for FlakyStore {
    fn read(&self, collection: Collection) -> Result<Vec<serde_json::Value>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} is down", collection.name())));
        }
        self.inner.read(collection)
    }

    fn write(&self, collection: Collection, records: Vec<serde_json::Value>) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} is down", collection.name())));
        }
        self.inner.write(collection, records)
    }

    fn info(&self) -> StoreInfo {
        StoreInfo {
            backend: "flaky-memory".to_string(),
            location: None,
        }
    }
}

/// Harness de test complet pour le moteur
pub struct TestHarness {
    pub engine: Arc<StatusEngine>,
    pub prober: ScriptedProber,
    pub store: Arc<FlakyStore>,
}

impl TestHarness {
    /// Délai de sonde court pour que les tests de blocage restent rapides
    pub const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

    pub fn new(topology: TopologySnapshot) -> Result<Self> {
        Self::with_history_capacity(topology, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(topology: TopologySnapshot, capacity: usize) -> Result<Self> {
        env_logger::try_init().ok(); // logs pour tests

        let store = Arc::new(FlakyStore::new());
        let topo_store = TopologyStore::new(store.clone());
        topo_store.seed_if_empty(&topology)?;

        let prober = ScriptedProber::new();
        let engine = StatusEngine::new(
            topo_store,
            OverrideStore::new(),
            Arc::new(prober.clone()),
            new_state(HistoryLog::new(capacity)),
            Self::PROBE_TIMEOUT,
        );
        Ok(Self {
            engine: Arc::new(engine),
            prober,
            store,
        })
    }

    /// Exécute un tick complet ; échoue s'il a été sauté
    pub async fn tick(&self) -> Result<TickSummary> {
        match self.engine.tick().await {
            TickOutcome::Completed(summary) => Ok(summary),
            TickOutcome::Skipped => bail!("tick was skipped"),
        }
    }

    pub fn record(&self, sector_id: &str) -> Option<StatusRecord> {
        self.engine.current_status().get(sector_id).cloned()
    }

    pub fn severity(&self, sector_id: &str) -> Option<Severity> {
        self.record(sector_id).map(|r| r.severity)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.engine.history_entries()
    }

    pub fn set_override(&self, sector_id: &str, active: bool) {
        self.engine.overrides().set_override(sector_id, active);
    }

    /// Vérifie sévérité et raison d'un secteur dans le dernier jeu publié
    pub fn assert_status(&self, sector_id: &str, severity: Severity, reason: &str) -> Result<()> {
        let Some(record) = self.record(sector_id) else {
            bail!("no published status for {sector_id}");
        };
        if record.severity != severity || record.reason != reason {
            bail!(
                "{sector_id}: expected {severity:?} \"{reason}\", got {:?} \"{}\"",
                record.severity,
                record.reason
            );
        }
        log::info!("[harness] {sector_id} is {severity:?} as expected");
        Ok(())
    }

    /// Vérifie les secteurs passés en panne par cascade
    pub fn assert_cascaded(&self, expected: &[&str]) -> Result<()> {
        let snapshot = self.engine.current_status();
        let mut cascaded: Vec<&str> = snapshot
            .records
            .iter()
            .filter(|r| r.cascaded)
            .map(|r| r.sector_id.as_str())
            .collect();
        cascaded.sort_unstable();
        let mut expected = expected.to_vec();
        expected.sort_unstable();
        if cascaded != expected {
            bail!("cascaded sectors: expected {expected:?}, got {cascaded:?}");
        }
        Ok(())
    }
}
