/**
 * STATUS ENGINE - Calcul du statut des secteurs à chaque tick
 *
 * RÔLE :
 * Combine les sondes (switch + équipements), les overrides et la topologie pour
 * produire un `StatusRecord` par secteur, propage les pannes en cascade,
 * détecte les dégradations et publie le tout atomiquement.
 *
 * FONCTIONNEMENT (un tick) :
 * 1. Snapshot de la configuration (repli sur le dernier valide si le store échoue)
 * 2. Sondes concurrentes : hôte du secteur (sauf override) + chaque équipement
 * 3. Sévérité locale : CRITICAL si hôte injoignable, WARNING si un équipement
 *    est hors ligne, sinon OK
 * 4. Cascade (voir `cascade.rs`)
 * 5. Transitions OK -> non-OK comparées au jeu publié précédent, par valeur
 * 6. Publication dans le cache + événements pour le bus
 *
 * Un seul tick à la fois : un appel concurrent retourne `TickOutcome::Skipped`.
 * Aucune erreur n'interrompt un tick.
 */

use crate::cache::StatusCache;
use crate::cascade;
use crate::history::HistoryLog;
use crate::models::{Device, DeviceStatus, HistoryEntry, Sector, Severity, StatusRecord, StatusSnapshot};
use crate::overrides::OverrideStore;
use crate::probe::{ProbeResult, Prober};
use crate::state::Shared;
use crate::topology::{TopologySnapshot, TopologyStore};
use futures::future::join_all;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub const REASON_OK: &str = "OK";
pub const REASON_SIMULATED: &str = "Simulated";
pub const REASON_NETWORK_FAILURE: &str = "Network Failure";

/// Secteurs sondés en parallèle (les équipements d'un secteur le sont tous ensemble)
const MAX_CONCURRENT_SECTORS: usize = 16;
/// Délai au-delà du timeout du prober avant de le considérer bloqué
const PROBE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum EngineEvent {
    Published(Arc<StatusSnapshot>),
    Degraded(HistoryEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub sectors: usize,
    pub ok: usize,
    pub warning: usize,
    pub critical: usize,
    pub cascaded: usize,
    pub new_history: usize,
    /// true si la configuration vient du dernier snapshot valide
    pub config_fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickSummary),
    Skipped,
}

pub struct StatusEngine {
    topology: TopologyStore,
    overrides: OverrideStore,
    prober: Arc<dyn Prober>,
    cache: StatusCache,
    history: Shared<HistoryLog>,
    last_good: Mutex<Option<TopologySnapshot>>,
    tick_gate: tokio::sync::Mutex<()>,
    ticks: AtomicU64,
    probe_timeout: Duration,
    events: broadcast::Sender<EngineEvent>,
}

impl StatusEngine {
    pub fn new(
        topology: TopologyStore,
        overrides: OverrideStore,
        prober: Arc<dyn Prober>,
        history: Shared<HistoryLog>,
        probe_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            topology,
            overrides,
            prober,
            cache: StatusCache::new(),
            history,
            last_good: Mutex::new(None),
            tick_gate: tokio::sync::Mutex::new(()),
            ticks: AtomicU64::new(0),
            probe_timeout,
            events,
        }
    }

    pub fn topology(&self) -> &TopologyStore {
        &self.topology
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }

    /// Dernier jeu publié, sans recalcul
    pub fn current_status(&self) -> Arc<StatusSnapshot> {
        self.cache.current()
    }

    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.history.lock().list()
    }

    pub async fn clear_history(&self) {
        let pending = {
            let mut history = self.history.lock();
            history.clear();
            history.take_pending()
        };
        if let Some(pending) = pending {
            pending.flush().await;
        }
        info!("history cleared");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub async fn tick(&self) -> TickOutcome {
        let Ok(_running) = self.tick_gate.try_lock() else {
            debug!("tick already in flight, skipped");
            return TickOutcome::Skipped;
        };
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;

        let (topology, config_fallback) = self.resolve_topology();
        let overrides = self.overrides.get_overrides();

        let sector_jobs: Vec<_> = topology
            .sectors
            .iter()
            .map(|sector| {
                let devices: Vec<&Device> = topology.devices_of(&sector.id).collect();
                let simulated = overrides.contains(&sector.id);
                self.resolve_sector(sector, devices, simulated)
            })
            .collect();
        let mut records: Vec<StatusRecord> = futures::stream::iter(sector_jobs)
            .buffered(MAX_CONCURRENT_SECTORS)
            .collect()
            .await;

        let report = cascade::propagate(&mut records, &topology.edges);
        records.sort_by(|a, b| a.sector_id.cmp(&b.sector_id));

        let now = OffsetDateTime::now_utc();
        let previous = self.cache.severities();
        let degradations = detect_transitions(&previous, &records, now);
        let pending = {
            let mut history = self.history.lock();
            for entry in &degradations {
                history.append(entry.clone());
            }
            history.take_pending()
        };
        // écriture disque hors du verrou du journal
        if let Some(pending) = pending {
            pending.flush().await;
        }

        let summary = summarize(tick, &records, report.cascaded.len(), degradations.len(), config_fallback);
        self.cache.publish(StatusSnapshot {
            generated_at: now,
            tick,
            records,
        });

        // pas d'abonné = pas d'erreur
        let _ = self.events.send(EngineEvent::Published(self.cache.current()));
        for entry in degradations {
            warn!(sector = %entry.sector_id, severity = ?entry.severity, reason = %entry.reason, "sector degraded");
            let _ = self.events.send(EngineEvent::Degraded(entry));
        }

        info!(
            tick,
            sectors = summary.sectors,
            ok = summary.ok,
            warning = summary.warning,
            critical = summary.critical,
            cascaded = summary.cascaded,
            fallback = summary.config_fallback,
            "status published"
        );
        TickOutcome::Completed(summary)
    }

    fn resolve_topology(&self) -> (TopologySnapshot, bool) {
        match self.topology.snapshot() {
            Ok(snapshot) => {
                *self.last_good.lock() = Some(snapshot.clone());
                (snapshot, false)
            }
            Err(e) => match self.last_good.lock().clone() {
                Some(snapshot) => {
                    warn!(error = %e, "configuration unavailable, using last known good snapshot");
                    (snapshot, true)
                }
                None => {
                    error!(error = %e, "configuration unavailable and no prior snapshot, publishing empty status");
                    (TopologySnapshot::default(), true)
                }
            },
        }
    }

    async fn resolve_sector(&self, sector: &Sector, devices: Vec<&Device>, simulated: bool) -> StatusRecord {
        let host = async {
            match (&sector.address, simulated) {
                (_, true) => None,
                (Some(address), false) => Some(self.probe(address).await),
                (None, false) => None,
            }
        };
        let device_probes = join_all(devices.into_iter().map(|device| async move {
            let result = self.probe(&device.address).await;
            DeviceStatus {
                id: device.id.clone(),
                name: device.name.clone(),
                address: device.address.clone(),
                online: result.alive,
                latency_ms: result.latency_ms,
            }
        }));
        let (host, device_statuses) = tokio::join!(host, device_probes);

        // sans adresse, rien à sonder : le secteur ne dépend que de ses équipements
        let host_online = !simulated && host.map_or(true, |r| r.alive);
        let (severity, reason) = local_severity(simulated, host_online, &device_statuses);

        StatusRecord {
            sector_id: sector.id.clone(),
            name: sector.name.clone(),
            address: sector.address.clone(),
            host_online,
            device_statuses,
            severity,
            reason,
            cascaded: false,
            cascaded_from: None,
            simulated,
            latency_ms: host.and_then(|r| r.latency_ms),
            checked_at: OffsetDateTime::now_utc(),
        }
    }

    /// Une sonde isolée : timeout, blocage ou panique du prober = hors ligne
    async fn probe(&self, address: &str) -> ProbeResult {
        let attempt = AssertUnwindSafe(self.prober.probe(address, self.probe_timeout)).catch_unwind();
        match tokio::time::timeout(self.probe_timeout + PROBE_GRACE, attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                error!(address, "prober panicked, treating address as offline");
                ProbeResult::offline()
            }
            Err(_) => {
                warn!(address, "prober exceeded its timeout, treating address as offline");
                ProbeResult::offline()
            }
        }
    }
}

/// Sévérité avant cascade
pub fn local_severity(simulated: bool, host_online: bool, devices: &[DeviceStatus]) -> (Severity, String) {
    if simulated {
        return (Severity::Critical, REASON_SIMULATED.to_string());
    }
    if !host_online {
        return (Severity::Critical, REASON_NETWORK_FAILURE.to_string());
    }
    let offline: Vec<&str> = devices.iter().filter(|d| !d.online).map(|d| d.name.as_str()).collect();
    if offline.is_empty() {
        (Severity::Ok, REASON_OK.to_string())
    } else {
        (Severity::Warning, format!("Device offline: {}", offline.join(", ")))
    }
}

/// Entrées d'historique pour chaque passage OK -> non-OK.
/// Un secteur absent du jeu précédent est considéré comme OK.
pub fn detect_transitions(
    previous: &HashMap<String, Severity>,
    records: &[StatusRecord],
    now: OffsetDateTime,
) -> Vec<HistoryEntry> {
    records
        .iter()
        .filter(|r| !r.severity.is_ok())
        .filter(|r| previous.get(&r.sector_id).copied().unwrap_or(Severity::Ok).is_ok())
        .map(|r| HistoryEntry {
            timestamp: now,
            sector_id: r.sector_id.clone(),
            severity: r.severity,
            reason: r.reason.clone(),
        })
        .collect()
}

fn summarize(
    tick: u64,
    records: &[StatusRecord],
    cascaded: usize,
    new_history: usize,
    config_fallback: bool,
) -> TickSummary {
    let count = |sev: Severity| records.iter().filter(|r| r.severity == sev).count();
    TickSummary {
        tick,
        sectors: records.len(),
        ok: count(Severity::Ok),
        warning: count(Severity::Warning),
        critical: count(Severity::Critical),
        cascaded,
        new_history,
        config_fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, online: bool) -> DeviceStatus {
        DeviceStatus {
            id: name.into(),
            name: name.into(),
            address: "10.0.0.1".into(),
            online,
            latency_ms: None,
        }
    }

    fn status(id: &str, severity: Severity) -> StatusRecord {
        StatusRecord {
            sector_id: id.into(),
            name: id.into(),
            address: None,
            host_online: true,
            device_statuses: vec![],
            severity,
            reason: "x".into(),
            cascaded: false,
            cascaded_from: None,
            simulated: false,
            latency_ms: None,
            checked_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn override_wins_over_everything() {
        let (sev, reason) = local_severity(true, true, &[device("cam", true)]);
        assert_eq!(sev, Severity::Critical);
        assert_eq!(reason, "Simulated");
    }

    #[test]
    fn host_down_is_critical_even_with_devices_up() {
        let (sev, reason) = local_severity(false, false, &[device("cam", true)]);
        assert_eq!(sev, Severity::Critical);
        assert_eq!(reason, "Network Failure");
    }

    #[test]
    fn offline_device_gives_warning_naming_it() {
        let (sev, reason) = local_severity(
            false,
            true,
            &[device("Impressora", true), device("Camera", false)],
        );
        assert_eq!(sev, Severity::Warning);
        assert_eq!(reason, "Device offline: Camera");
    }

    #[test]
    fn transitions_are_edge_triggered() {
        let now = OffsetDateTime::now_utc();
        let mut previous = HashMap::new();
        previous.insert("A".to_string(), Severity::Ok);
        previous.insert("B".to_string(), Severity::Critical);
        previous.insert("C".to_string(), Severity::Warning);

        let records = vec![
            status("A", Severity::Critical),
            status("B", Severity::Critical),
            status("C", Severity::Critical),
            status("NEW", Severity::Warning),
            status("D", Severity::Ok),
        ];
        let entries = detect_transitions(&previous, &records, now);
        let ids: Vec<_> = entries.iter().map(|e| e.sector_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "NEW"]);
    }

    struct AllDown;

    #[async_trait::async_trait]
    impl Prober for AllDown {
        async fn probe(&self, _address: &str, _timeout: Duration) -> ProbeResult {
            ProbeResult::offline()
        }
    }

    fn engine_with_store(store: Arc<dyn crate::store::RecordStore>) -> StatusEngine {
        let topology = TopologyStore::new(store.clone());
        let seed = TopologySnapshot {
            sectors: vec![Sector {
                id: "CPD".into(),
                name: "CPD".into(),
                address: Some("10.0.0.1".into()),
                equipment: None,
            }],
            ..Default::default()
        };
        topology.seed_if_empty(&seed).unwrap();
        StatusEngine::new(
            topology,
            OverrideStore::new(),
            Arc::new(AllDown),
            crate::state::new_state(HistoryLog::with_store(10, store)),
            Duration::from_millis(100),
        )
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn tick_future_can_be_spawned() {
        let engine = Arc::new(engine_with_store(Arc::new(crate::store::MemoryStore::new())));
        let fut = engine.tick();
        assert_send(&fut);
        drop(fut);

        let spawned = engine.clone();
        let outcome = tokio::spawn(async move { spawned.tick().await }).await.unwrap();
        assert!(matches!(outcome, TickOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn tick_writes_history_without_holding_the_log() {
        let store: Arc<dyn crate::store::RecordStore> = Arc::new(crate::store::MemoryStore::new());
        let engine = engine_with_store(store.clone());
        engine.tick().await;

        // le verrou du journal est libre après le tick
        assert!(engine.history.try_lock().is_some());
        let on_disk: Vec<HistoryEntry> =
            crate::store::read_records(store.as_ref(), crate::store::Collection::History).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].sector_id, "CPD");

        engine.clear_history().await;
        let on_disk: Vec<HistoryEntry> =
            crate::store::read_records(store.as_ref(), crate::store::Collection::History).unwrap();
        assert!(on_disk.is_empty());
    }
}
