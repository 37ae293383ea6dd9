/**
 * HISTORY LOG - Journal borné des dégradations de secteurs
 *
 * FONCTIONNEMENT :
 * - Buffer circulaire FIFO (capacité par défaut 50) : append en fin, éviction en tête
 * - `list()` rend les entrées de la plus récente à la plus ancienne
 * - Avec un store : chargé au démarrage. `append`/`clear` ne touchent que la
 *   mémoire ; `take_pending()` rend la copie à écrire, que l'appelant écrit
 *   hors du verrou du journal (`PendingWrite::flush` passe par spawn_blocking).
 *   Une écriture plus ancienne que la dernière écrite est ignorée.
 *   Un échec d'écriture est loggé mais ne touche pas le journal en mémoire.
 */

use crate::models::HistoryEntry;
use crate::store::{read_records, write_records, Collection, RecordStore};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
    writer: Option<HistoryWriter>,
    generation: u64,
    flushed: u64,
}

#[derive(Clone)]
struct HistoryWriter {
    store: Arc<dyn RecordStore>,
    written: Arc<Mutex<u64>>,
}

/// Copie du journal à écrire dans le store
pub struct PendingWrite {
    writer: HistoryWriter,
    generation: u64,
    entries: Vec<HistoryEntry>,
}

impl PendingWrite {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Écriture synchrone ; sautée si une copie plus récente est déjà sur disque
    pub fn write(self) {
        let mut written = self.writer.written.lock();
        if self.generation <= *written {
            debug!(generation = self.generation, "stale history write skipped");
            return;
        }
        match write_records(self.writer.store.as_ref(), Collection::History, &self.entries) {
            Ok(()) => *written = self.generation,
            Err(e) => warn!(error = %e, "failed to persist history"),
        }
    }

    /// Écriture sur le pool bloquant de tokio
    pub async fn flush(self) {
        if let Err(e) = tokio::task::spawn_blocking(move || self.write()).await {
            warn!(error = %e, "history writer task failed");
        }
    }
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            writer: None,
            generation: 0,
            flushed: 0,
        }
    }

    /// Journal persistant : recharge la collection `history` (tronquée à la capacité)
    pub fn with_store(capacity: usize, store: Arc<dyn RecordStore>) -> Self {
        let mut log = Self::new(capacity);
        match read_records::<HistoryEntry>(store.as_ref(), Collection::History) {
            Ok(entries) => {
                let skip = entries.len().saturating_sub(log.capacity);
                log.entries.extend(entries.into_iter().skip(skip));
                debug!(count = log.entries.len(), "history restored");
            }
            Err(e) => warn!(error = %e, "failed to restore history, starting empty"),
        }
        log.writer = Some(HistoryWriter {
            store,
            written: Arc::new(Mutex::new(0)),
        });
        log
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        self.generation += 1;
    }

    /// Entrées de la plus récente à la plus ancienne
    pub fn list(&self) -> Vec<HistoryEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copie à écrire si le journal a changé depuis le dernier appel (None sans store)
    pub fn take_pending(&mut self) -> Option<PendingWrite> {
        let writer = self.writer.as_ref()?;
        if self.generation == self.flushed {
            return None;
        }
        self.flushed = self.generation;
        Some(PendingWrite {
            writer: writer.clone(),
            generation: self.generation,
            entries: self.entries.iter().cloned().collect(),
        })
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use crate::store::MemoryStore;
    use time::OffsetDateTime;

    fn entry(sector: &str) -> HistoryEntry {
        HistoryEntry {
            timestamp: OffsetDateTime::now_utc(),
            sector_id: sector.into(),
            severity: Severity::Critical,
            reason: "Network Failure".into(),
        }
    }

    #[test]
    fn never_exceeds_capacity_and_evicts_oldest() {
        let mut log = HistoryLog::default();
        for i in 0..60 {
            log.append(entry(&format!("S{i}")));
        }
        assert_eq!(log.len(), 50);
        let listed = log.list();
        assert_eq!(listed.first().unwrap().sector_id, "S59");
        assert_eq!(listed.last().unwrap().sector_id, "S10");
    }

    #[test]
    fn list_is_newest_first() {
        let mut log = HistoryLog::new(5);
        log.append(entry("A"));
        log.append(entry("B"));
        let ids: Vec<_> = log.list().into_iter().map(|e| e.sector_id).collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn clear_empties_the_log() {
        let mut log = HistoryLog::new(5);
        log.append(entry("A"));
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn persisted_log_is_restored_and_truncated() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        {
            let mut log = HistoryLog::with_store(10, store.clone());
            for i in 0..8 {
                log.append(entry(&format!("S{i}")));
            }
            log.take_pending().unwrap().write();
        }
        let restored = HistoryLog::with_store(5, store);
        assert_eq!(restored.len(), 5);
        assert_eq!(restored.list()[0].sector_id, "S7");
        assert_eq!(restored.list()[4].sector_id, "S3");
    }

    #[test]
    fn pending_write_only_when_changed_and_with_a_store() {
        let mut volatile = HistoryLog::new(5);
        volatile.append(entry("A"));
        assert!(volatile.take_pending().is_none());

        let mut log = HistoryLog::with_store(5, Arc::new(MemoryStore::new()));
        assert!(log.take_pending().is_none());
        log.append(entry("A"));
        log.append(entry("B"));
        let pending = log.take_pending().unwrap();
        assert_eq!(pending.generation(), 2);
        assert!(log.take_pending().is_none());
    }

    #[test]
    fn older_write_does_not_overwrite_a_newer_one() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let mut log = HistoryLog::with_store(5, store.clone());
        log.append(entry("A"));
        let older = log.take_pending().unwrap();
        log.clear();
        let newer = log.take_pending().unwrap();

        newer.write();
        older.write();
        let on_disk: Vec<HistoryEntry> = read_records(store.as_ref(), Collection::History).unwrap();
        assert!(on_disk.is_empty());
    }

    #[tokio::test]
    async fn flush_writes_from_the_blocking_pool() {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let mut log = HistoryLog::with_store(5, store.clone());
        log.append(entry("A"));
        log.take_pending().unwrap().flush().await;

        let on_disk: Vec<HistoryEntry> = read_records(store.as_ref(), Collection::History).unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].sector_id, "A");
    }
}
