use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Secteurs forcés en panne (mode simulation). Volatile : rien n'est persisté.
#[derive(Clone, Default)]
pub struct OverrideStore {
    active: Arc<Mutex<BTreeSet<String>>>,
}

impl OverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active ou lève l'override ; retourne true si l'état a changé
    pub fn set_override(&self, sector_id: &str, active: bool) -> bool {
        let mut set = self.active.lock();
        let changed = if active {
            set.insert(sector_id.to_string())
        } else {
            set.remove(sector_id)
        };
        if changed {
            info!(sector = %sector_id, active, "override changed");
        }
        changed
    }

    /// Inverse l'override et retourne le nouvel état
    pub fn toggle_override(&self, sector_id: &str) -> bool {
        let mut set = self.active.lock();
        let now_active = if set.remove(sector_id) {
            false
        } else {
            set.insert(sector_id.to_string());
            true
        };
        info!(sector = %sector_id, active = now_active, "override toggled");
        now_active
    }

    pub fn is_active(&self, sector_id: &str) -> bool {
        self.active.lock().contains(sector_id)
    }

    /// Copie triée des overrides actifs
    pub fn get_overrides(&self) -> BTreeSet<String> {
        self.active.lock().clone()
    }

    pub fn clear_all(&self) {
        self.active.lock().clear();
    }
}
