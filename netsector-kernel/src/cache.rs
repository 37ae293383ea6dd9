use crate::models::{Severity, StatusSnapshot};
use crate::state::Published;
use std::collections::HashMap;
use std::sync::Arc;

/// Dernier jeu de statuts publié. Lecture sans recalcul, remplacement atomique.
#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<Published<StatusSnapshot>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Published::new(StatusSnapshot::empty())),
        }
    }

    pub fn current(&self) -> Arc<StatusSnapshot> {
        self.inner.load()
    }

    /// Publie un nouveau jeu complet et retourne le précédent
    pub fn publish(&self, snapshot: StatusSnapshot) -> Arc<StatusSnapshot> {
        self.inner.store(snapshot)
    }

    /// Sévérités publiées, par valeur, pour la détection de transitions
    pub fn severities(&self) -> HashMap<String, Severity> {
        self.current()
            .records
            .iter()
            .map(|r| (r.sector_id.clone(), r.severity))
            .collect()
    }
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}
