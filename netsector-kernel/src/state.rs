use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Cellule à publication atomique : les lecteurs reçoivent un `Arc<T>` figé,
/// l'écrivain remplace la valeur entière d'un coup.
pub struct Published<T> {
    inner: RwLock<Arc<T>>,
}

impl<T> Published<T> {
    pub fn new(value: T) -> Self {
        Self { inner: RwLock::new(Arc::new(value)) }
    }

    pub fn load(&self) -> Arc<T> {
        self.inner.read().clone()
    }

    /// Remplace la valeur et retourne l'ancienne
    pub fn store(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        std::mem::replace(&mut *self.inner.write(), next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_keep_their_snapshot_after_store() {
        let cell = Published::new(vec![1, 2]);
        let before = cell.load();
        let old = cell.store(vec![3]);
        assert_eq!(*before, vec![1, 2]);
        assert_eq!(*old, vec![1, 2]);
        assert_eq!(*cell.load(), vec![3]);
    }
}
