use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one registration, unique for the life of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterceptorId(u64);

impl InterceptorId {
    fn next() -> Self {
        InterceptorId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Entries<T> = RwLock<Vec<(InterceptorId, Arc<T>)>>;

/// Ordered interceptor registry; insertion order is execution order
pub(crate) struct Chain<T: ?Sized> {
    entries: Arc<Entries<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Chain<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Append an interceptor and return the disposer that removes it
    pub fn push(&self, item: Arc<T>) -> Disposer {
        let id = InterceptorId::next();
        self.entries.write().push((id, item));

        let entries: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        Disposer::new(id, move || {
            let Some(entries) = entries.upgrade() else {
                return false;
            };
            let mut entries = entries.write();
            match entries.iter().position(|(entry_id, _)| *entry_id == id) {
                Some(index) => {
                    entries.remove(index);
                    true
                }
                None => false,
            }
        })
    }

    /// Current interceptors in order; the lock is released before any runs
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.entries.read().iter().map(|(_, item)| Arc::clone(item)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Removes exactly one registration when disposed.
///
/// Dropping a disposer without calling [`Disposer::dispose`] leaves the
/// interceptor registered.
#[must_use = "dropping a Disposer leaves the interceptor registered"]
pub struct Disposer {
    id: InterceptorId,
    remove: Box<dyn FnOnce() -> bool + Send + Sync>,
}

impl Disposer {
    fn new(id: InterceptorId, remove: impl FnOnce() -> bool + Send + Sync + 'static) -> Self {
        Self {
            id,
            remove: Box::new(remove),
        }
    }

    pub fn id(&self) -> InterceptorId {
        self.id
    }

    /// Remove the registration; returns false if it was already gone
    pub fn dispose(self) -> bool {
        let removed = (self.remove)();
        tracing::debug!("Disposed interceptor {:?} (removed: {})", self.id, removed);
        removed
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_removes_only_its_entry() {
        let chain: Chain<str> = Chain::new();
        let a = chain.push(Arc::from("same"));
        let _b = chain.push(Arc::from("same"));

        assert_eq!(chain.len(), 2);
        assert!(a.dispose());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_dispose_after_clear_is_noop() {
        let chain: Chain<str> = Chain::new();
        let a = chain.push(Arc::from("a"));
        chain.clear();
        assert!(!a.dispose());
    }

    #[test]
    fn test_ids_are_distinct() {
        let chain: Chain<str> = Chain::new();
        let a = chain.push(Arc::from("a"));
        let b = chain.push(Arc::from("a"));
        assert_ne!(a.id(), b.id());
    }
}
