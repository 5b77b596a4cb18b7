//! Type-keyed invoker cache.
//!
//! Maps a concrete message type's `TypeId` to its dispatch entry. Reads
//! are shared and contention-free after warmup; writes happen once per
//! message type. Insertion races are benign: entries for the same type
//! are value-equal by construction, so the first writer wins and the
//! losing build is dropped.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

pub(crate) struct InvokerCache {
    entries: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    builds: AtomicUsize,
}

impl InvokerCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    /// Fetch the entry for `message`, building and inserting it on the
    /// first call.
    pub fn get_or_build<E, F>(&self, message: TypeId, build: F) -> Arc<E>
    where
        E: Send + Sync + 'static,
        F: FnOnce() -> E,
    {
        if let Some(entry) = self.lookup::<E>(message) {
            return entry;
        }

        let built = Arc::new(build());
        self.builds.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(entry = std::any::type_name::<E>(), "dispatch entry built");

        let mut entries = self.entries.write().expect("invoker cache poisoned");
        if let Some(existing) = entries
            .get(&message)
            .and_then(|entry| entry.clone().downcast::<E>().ok())
        {
            // Lost a warmup race; the entries are interchangeable.
            return existing;
        }
        entries.insert(message, built.clone());
        built
    }

    fn lookup<E: Send + Sync + 'static>(&self, message: TypeId) -> Option<Arc<E>> {
        let entries = self.entries.read().expect("invoker cache poisoned");
        entries
            .get(&message)
            .and_then(|entry| entry.clone().downcast::<E>().ok())
    }

    /// Number of cold-path builds performed so far.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_once_per_key() {
        let cache = InvokerCache::new();
        let key = TypeId::of::<u32>();

        let first = cache.get_or_build(key, || "entry".to_string());
        let second = cache.get_or_build(key, || "unused".to_string());

        assert_eq!(*first, "entry");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn test_distinct_keys_build_separately() {
        let cache = InvokerCache::new();

        cache.get_or_build(TypeId::of::<u32>(), || 1u8);
        cache.get_or_build(TypeId::of::<u64>(), || 2u8);

        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn test_concurrent_warmup_is_consistent() {
        let cache = Arc::new(InvokerCache::new());
        let key = TypeId::of::<u32>();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.get_or_build(key, || 7usize))
            })
            .collect();

        let entries: Vec<Arc<usize>> = handles
            .into_iter()
            .map(|handle| handle.join().expect("warmup thread panicked"))
            .collect();

        // Racing builds may happen, but every caller sees the same value
        // and later lookups are warm.
        assert!(entries.iter().all(|entry| **entry == 7));
        assert!(cache.builds() >= 1);
        let again = cache.get_or_build(key, || 9usize);
        assert_eq!(*again, 7);
    }
}
