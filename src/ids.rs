//! Numeric id allocation for catalog records

use std::sync::atomic::{AtomicU64, Ordering};

/// Independent id sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdNamespace {
    SchemaMetadata,
    SerDes,
}

/// Hands out unique, monotonically increasing ids per namespace.
///
/// Ids start at 1. After a restart the stores seed the allocator with the
/// highest id they loaded so nothing is ever handed out twice.
#[derive(Debug)]
pub struct IdAllocator {
    metadata: AtomicU64,
    serdes: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            metadata: AtomicU64::new(1),
            serdes: AtomicU64::new(1),
        }
    }

    fn counter(&self, namespace: IdNamespace) -> &AtomicU64 {
        match namespace {
            IdNamespace::SchemaMetadata => &self.metadata,
            IdNamespace::SerDes => &self.serdes,
        }
    }

    /// Make sure ids up to and including `last_used` are never returned
    pub fn observe(&self, namespace: IdNamespace, last_used: u64) {
        let next = last_used.saturating_add(1);
        self.counter(namespace).fetch_max(next, Ordering::SeqCst);
    }

    /// Allocate the next id.
    ///
    /// # Panics
    ///
    /// Panics when the namespace runs out of `u64` ids.
    pub fn next_id(&self, namespace: IdNamespace) -> u64 {
        self.counter(namespace)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_add(1)
            })
            .unwrap_or_else(|_| panic!("{:?} id space exhausted", namespace))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_namespaces_are_independent() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next_id(IdNamespace::SchemaMetadata), 1);
        assert_eq!(ids.next_id(IdNamespace::SchemaMetadata), 2);
        assert_eq!(ids.next_id(IdNamespace::SerDes), 1);
    }

    #[test]
    fn test_observe_skips_used_ids() {
        let ids = IdAllocator::new();
        ids.observe(IdNamespace::SerDes, 41);
        assert_eq!(ids.next_id(IdNamespace::SerDes), 42);
        // observing an older id never moves the sequence backwards
        ids.observe(IdNamespace::SerDes, 3);
        assert_eq!(ids.next_id(IdNamespace::SerDes), 43);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let ids = IdAllocator::new();
        let allocated: Vec<u64> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..250)
                            .map(|_| ids.next_id(IdNamespace::SchemaMetadata))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });
        let unique: HashSet<_> = allocated.iter().copied().collect();
        assert_eq!(unique.len(), 2000);
        assert_eq!(allocated.iter().max(), Some(&2000));
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn test_exhaustion_is_fatal() {
        let ids = IdAllocator::new();
        ids.observe(IdNamespace::SchemaMetadata, u64::MAX - 1);
        ids.next_id(IdNamespace::SchemaMetadata);
    }
}
