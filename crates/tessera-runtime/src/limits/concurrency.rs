//! In-flight execution counting per namespace.

use super::LimitError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_types::Namespace;

/// Counts executions in flight per namespace.
///
/// Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyLimiter {
    counts: Arc<Mutex<HashMap<Namespace, u32>>>,
}

impl ConcurrencyLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot for `namespace` if fewer than `max` are in flight.
    ///
    /// The slot is released when the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError::ConcurrencyLimited`] when `max` slots are
    /// already taken.
    pub fn try_acquire(&self, namespace: &Namespace, max: u32) -> Result<InFlightGuard, LimitError> {
        let mut counts = self.counts.lock();
        let current = counts.entry(namespace.clone()).or_insert(0);
        if *current >= max {
            tracing::warn!(%namespace, limit = max, "concurrency limit reached");
            return Err(LimitError::ConcurrencyLimited { limit: max });
        }
        *current += 1;
        Ok(InFlightGuard {
            counts: Arc::clone(&self.counts),
            namespace: namespace.clone(),
        })
    }

    /// Executions currently in flight for `namespace`.
    #[must_use]
    pub fn in_flight(&self, namespace: &Namespace) -> u32 {
        self.counts.lock().get(namespace).copied().unwrap_or(0)
    }
}

/// A reserved execution slot. Dropping it releases the slot.
#[derive(Debug)]
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct InFlightGuard {
    counts: Arc<Mutex<HashMap<Namespace, u32>>>,
    namespace: Namespace,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut counts = self.counts.lock();
        if let Some(n) = counts.get_mut(&self.namespace) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                counts.remove(&self.namespace);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_up_to_max() {
        let l = ConcurrencyLimiter::new();
        let ns = Namespace::tenant("acme");
        let a = l.try_acquire(&ns, 2).expect("first");
        let _b = l.try_acquire(&ns, 2).expect("second");
        assert_eq!(
            l.try_acquire(&ns, 2).err(),
            Some(LimitError::ConcurrencyLimited { limit: 2 })
        );
        drop(a);
        assert_eq!(l.in_flight(&ns), 1);
        assert!(l.try_acquire(&ns, 2).is_ok());
    }

    #[test]
    fn release_on_drop_clears_entry() {
        let l = ConcurrencyLimiter::new();
        let ns = Namespace::user("u");
        {
            let _g = l.try_acquire(&ns, 1).expect("acquire");
            assert_eq!(l.in_flight(&ns), 1);
        }
        assert_eq!(l.in_flight(&ns), 0);
        assert!(l.counts.lock().is_empty());
    }

    #[test]
    fn release_on_panic_unwind() {
        let l = ConcurrencyLimiter::new();
        let ns = Namespace::user("u");
        let l2 = l.clone();
        let ns2 = ns.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _g = l2.try_acquire(&ns2, 1).expect("acquire");
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(l.in_flight(&ns), 0);
    }

    #[test]
    fn namespaces_do_not_share_slots() {
        let l = ConcurrencyLimiter::new();
        let _a = l.try_acquire(&Namespace::tenant("a"), 1).expect("a");
        assert!(l.try_acquire(&Namespace::tenant("b"), 1).is_ok());
    }
}
