use crate::error::CalculationError;
use core_types::{CalculationParams, CalculationResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// What every waiter on a computation eventually receives.
pub type Settlement = Result<Arc<CalculationResult>, CalculationError>;

/// Decides whether two requests share one computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoalescingKey {
    /// The handler's cache key, for chains with caching enabled.
    Cached(String),
    /// Structural equality of the whole request, for chains without caching.
    Params(CalculationParams),
}

struct InFlightEntry {
    settlement: watch::Receiver<Option<Settlement>>,
    waiter_count: usize,
}

/// Tracks the computations currently running, one per coalescing key.
///
/// Check-then-insert happens under a single mutex acquisition, which is never held
/// across an `.await`.
#[derive(Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<CoalescingKey, InFlightEntry>>,
}

/// The result of joining the registry under a key.
pub enum Attachment {
    /// No computation was running: the caller must run it and settle `handle`.
    Owner { handle: SettleHandle, waiter: Waiter },
    /// A computation is already running: await it.
    Joined(Waiter),
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CoalescingKey, InFlightEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Atomically joins the computation running under `key`, or registers a new one.
    pub fn attach(self: &Arc<Self>, key: CoalescingKey) -> Attachment {
        let mut entries = self.lock();

        if let Some(entry) = entries.get_mut(&key) {
            entry.waiter_count += 1;
            return Attachment::Joined(Waiter {
                settlement: entry.settlement.clone(),
            });
        }

        let (sender, receiver) = watch::channel(None);
        entries.insert(
            key.clone(),
            InFlightEntry {
                settlement: receiver.clone(),
                waiter_count: 1,
            },
        );

        Attachment::Owner {
            handle: SettleHandle {
                registry: Arc::clone(self),
                key,
                sender,
                settled: false,
            },
            waiter: Waiter { settlement: receiver },
        }
    }

    /// Number of computations currently running.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of callers attached to the computation under `key`, owner included.
    pub fn waiter_count(&self, key: &CoalescingKey) -> Option<usize> {
        self.lock().get(key).map(|entry| entry.waiter_count)
    }
}

/// Held by whoever runs the computation for a key.
///
/// Settling publishes the outcome and removes the entry in one critical section, so a
/// request arriving afterwards never joins a finished computation. Dropping the handle
/// unsettled (e.g. the computing task panicked) still removes the entry; waiters then
/// receive a `CalculationError`.
pub struct SettleHandle {
    registry: Arc<InFlightRegistry>,
    key: CoalescingKey,
    sender: watch::Sender<Option<Settlement>>,
    settled: bool,
}

impl SettleHandle {
    pub fn settle(mut self, outcome: Settlement) {
        let mut entries = self.registry.lock();
        self.sender.send_replace(Some(outcome));
        entries.remove(&self.key);
        self.settled = true;
    }
}

impl Drop for SettleHandle {
    fn drop(&mut self) {
        if !self.settled {
            tracing::error!(key = ?self.key, "In-flight computation ended without settling.");
            self.registry.lock().remove(&self.key);
        }
    }
}

/// One caller's view of a pending computation.
///
/// Dropping a waiter only stops that caller from waiting.
pub struct Waiter {
    settlement: watch::Receiver<Option<Settlement>>,
}

impl Waiter {
    pub async fn wait(mut self) -> Settlement {
        match self.settlement.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone().unwrap_or_else(|| {
                Err(CalculationError::Calculation(
                    "computation settled without an outcome".to_string(),
                ))
            }),
            Err(_closed) => Err(CalculationError::Calculation(
                "computation was aborted before it settled".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CoalescingKey {
        CoalescingKey::Cached(name.to_string())
    }

    fn owner(attachment: Attachment) -> (SettleHandle, Waiter) {
        match attachment {
            Attachment::Owner { handle, waiter } => (handle, waiter),
            Attachment::Joined(_) => panic!("expected to own the computation"),
        }
    }

    #[tokio::test]
    async fn second_attach_joins_the_first() {
        let registry = Arc::new(InFlightRegistry::new());
        let (handle, owner_waiter) = owner(registry.attach(key("a")));

        let Attachment::Joined(joined) = registry.attach(key("a")) else {
            panic!("expected to join the running computation");
        };
        assert_eq!(registry.waiter_count(&key("a")), Some(2));

        handle.settle(Err(CalculationError::Calculation("boom".to_string())));
        assert!(registry.is_empty());
        assert_eq!(owner_waiter.wait().await, joined.wait().await);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_coalesce() {
        let registry = Arc::new(InFlightRegistry::new());
        let (_a, _) = owner(registry.attach(key("a")));
        let (_b, _) = owner(registry.attach(key("b")));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn dropping_an_unsettled_handle_removes_the_entry_and_fails_waiters() {
        let registry = Arc::new(InFlightRegistry::new());
        let (handle, waiter) = owner(registry.attach(key("a")));

        drop(handle);

        assert!(registry.is_empty());
        assert!(matches!(waiter.wait().await, Err(CalculationError::Calculation(_))));
    }

    #[tokio::test]
    async fn attach_after_settlement_starts_a_new_computation() {
        let registry = Arc::new(InFlightRegistry::new());
        let (handle, _) = owner(registry.attach(key("a")));
        handle.settle(Err(CalculationError::Calculation("boom".to_string())));

        assert!(matches!(registry.attach(key("a")), Attachment::Owner { .. }));
    }
}
