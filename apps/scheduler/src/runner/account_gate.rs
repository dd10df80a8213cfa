use domain::model::AccountId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Per-account keyed semaphore registry: a dynamic map keyed by `AccountId`
/// rather than a fixed set of semaphores, since the account set is unbounded
/// and entries must not leak once an account stops having in-flight work.
/// Stale entries are garbage-collected via `Weak` references instead of an
/// explicit global lock.
pub struct AccountGate {
    concurrency: usize,
    registry: Mutex<HashMap<AccountId, Weak<Semaphore>>>,
}

impl AccountGate {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            registry: Mutex::new(HashMap::new()),
        }
    }

    fn semaphore_for(&self, account_id: AccountId) -> Arc<Semaphore> {
        let mut registry = self.registry.lock().expect("account gate mutex poisoned");
        if let Some(sem) = registry.get(&account_id).and_then(Weak::upgrade) {
            return sem;
        }
        let sem = Arc::new(Semaphore::new(self.concurrency));
        registry.insert(account_id, Arc::downgrade(&sem));
        // Opportunistic GC: drop entries whose only strong reference has
        // already gone away, so the map doesn't grow unboundedly across the
        // lifetime of the process.
        registry.retain(|_, weak| weak.strong_count() > 0);
        sem
    }

    /// Acquires a permit for `account_id`, serializing publish work for that
    /// account. The returned permit, plus the `Arc<Semaphore>` it borrows
    /// from, keep the entry alive until the worker drops it.
    pub async fn acquire(&self, account_id: AccountId) -> AccountPermit {
        let sem = self.semaphore_for(account_id);
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .expect("account semaphore never closed");
        AccountPermit { _sem: sem, permit }
    }
}

pub struct AccountPermit {
    _sem: Arc<Semaphore>,
    permit: OwnedSemaphorePermit,
}

impl Drop for AccountPermit {
    fn drop(&mut self) {
        let _ = &self.permit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_account_serializes_while_different_accounts_run_concurrently() {
        let gate = Arc::new(AccountGate::new(1));

        let g1 = gate.clone();
        let permit_a = g1.acquire(AccountId(1)).await;

        // A second acquire for a different account must not block on account 1's permit.
        let g2 = gate.clone();
        let acquired_other =
            tokio::time::timeout(std::time::Duration::from_millis(50), g2.acquire(AccountId(2))).await;
        assert!(acquired_other.is_ok());

        // But a second acquire for the SAME account blocks until the first is dropped.
        let g3 = gate.clone();
        let fut = tokio::spawn(async move {
            let _p = g3.acquire(AccountId(1)).await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!fut.is_finished());
        drop(permit_a);
        fut.await.unwrap();
    }

    #[tokio::test]
    async fn registry_entry_is_evicted_once_all_permits_for_an_account_are_dropped() {
        let gate = AccountGate::new(1);
        {
            let _permit = gate.acquire(AccountId(7)).await;
            assert_eq!(gate.registry.lock().unwrap().len(), 1);
        }
        // Force the GC sweep by acquiring a (different) account.
        let _other = gate.acquire(AccountId(8)).await;
        let registry = gate.registry.lock().unwrap();
        assert!(!registry.contains_key(&AccountId(7)));
    }
}
