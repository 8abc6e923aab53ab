//! In-process serialisation of writes per discovery scope.
//!
//! Two writes whose footprints share a `(user, geography)` pair must not
//! interleave their holder rebalancing. Each scope maps to an async mutex;
//! a writer takes all of its scopes in sorted order, so two writers can never
//! wait on each other in a cycle.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use banya_core::recompute::DiscoveryScope;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table = BTreeMap<DiscoveryScope, Arc<AsyncMutex<()>>>;

#[derive(Clone, Default)]
pub struct ScopeLocks {
  table: Arc<Mutex<Table>>,
}

/// Held scopes; released on drop.
pub struct ScopeGuard {
  table:  Arc<Mutex<Table>>,
  scopes: Vec<DiscoveryScope>,
  guards: Vec<OwnedMutexGuard<()>>,
}

impl ScopeLocks {
  pub fn new() -> Self { Self::default() }

  fn entry(&self, scope: DiscoveryScope) -> Arc<AsyncMutex<()>> {
    let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(table.entry(scope).or_default())
  }

  /// Take every scope in `scopes`, waiting at most `timeout` in total.
  ///
  /// Returns `None` when the deadline passes; nothing stays held then.
  pub async fn acquire(
    &self,
    scopes: &BTreeSet<DiscoveryScope>,
    timeout: Duration,
  ) -> Option<ScopeGuard> {
    let mut held = ScopeGuard {
      table:  Arc::clone(&self.table),
      scopes: scopes.iter().copied().collect(),
      guards: Vec::with_capacity(scopes.len()),
    };
    let deadline = tokio::time::Instant::now() + timeout;
    for &scope in scopes {
      let lock = self.entry(scope);
      let guard = tokio::time::timeout_at(deadline, lock.lock_owned()).await.ok()?;
      held.guards.push(guard);
    }
    Some(held)
  }

  #[cfg(test)]
  pub fn len(&self) -> usize {
    self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  /// Holders plus waiters on `scope`.
  #[cfg(test)]
  pub fn contenders(&self, scope: &DiscoveryScope) -> usize {
    let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
    table.get(scope).map_or(0, |lock| Arc::strong_count(lock) - 1)
  }
}

impl Drop for ScopeGuard {
  fn drop(&mut self) {
    self.guards.clear();
    let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
    for scope in &self.scopes {
      // Only the table itself still points at an idle entry.
      if table.get(scope).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        table.remove(scope);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use banya_core::{
    ids::{RegionId, UserId},
    recompute::Geo,
  };

  use super::*;

  fn scope(user: i64, region: i64) -> DiscoveryScope {
    DiscoveryScope { user_id: UserId(user), geo: Geo::Region(RegionId(region)) }
  }

  #[tokio::test]
  async fn overlapping_scopes_wait_then_time_out() {
    let locks = ScopeLocks::new();
    let first: BTreeSet<_> = [scope(1, 1), scope(2, 1)].into();
    let second: BTreeSet<_> = [scope(2, 1), scope(3, 1)].into();

    let held = locks.acquire(&first, Duration::from_secs(1)).await.unwrap();
    assert!(locks.acquire(&second, Duration::from_millis(20)).await.is_none());

    drop(held);
    assert!(locks.acquire(&second, Duration::from_secs(1)).await.is_some());
  }

  #[tokio::test]
  async fn disjoint_scopes_do_not_block() {
    let locks = ScopeLocks::new();
    let _a = locks.acquire(&[scope(1, 1)].into(), Duration::from_secs(1)).await.unwrap();
    let b = locks.acquire(&[scope(1, 2)].into(), Duration::from_millis(20)).await;
    assert!(b.is_some());
  }

  #[tokio::test]
  async fn waiters_count_as_contenders() {
    let locks = ScopeLocks::new();
    let held = locks.acquire(&[scope(1, 1)].into(), Duration::from_secs(1)).await.unwrap();
    assert_eq!(locks.contenders(&scope(1, 1)), 1);

    let other = locks.clone();
    let waiter = tokio::spawn(async move {
      other.acquire(&[scope(1, 1)].into(), Duration::from_secs(1)).await.is_some()
    });
    while locks.contenders(&scope(1, 1)) < 2 {
      tokio::task::yield_now().await;
    }
    drop(held);
    assert!(waiter.await.unwrap());
    assert_eq!(locks.contenders(&scope(1, 1)), 0);
  }

  #[tokio::test]
  async fn idle_entries_are_pruned() {
    let locks = ScopeLocks::new();
    let held = locks
      .acquire(&[scope(1, 1), scope(1, 2)].into(), Duration::from_secs(1))
      .await
      .unwrap();
    assert_eq!(locks.len(), 2);
    drop(held);
    assert_eq!(locks.len(), 0);
  }
}
