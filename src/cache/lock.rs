//! Single-flight build coordination
//!
//! Each cache key maps to a binary semaphore. The first caller for a key
//! builds; everyone else queues on the same semaphore and re-checks the cache
//! once they get the permit. Results are never shared through the table, only
//! the right to attempt a build.
//!
//! Slots are created on demand and removed by the last registered party. Both
//! happen under the table mutex so a new waiter can never register against a
//! slot that is about to be dropped.

use crate::cache::key::CacheKey;
use crate::error::{ClientlibError, ClientlibResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

struct Slot {
    semaphore: Arc<Semaphore>,
    /// Holder plus queued waiters
    parties: usize,
}

#[derive(Default)]
struct TableState {
    slots: HashMap<CacheKey, Slot>,
    closed: bool,
}

/// Table of per-key build locks
#[derive(Default)]
pub struct BuildLockTable {
    state: Mutex<TableState>,
}

impl BuildLockTable {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, TableState> {
        // Critical sections never panic while holding the lock, a poisoned
        // table is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for the build lock of `key`
    ///
    /// The returned guard releases the lock when dropped, including when the
    /// waiting future itself is dropped before the lock was granted.
    pub async fn acquire(&self, key: &CacheKey) -> ClientlibResult<BuildGuard<'_>> {
        let mut guard = {
            let mut state = self.lock_state();
            if state.closed {
                return Err(ClientlibError::ServiceShutdown);
            }

            let slot = state.slots.entry(key.clone()).or_insert_with(|| Slot {
                semaphore: Arc::new(Semaphore::new(1)),
                parties: 0,
            });
            slot.parties += 1;
            trace!("Registered for build lock {} ({} parties)", key, slot.parties);

            BuildGuard {
                table: self,
                key: key.clone(),
                semaphore: Arc::clone(&slot.semaphore),
                permit: None,
            }
        };

        match Arc::clone(&guard.semaphore).acquire_owned().await {
            Ok(permit) => {
                guard.permit = Some(permit);
                Ok(guard)
            }
            Err(_) => {
                debug!("Build lock {} closed while waiting", key);
                Err(ClientlibError::ServiceShutdown)
            }
        }
    }

    /// Run `build` while holding the build lock of `key`
    ///
    /// Errors of `build` are returned after the lock has been released.
    pub async fn with_build_lock<F, Fut, T>(&self, key: &CacheKey, build: F) -> ClientlibResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientlibResult<T>>,
    {
        let guard = self.acquire(key).await?;
        let result = build().await;
        drop(guard);
        result
    }

    /// Number of keys with a live lock slot
    pub fn len(&self) -> usize {
        self.lock_state().slots.len()
    }

    /// True when no build holds or waits for a lock
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Holder plus waiters registered for `key`
    pub fn parties(&self, key: &CacheKey) -> usize {
        self.lock_state()
            .slots
            .get(key)
            .map(|slot| slot.parties)
            .unwrap_or(0)
    }

    /// Force-unblock every waiter and discard the table
    ///
    /// Queued waiters fail with [`ClientlibError::ServiceShutdown`]; builds
    /// already holding a lock run to completion. Later acquisitions fail.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        state.closed = true;

        let mut waiting = 0;
        for slot in state.slots.values() {
            waiting += slot.parties.saturating_sub(1);
            slot.semaphore.close();
        }
        debug!(
            "Build lock table shut down: {} slots, {} waiters released",
            state.slots.len(),
            waiting
        );
        state.slots.clear();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.lock_state().closed
    }
}

/// Held build lock for one cache key
pub struct BuildGuard<'a> {
    table: &'a BuildLockTable,
    key: CacheKey,
    semaphore: Arc<Semaphore>,
    permit: Option<OwnedSemaphorePermit>,
}

impl BuildGuard<'_> {
    /// Key this guard locks
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.table.lock_state();
        drop(self.permit.take());

        let remove = match state.slots.get_mut(&self.key) {
            // A slot re-created after shutdown or removal belongs to others
            Some(slot) if Arc::ptr_eq(&slot.semaphore, &self.semaphore) => {
                slot.parties -= 1;
                slot.parties == 0
            }
            _ => false,
        };
        if remove {
            state.slots.remove(&self.key);
            trace!("Removed build lock {}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::resolve_cache_key;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn key(path: &str) -> CacheKey {
        resolve_cache_key("/var/cache/clientlibs", path, "")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_build_once() {
        let table = Arc::new(BuildLockTable::new());
        let built = Arc::new(AtomicBool::new(false));
        let builds = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let table = Arc::clone(&table);
            let built = Arc::clone(&built);
            let builds = Arc::clone(&builds);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            handles.push(tokio::spawn(async move {
                table
                    .with_build_lock(&key("app.js"), || async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        if !built.load(Ordering::SeqCst) {
                            builds.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            built.store(true, Ordering::SeqCst);
                        }
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ClientlibError>(())
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn different_keys_run_in_parallel() {
        let table = Arc::new(BuildLockTable::new());
        let barrier = Arc::new(Barrier::new(2));

        let run = |path: &'static str| {
            let table = Arc::clone(&table);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                table
                    .with_build_lock(&key(path), || async {
                        // Both holders must be inside at the same time
                        barrier.wait().await;
                        Ok::<_, ClientlibError>(())
                    })
                    .await
            })
        };

        let a = run("a.js");
        let b = run("b.css");
        let joined = tokio::time::timeout(Duration::from_secs(5), async {
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();
        })
        .await;

        assert!(joined.is_ok());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn error_propagates_after_release() {
        let table = BuildLockTable::new();
        let k = key("app.js");

        let result: ClientlibResult<()> = table
            .with_build_lock(&k, || async {
                Err(ClientlibError::build_failed(k.as_str(), "boom"))
            })
            .await;

        assert!(matches!(result, Err(ClientlibError::BuildFailed { .. })));
        assert!(table.is_empty());

        let value = table
            .with_build_lock(&k, || async { Ok::<_, ClientlibError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn waiters_are_counted_and_removed() {
        let table = Arc::new(BuildLockTable::new());
        let k = key("app.js");

        let held = table.acquire(&k).await.unwrap();
        assert_eq!(held.key(), &k);
        assert_eq!(table.parties(&k), 1);

        let waiter = {
            let table = Arc::clone(&table);
            let k = k.clone();
            tokio::spawn(async move {
                let _guard = table.acquire(&k).await?;
                Ok::<_, ClientlibError>(())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(table.parties(&k), 2);

        drop(held);
        waiter.await.unwrap().unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancelled_waiter_deregisters() {
        let table = Arc::new(BuildLockTable::new());
        let k = key("app.js");

        let held = table.acquire(&k).await.unwrap();
        let waiter = {
            let table = Arc::clone(&table);
            let k = k.clone();
            tokio::spawn(async move {
                let _guard = table.acquire(&k).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(table.parties(&k), 2);

        waiter.abort();
        let _ = waiter.await;
        assert_eq!(table.parties(&k), 1);

        drop(held);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn shutdown_releases_waiters() {
        let table = Arc::new(BuildLockTable::new());
        let k = key("app.js");

        let held = table.acquire(&k).await.unwrap();
        let waiter = {
            let table = Arc::clone(&table);
            let k = k.clone();
            tokio::spawn(async move {
                let outcome = table.acquire(&k).await.map(|_| ());
                outcome
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        table.shutdown();
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(ClientlibError::ServiceShutdown)));
        assert!(table.is_empty());
        assert!(table.is_shut_down());

        // The running build finishes normally
        drop(held);
        assert!(table.is_empty());

        assert!(matches!(
            table.acquire(&k).await,
            Err(ClientlibError::ServiceShutdown)
        ));
    }
}
