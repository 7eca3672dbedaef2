//! Namespace locking for (bucket, object) pairs.
//!
//! [`NsLockMap`] provides reader-writer locking keyed by
//! [`NsParam`] `{volume, path}`.  Entries are reference counted: a short
//! guard mutex serializes entry creation and ref arithmetic, the actual
//! waiting happens outside the guard on the entry's lock, and an entry is
//! removed from the map the moment its ref count returns to zero.  No
//! finalizers or weak references are involved.
//!
//! The lock primitive must be releasable from a different call than the
//! acquire (`lock` / `unlock` are separate operations keyed by name, not
//! an RAII guard), so it is built on a FIFO [`tokio::sync::Semaphore`]:
//! a writer takes every permit, a reader takes one, and release returns
//! the permits.  The FIFO queue means a waiting writer blocks readers
//! that arrive after it, so readers cannot starve writers.
//!
//! With instrumentation enabled (see [`crate::config::DebugConfig`]) each
//! operation's lock state is tracked for the debug endpoint; see
//! [`instrument`].

mod instrument;

pub use instrument::{LockType, OpsLockState, SystemLockState, VolumeLockInfo};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use instrument::DebugLockState;

/// Number of permits a writer drains.  Readers take one permit each, so
/// this also bounds concurrent readers per entry.
const WRITE_PERMITS: u32 = u32::MAX >> 3;

/// Key identifying a lockable namespace resource.  `volume` is the
/// bucket; `path` is the object, or empty for bucket-level operations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NsParam {
    pub volume: String,
    pub path: String,
}

impl NsParam {
    fn new(volume: &str, path: &str) -> Self {
        Self {
            volume: volume.to_string(),
            path: path.to_string(),
        }
    }
}

/// A single reference-counted lock entry.  The ref count is only mutated
/// under the map's guard mutex.
#[derive(Debug)]
struct NsLock {
    sem: Semaphore,
    ref_count: AtomicI64,
}

impl NsLock {
    fn new() -> Self {
        Self {
            sem: Semaphore::new(WRITE_PERMITS as usize),
            ref_count: AtomicI64::new(0),
        }
    }

    async fn acquire(&self, lock_type: LockType) {
        let permits = match lock_type {
            LockType::Read => 1,
            LockType::Write => WRITE_PERMITS,
        };
        self.sem
            .acquire_many(permits)
            .await
            .expect("lock semaphore closed")
            .forget();
    }

    fn release(&self, lock_type: LockType) {
        let permits = match lock_type {
            LockType::Read => 1,
            LockType::Write => WRITE_PERMITS,
        };
        self.sem.add_permits(permits as usize);
    }
}

#[derive(Debug, Default)]
struct Inner {
    lock_map: HashMap<NsParam, Arc<NsLock>>,
    debug: DebugLockState,
}

/// Map of namespace locks, one entry per in-use (volume, path) pair.
#[derive(Debug)]
pub struct NsLockMap {
    /// Guard mutex: held only across O(1) work (map lookup, ref
    /// arithmetic, counter updates) and the snapshot walk.
    inner: Mutex<Inner>,
    instrumented: bool,
}

impl NsLockMap {
    /// Create a lock map.  With `instrumented` set, every operation's
    /// lock state is recorded for the debug endpoint.
    pub fn new(instrumented: bool) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            instrumented,
        }
    }

    /// Whether lock instrumentation is enabled.
    pub fn is_instrumented(&self) -> bool {
        self.instrumented
    }

    /// Acquire an exclusive lock on (volume, path).  Blocks until every
    /// other holder has released.
    #[track_caller]
    pub fn lock(
        &self,
        volume: &str,
        path: &str,
        op_id: &str,
    ) -> impl Future<Output = ()> + Send + '_ {
        let origin = std::panic::Location::caller().to_string();
        let param = NsParam::new(volume, path);
        let op_id = op_id.to_string();
        async move { self.acquire(param, op_id, origin, LockType::Write).await }
    }

    /// Release an exclusive lock.
    pub fn unlock(&self, volume: &str, path: &str, op_id: &str) {
        self.release(NsParam::new(volume, path), op_id, LockType::Write);
    }

    /// Acquire a shared lock on (volume, path).  Blocks only behind a
    /// writer.  Shared across distinct operation IDs; not counted within
    /// a single one.
    #[track_caller]
    pub fn rlock(
        &self,
        volume: &str,
        path: &str,
        op_id: &str,
    ) -> impl Future<Output = ()> + Send + '_ {
        let origin = std::panic::Location::caller().to_string();
        let param = NsParam::new(volume, path);
        let op_id = op_id.to_string();
        async move { self.acquire(param, op_id, origin, LockType::Read).await }
    }

    /// Release a shared lock.
    pub fn runlock(&self, volume: &str, path: &str, op_id: &str) {
        self.release(NsParam::new(volume, path), op_id, LockType::Read);
    }

    async fn acquire(&self, param: NsParam, op_id: String, origin: String, lock_type: LockType) {
        let entry = {
            let mut inner = self.inner.lock().expect("nslock guard poisoned");
            let entry = inner
                .lock_map
                .entry(param.clone())
                .or_insert_with(|| Arc::new(NsLock::new()))
                .clone();
            entry.ref_count.fetch_add(1, Ordering::Relaxed);
            if self.instrumented {
                inner.debug.reserve(&param, &origin, &op_id, lock_type);
            }
            entry
        };

        // Wait outside the guard so entry creation stays serialized while
        // contention is paid here.
        entry.acquire(lock_type).await;

        if self.instrumented {
            let mut inner = self.inner.lock().expect("nslock guard poisoned");
            inner.debug.acquired(&param, &origin, &op_id, lock_type);
        }
    }

    fn release(&self, param: NsParam, op_id: &str, lock_type: LockType) {
        let mut inner = self.inner.lock().expect("nslock guard poisoned");
        let Inner { lock_map, debug } = &mut *inner;
        match lock_map.get(&param) {
            Some(entry) => {
                entry.release(lock_type);
                let remaining = entry.ref_count.fetch_sub(1, Ordering::Relaxed) - 1;
                if self.instrumented {
                    debug.released(&param, op_id);
                }
                if remaining == 0 {
                    lock_map.remove(&param);
                    if self.instrumented {
                        debug.drop_param(&param);
                    }
                }
            }
            None => {
                // Silent no-op in the production path; reported when
                // instrumentation is on.
                if self.instrumented {
                    debug.released(&param, op_id);
                }
            }
        }
    }

    /// Operator override: remove the entry for (volume, path) irrespective
    /// of its ref count.  Used only by the debug channel.  Waiters already
    /// parked on the entry stay parked; new acquirers get a fresh entry.
    pub fn force_unlock(&self, volume: &str, path: &str) -> bool {
        let param = NsParam::new(volume, path);
        let mut inner = self.inner.lock().expect("nslock guard poisoned");
        let removed = inner.lock_map.remove(&param).is_some();
        inner.debug.force_drop_param(&param);
        removed
    }

    /// Read a consistent snapshot of the entire lock state for the debug
    /// endpoint.  Holds the guard mutex across the walk; walks are short
    /// and rare.
    pub fn snapshot(&self) -> SystemLockState {
        let inner = self.inner.lock().expect("nslock guard poisoned");
        inner.debug.snapshot()
    }

    /// Ref count of the entry for (volume, path), if present.
    #[cfg(test)]
    fn entry_ref(&self, volume: &str, path: &str) -> Option<i64> {
        let inner = self.inner.lock().expect("nslock guard poisoned");
        inner
            .lock_map
            .get(&NsParam::new(volume, path))
            .map(|e| e.ref_count.load(Ordering::Relaxed))
    }

    /// Number of entries currently present in the map.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("nslock guard poisoned");
        inner.lock_map.len()
    }

    /// True when no entry is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// -- Unit tests ---------------------------------------------------------------
