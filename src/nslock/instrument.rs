//! Lock-state instrumentation for the namespace lock map.
//!
//! When instrumentation is enabled every lock operation owns a small
//! descriptor that tracks its type, origin and status.  The per-operation
//! state machine is
//!
//! ```text
//! (none) --reserve--> Blocked --acquired--> Running --released--> (deleted)
//! ```
//!
//! and each transition updates the per-(volume, path) counters and the
//! global counters together, under the lock map's guard mutex.  The
//! counters satisfy `ref == running + blocked` per entry and the sums of
//! the per-entry counters equal the global counters at all times.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use tracing::error;

use super::NsParam;

const RLOCK_STR: &str = "RLock";
const WLOCK_STR: &str = "WLock";

/// Whether an operation holds (or waits for) a shared or exclusive lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    Read,
    Write,
}

impl LockType {
    fn as_str(self) -> &'static str {
        match self {
            LockType::Read => RLOCK_STR,
            LockType::Write => WLOCK_STR,
        }
    }
}

/// Status of an operation with a given operation ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// Waiting for the lock to be granted.
    Blocked,
    /// Lock acquired, operation under execution.
    Running,
}

impl LockStatus {
    fn as_str(self) -> &'static str {
        match self {
            LockStatus::Blocked => "Blocked",
            LockStatus::Running => "Running",
        }
    }
}

/// Lock state for one operation ID.
#[derive(Debug)]
struct OpLockInfo {
    lock_type: LockType,
    /// Call site of the lock acquisition, for operators chasing a stuck
    /// operation.
    origin: String,
    status: LockStatus,
    /// When the current status was entered.
    since: Instant,
}

/// Lock state for one (volume, path) pair.
///
/// `ref_count` is the number of operations holding or waiting on the
/// entry; `running` counts successful acquisitions not yet released and
/// `blocked` counts operations still waiting, so
/// `ref_count == running + blocked`.
#[derive(Debug, Default)]
struct ParamLockInfo {
    ref_count: i64,
    running: i64,
    blocked: i64,
    ops: HashMap<String, OpLockInfo>,
}

/// Debug state for the whole lock map, aggregated across entries.
#[derive(Debug, Default)]
pub(super) struct DebugLockState {
    global_lock_count: i64,
    running_lock_count: i64,
    blocked_count: i64,
    params: HashMap<NsParam, ParamLockInfo>,
}

impl DebugLockState {
    /// Record a new operation waiting on a lock: (none) -> Blocked.
    pub(super) fn reserve(&mut self, param: &NsParam, origin: &str, op_id: &str, lock_type: LockType) {
        let info = self.params.entry(param.clone()).or_default();
        info.ops.insert(
            op_id.to_string(),
            OpLockInfo {
                lock_type,
                origin: origin.to_string(),
                status: LockStatus::Blocked,
                since: Instant::now(),
            },
        );
        self.global_lock_count += 1;
        self.blocked_count += 1;
        info.ref_count += 1;
        info.blocked += 1;
    }

    /// Record a granted lock: Blocked -> Running.
    pub(super) fn acquired(&mut self, param: &NsParam, origin: &str, op_id: &str, lock_type: LockType) {
        let Some(info) = self.params.get_mut(param) else {
            error!(volume = %param.volume, path = %param.path, "Lock state missing for acquired lock");
            return;
        };
        info.ops.insert(
            op_id.to_string(),
            OpLockInfo {
                lock_type,
                origin: origin.to_string(),
                status: LockStatus::Running,
                since: Instant::now(),
            },
        );
        self.blocked_count -= 1;
        self.running_lock_count += 1;
        info.blocked -= 1;
        info.running += 1;
    }

    /// Record a released lock: Running -> (deleted).
    ///
    /// A release with an operation ID that was never reserved is reported
    /// and otherwise ignored.
    pub(super) fn released(&mut self, param: &NsParam, op_id: &str) {
        let Some(info) = self.params.get_mut(param) else {
            error!(
                volume = %param.volume,
                path = %param.path,
                "Operation ID doesn't exist"
            );
            return;
        };
        if info.ops.remove(op_id).is_none() {
            error!(
                volume = %param.volume,
                path = %param.path,
                ops_id = %op_id,
                "Operation ID doesn't exist"
            );
            return;
        }
        self.running_lock_count -= 1;
        self.global_lock_count -= 1;
        info.running -= 1;
        info.ref_count -= 1;
    }

    /// Drop the state for a (volume, path) pair whose lock entry reached a
    /// zero ref count.
    pub(super) fn drop_param(&mut self, param: &NsParam) {
        self.params.remove(param);
    }

    /// Forcibly drop the state for a (volume, path) pair, subtracting its
    /// counters from the global aggregates so the invariants keep holding.
    pub(super) fn force_drop_param(&mut self, param: &NsParam) {
        if let Some(info) = self.params.remove(param) {
            self.global_lock_count -= info.ref_count;
            self.running_lock_count -= info.running;
            self.blocked_count -= info.blocked;
        }
    }

    /// Render the entire lock state.  Called under the guard mutex.
    pub(super) fn snapshot(&self) -> SystemLockState {
        let mut locks_info_per_object = Vec::with_capacity(self.params.len());
        for (param, info) in &self.params {
            let mut ops: Vec<OpsLockState> = info
                .ops
                .iter()
                .map(|(op_id, op)| OpsLockState {
                    operation_id: op_id.clone(),
                    lock_origin: op.origin.clone(),
                    lock_type: op.lock_type.as_str().to_string(),
                    status: op.status.as_str().to_string(),
                    since: format!("{:?}", op.since.elapsed()),
                })
                .collect();
            ops.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));
            locks_info_per_object.push(VolumeLockInfo {
                volume: param.volume.clone(),
                path: param.path.clone(),
                total_locks: info.ref_count,
                total_running_ops: info.running,
                total_blocked_locks: info.blocked,
                ops_lock_state: ops,
            });
        }
        locks_info_per_object.sort_by(|a, b| (&a.volume, &a.path).cmp(&(&b.volume, &b.path)));
        SystemLockState {
            total_locks_count: self.global_lock_count,
            total_blocked_locks: self.blocked_count,
            total_running_locks: self.running_lock_count,
            locks_info_per_volume: locks_info_per_object,
        }
    }

    #[cfg(test)]
    pub(super) fn counters(&self) -> (i64, i64, i64) {
        (self.global_lock_count, self.running_lock_count, self.blocked_count)
    }

    #[cfg(test)]
    pub(super) fn param_counters(&self, param: &NsParam) -> Option<(i64, i64, i64)> {
        self.params
            .get(param)
            .map(|i| (i.ref_count, i.running, i.blocked))
    }
}

// -- Snapshot types -----------------------------------------------------------

/// Lock state of the entire system: total locks held, total calls blocked
/// on locks, and the state of every lock.  The JSON field names are a
/// compatibility contract for the debug endpoint.
#[derive(Debug, Serialize)]
pub struct SystemLockState {
    #[serde(rename = "totalLocks")]
    pub total_locks_count: i64,
    #[serde(rename = "totalBlockedLocks")]
    pub total_blocked_locks: i64,
    #[serde(rename = "totalAcquiredLocks")]
    pub total_running_locks: i64,
    #[serde(rename = "locksInfoPerObject")]
    pub locks_info_per_volume: Vec<VolumeLockInfo>,
}

/// Lock state for a single (volume, path) pair.
#[derive(Debug, Serialize)]
pub struct VolumeLockInfo {
    #[serde(rename = "bucket")]
    pub volume: String,
    #[serde(rename = "object")]
    pub path: String,
    #[serde(rename = "locksOnObject")]
    pub total_locks: i64,
    /// Operations that acquired the lock and are still executing.
    #[serde(rename = "locksAcquiredOnObject")]
    pub total_running_ops: i64,
    /// Operations blocked waiting for the lock to be released.
    #[serde(rename = "locksBlockedOnObject")]
    pub total_blocked_locks: i64,
    #[serde(rename = "LockDetailsOnObject")]
    pub ops_lock_state: Vec<OpsLockState>,
}

/// State of one operation's lock.
#[derive(Debug, Serialize)]
pub struct OpsLockState {
    #[serde(rename = "opsID")]
    pub operation_id: String,
    #[serde(rename = "lockOrigin")]
    pub lock_origin: String,
    #[serde(rename = "lockType")]
    pub lock_type: String,
    #[serde(rename = "status")]
    pub status: String,
    /// Human-readable duration since the status transition.
    #[serde(rename = "statusSince")]
    pub since: String,
}
