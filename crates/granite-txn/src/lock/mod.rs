//! Hierarchical lock manager.
//!
//! Locks exist at two granularities (table and row) in five modes:
//!
//! ```text
//!          │ IS │ IX │ S  │ SIX │ X  │
//! ─────────┼────┼────┼────┼─────┼────┤
//!     IS   │ ✓  │ ✓  │ ✓  │ ✓   │ ✗  │
//!     IX   │ ✓  │ ✓  │ ✗  │ ✗   │ ✗  │
//!     S    │ ✓  │ ✗  │ ✓  │ ✗   │ ✗  │
//!     SIX  │ ✓  │ ✗  │ ✗  │ ✗   │ ✗  │
//!     X    │ ✗  │ ✗  │ ✗  │ ✗   │ ✗  │
//! ```
//!
//! Every resource has a FIFO request queue with a mutex and a condition
//! variable. A request is granted when its mode is compatible with all
//! current holders and with every earlier waiter that would be granted
//! first: compatible batches advance together, but nothing overtakes an
//! incompatible earlier request. A queue has at most one upgrading
//! transaction at a time; the upgrader has priority over ordinary waiters.
//!
//! Rule violations abort the calling transaction: its state flips to
//! `Aborted`, the reason is recorded, and a [`TransactionAbort`] error is
//! returned for the caller's rollback path. A blocked call whose transaction
//! is aborted from outside (deadlock victim) wakes, withdraws its request,
//! and returns `Ok(false)` without unwinding.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, trace};

use granite_common::types::{Rid, TableId, TxnId};

use crate::deadlock::WaitsForGraph;
use crate::manager::{IsolationLevel, Transaction, TransactionManager, TransactionState};

/// Lock mode for a table or row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Intention shared: finer-grained S locks will be taken within.
    IntentionShared,
    /// Intention exclusive: finer-grained X locks will be taken within.
    IntentionExclusive,
    /// Shared (read).
    Shared,
    /// Shared plus intention exclusive.
    SharedIntentionExclusive,
    /// Exclusive (write).
    Exclusive,
}

impl LockMode {
    /// All modes, in declaration order. Used to index compatibility sets.
    const ALL: [LockMode; 5] = [
        LockMode::IntentionShared,
        LockMode::IntentionExclusive,
        LockMode::Shared,
        LockMode::SharedIntentionExclusive,
        LockMode::Exclusive,
    ];

    fn index(self) -> usize {
        match self {
            LockMode::IntentionShared => 0,
            LockMode::IntentionExclusive => 1,
            LockMode::Shared => 2,
            LockMode::SharedIntentionExclusive => 3,
            LockMode::Exclusive => 4,
        }
    }

    /// Checks the compatibility matrix: can two transactions hold these
    /// modes on the same resource at once?
    pub fn is_compatible_with(self, other: LockMode) -> bool {
        use LockMode::*;
        matches!(
            (self, other),
            (IntentionShared, IntentionShared | IntentionExclusive | Shared | SharedIntentionExclusive)
                | (IntentionExclusive, IntentionShared | IntentionExclusive)
                | (Shared, IntentionShared | Shared)
                | (SharedIntentionExclusive, IntentionShared)
        )
    }

    /// Checks the upgrade lattice: IS → {S, X, IX, SIX}, S → {X, SIX},
    /// IX → {X, SIX}, SIX → {X}, and every mode upgrades to itself.
    pub fn can_upgrade_to(self, target: LockMode) -> bool {
        use LockMode::*;
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (IntentionShared, Shared | Exclusive | IntentionExclusive | SharedIntentionExclusive)
                | (Shared, Exclusive | SharedIntentionExclusive)
                | (IntentionExclusive, Exclusive | SharedIntentionExclusive)
                | (SharedIntentionExclusive, Exclusive)
        )
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::IntentionShared => write!(f, "IS"),
            LockMode::IntentionExclusive => write!(f, "IX"),
            LockMode::Shared => write!(f, "S"),
            LockMode::SharedIntentionExclusive => write!(f, "SIX"),
            LockMode::Exclusive => write!(f, "X"),
        }
    }
}

/// Why a transaction was aborted by the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Lock acquisition after the shrinking phase began.
    LockOnShrinking,
    /// S/IS/SIX requested under READ_UNCOMMITTED.
    LockSharedOnReadUncommitted,
    /// Another transaction is already upgrading on this resource.
    UpgradeConflict,
    /// The requested upgrade is not in the lattice.
    IncompatibleUpgrade,
    /// Unlock of a resource the transaction holds no lock on.
    AttemptedUnlockButNoLockHeld,
    /// Table unlock while row locks on that table are still held.
    TableUnlockedBeforeUnlockingRows,
    /// Intention mode requested at row granularity.
    AttemptedIntentionLockOnRow,
    /// Row lock without the prerequisite table lock.
    TableLockNotPresent,
    /// Chosen as the victim of a deadlock cycle.
    DeadlockVictim,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            AbortReason::LockOnShrinking => "lock requested while shrinking",
            AbortReason::LockSharedOnReadUncommitted => {
                "shared lock requested under READ_UNCOMMITTED"
            }
            AbortReason::UpgradeConflict => "another transaction is already upgrading",
            AbortReason::IncompatibleUpgrade => "upgrade not allowed by the lattice",
            AbortReason::AttemptedUnlockButNoLockHeld => "unlock without a held lock",
            AbortReason::TableUnlockedBeforeUnlockingRows => {
                "table unlocked before its row locks"
            }
            AbortReason::AttemptedIntentionLockOnRow => "intention lock requested on a row",
            AbortReason::TableLockNotPresent => "row lock without a table lock",
            AbortReason::DeadlockVictim => "deadlock victim",
        };
        write!(f, "{msg}")
    }
}

/// Error returned when a lock call aborts its transaction.
///
/// The transaction state is already `Aborted` when this surfaces; the caller
/// is responsible for running the transaction-manager abort path.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("transaction {txn_id} aborted: {reason}")]
pub struct TransactionAbort {
    /// The aborted transaction.
    pub txn_id: TxnId,
    /// Why it was aborted.
    pub reason: AbortReason,
}

/// Result type for lock manager operations.
pub type LockResult<T> = Result<T, TransactionAbort>;

/// One lock request in a queue.
#[derive(Debug, Clone, Copy)]
pub struct LockRequest {
    /// The requesting transaction.
    pub txn_id: TxnId,
    /// The requested mode.
    pub mode: LockMode,
    /// Whether the request has been granted.
    pub granted: bool,
}

impl LockRequest {
    fn new(txn_id: TxnId, mode: LockMode) -> Self {
        Self {
            txn_id,
            mode,
            granted: false,
        }
    }
}

/// Queue state: the FIFO request list and the single upgrader slot.
struct QueueInner {
    requests: VecDeque<LockRequest>,
    /// The transaction currently upgrading, `TxnId::INVALID` when none.
    upgrading: TxnId,
}

/// Per-resource request queue.
struct LockRequestQueue {
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

impl LockRequestQueue {
    fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                requests: VecDeque::new(),
                upgrading: TxnId::INVALID,
            }),
            cv: Condvar::new(),
        }
    }
}

/// A lockable resource, used to route lock-set bookkeeping.
#[derive(Debug, Clone, Copy)]
enum Resource {
    Table(TableId),
    Row(TableId, Rid),
}

/// Counters of lock manager activity.
#[derive(Debug, Default)]
pub struct LockStats {
    /// Total lock grants.
    pub acquisitions: AtomicU64,
    /// Total lock releases.
    pub releases: AtomicU64,
    /// Requests that had to wait at least once.
    pub waits: AtomicU64,
    /// Lock upgrades performed.
    pub upgrades: AtomicU64,
    /// Transactions aborted by the lock manager (rule violations and
    /// deadlock victims).
    pub aborts: AtomicU64,
}

impl LockStats {
    fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn record_release(&self) {
        self.releases.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn record_wait(&self) {
        self.waits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn record_upgrade(&self) {
        self.upgrades.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn record_abort(&self) {
        self.aborts.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

/// The hierarchical lock manager.
///
/// The two resource maps are guarded by their own latches, held only while
/// locating or creating a queue; all waiting happens on the per-queue
/// condition variables.
pub struct LockManager {
    table_locks: Mutex<HashMap<TableId, Arc<LockRequestQueue>>>,
    row_locks: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
    stats: LockStats,
}

impl LockManager {
    /// Creates an empty lock manager.
    pub fn new() -> Self {
        Self {
            table_locks: Mutex::new(HashMap::new()),
            row_locks: Mutex::new(HashMap::new()),
            stats: LockStats::default(),
        }
    }

    /// Returns the activity counters.
    pub fn stats(&self) -> &LockStats {
        &self.stats
    }

    /// Acquires a table lock, blocking until granted.
    ///
    /// Returns `Ok(true)` on grant, `Ok(false)` if the blocked call woke to
    /// find its transaction aborted or its request withdrawn, and an abort
    /// error on any rule violation.
    pub fn lock_table(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        table: TableId,
    ) -> LockResult<bool> {
        if txn.state().is_ended() {
            return Ok(false);
        }
        self.check_admission(txn, mode)?;
        let queue = {
            let mut map = self.table_locks.lock();
            Arc::clone(map.entry(table).or_insert_with(|| Arc::new(LockRequestQueue::new())))
        };
        self.lock_resource(txn, mode, Resource::Table(table), &queue)
    }

    /// Releases a table lock.
    ///
    /// Fails (aborting the transaction) when no lock is held on the table or
    /// when row locks on the table are still held. Applies the 2PL state
    /// transition: under REPEATABLE_READ unlocking S or X moves the
    /// transaction to shrinking; under the other levels only X does.
    pub fn unlock_table(&self, txn: &Arc<Transaction>, table: TableId) -> LockResult<bool> {
        let queue = { self.table_locks.lock().get(&table).cloned() };
        let Some(queue) = queue else {
            return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };
        if txn.holds_row_locks_on(table) {
            return Err(self.abort(txn, AbortReason::TableUnlockedBeforeUnlockingRows));
        }

        let mode = {
            let mut inner = queue.inner.lock();
            let Some(pos) = inner
                .requests
                .iter()
                .position(|r| r.txn_id == txn.id() && r.granted)
            else {
                drop(inner);
                return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
            };
            let mode = inner.requests[pos].mode;
            let _ = inner.requests.remove(pos);
            queue.cv.notify_all();
            mode
        };

        txn.remove_table_lock(mode, table);
        self.apply_unlock_transition(txn, mode);
        self.stats.record_release();
        trace!(txn = %txn.id(), %table, %mode, "released table lock");
        Ok(true)
    }

    /// Acquires a row lock, blocking until granted.
    ///
    /// Rows only support S and X. An X row lock requires X, IX, or SIX on
    /// the table; an S row lock requires a table lock of any mode.
    pub fn lock_row(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        table: TableId,
        rid: Rid,
    ) -> LockResult<bool> {
        if txn.state().is_ended() {
            return Ok(false);
        }
        if !matches!(mode, LockMode::Shared | LockMode::Exclusive) {
            return Err(self.abort(txn, AbortReason::AttemptedIntentionLockOnRow));
        }
        self.check_admission(txn, mode)?;

        let table_mode = txn.table_lock_mode(table);
        let table_ok = match mode {
            LockMode::Exclusive => matches!(
                table_mode,
                Some(LockMode::Exclusive)
                    | Some(LockMode::IntentionExclusive)
                    | Some(LockMode::SharedIntentionExclusive)
            ),
            _ => table_mode.is_some(),
        };
        if !table_ok {
            return Err(self.abort(txn, AbortReason::TableLockNotPresent));
        }

        let queue = {
            let mut map = self.row_locks.lock();
            Arc::clone(map.entry(rid).or_insert_with(|| Arc::new(LockRequestQueue::new())))
        };
        self.lock_resource(txn, mode, Resource::Row(table, rid), &queue)
    }

    /// Releases a row lock.
    ///
    /// With `force` the 2PL state transition is skipped; executors use this
    /// to drop read locks eagerly under READ_COMMITTED, and commit/abort use
    /// it when draining a transaction's lock sets.
    pub fn unlock_row(
        &self,
        txn: &Arc<Transaction>,
        table: TableId,
        rid: Rid,
        force: bool,
    ) -> LockResult<bool> {
        let queue = { self.row_locks.lock().get(&rid).cloned() };
        let Some(queue) = queue else {
            return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
        };

        let mode = {
            let mut inner = queue.inner.lock();
            let Some(pos) = inner
                .requests
                .iter()
                .position(|r| r.txn_id == txn.id() && r.granted)
            else {
                drop(inner);
                return Err(self.abort(txn, AbortReason::AttemptedUnlockButNoLockHeld));
            };
            let mode = inner.requests[pos].mode;
            let _ = inner.requests.remove(pos);
            queue.cv.notify_all();
            mode
        };

        txn.remove_row_lock(mode, table, rid);
        if !force {
            self.apply_unlock_transition(txn, mode);
        }
        self.stats.record_release();
        trace!(txn = %txn.id(), %table, %rid, %mode, "released row lock");
        Ok(true)
    }

    /// Withdraws every request from every queue and wakes all waiters; used
    /// on shutdown. Woken waiters observe their request gone and return
    /// without a grant.
    pub fn unlock_all(&self) {
        let queues = self.all_queues();
        for queue in queues {
            let mut inner = queue.inner.lock();
            inner.requests.clear();
            inner.upgrading = TxnId::INVALID;
            queue.cv.notify_all();
        }
    }

    /// Wakes every waiter so it re-checks its transaction state. Called
    /// after a transaction is aborted from outside the lock path.
    pub fn notify_all_waiters(&self) {
        for queue in self.all_queues() {
            let _inner = queue.inner.lock();
            queue.cv.notify_all();
        }
    }

    /// Rebuilds the waits-for graph from current queue state: one edge from
    /// every ungranted waiter to every granted holder of the same resource.
    pub fn build_waits_for(&self) -> WaitsForGraph {
        let graph = WaitsForGraph::new();
        for queue in self.all_queues() {
            let inner = queue.inner.lock();
            for waiter in inner.requests.iter().filter(|r| !r.granted) {
                for holder in inner.requests.iter().filter(|r| r.granted) {
                    graph.add_edge(waiter.txn_id, holder.txn_id);
                }
            }
        }
        graph
    }

    /// One deadlock detection pass: rebuild the graph, then repeatedly abort
    /// the youngest transaction of a cycle until none remains.
    pub fn run_cycle_detection(&self, registry: &TransactionManager) {
        let graph = self.build_waits_for();
        while let Some(victim) = graph.find_victim() {
            debug!(victim = %victim, "deadlock cycle found, aborting youngest transaction");
            if let Some(txn) = registry.get(victim) {
                txn.set_state(TransactionState::Aborted);
                txn.set_abort_reason(AbortReason::DeadlockVictim);
                self.stats.record_abort();
            }
            graph.remove_txn(victim);
            // The victim's blocked lock call observes the aborted state on
            // wake and withdraws its request.
            self.notify_all_waiters();
        }
    }

    fn all_queues(&self) -> Vec<Arc<LockRequestQueue>> {
        let mut queues: Vec<Arc<LockRequestQueue>> =
            self.table_locks.lock().values().cloned().collect();
        queues.extend(self.row_locks.lock().values().cloned());
        queues
    }

    /// Flips the transaction to `Aborted`, records the reason, and builds
    /// the error for the caller.
    fn abort(&self, txn: &Arc<Transaction>, reason: AbortReason) -> TransactionAbort {
        txn.set_state(TransactionState::Aborted);
        txn.set_abort_reason(reason);
        self.stats.record_abort();
        debug!(txn = %txn.id(), %reason, "lock manager aborted transaction");
        TransactionAbort {
            txn_id: txn.id(),
            reason,
        }
    }

    /// Isolation × state admission rules.
    fn check_admission(&self, txn: &Arc<Transaction>, mode: LockMode) -> LockResult<()> {
        let state = txn.state();
        match txn.isolation_level() {
            IsolationLevel::ReadUncommitted => match state {
                TransactionState::Growing => {
                    if matches!(mode, LockMode::Exclusive | LockMode::IntentionExclusive) {
                        Ok(())
                    } else {
                        Err(self.abort(txn, AbortReason::LockSharedOnReadUncommitted))
                    }
                }
                TransactionState::Shrinking => Err(self.abort(txn, AbortReason::LockOnShrinking)),
                _ => Ok(()),
            },
            IsolationLevel::ReadCommitted => match state {
                TransactionState::Growing => Ok(()),
                TransactionState::Shrinking => {
                    if matches!(mode, LockMode::Shared | LockMode::IntentionShared) {
                        Ok(())
                    } else {
                        Err(self.abort(txn, AbortReason::LockOnShrinking))
                    }
                }
                _ => Ok(()),
            },
            IsolationLevel::RepeatableRead => match state {
                TransactionState::Growing => Ok(()),
                TransactionState::Shrinking => Err(self.abort(txn, AbortReason::LockOnShrinking)),
                _ => Ok(()),
            },
        }
    }

    /// 2PL transition applied when a lock is released.
    fn apply_unlock_transition(&self, txn: &Arc<Transaction>, mode: LockMode) {
        if txn.state() != TransactionState::Growing {
            return;
        }
        let shrink = match txn.isolation_level() {
            IsolationLevel::RepeatableRead => {
                matches!(mode, LockMode::Shared | LockMode::Exclusive)
            }
            IsolationLevel::ReadCommitted | IsolationLevel::ReadUncommitted => {
                mode == LockMode::Exclusive
            }
        };
        if shrink {
            txn.set_state(TransactionState::Shrinking);
        }
    }

    /// Enqueues (or upgrades) a request and blocks until it is granted or
    /// the transaction stops being eligible.
    fn lock_resource(
        &self,
        txn: &Arc<Transaction>,
        mode: LockMode,
        resource: Resource,
        queue: &LockRequestQueue,
    ) -> LockResult<bool> {
        let txn_id = txn.id();
        let mut is_upgrade = false;
        let mut inner = queue.inner.lock();

        if let Some(pos) = inner
            .requests
            .iter()
            .position(|r| r.txn_id == txn_id && r.granted)
        {
            // The transaction already holds this resource: upgrade path.
            let held = inner.requests[pos].mode;
            if held == mode {
                return Ok(true);
            }
            if !held.can_upgrade_to(mode) {
                drop(inner);
                return Err(self.abort(txn, AbortReason::IncompatibleUpgrade));
            }
            if inner.upgrading.is_valid() && inner.upgrading != txn_id {
                drop(inner);
                return Err(self.abort(txn, AbortReason::UpgradeConflict));
            }
            let _ = inner.requests.remove(pos);
            self.track_release(txn, resource, held);
            inner.upgrading = txn_id;
            is_upgrade = true;
            // The upgrade request goes ahead of every ordinary waiter.
            let insert_at = inner
                .requests
                .iter()
                .position(|r| !r.granted)
                .unwrap_or(inner.requests.len());
            inner.requests.insert(insert_at, LockRequest::new(txn_id, mode));
        } else {
            inner.requests.push_back(LockRequest::new(txn_id, mode));
        }

        let mut waited = false;
        loop {
            if txn.state() == TransactionState::Aborted {
                Self::withdraw(&mut inner, txn_id);
                queue.cv.notify_all();
                return Ok(false);
            }
            let Some(pos) = inner
                .requests
                .iter()
                .position(|r| r.txn_id == txn_id && !r.granted)
            else {
                // Withdrawn from outside (shutdown): no grant.
                if inner.upgrading == txn_id {
                    inner.upgrading = TxnId::INVALID;
                }
                return Ok(false);
            };
            if Self::grantable(&inner, pos) {
                inner.requests[pos].granted = true;
                if inner.upgrading == txn_id {
                    inner.upgrading = TxnId::INVALID;
                }
                // An upgrade dropped its old granted request above; waiters
                // behind us may have become grantable.
                queue.cv.notify_all();
                break;
            }
            if !waited {
                waited = true;
                self.stats.record_wait();
            }
            queue.cv.wait(&mut inner);
        }
        drop(inner);

        if is_upgrade {
            self.stats.record_upgrade();
        } else {
            self.stats.record_acquisition();
        }
        self.track_grant(txn, resource, mode);
        trace!(txn = %txn_id, %mode, ?resource, "granted lock");
        Ok(true)
    }

    /// Removes a transaction's pending request after cancellation.
    fn withdraw(inner: &mut QueueInner, txn_id: TxnId) {
        if let Some(pos) = inner
            .requests
            .iter()
            .position(|r| r.txn_id == txn_id && !r.granted)
        {
            let _ = inner.requests.remove(pos);
        }
        if inner.upgrading == txn_id {
            inner.upgrading = TxnId::INVALID;
        }
    }

    /// The grant predicate, evaluated with the queue latch held.
    ///
    /// Starting from the modes compatible with every current holder, the
    /// upgrader (if any) and then every earlier still-grantable waiter are
    /// granted virtually, each shrinking the compatible set. The request is
    /// grantable iff its mode survives.
    fn grantable(inner: &QueueInner, pos: usize) -> bool {
        let request = &inner.requests[pos];

        let mut allowed = [true; 5];
        for holder in inner.requests.iter().filter(|r| r.granted) {
            for mode in LockMode::ALL {
                allowed[mode.index()] &= mode.is_compatible_with(holder.mode);
            }
        }
        if !allowed[request.mode.index()] {
            return false;
        }

        if inner.upgrading.is_valid() {
            if inner.upgrading == request.txn_id {
                return true;
            }
            if let Some(upgrader) = inner
                .requests
                .iter()
                .find(|r| !r.granted && r.txn_id == inner.upgrading)
            {
                for mode in LockMode::ALL {
                    allowed[mode.index()] &= mode.is_compatible_with(upgrader.mode);
                }
            }
        }

        for earlier in inner.requests.iter().take(pos).filter(|r| !r.granted) {
            if earlier.txn_id == inner.upgrading {
                continue;
            }
            if allowed[earlier.mode.index()] {
                for mode in LockMode::ALL {
                    allowed[mode.index()] &= mode.is_compatible_with(earlier.mode);
                }
            }
        }

        allowed[request.mode.index()]
    }

    fn track_grant(&self, txn: &Arc<Transaction>, resource: Resource, mode: LockMode) {
        match resource {
            Resource::Table(table) => txn.add_table_lock(mode, table),
            Resource::Row(table, rid) => txn.add_row_lock(mode, table, rid),
        }
    }

    fn track_release(&self, txn: &Arc<Transaction>, resource: Resource, mode: LockMode) {
        match resource {
            Resource::Table(table) => txn.remove_table_lock(mode, table),
            Resource::Row(table, rid) => txn.remove_row_lock(mode, table, rid),
        }
    }

    /// Test/inspection helper: the granted modes on a table, in queue order.
    pub fn granted_table_modes(&self, table: TableId) -> Vec<(TxnId, LockMode)> {
        let queue = { self.table_locks.lock().get(&table).cloned() };
        match queue {
            None => Vec::new(),
            Some(queue) => {
                let inner = queue.inner.lock();
                inner
                    .requests
                    .iter()
                    .filter(|r| r.granted)
                    .map(|r| (r.txn_id, r.mode))
                    .collect()
            }
        }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("table_queues", &self.table_locks.lock().len())
            .field("row_queues", &self.row_locks.lock().len())
            .finish()
    }
}
