//! Transaction lifecycle and per-transaction lock bookkeeping.
//!
//! A [`Transaction`] follows the two-phase locking state machine:
//!
//! ```text
//! ┌─────────┐  first unlock   ┌───────────┐
//! │ Growing │────────────────▶│ Shrinking │
//! └─────────┘  (per 2PL rule) └───────────┘
//!      │                            │
//!      └──────────┬─────────────────┘
//!                 ▼
//!      Committed  /  Aborted
//! ```
//!
//! The transaction's lock sets mirror the granted requests across every lock
//! request queue; they are guarded by the transaction's own latch so the lock
//! manager and the transaction's worker thread can mutate them concurrently.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use granite_common::types::{Rid, TableId, TxnId};

use crate::lock::{AbortReason, LockManager, LockMode};

/// Transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Dirty reads allowed; only exclusive locks are ever taken.
    ReadUncommitted,
    /// Read locks are released eagerly; write locks are held to the end.
    ReadCommitted,
    /// All locks are held until the transaction ends.
    RepeatableRead,
}

/// The 2PL state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Acquiring locks; no lock has been released yet.
    Growing,
    /// At least one lock was released; acquisition is restricted.
    Shrinking,
    /// Finished successfully.
    Committed,
    /// Rolled back, by choice or as a deadlock victim.
    Aborted,
}

impl TransactionState {
    /// Returns true if the transaction has ended.
    pub fn is_ended(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Growing => write!(f, "Growing"),
            TransactionState::Shrinking => write!(f, "Shrinking"),
            TransactionState::Committed => write!(f, "Committed"),
            TransactionState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Per-mode table-lock sets and per-mode row-lock maps.
#[derive(Debug, Default)]
struct LockSets {
    shared_tables: HashSet<TableId>,
    exclusive_tables: HashSet<TableId>,
    intention_shared_tables: HashSet<TableId>,
    intention_exclusive_tables: HashSet<TableId>,
    shared_intention_exclusive_tables: HashSet<TableId>,
    shared_rows: HashMap<TableId, HashSet<Rid>>,
    exclusive_rows: HashMap<TableId, HashSet<Rid>>,
}

impl LockSets {
    fn table_set(&mut self, mode: LockMode) -> &mut HashSet<TableId> {
        match mode {
            LockMode::Shared => &mut self.shared_tables,
            LockMode::Exclusive => &mut self.exclusive_tables,
            LockMode::IntentionShared => &mut self.intention_shared_tables,
            LockMode::IntentionExclusive => &mut self.intention_exclusive_tables,
            LockMode::SharedIntentionExclusive => &mut self.shared_intention_exclusive_tables,
        }
    }
}

/// An active database transaction.
pub struct Transaction {
    id: TxnId,
    isolation: IsolationLevel,
    state: Mutex<TransactionState>,
    abort_reason: Mutex<Option<AbortReason>>,
    locks: Mutex<LockSets>,
}

impl Transaction {
    /// Creates a transaction in the growing phase.
    pub fn new(id: TxnId, isolation: IsolationLevel) -> Self {
        Self {
            id,
            isolation,
            state: Mutex::new(TransactionState::Growing),
            abort_reason: Mutex::new(None),
            locks: Mutex::new(LockSets::default()),
        }
    }

    /// Returns the transaction id.
    pub fn id(&self) -> TxnId {
        self.id
    }

    /// Returns the isolation level.
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    /// Returns the current state.
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Sets the state.
    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    /// Returns the recorded abort reason, if the transaction was aborted.
    pub fn abort_reason(&self) -> Option<AbortReason> {
        *self.abort_reason.lock()
    }

    /// Records why the transaction was aborted.
    pub fn set_abort_reason(&self, reason: AbortReason) {
        *self.abort_reason.lock() = Some(reason);
    }

    /// Records a granted table lock.
    pub fn add_table_lock(&self, mode: LockMode, table: TableId) {
        self.locks.lock().table_set(mode).insert(table);
    }

    /// Forgets a table lock.
    pub fn remove_table_lock(&self, mode: LockMode, table: TableId) {
        self.locks.lock().table_set(mode).remove(&table);
    }

    /// Records a granted row lock. Only S and X exist at row granularity.
    pub fn add_row_lock(&self, mode: LockMode, table: TableId, rid: Rid) {
        let mut locks = self.locks.lock();
        let map = match mode {
            LockMode::Shared => &mut locks.shared_rows,
            LockMode::Exclusive => &mut locks.exclusive_rows,
            _ => return,
        };
        map.entry(table).or_default().insert(rid);
    }

    /// Forgets a row lock.
    pub fn remove_row_lock(&self, mode: LockMode, table: TableId, rid: Rid) {
        let mut locks = self.locks.lock();
        let map = match mode {
            LockMode::Shared => &mut locks.shared_rows,
            LockMode::Exclusive => &mut locks.exclusive_rows,
            _ => return,
        };
        if let Some(rows) = map.get_mut(&table) {
            rows.remove(&rid);
            if rows.is_empty() {
                map.remove(&table);
            }
        }
    }

    /// Returns the mode of the table lock held on `table`, if any.
    ///
    /// A transaction holds at most one granted request per resource, so the
    /// strongest-first scan finds the unique mode.
    pub fn table_lock_mode(&self, table: TableId) -> Option<LockMode> {
        let locks = self.locks.lock();
        if locks.exclusive_tables.contains(&table) {
            Some(LockMode::Exclusive)
        } else if locks.shared_intention_exclusive_tables.contains(&table) {
            Some(LockMode::SharedIntentionExclusive)
        } else if locks.intention_exclusive_tables.contains(&table) {
            Some(LockMode::IntentionExclusive)
        } else if locks.shared_tables.contains(&table) {
            Some(LockMode::Shared)
        } else if locks.intention_shared_tables.contains(&table) {
            Some(LockMode::IntentionShared)
        } else {
            None
        }
    }

    /// Returns true if the transaction still holds any row lock on `table`.
    pub fn holds_row_locks_on(&self, table: TableId) -> bool {
        let locks = self.locks.lock();
        locks.shared_rows.contains_key(&table) || locks.exclusive_rows.contains_key(&table)
    }

    /// Returns true if the transaction holds the given row lock.
    pub fn holds_row_lock(&self, mode: LockMode, table: TableId, rid: Rid) -> bool {
        let locks = self.locks.lock();
        let map = match mode {
            LockMode::Shared => &locks.shared_rows,
            LockMode::Exclusive => &locks.exclusive_rows,
            _ => return false,
        };
        map.get(&table).is_some_and(|rows| rows.contains(&rid))
    }

    /// Snapshot of every held table lock.
    pub fn held_table_locks(&self) -> Vec<(LockMode, TableId)> {
        let locks = self.locks.lock();
        let mut held = Vec::new();
        for (mode, set) in [
            (LockMode::IntentionShared, &locks.intention_shared_tables),
            (LockMode::IntentionExclusive, &locks.intention_exclusive_tables),
            (LockMode::Shared, &locks.shared_tables),
            (
                LockMode::SharedIntentionExclusive,
                &locks.shared_intention_exclusive_tables,
            ),
            (LockMode::Exclusive, &locks.exclusive_tables),
        ] {
            held.extend(set.iter().map(|&t| (mode, t)));
        }
        held
    }

    /// Snapshot of every held row lock.
    pub fn held_row_locks(&self) -> Vec<(LockMode, TableId, Rid)> {
        let locks = self.locks.lock();
        let mut held = Vec::new();
        for (mode, map) in [
            (LockMode::Shared, &locks.shared_rows),
            (LockMode::Exclusive, &locks.exclusive_rows),
        ] {
            for (&table, rows) in map {
                held.extend(rows.iter().map(|&r| (mode, table, r)));
            }
        }
        held
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("state", &self.state())
            .finish()
    }
}

/// Coordinates transaction lifecycle: id allocation, the registry consulted
/// by the deadlock detector, and lock release on commit/abort.
pub struct TransactionManager {
    lock_manager: Arc<LockManager>,
    next_txn_id: AtomicU64,
    txns: Mutex<HashMap<TxnId, Arc<Transaction>>>,
}

impl TransactionManager {
    /// Creates a manager releasing locks through `lock_manager`.
    pub fn new(lock_manager: Arc<LockManager>) -> Self {
        Self {
            lock_manager,
            next_txn_id: AtomicU64::new(TxnId::MIN.as_u64()),
            txns: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the lock manager this transaction manager releases through.
    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    /// Begins a new transaction.
    pub fn begin(&self, isolation: IsolationLevel) -> Arc<Transaction> {
        let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let txn = Arc::new(Transaction::new(id, isolation));
        self.txns.lock().insert(id, Arc::clone(&txn));
        txn
    }

    /// Looks up a live transaction by id.
    pub fn get(&self, txn_id: TxnId) -> Option<Arc<Transaction>> {
        self.txns.lock().get(&txn_id).cloned()
    }

    /// Commits a transaction, releasing every held lock.
    ///
    /// Returns false if the transaction already ended (committed or aborted).
    pub fn commit(&self, txn: &Arc<Transaction>) -> bool {
        if txn.state().is_ended() {
            return false;
        }
        self.release_locks(txn);
        txn.set_state(TransactionState::Committed);
        self.txns.lock().remove(&txn.id());
        true
    }

    /// Aborts a transaction: flips its state, wakes any of its blocked lock
    /// calls, and releases every held lock. Idempotent.
    pub fn abort(&self, txn: &Arc<Transaction>) {
        if txn.state() != TransactionState::Aborted {
            txn.set_state(TransactionState::Aborted);
        }
        debug!(txn = %txn.id(), reason = ?txn.abort_reason(), "aborting transaction");
        // A lock call of this transaction may be blocked on a queue condvar;
        // it only re-checks the state on wake.
        self.lock_manager.notify_all_waiters();
        self.release_locks(txn);
        self.txns.lock().remove(&txn.id());
    }

    /// Releases row locks first (forced, skipping 2PL transitions), then
    /// table locks.
    fn release_locks(&self, txn: &Arc<Transaction>) {
        for (_, table, rid) in txn.held_row_locks() {
            let _ = self.lock_manager.unlock_row(txn, table, rid, true);
        }
        for (_, table) in txn.held_table_locks() {
            let _ = self.lock_manager.unlock_table(txn, table);
        }
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("live_txns", &self.txns.lock().len())
            .finish()
    }
}
