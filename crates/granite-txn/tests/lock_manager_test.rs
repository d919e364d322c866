//! Concurrent lock manager tests: FIFO fairness, blocking grants, and
//! upgrade priority across real threads.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use granite_common::types::TableId;
use granite_txn::lock::AbortReason;
use granite_txn::{IsolationLevel, LockManager, LockMode, TransactionManager};

/// Long enough for a spawned thread to reach its blocking lock call.
const SETTLE: Duration = Duration::from_millis(100);

#[test]
fn exclusive_blocks_shared_until_release() {
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::Exclusive, table).unwrap());

    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let granted = Arc::new(Mutex::new(false));

    let waiter = {
        let lm = Arc::clone(&lm);
        let t2 = Arc::clone(&t2);
        let granted = Arc::clone(&granted);
        thread::spawn(move || {
            assert!(lm.lock_table(&t2, LockMode::Shared, table).unwrap());
            *granted.lock() = true;
        })
    };

    thread::sleep(SETTLE);
    assert!(!*granted.lock(), "S granted while X was held");

    assert!(lm.unlock_table(&t1, table).unwrap());
    waiter.join().unwrap();
    assert!(*granted.lock());
}

#[test]
fn fifo_order_is_respected() {
    // t1 holds S. t2 requests X (incompatible, waits). t3 then requests S:
    // although S is compatible with the held S, it must not overtake the
    // earlier X request.
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let t3 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::Shared, table).unwrap());

    let order = Arc::new(Mutex::new(Vec::new()));

    let waiter_x = {
        let (lm, t2, order) = (Arc::clone(&lm), Arc::clone(&t2), Arc::clone(&order));
        thread::spawn(move || {
            assert!(lm.lock_table(&t2, LockMode::Exclusive, table).unwrap());
            order.lock().push("x");
            thread::sleep(SETTLE);
            assert!(lm.unlock_table(&t2, table).unwrap());
        })
    };
    thread::sleep(SETTLE);

    let waiter_s = {
        let (lm, t3, order) = (Arc::clone(&lm), Arc::clone(&t3), Arc::clone(&order));
        thread::spawn(move || {
            assert!(lm.lock_table(&t3, LockMode::Shared, table).unwrap());
            order.lock().push("s");
        })
    };
    thread::sleep(SETTLE);

    // Neither waiter can be granted while t1 holds S (t2 is incompatible,
    // t3 is fenced behind t2).
    assert!(order.lock().is_empty());

    assert!(lm.unlock_table(&t1, table).unwrap());
    waiter_x.join().unwrap();
    waiter_s.join().unwrap();

    assert_eq!(*order.lock(), vec!["x", "s"]);
}

#[test]
fn compatible_batch_advances_together() {
    // t1 holds X; t2 and t3 queue S requests. When t1 releases, both shared
    // requests are granted.
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::Exclusive, table).unwrap());

    let mut waiters = Vec::new();
    let granted = Arc::new(Mutex::new(0usize));
    for _ in 0..2 {
        let txn = tm.begin(IsolationLevel::RepeatableRead);
        let (lm, granted) = (Arc::clone(&lm), Arc::clone(&granted));
        waiters.push(thread::spawn(move || {
            assert!(lm.lock_table(&txn, LockMode::Shared, table).unwrap());
            *granted.lock() += 1;
            // Hold the shared lock briefly so the grants overlap.
            thread::sleep(SETTLE);
        }));
        thread::sleep(Duration::from_millis(20));
    }

    thread::sleep(SETTLE);
    assert_eq!(*granted.lock(), 0);

    assert!(lm.unlock_table(&t1, table).unwrap());
    thread::sleep(SETTLE);
    assert_eq!(*granted.lock(), 2, "both shared requests should be granted");

    for w in waiters {
        w.join().unwrap();
    }
}

#[test]
fn upgrade_conflict_aborts_second_upgrader() {
    // t1 and t2 both hold S. t1 queues an upgrade to X; t2's own upgrade
    // attempt must abort with UPGRADE_CONFLICT.
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::Shared, table).unwrap());
    assert!(lm.lock_table(&t2, LockMode::Shared, table).unwrap());

    let upgrader = {
        let (lm, t1) = (Arc::clone(&lm), Arc::clone(&t1));
        thread::spawn(move || lm.lock_table(&t1, LockMode::Exclusive, table).unwrap())
    };
    thread::sleep(SETTLE);

    let err = lm.lock_table(&t2, LockMode::Exclusive, table).unwrap_err();
    assert_eq!(err.reason, AbortReason::UpgradeConflict);

    // Aborting t2 releases its shared lock, unblocking the upgrader.
    tm.abort(&t2);
    assert!(upgrader.join().unwrap());
    assert_eq!(t1.table_lock_mode(table), Some(LockMode::Exclusive));
}

#[test]
fn upgrader_has_priority_over_waiters() {
    // t1 holds S; t2 queues an ordinary X request; t1 then upgrades to X.
    // The upgrade is granted first even though t2 asked earlier.
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::Shared, table).unwrap());

    let order = Arc::new(Mutex::new(Vec::new()));
    let waiter = {
        let (lm, t2, order) = (Arc::clone(&lm), Arc::clone(&t2), Arc::clone(&order));
        thread::spawn(move || {
            assert!(lm.lock_table(&t2, LockMode::Exclusive, table).unwrap());
            order.lock().push("waiter");
            assert!(lm.unlock_table(&t2, table).unwrap());
        })
    };
    thread::sleep(SETTLE);

    // The upgrade only needs the other holders gone; here t1 is the sole
    // holder, so it proceeds immediately, ahead of t2.
    assert!(lm.lock_table(&t1, LockMode::Exclusive, table).unwrap());
    order.lock().push("upgrader");

    assert!(lm.unlock_table(&t1, table).unwrap());
    waiter.join().unwrap();

    assert_eq!(*order.lock(), vec!["upgrader", "waiter"]);
}

#[test]
fn upgrade_waits_for_incompatible_holder() {
    // t1 holds IS, t2 holds IX. t1's upgrade to X is legal but must wait
    // until the IX holder is gone.
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::IntentionShared, table).unwrap());
    assert!(lm.lock_table(&t2, LockMode::IntentionExclusive, table).unwrap());

    let granted = Arc::new(Mutex::new(false));
    let upgrader = {
        let (lm, t1, granted) = (Arc::clone(&lm), Arc::clone(&t1), Arc::clone(&granted));
        thread::spawn(move || {
            assert!(lm.lock_table(&t1, LockMode::Exclusive, table).unwrap());
            *granted.lock() = true;
        })
    };

    thread::sleep(SETTLE);
    assert!(!*granted.lock(), "X upgrade granted while IX was held");

    assert!(lm.unlock_table(&t2, table).unwrap());
    upgrader.join().unwrap();
    assert!(*granted.lock());
    assert_eq!(t1.table_lock_mode(table), Some(LockMode::Exclusive));
}

#[test]
fn unlock_all_wakes_waiters_without_grant() {
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::Exclusive, table).unwrap());

    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let waiter = {
        let (lm, t2) = (Arc::clone(&lm), Arc::clone(&t2));
        thread::spawn(move || lm.lock_table(&t2, LockMode::Shared, table).unwrap())
    };
    thread::sleep(SETTLE);

    lm.unlock_all();
    assert!(!waiter.join().unwrap(), "withdrawn waiter must not be granted");
}

#[test]
fn intention_locks_coexist_across_transactions() {
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    let t3 = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t1, LockMode::IntentionShared, table).unwrap());
    assert!(lm.lock_table(&t2, LockMode::IntentionExclusive, table).unwrap());
    assert!(lm.lock_table(&t3, LockMode::IntentionShared, table).unwrap());

    assert_eq!(lm.granted_table_modes(table).len(), 3);
}

#[test]
fn lock_sets_mirror_granted_requests() {
    let lm = Arc::new(LockManager::new());
    let tm = TransactionManager::new(Arc::clone(&lm));
    let table_a = TableId::new(1);
    let table_b = TableId::new(2);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::IntentionExclusive, table_a).unwrap());
    assert!(lm.lock_table(&t1, LockMode::Shared, table_b).unwrap());

    let mut held = t1.held_table_locks();
    held.sort_by_key(|&(_, t)| t);
    assert_eq!(
        held,
        vec![
            (LockMode::IntentionExclusive, table_a),
            (LockMode::Shared, table_b)
        ]
    );

    for (txn_id, mode) in lm.granted_table_modes(table_a) {
        assert_eq!(txn_id, t1.id());
        assert_eq!(mode, LockMode::IntentionExclusive);
    }
}
