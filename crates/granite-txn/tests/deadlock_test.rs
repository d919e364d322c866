//! Deadlock detection tests: two transactions crossing on two rows, with
//! the detector aborting the younger one.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use granite_common::types::{PageId, Rid, TableId};
use granite_txn::lock::AbortReason;
use granite_txn::{
    DeadlockDetector, IsolationLevel, LockManager, LockMode, TransactionManager, TransactionState,
};

/// Long enough for a spawned thread to reach its blocking lock call.
const SETTLE: Duration = Duration::from_millis(100);

fn setup() -> (Arc<LockManager>, Arc<TransactionManager>) {
    let lm = Arc::new(LockManager::new());
    let tm = Arc::new(TransactionManager::new(Arc::clone(&lm)));
    (lm, tm)
}

#[test]
fn waits_for_graph_reflects_queue_state() {
    let (lm, tm) = setup();
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::Exclusive, table).unwrap());

    let waiter = {
        let (lm, t2) = (Arc::clone(&lm), Arc::clone(&t2));
        thread::spawn(move || lm.lock_table(&t2, LockMode::Shared, table).unwrap())
    };
    thread::sleep(SETTLE);

    let graph = lm.build_waits_for();
    assert_eq!(graph.edge_list(), vec![(t2.id(), t1.id())]);

    assert!(lm.unlock_table(&t1, table).unwrap());
    assert!(waiter.join().unwrap());

    // With the grant the edge disappears.
    let graph = lm.build_waits_for();
    assert_eq!(graph.edge_list(), vec![]);
}

#[test]
fn cross_row_deadlock_aborts_younger() {
    // REPEATABLE_READ. t1 X-locks r1, t2 X-locks r2, then each requests the
    // other's row. A detection pass must pick t2 (the younger) as victim;
    // its blocked call returns false with the transaction aborted.
    let (lm, tm) = setup();
    let table = TableId::new(1);
    let r1 = Rid::new(PageId::new(1), 1);
    let r2 = Rid::new(PageId::new(1), 2);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(t1.id() < t2.id());

    assert!(lm.lock_table(&t1, LockMode::IntentionExclusive, table).unwrap());
    assert!(lm.lock_table(&t2, LockMode::IntentionExclusive, table).unwrap());
    assert!(lm.lock_row(&t1, LockMode::Exclusive, table, r1).unwrap());
    assert!(lm.lock_row(&t2, LockMode::Exclusive, table, r2).unwrap());

    let blocked_t1 = {
        let (lm, t1) = (Arc::clone(&lm), Arc::clone(&t1));
        thread::spawn(move || lm.lock_row(&t1, LockMode::Exclusive, table, r2).unwrap())
    };
    thread::sleep(SETTLE);

    let blocked_t2 = {
        let (lm, tm, t2) = (Arc::clone(&lm), Arc::clone(&tm), Arc::clone(&t2));
        thread::spawn(move || {
            let granted = lm.lock_row(&t2, LockMode::Exclusive, table, r1).unwrap();
            if !granted {
                // The executor's abort path: roll back and release.
                tm.abort(&t2);
            }
            granted
        })
    };
    thread::sleep(SETTLE);

    // Both sides are blocked; the graph holds the 2-cycle.
    let graph = lm.build_waits_for();
    assert_eq!(graph.find_victim(), Some(t2.id()));

    lm.run_cycle_detection(&tm);

    assert!(!blocked_t2.join().unwrap(), "victim must not be granted");
    assert_eq!(t2.state(), TransactionState::Aborted);
    assert_eq!(t2.abort_reason(), Some(AbortReason::DeadlockVictim));

    // The victim's rollback released r2, so t1's blocked call goes through.
    assert!(blocked_t1.join().unwrap());
    assert_eq!(t1.state(), TransactionState::Growing);
}

#[test]
fn background_detector_resolves_deadlock() {
    let (lm, tm) = setup();
    let table = TableId::new(1);
    let r1 = Rid::new(PageId::new(2), 1);
    let r2 = Rid::new(PageId::new(2), 2);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);

    assert!(lm.lock_table(&t1, LockMode::IntentionExclusive, table).unwrap());
    assert!(lm.lock_table(&t2, LockMode::IntentionExclusive, table).unwrap());
    assert!(lm.lock_row(&t1, LockMode::Exclusive, table, r1).unwrap());
    assert!(lm.lock_row(&t2, LockMode::Exclusive, table, r2).unwrap());

    let mut detector = DeadlockDetector::spawn(
        Arc::clone(&lm),
        Arc::clone(&tm),
        Duration::from_millis(10),
    );

    let blocked_t1 = {
        let (lm, t1) = (Arc::clone(&lm), Arc::clone(&t1));
        thread::spawn(move || lm.lock_row(&t1, LockMode::Exclusive, table, r2).unwrap())
    };
    thread::sleep(SETTLE);

    let blocked_t2 = {
        let (lm, tm, t2) = (Arc::clone(&lm), Arc::clone(&tm), Arc::clone(&t2));
        thread::spawn(move || {
            let granted = lm.lock_row(&t2, LockMode::Exclusive, table, r1).unwrap();
            if !granted {
                tm.abort(&t2);
            }
            granted
        })
    };

    // The detector fires on its own and breaks the cycle.
    assert!(!blocked_t2.join().unwrap());
    assert_eq!(t2.state(), TransactionState::Aborted);
    assert!(blocked_t1.join().unwrap());

    detector.shutdown();
}

#[test]
fn detector_shutdown_is_clean_when_idle() {
    let (lm, tm) = setup();
    let mut detector = DeadlockDetector::spawn(lm, tm, Duration::from_millis(5));
    thread::sleep(Duration::from_millis(30));
    detector.shutdown();
    // Shutdown is idempotent; dropping afterwards is a no-op.
    detector.shutdown();
}

#[test]
fn no_false_positives_without_cycle() {
    let (lm, tm) = setup();
    let table = TableId::new(1);

    let t1 = tm.begin(IsolationLevel::RepeatableRead);
    let t2 = tm.begin(IsolationLevel::RepeatableRead);
    assert!(lm.lock_table(&t1, LockMode::Exclusive, table).unwrap());

    let waiter = {
        let (lm, t2) = (Arc::clone(&lm), Arc::clone(&t2));
        thread::spawn(move || lm.lock_table(&t2, LockMode::Shared, table).unwrap())
    };
    thread::sleep(SETTLE);

    // A plain waiter is not a deadlock; nobody is aborted.
    lm.run_cycle_detection(&tm);
    assert_eq!(t1.state(), TransactionState::Growing);
    assert_eq!(t2.state(), TransactionState::Growing);

    assert!(lm.unlock_table(&t1, table).unwrap());
    assert!(waiter.join().unwrap());
}
