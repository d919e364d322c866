//! Deadlock detection via waits-for cycle search.
//!
//! The waits-for graph has an edge T → U iff transaction T is blocked on a
//! lock currently held by U. The graph is rebuilt from queue state on every
//! detection pass; cycles are broken by aborting the youngest transaction
//! (the largest id) on the cycle until no cycle remains.
//!
//! ```text
//! T1 waits for T2:  T1 -> T2
//! T2 waits for T1:  T2 -> T1   (cycle: abort T2, the younger)
//! ```
//!
//! Determinism: DFS starts from transaction ids in ascending order and
//! explores neighbors in ascending order, so a given graph always yields the
//! same victims.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::trace;

use granite_common::types::TxnId;

use crate::lock::LockManager;
use crate::manager::TransactionManager;

/// A directed waits-for graph over transaction ids.
pub struct WaitsForGraph {
    /// waiter -> set of holders it waits for, both in ascending order.
    edges: RwLock<BTreeMap<TxnId, BTreeSet<TxnId>>>,
}

impl WaitsForGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self {
            edges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Adds the edge `waiter -> holder`. Self-edges are ignored.
    pub fn add_edge(&self, waiter: TxnId, holder: TxnId) {
        if waiter == holder {
            return;
        }
        self.edges.write().entry(waiter).or_default().insert(holder);
    }

    /// Removes the edge `waiter -> holder` if present.
    pub fn remove_edge(&self, waiter: TxnId, holder: TxnId) {
        let mut edges = self.edges.write();
        if let Some(holders) = edges.get_mut(&waiter) {
            holders.remove(&holder);
            if holders.is_empty() {
                edges.remove(&waiter);
            }
        }
    }

    /// Removes a transaction and every edge touching it.
    pub fn remove_txn(&self, txn_id: TxnId) {
        let mut edges = self.edges.write();
        edges.remove(&txn_id);
        for holders in edges.values_mut() {
            holders.remove(&txn_id);
        }
    }

    /// Returns every edge as sorted `(waiter, holder)` pairs.
    pub fn edge_list(&self) -> Vec<(TxnId, TxnId)> {
        let edges = self.edges.read();
        edges
            .iter()
            .flat_map(|(&w, holders)| holders.iter().map(move |&h| (w, h)))
            .collect()
    }

    /// Returns the number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.read().values().map(|s| s.len()).sum()
    }

    /// Searches for a cycle, starting the DFS from each transaction id in
    /// ascending order. Returns the cycle's members when one exists.
    pub fn find_cycle(&self) -> Option<Vec<TxnId>> {
        let edges = self.edges.read();
        let mut visited = BTreeSet::new();

        for &start in edges.keys() {
            if visited.contains(&start) {
                continue;
            }
            let mut path = Vec::new();
            if let Some(cycle) = Self::dfs(&edges, start, &mut visited, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    /// Returns the youngest transaction (largest id) on some cycle, or
    /// `None` when the graph is acyclic.
    pub fn find_victim(&self) -> Option<TxnId> {
        self.find_cycle()
            .and_then(|cycle| cycle.into_iter().max())
    }

    fn dfs(
        edges: &BTreeMap<TxnId, BTreeSet<TxnId>>,
        current: TxnId,
        visited: &mut BTreeSet<TxnId>,
        path: &mut Vec<TxnId>,
    ) -> Option<Vec<TxnId>> {
        if let Some(at) = path.iter().position(|&t| t == current) {
            // Back edge: the cycle is the path suffix from the first
            // occurrence of `current`.
            return Some(path[at..].to_vec());
        }
        if !visited.insert(current) {
            return None;
        }
        path.push(current);
        if let Some(holders) = edges.get(&current) {
            for &holder in holders {
                if let Some(cycle) = Self::dfs(edges, holder, visited, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        None
    }
}

impl Default for WaitsForGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WaitsForGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitsForGraph")
            .field("edges", &self.edge_count())
            .finish()
    }
}

/// Shutdown handshake between the detector thread and its owner.
struct ShutdownSignal {
    stop: Mutex<bool>,
    cv: Condvar,
}

/// Background deadlock detector.
///
/// Wakes every `interval`, rebuilds the waits-for graph from the lock
/// manager's queues, and aborts victims until no cycle remains. Shutdown is
/// an explicit signal (not a missed sleep): dropping the detector interrupts
/// the wait and joins the worker thread.
pub struct DeadlockDetector {
    signal: Arc<ShutdownSignal>,
    handle: Option<JoinHandle<()>>,
}

impl DeadlockDetector {
    /// Spawns the detector thread.
    pub fn spawn(
        lock_manager: Arc<LockManager>,
        registry: Arc<TransactionManager>,
        interval: Duration,
    ) -> Self {
        let signal = Arc::new(ShutdownSignal {
            stop: Mutex::new(false),
            cv: Condvar::new(),
        });
        let thread_signal = Arc::clone(&signal);

        let handle = std::thread::Builder::new()
            .name("granite-deadlock".into())
            .spawn(move || {
                let mut stop = thread_signal.stop.lock();
                loop {
                    thread_signal.cv.wait_for(&mut stop, interval);
                    if *stop {
                        break;
                    }
                    drop(stop);
                    trace!("deadlock detection tick");
                    lock_manager.run_cycle_detection(&registry);
                    stop = thread_signal.stop.lock();
                }
            })
            .expect("failed to spawn deadlock detector thread");

        Self {
            signal,
            handle: Some(handle),
        }
    }

    /// Signals the worker to stop and joins it. Idempotent.
    pub fn shutdown(&mut self) {
        *self.signal.stop.lock() = true;
        self.signal.cv.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeadlockDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for DeadlockDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlockDetector")
            .field("running", &self.handle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(id: u64) -> TxnId {
        TxnId::new(id)
    }

    #[test]
    fn test_add_remove_edges() {
        let graph = WaitsForGraph::new();

        graph.add_edge(t(1), t(2));
        graph.add_edge(t(1), t(3));
        graph.add_edge(t(2), t(3));
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(
            graph.edge_list(),
            vec![(t(1), t(2)), (t(1), t(3)), (t(2), t(3))]
        );

        graph.remove_edge(t(1), t(3));
        assert_eq!(graph.edge_count(), 2);

        // Self-edges are ignored.
        graph.add_edge(t(4), t(4));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let graph = WaitsForGraph::new();
        graph.add_edge(t(1), t(2));
        graph.add_edge(t(2), t(3));
        graph.add_edge(t(3), t(4));

        assert!(graph.find_cycle().is_none());
        assert!(graph.find_victim().is_none());
    }

    #[test]
    fn test_two_cycle_picks_younger() {
        let graph = WaitsForGraph::new();
        graph.add_edge(t(1), t(2));
        graph.add_edge(t(2), t(1));

        let cycle = graph.find_cycle().unwrap();
        assert!(cycle.contains(&t(1)) && cycle.contains(&t(2)));
        assert_eq!(graph.find_victim(), Some(t(2)));
    }

    #[test]
    fn test_three_cycle_picks_youngest() {
        let graph = WaitsForGraph::new();
        graph.add_edge(t(1), t(2));
        graph.add_edge(t(2), t(3));
        graph.add_edge(t(3), t(1));

        assert_eq!(graph.find_victim(), Some(t(3)));
    }

    #[test]
    fn test_cycle_excludes_outside_waiters() {
        // T4 waits into the cycle {2, 3} but is not on it; the victim must
        // come from the cycle itself.
        let graph = WaitsForGraph::new();
        graph.add_edge(t(4), t(2));
        graph.add_edge(t(2), t(3));
        graph.add_edge(t(3), t(2));

        assert_eq!(graph.find_victim(), Some(t(3)));
    }

    #[test]
    fn test_victim_removal_breaks_cycle() {
        let graph = WaitsForGraph::new();
        graph.add_edge(t(1), t(2));
        graph.add_edge(t(2), t(1));
        graph.add_edge(t(3), t(4));
        graph.add_edge(t(4), t(3));

        let first = graph.find_victim().unwrap();
        graph.remove_txn(first);
        let second = graph.find_victim().unwrap();
        graph.remove_txn(second);
        assert!(graph.find_victim().is_none());

        assert_eq!(first, t(2));
        assert_eq!(second, t(4));
    }
}
