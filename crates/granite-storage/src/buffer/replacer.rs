//! LRU-K replacement policy.
//!
//! LRU-K ranks eviction candidates by their *backward K-distance*: the
//! distance between the current logical timestamp and the K-th most recent
//! access. Frames with fewer than K recorded accesses have infinite distance
//! and are evicted first, breaking ties on the earliest recorded access.
//! This resists the scan pollution that defeats plain LRU: a burst of single
//! touches cannot displace frames with a genuine re-reference history.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use super::error::{BufferError, BufferResult};
use super::frame::FrameId;

/// Access history and eviction state for one tracked frame.
#[derive(Debug)]
struct LruKNode {
    /// The last K access timestamps, oldest first.
    history: VecDeque<u64>,
    /// Whether the frame may be evicted.
    evictable: bool,
}

impl LruKNode {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            evictable: false,
        }
    }

    fn record(&mut self, timestamp: u64, k: usize) {
        self.history.push_back(timestamp);
        if self.history.len() > k {
            self.history.pop_front();
        }
    }

    /// Eviction rank: larger is a better victim.
    ///
    /// Returns (backward K-distance, age of the earliest retained access).
    /// Distance is `u64::MAX` for frames with fewer than K accesses.
    fn rank(&self, now: u64, k: usize) -> (u64, u64) {
        let earliest = self.history.front().copied().unwrap_or(0);
        if self.history.len() < k {
            (u64::MAX, now - earliest)
        } else {
            (now - earliest, now - earliest)
        }
    }
}

#[derive(Debug)]
struct ReplacerInner {
    nodes: HashMap<FrameId, LruKNode>,
    current_timestamp: u64,
    evictable_count: usize,
}

/// LRU-K replacer over the frames of one buffer pool.
///
/// All operations are linearizable under the replacer's internal mutex; the
/// logical timestamp is a monotonic counter bumped on every access and
/// eviction pass.
#[derive(Debug)]
pub struct LruKReplacer {
    capacity: usize,
    k: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    /// Creates a replacer for `capacity` frames with the given K.
    pub fn new(capacity: usize, k: usize) -> Self {
        debug_assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            capacity,
            k,
            inner: Mutex::new(ReplacerInner {
                nodes: HashMap::with_capacity(capacity),
                current_timestamp: 0,
                evictable_count: 0,
            }),
        }
    }

    /// Records an access to `frame_id` at the next logical timestamp.
    ///
    /// A frame outside `[0, capacity)` is rejected.
    pub fn record_access(&self, frame_id: FrameId) -> BufferResult<()> {
        if frame_id.index() >= self.capacity {
            return Err(BufferError::UnknownFrame { frame_id });
        }
        let mut inner = self.inner.lock();
        inner.current_timestamp += 1;
        let timestamp = inner.current_timestamp;
        let k = self.k;
        inner
            .nodes
            .entry(frame_id)
            .or_insert_with(LruKNode::new)
            .record(timestamp, k);
        Ok(())
    }

    /// Marks a tracked frame evictable or pinned-in-place.
    ///
    /// Calling this on a frame the replacer has never seen is an error.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> BufferResult<()> {
        let mut inner = self.inner.lock();
        let node = inner
            .nodes
            .get_mut(&frame_id)
            .ok_or(BufferError::UnknownFrame { frame_id })?;
        if node.evictable != evictable {
            node.evictable = evictable;
            if evictable {
                inner.evictable_count += 1;
            } else {
                inner.evictable_count -= 1;
            }
        }
        Ok(())
    }

    /// Drops a frame from the replacer, forgetting its history.
    ///
    /// Removing an unknown frame is a no-op; removing a non-evictable frame
    /// is an error.
    pub fn remove(&self, frame_id: FrameId) -> BufferResult<()> {
        let mut inner = self.inner.lock();
        match inner.nodes.get(&frame_id) {
            None => Ok(()),
            Some(node) if !node.evictable => Err(BufferError::FrameNotEvictable { frame_id }),
            Some(_) => {
                inner.nodes.remove(&frame_id);
                inner.evictable_count -= 1;
                Ok(())
            }
        }
    }

    /// Evicts the frame with the largest backward K-distance.
    ///
    /// Returns `None` when no frame is evictable. The chosen frame is removed
    /// from the replacer together with its access history.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        inner.current_timestamp += 1;
        let now = inner.current_timestamp;

        let victim = inner
            .nodes
            .iter()
            .filter(|(_, node)| node.evictable)
            .max_by_key(|(_, node)| node.rank(now, self.k))
            .map(|(&frame_id, _)| frame_id)?;

        inner.nodes.remove(&victim);
        inner.evictable_count -= 1;
        Some(victim)
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}
