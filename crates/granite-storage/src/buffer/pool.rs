//! Buffer pool manager.
//!
//! The pool owns a fixed array of frames and brokers every page between disk
//! and memory. A single mutex guards the page table and free list; disk I/O
//! happens while it is held, which keeps the pool linearizable at the cost of
//! serializing misses. The per-frame latches and the replacer's own mutex sit
//! below it in the lock order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use granite_common::types::PageId;

use crate::file::DiskManager;

use super::error::{BufferError, BufferResult};
use super::frame::{Frame, FrameId};
use super::latch::{PageGuard, ReadPageGuard, WritePageGuard};
use super::replacer::LruKReplacer;

struct PoolInner {
    /// Maps resident page ids to the frame holding them.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page at all.
    free_list: VecDeque<FrameId>,
}

/// Point-in-time counters of the buffer pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Total page fetches.
    pub fetches: u64,
    /// Fetches served from memory.
    pub hits: u64,
    /// Fetches that went to disk.
    pub misses: u64,
    /// Victim evictions.
    pub evictions: u64,
    /// Pages written to disk.
    pub flushes: u64,
    /// Frames currently pinned.
    pub pinned_frames: usize,
    /// Frames currently dirty.
    pub dirty_frames: usize,
}

/// The buffer pool manager.
///
/// Provides the only path to in-memory pages and enforces at-most-one
/// resident copy per page id. When memory is full the LRU-K replacer picks
/// the victim; dirty victims are written through before their frame is
/// reused.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<Frame>,
    inner: Mutex<PoolInner>,
    replacer: LruKReplacer,
    disk: Arc<DiskManager>,
    next_page_id: AtomicU32,
    fetch_count: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    eviction_count: AtomicU64,
    flush_count: AtomicU64,
}

impl BufferPoolManager {
    /// Creates a pool with `pool_size` frames backed by `disk`, using LRU-K
    /// replacement with the given `replacer_k`.
    pub fn new(pool_size: usize, replacer_k: usize, disk: Arc<DiskManager>) -> Self {
        let frames = (0..pool_size).map(|i| Frame::new(FrameId::new(i))).collect();
        let free_list = (0..pool_size).map(FrameId::new).collect();
        Self {
            pool_size,
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: LruKReplacer::new(pool_size, replacer_k),
            disk: Arc::clone(&disk),
            next_page_id: AtomicU32::new(0),
            fetch_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            flush_count: AtomicU64::new(0),
        }
    }

    /// Returns a snapshot of the pool's counters.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned = 0;
        let mut dirty = 0;
        for frame in &self.frames {
            if frame.is_pinned() {
                pinned += 1;
            }
            if frame.is_dirty() {
                dirty += 1;
            }
        }
        BufferPoolStats {
            fetches: self.fetch_count.load(Ordering::Relaxed),
            hits: self.hit_count.load(Ordering::Relaxed),
            misses: self.miss_count.load(Ordering::Relaxed),
            evictions: self.eviction_count.load(Ordering::Relaxed),
            flushes: self.flush_count.load(Ordering::Relaxed),
            pinned_frames: pinned,
            dirty_frames: dirty,
        }
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns true if the page is currently resident.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.inner.lock().page_table.contains_key(&page_id)
    }

    /// Returns the pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|frame_id| self.frames[frame_id.index()].pin_count())
    }

    /// Allocates a new page and pins it.
    ///
    /// The next page id is drawn from a monotonic counter; the frame comes
    /// from the free list, or from evicting a victim (flushing it first if
    /// dirty). The new page's memory is zeroed. The caller must
    /// [`unpin_page`](Self::unpin_page) it when done.
    pub fn new_page(&self) -> BufferResult<PageId> {
        let mut inner = self.inner.lock();
        let frame_id = self.acquire_frame(&mut inner)?;

        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst));
        let frame = &self.frames[frame_id.index()];
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        Ok(page_id)
    }

    /// Allocates a new page and returns it behind a basic guard.
    pub fn new_page_guarded(&self) -> BufferResult<PageGuard<'_>> {
        let page_id = self.new_page()?;
        let frame_id = {
            let inner = self.inner.lock();
            inner.page_table[&page_id]
        };
        Ok(PageGuard::new(self, &self.frames[frame_id.index()], page_id))
    }

    /// Fetches a page behind a basic guard (pin only, no latch held).
    pub fn fetch_page_basic(&self, page_id: PageId) -> BufferResult<PageGuard<'_>> {
        let frame_id = self.fetch_pinned(page_id)?;
        Ok(PageGuard::new(self, &self.frames[frame_id.index()], page_id))
    }

    /// Fetches a page behind a read guard (pin + shared latch).
    pub fn fetch_page_read(&self, page_id: PageId) -> BufferResult<ReadPageGuard<'_>> {
        let frame_id = self.fetch_pinned(page_id)?;
        Ok(ReadPageGuard::new(self, &self.frames[frame_id.index()], page_id))
    }

    /// Fetches a page behind a write guard (pin + exclusive latch).
    pub fn fetch_page_write(&self, page_id: PageId) -> BufferResult<WritePageGuard<'_>> {
        let frame_id = self.fetch_pinned(page_id)?;
        Ok(WritePageGuard::new(self, &self.frames[frame_id.index()], page_id))
    }

    /// Decrements the pin count of a resident page.
    ///
    /// The dirty flag is OR'd with `is_dirty`: a clean unpin never clears a
    /// dirty page. Returns false (without side effects) when the page is not
    /// resident or its pin count is already zero. A pin count reaching zero
    /// makes the frame evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.index()];
        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if frame.unpin() == 0 {
            let evictable = self.replacer.set_evictable(frame_id, true);
            debug_assert!(evictable.is_ok(), "unpinned frame unknown to replacer");
        }
        true
    }

    /// Writes a resident page to disk unconditionally and clears its dirty
    /// flag.
    ///
    /// The page is pinned for the duration and its shared latch is taken
    /// outside the pool mutex to snapshot the data: callers must not hold a
    /// write guard on the same page.
    pub fn flush_page(&self, page_id: PageId) -> BufferResult<()> {
        let frame_id = {
            let inner = self.inner.lock();
            let &frame_id = inner
                .page_table
                .get(&page_id)
                .ok_or(BufferError::PageNotFound { page_id })?;
            let frame = &self.frames[frame_id.index()];
            if frame.pin() == 1 {
                self.replacer.set_evictable(frame_id, false)?;
            }
            frame_id
        };

        let frame = &self.frames[frame_id.index()];
        let result = {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data[..])
        };
        if result.is_ok() {
            frame.set_dirty(false);
            self.flush_count.fetch_add(1, Ordering::Relaxed);
        }
        self.unpin_page(page_id, false);
        result.map_err(Into::into)
    }

    /// Flushes every resident page. Returns the number of pages written.
    ///
    /// Pages evicted or deleted while the sweep runs are skipped.
    pub fn flush_all_pages(&self) -> BufferResult<usize> {
        let pages: Vec<PageId> = {
            let inner = self.inner.lock();
            inner.page_table.keys().copied().collect()
        };
        let mut flushed = 0;
        for page_id in pages {
            match self.flush_page(page_id) {
                Ok(()) => flushed += 1,
                Err(BufferError::PageNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(flushed)
    }

    /// Removes a page from the pool and returns its frame to the free list.
    ///
    /// Deleting a page that is not resident succeeds trivially; deleting a
    /// pinned page fails with [`BufferError::PagePinned`]. The page id is not
    /// reused.
    pub fn delete_page(&self, page_id: PageId) -> BufferResult<()> {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(());
        };
        let frame = &self.frames[frame_id.index()];
        if frame.is_pinned() {
            return Err(BufferError::PagePinned { page_id });
        }
        self.replacer.remove(frame_id)?;
        inner.page_table.remove(&page_id);
        frame.reset();
        inner.free_list.push_back(frame_id);
        trace!(page = %page_id, frame = frame_id.index(), "deleted page");
        Ok(())
    }

    /// Pins the frame holding `page_id`, reading it from disk on a miss.
    fn fetch_pinned(&self, page_id: PageId) -> BufferResult<FrameId> {
        let mut inner = self.inner.lock();
        self.fetch_count.fetch_add(1, Ordering::Relaxed);

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            let frame = &self.frames[frame_id.index()];
            if frame.pin() == 1 {
                self.replacer.set_evictable(frame_id, false)?;
            }
            self.replacer.record_access(frame_id)?;
            return Ok(frame_id);
        }

        self.miss_count.fetch_add(1, Ordering::Relaxed);
        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.frames[frame_id.index()];
        {
            let mut data = frame.write_data();
            if let Err(e) = self.disk.read_page(page_id, &mut data[..]) {
                drop(data);
                frame.reset();
                inner.free_list.push_back(frame_id);
                return Err(e.into());
            }
        }
        frame.set_page_id(page_id);
        frame.pin();
        inner.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id)?;
        self.replacer.set_evictable(frame_id, false)?;
        Ok(frame_id)
    }

    /// Picks a frame for a new resident page: free list first, then a
    /// replacer victim. Dirty victims are written through before the frame is
    /// reused; the victim's page-table entry is dropped.
    fn acquire_frame(&self, inner: &mut PoolInner) -> BufferResult<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(BufferError::PoolExhausted)?;
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
        let frame = &self.frames[frame_id.index()];
        let victim_page = frame.page_id();
        if frame.is_dirty() {
            let data = frame.read_data();
            self.disk.write_page(victim_page, &data[..])?;
            self.flush_count.fetch_add(1, Ordering::Relaxed);
        }
        trace!(
            victim = %victim_page,
            frame = frame_id.index(),
            dirty = frame.is_dirty(),
            "evicted page"
        );
        inner.page_table.remove(&victim_page);
        frame.reset();
        Ok(frame_id)
    }
}

impl std::fmt::Debug for BufferPoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("BufferPoolManager")
            .field("pool_size", &self.pool_size)
            .field("resident", &inner.page_table.len())
            .field("free", &inner.free_list.len())
            .field("evictable", &self.replacer.size())
            .finish()
    }
}
