//! The B+ tree proper: lookups, insertion with splits, deletion with merges
//! and redistribution, all under latch crabbing.
//!
//! Locking protocol:
//! - The header page (holding the root page id) is write-latched by insert
//!   and remove, read-latched by lookups, and released as soon as the
//!   operation can prove the root will not change.
//! - Traversal latches top-down. A write descent keeps the chain of ancestor
//!   guards in a context and clears it the moment the newly latched node is
//!   *safe*: it cannot split (insert) or underflow (delete), so no structural
//!   change can propagate above it.
//! - Lookups crab with read latches: the child is latched before the parent
//!   guard is dropped.

use std::cmp::Ordering;
use std::mem;
use std::sync::Arc;

use granite_common::types::{PageId, Rid};

use crate::buffer::{BufferPoolManager, WritePageGuard};

use super::cursor::TreeCursor;
use super::error::{BTreeError, BTreeResult};
use super::node::{node_type, InternalNode, LeafNode, NodeType};

/// Key ordering strategy for a tree.
///
/// Keys are fixed-width byte strings; the comparator decides their order. The
/// same comparator must be used for the whole lifetime of an index.
pub trait KeyComparator: Clone + Send + Sync {
    /// Compares two keys of the tree's key width.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Orders keys by their raw bytes.
///
/// Big-endian encoded unsigned integers order correctly under this
/// comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicographicComparator;

impl KeyComparator for LexicographicComparator {
    #[inline]
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Fan-out configuration of a tree.
#[derive(Debug, Clone, Copy)]
pub struct BTreeConfig {
    /// A leaf splits when an insertion brings it to this many entries.
    pub leaf_max_size: u16,
    /// An internal node splits when an insertion would exceed this many
    /// slots (slot 0 included).
    pub internal_max_size: u16,
}

impl BTreeConfig {
    /// Creates a config with explicit fan-outs.
    pub fn new(leaf_max_size: u16, internal_max_size: u16) -> Self {
        Self {
            leaf_max_size,
            internal_max_size,
        }
    }

    /// The largest fan-outs that physically fit a page for key width `K`.
    pub fn max_for_key_width<const K: usize>() -> Self {
        Self {
            leaf_max_size: LeafNode::<Vec<u8>, K>::capacity() as u16,
            internal_max_size: InternalNode::<Vec<u8>, K>::capacity() as u16,
        }
    }
}

/// Byte offset of the root page id within the header page.
const ROOT_PAGE_ID_OFFSET: usize = 0;

pub(crate) fn read_root(data: &[u8]) -> PageId {
    PageId::from_le_bytes([
        data[ROOT_PAGE_ID_OFFSET],
        data[ROOT_PAGE_ID_OFFSET + 1],
        data[ROOT_PAGE_ID_OFFSET + 2],
        data[ROOT_PAGE_ID_OFFSET + 3],
    ])
}

fn write_root(header: &mut WritePageGuard<'_>, root: PageId) {
    header.data_mut()[ROOT_PAGE_ID_OFFSET..ROOT_PAGE_ID_OFFSET + 4]
        .copy_from_slice(&root.to_le_bytes());
}

/// Write-descent context: the header guard (held while the root may change)
/// and the chain of latched ancestors, root-most first.
struct Context<'a> {
    header: Option<WritePageGuard<'a>>,
    ancestors: Vec<WritePageGuard<'a>>,
    root_page_id: PageId,
}

impl Context<'_> {
    /// Drops every ancestor latch and the header latch; called when the
    /// current node is safe for the operation.
    fn release_ancestors(&mut self) {
        self.ancestors.clear();
        self.header = None;
    }
}

/// A concurrent B+ tree index with fixed-width `K`-byte keys and [`Rid`]
/// values.
pub struct BPlusTree<const K: usize, C: KeyComparator = LexicographicComparator> {
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    header_page_id: PageId,
    leaf_max_size: u16,
    internal_max_size: u16,
}

impl<const K: usize, C: KeyComparator> BPlusTree<K, C> {
    /// Creates a tree over an existing header page, resetting it to empty.
    ///
    /// # Panics
    ///
    /// Panics if the configured fan-outs do not fit a page or are below the
    /// minimum of 3.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        header_page_id: PageId,
        config: BTreeConfig,
    ) -> BTreeResult<Self> {
        assert!(config.leaf_max_size >= 3, "leaf fan-out below minimum");
        assert!(config.internal_max_size >= 3, "internal fan-out below minimum");
        assert!(
            config.leaf_max_size as usize <= LeafNode::<Vec<u8>, K>::capacity(),
            "leaf fan-out exceeds page capacity"
        );
        assert!(
            config.internal_max_size as usize <= InternalNode::<Vec<u8>, K>::capacity(),
            "internal fan-out exceeds page capacity"
        );

        {
            let mut header = bpm.fetch_page_write(header_page_id)?;
            write_root(&mut header, PageId::INVALID);
        }
        Ok(Self {
            bpm,
            comparator,
            header_page_id,
            leaf_max_size: config.leaf_max_size,
            internal_max_size: config.internal_max_size,
        })
    }

    /// Creates a tree, allocating a fresh header page from the pool.
    pub fn create(
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        config: BTreeConfig,
    ) -> BTreeResult<Self> {
        let header_page_id = bpm.new_page()?;
        bpm.unpin_page(header_page_id, true);
        Self::new(bpm, comparator, header_page_id, config)
    }

    /// Returns the page id of the header page.
    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    /// Returns the current root page id, or `PageId::INVALID` when empty.
    pub fn root_page_id(&self) -> BTreeResult<PageId> {
        let header = self.bpm.fetch_page_read(self.header_page_id)?;
        Ok(read_root(header.data()))
    }

    /// Returns true if the tree holds no entries.
    pub fn is_empty(&self) -> BTreeResult<bool> {
        Ok(!self.root_page_id()?.is_valid())
    }

    pub(crate) fn bpm(&self) -> &BufferPoolManager {
        &self.bpm
    }

    pub(crate) fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Point lookup: returns the record id stored under `key`.
    pub fn get(&self, key: &[u8; K]) -> BTreeResult<Option<Rid>> {
        let bpm = &*self.bpm;
        let header = bpm.fetch_page_read(self.header_page_id)?;
        let root_id = read_root(header.data());
        if !root_id.is_valid() {
            return Ok(None);
        }
        let mut guard = bpm.fetch_page_read(root_id)?;
        drop(header);

        loop {
            match node_type(guard.data()).ok_or(BTreeError::Corrupted {
                page_id: guard.page_id(),
            })? {
                NodeType::Leaf => {
                    let leaf = LeafNode::<_, K>::new(guard.data());
                    return Ok(leaf.lookup(key, &self.comparator));
                }
                NodeType::Internal => {
                    let child = {
                        let node = InternalNode::<_, K>::new(guard.data());
                        node.child_for(key, &self.comparator)
                    };
                    // Latch the child before dropping the parent.
                    let child_guard = bpm.fetch_page_read(child)?;
                    guard = child_guard;
                }
            }
        }
    }

    /// Inserts `key -> rid`. Keys are unique; inserting an existing key
    /// fails with [`BTreeError::DuplicateKey`] and leaves the tree unchanged.
    pub fn insert(&self, key: &[u8; K], rid: Rid) -> BTreeResult<()> {
        let bpm = &*self.bpm;
        let mut header = bpm.fetch_page_write(self.header_page_id)?;
        let root_id = read_root(header.data());

        if !root_id.is_valid() {
            // First insertion: the new leaf becomes the root.
            let mut root_guard = bpm.new_page_guarded()?.upgrade_write();
            let new_root_id = root_guard.page_id();
            {
                let mut data = root_guard.data_mut();
                LeafNode::<_, K>::init(&mut data, self.leaf_max_size);
                let mut leaf = LeafNode::<_, K>::new(data);
                leaf.insert(key, rid, &self.comparator);
            }
            write_root(&mut header, new_root_id);
            return Ok(());
        }

        let mut ctx = Context {
            header: Some(header),
            ancestors: Vec::new(),
            root_page_id: root_id,
        };
        let mut guard = bpm.fetch_page_write(root_id)?;

        loop {
            match node_type(guard.data()).ok_or(BTreeError::Corrupted {
                page_id: guard.page_id(),
            })? {
                NodeType::Leaf => {
                    let safe = {
                        let leaf = LeafNode::<_, K>::new(guard.data());
                        leaf.size() + 1 < leaf.max_size()
                    };
                    if safe {
                        ctx.release_ancestors();
                    }
                    break;
                }
                NodeType::Internal => {
                    let (safe, child) = {
                        let node = InternalNode::<_, K>::new(guard.data());
                        (
                            node.size() + 1 < node.max_size(),
                            node.child_for(key, &self.comparator),
                        )
                    };
                    if safe {
                        ctx.release_ancestors();
                    }
                    let child_guard = bpm.fetch_page_write(child)?;
                    ctx.ancestors.push(mem::replace(&mut guard, child_guard));
                }
            }
        }

        let (inserted, at_max) = {
            let mut leaf = LeafNode::<_, K>::new(guard.data_mut());
            let inserted = leaf.insert(key, rid, &self.comparator);
            (inserted, leaf.size() == leaf.max_size())
        };
        if !inserted {
            return Err(BTreeError::DuplicateKey);
        }
        if at_max {
            self.split_leaf(&mut ctx, guard)?;
        }
        Ok(())
    }

    /// Removes `key` if present. Removing an absent key is a no-op.
    pub fn remove(&self, key: &[u8; K]) -> BTreeResult<()> {
        let bpm = &*self.bpm;
        let mut header = bpm.fetch_page_write(self.header_page_id)?;
        let root_id = read_root(header.data());
        if !root_id.is_valid() {
            return Ok(());
        }

        let mut ctx = Context {
            header: Some(header),
            ancestors: Vec::new(),
            root_page_id: root_id,
        };
        let mut guard = bpm.fetch_page_write(root_id)?;

        loop {
            let is_root = guard.page_id() == ctx.root_page_id;
            match node_type(guard.data()).ok_or(BTreeError::Corrupted {
                page_id: guard.page_id(),
            })? {
                NodeType::Leaf => {
                    let safe = {
                        let leaf = LeafNode::<_, K>::new(guard.data());
                        if is_root {
                            leaf.size() > 1
                        } else {
                            leaf.size() > leaf.min_size()
                        }
                    };
                    if safe {
                        ctx.release_ancestors();
                    }
                    break;
                }
                NodeType::Internal => {
                    let (safe, child) = {
                        let node = InternalNode::<_, K>::new(guard.data());
                        let safe = if is_root {
                            node.size() > 2
                        } else {
                            node.size() > node.min_size()
                        };
                        (safe, node.child_for(key, &self.comparator))
                    };
                    if safe {
                        ctx.release_ancestors();
                    }
                    let child_guard = bpm.fetch_page_write(child)?;
                    ctx.ancestors.push(mem::replace(&mut guard, child_guard));
                }
            }
        }

        let removed = {
            let mut leaf = LeafNode::<_, K>::new(guard.data_mut());
            leaf.remove(key, &self.comparator)
        };
        if !removed {
            return Ok(());
        }

        let leaf_id = guard.page_id();
        if leaf_id == ctx.root_page_id {
            let size = LeafNode::<_, K>::new(guard.data()).size();
            if size == 0 {
                let mut header = ctx
                    .header
                    .take()
                    .expect("emptying root leaf retains the header latch");
                write_root(&mut header, PageId::INVALID);
                drop(guard);
                let _ = bpm.delete_page(leaf_id);
            }
            return Ok(());
        }

        let underflow = {
            let leaf = LeafNode::<_, K>::new(guard.data());
            leaf.size() < leaf.min_size()
        };
        if underflow {
            self.handle_leaf_underflow(&mut ctx, guard)?;
        }
        Ok(())
    }

    /// Returns a cursor positioned at the first entry of the tree.
    pub fn iter(&self) -> BTreeResult<TreeCursor<'_, K, C>> {
        TreeCursor::at_start(self)
    }

    /// Returns a cursor positioned at the first entry ≥ `key`.
    pub fn iter_from(&self, key: &[u8; K]) -> BTreeResult<TreeCursor<'_, K, C>> {
        TreeCursor::at_key(self, key)
    }

    /// Splits a leaf that has reached its max size. `guard` holds the full
    /// leaf; the context still holds every ancestor that may be affected.
    fn split_leaf<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        mut guard: WritePageGuard<'a>,
    ) -> BTreeResult<()> {
        let bpm = &*self.bpm;
        let mut sib_guard = bpm.new_page_guarded()?.upgrade_write();
        let sib_id = sib_guard.page_id();

        {
            let mut sdata = sib_guard.data_mut();
            LeafNode::<_, K>::init(&mut sdata, self.leaf_max_size);
            let mut sibling = LeafNode::<_, K>::new(sdata);
            let mut leaf = LeafNode::<_, K>::new(guard.data_mut());
            leaf.split_into(&mut sibling);
            sibling.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(sib_id);
        }

        let leaf_id = guard.page_id();
        let leaf_key0 = first_key::<K>(guard.data());
        let sep = first_key::<K>(sib_guard.data());

        if leaf_id == ctx.root_page_id {
            let mut root_guard = bpm.new_page_guarded()?.upgrade_write();
            let new_root_id = root_guard.page_id();
            {
                let mut rdata = root_guard.data_mut();
                InternalNode::<_, K>::init(&mut rdata, self.internal_max_size);
                let mut root = InternalNode::<_, K>::new(rdata);
                root.init_as_root(&leaf_key0, leaf_id, &sep, sib_id);
            }
            let mut header = ctx
                .header
                .take()
                .expect("splitting the root retains the header latch");
            write_root(&mut header, new_root_id);
            return Ok(());
        }

        let mut parent = ctx
            .ancestors
            .pop()
            .expect("splitting a non-root leaf retains its parent latch");
        {
            let mut pnode = InternalNode::<_, K>::new(parent.data_mut());
            let index = pnode
                .child_index_of(leaf_id)
                .expect("parent references the split leaf");
            pnode.set_key_at(index, &leaf_key0);
        }
        drop(guard);
        drop(sib_guard);
        self.insert_into_parent(ctx, parent, sep, sib_id)
    }

    /// Inserts a promoted (separator, child) pair into `parent`, splitting
    /// internal nodes upward as long as they overflow.
    fn insert_into_parent<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        mut parent: WritePageGuard<'a>,
        mut key: [u8; K],
        mut child_id: PageId,
    ) -> BTreeResult<()> {
        let bpm = &*self.bpm;
        loop {
            let size = InternalNode::<_, K>::new(parent.data()).size();
            if size < self.internal_max_size as usize {
                let mut pnode = InternalNode::<_, K>::new(parent.data_mut());
                pnode.insert(&key, child_id, &self.comparator);
                return Ok(());
            }

            // Full: split this internal node around the insertion.
            let mut sib_guard = bpm.new_page_guarded()?.upgrade_write();
            let sib_id = sib_guard.page_id();
            {
                let mut sdata = sib_guard.data_mut();
                InternalNode::<_, K>::init(&mut sdata, self.internal_max_size);
                let mut sibling = InternalNode::<_, K>::new(sdata);
                let mut pnode = InternalNode::<_, K>::new(parent.data_mut());
                pnode.split_with_insert(&mut sibling, &key, child_id, &self.comparator);
            }

            let parent_id = parent.page_id();
            let parent_key0 = first_key::<K>(parent.data());
            let promoted = first_key::<K>(sib_guard.data());

            if parent_id == ctx.root_page_id {
                let mut root_guard = bpm.new_page_guarded()?.upgrade_write();
                let new_root_id = root_guard.page_id();
                {
                    let mut rdata = root_guard.data_mut();
                    InternalNode::<_, K>::init(&mut rdata, self.internal_max_size);
                    let mut root = InternalNode::<_, K>::new(rdata);
                    root.init_as_root(&parent_key0, parent_id, &promoted, sib_id);
                }
                let mut header = ctx
                    .header
                    .take()
                    .expect("splitting the root retains the header latch");
                write_root(&mut header, new_root_id);
                return Ok(());
            }

            let mut grandparent = ctx
                .ancestors
                .pop()
                .expect("splitting a non-root node retains its parent latch");
            {
                let mut gnode = InternalNode::<_, K>::new(grandparent.data_mut());
                let index = gnode
                    .child_index_of(parent_id)
                    .expect("grandparent references the split node");
                gnode.set_key_at(index, &parent_key0);
            }
            key = promoted;
            child_id = sib_id;
            parent = grandparent;
        }
    }

    /// Rebalances a leaf that fell below its min size: merge with a sibling
    /// when both fit in one page, redistribute one entry otherwise.
    fn handle_leaf_underflow<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        leaf_guard: WritePageGuard<'a>,
    ) -> BTreeResult<()> {
        let bpm = &*self.bpm;
        let mut parent = ctx
            .ancestors
            .pop()
            .expect("underflowing leaf retains its parent latch");
        let leaf_id = leaf_guard.page_id();

        let (index, parent_size) = {
            let pnode = InternalNode::<_, K>::new(parent.data());
            let index = pnode
                .child_index_of(leaf_id)
                .expect("parent references the underflowing leaf");
            (index, pnode.size())
        };

        // Normalize to an adjacent (left, right) pair, preferring the right
        // sibling.
        let (mut left, mut right, left_index) = if index + 1 < parent_size {
            let right_id = InternalNode::<_, K>::new(parent.data()).child_at(index + 1);
            (leaf_guard, bpm.fetch_page_write(right_id)?, index)
        } else {
            let left_id = InternalNode::<_, K>::new(parent.data()).child_at(index - 1);
            (bpm.fetch_page_write(left_id)?, leaf_guard, index - 1)
        };

        let (left_size, right_size) = {
            let l = LeafNode::<_, K>::new(left.data());
            let r = LeafNode::<_, K>::new(right.data());
            (l.size(), r.size())
        };

        if left_size + right_size < self.leaf_max_size as usize {
            // Merge the right leaf into the left and unlink it.
            {
                let mut rnode = LeafNode::<_, K>::new(right.data_mut());
                let mut lnode = LeafNode::<_, K>::new(left.data_mut());
                lnode.merge_from(&mut rnode);
            }
            let right_id = right.page_id();
            drop(right);
            // A concurrent cursor may still pin the page; it is unlinked from
            // the tree either way.
            let _ = bpm.delete_page(right_id);

            let left_key0 = first_key::<K>(left.data());
            {
                let mut pnode = InternalNode::<_, K>::new(parent.data_mut());
                pnode.remove_child_at(left_index + 1);
                pnode.set_key_at(left_index, &left_key0);
            }
            drop(left);
            self.handle_internal_underflow(ctx, parent)
        } else {
            // Move one entry from the fatter sibling to the leaner one.
            {
                let mut rnode = LeafNode::<_, K>::new(right.data_mut());
                let mut lnode = LeafNode::<_, K>::new(left.data_mut());
                if lnode.size() < rnode.size() {
                    lnode.move_first_from(&mut rnode);
                } else {
                    rnode.move_last_from(&mut lnode);
                }
            }
            let left_key0 = first_key::<K>(left.data());
            let right_key0 = first_key::<K>(right.data());
            {
                let mut pnode = InternalNode::<_, K>::new(parent.data_mut());
                pnode.set_key_at(left_index, &left_key0);
                pnode.set_key_at(left_index + 1, &right_key0);
            }
            drop(left);
            drop(right);
            self.propagate_separator(ctx, parent)
        }
    }

    /// Rebalances internal nodes upward after a child merge removed a slot.
    fn handle_internal_underflow<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        mut guard: WritePageGuard<'a>,
    ) -> BTreeResult<()> {
        let bpm = &*self.bpm;
        loop {
            let node_id = guard.page_id();
            let (size, min) = {
                let node = InternalNode::<_, K>::new(guard.data());
                (node.size(), node.min_size())
            };

            if node_id == ctx.root_page_id {
                if size == 1 {
                    // The root has a single child left: promote it.
                    let child = InternalNode::<_, K>::new(guard.data()).child_at(0);
                    let mut header = ctx
                        .header
                        .take()
                        .expect("collapsing the root retains the header latch");
                    write_root(&mut header, child);
                    drop(guard);
                    let _ = bpm.delete_page(node_id);
                }
                return Ok(());
            }
            if size >= min {
                return Ok(());
            }

            let mut parent = ctx
                .ancestors
                .pop()
                .expect("underflowing node retains its parent latch");
            let (index, parent_size) = {
                let pnode = InternalNode::<_, K>::new(parent.data());
                let index = pnode
                    .child_index_of(node_id)
                    .expect("parent references the underflowing node");
                (index, pnode.size())
            };

            let (mut left, mut right, left_index) = if index + 1 < parent_size {
                let right_id = InternalNode::<_, K>::new(parent.data()).child_at(index + 1);
                (guard, bpm.fetch_page_write(right_id)?, index)
            } else {
                let left_id = InternalNode::<_, K>::new(parent.data()).child_at(index - 1);
                (bpm.fetch_page_write(left_id)?, guard, index - 1)
            };

            let (left_size, right_size) = {
                let l = InternalNode::<_, K>::new(left.data());
                let r = InternalNode::<_, K>::new(right.data());
                (l.size(), r.size())
            };

            if left_size + right_size <= self.internal_max_size as usize {
                {
                    let mut rnode = InternalNode::<_, K>::new(right.data_mut());
                    let mut lnode = InternalNode::<_, K>::new(left.data_mut());
                    lnode.merge_from(&mut rnode);
                }
                let right_id = right.page_id();
                drop(right);
                let _ = bpm.delete_page(right_id);

                let left_key0 = first_key::<K>(left.data());
                {
                    let mut pnode = InternalNode::<_, K>::new(parent.data_mut());
                    pnode.remove_child_at(left_index + 1);
                    pnode.set_key_at(left_index, &left_key0);
                }
                drop(left);
                guard = parent;
            } else {
                {
                    let mut rnode = InternalNode::<_, K>::new(right.data_mut());
                    let mut lnode = InternalNode::<_, K>::new(left.data_mut());
                    if lnode.size() < rnode.size() {
                        lnode.move_first_from(&mut rnode);
                    } else {
                        rnode.move_last_from(&mut lnode);
                    }
                }
                let left_key0 = first_key::<K>(left.data());
                let right_key0 = first_key::<K>(right.data());
                {
                    let mut pnode = InternalNode::<_, K>::new(parent.data_mut());
                    pnode.set_key_at(left_index, &left_key0);
                    pnode.set_key_at(left_index + 1, &right_key0);
                }
                drop(left);
                drop(right);
                return self.propagate_separator(ctx, parent);
            }
        }
    }

    /// Lazily rewrites ancestor separators to `child`'s new first key,
    /// stopping as soon as a separator already matches or the chain of
    /// latched ancestors runs out.
    fn propagate_separator<'a>(
        &'a self,
        ctx: &mut Context<'a>,
        mut child: WritePageGuard<'a>,
    ) -> BTreeResult<()> {
        loop {
            let child_id = child.page_id();
            if child_id == ctx.root_page_id {
                return Ok(());
            }
            let Some(mut parent) = ctx.ancestors.pop() else {
                return Ok(());
            };
            let key0 = first_key::<K>(child.data());
            let (index, up_to_date) = {
                let pnode = InternalNode::<_, K>::new(parent.data());
                let index = pnode
                    .child_index_of(child_id)
                    .expect("latched ancestor references its child");
                let up_to_date =
                    self.comparator.compare(pnode.key_at(index), &key0) == Ordering::Equal;
                (index, up_to_date)
            };
            if up_to_date {
                return Ok(());
            }
            {
                let mut pnode = InternalNode::<_, K>::new(parent.data_mut());
                pnode.set_key_at(index, &key0);
            }
            child = parent;
        }
    }
}

impl<const K: usize, C: KeyComparator> std::fmt::Debug for BPlusTree<K, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BPlusTree")
            .field("key_width", &K)
            .field("header_page_id", &self.header_page_id)
            .field("leaf_max_size", &self.leaf_max_size)
            .field("internal_max_size", &self.internal_max_size)
            .finish()
    }
}

/// Copies the first key of a node (either kind) out of its page bytes.
fn first_key<const K: usize>(data: &[u8]) -> [u8; K] {
    let mut key = [0u8; K];
    let offset = match node_type(data) {
        Some(NodeType::Leaf) => super::node::LEAF_HEADER_SIZE,
        _ => super::node::INTERNAL_HEADER_SIZE,
    };
    key.copy_from_slice(&data[offset..offset + K]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::DiskManager;
    use tempfile::tempdir;

    fn key(v: u64) -> [u8; 8] {
        v.to_be_bytes()
    }

    fn rid(v: u32) -> Rid {
        Rid::new(PageId::new(v), v)
    }

    fn small_tree() -> (tempfile::TempDir, BPlusTree<8>) {
        let dir = tempdir().unwrap();
        let disk = Arc::new(DiskManager::open(dir.path().join("index.db")).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(64, 2, disk));
        let tree = BPlusTree::<8>::create(bpm, LexicographicComparator, BTreeConfig::new(3, 3))
            .unwrap();
        (dir, tree)
    }

    #[test]
    fn test_empty_tree() {
        let (_dir, tree) = small_tree();
        assert!(tree.is_empty().unwrap());
        assert_eq!(tree.get(&key(1)).unwrap(), None);
        tree.remove(&key(1)).unwrap();
        assert!(tree.is_empty().unwrap());
    }

    #[test]
    fn test_first_insert_creates_root_leaf() {
        let (_dir, tree) = small_tree();
        tree.insert(&key(10), rid(10)).unwrap();
        assert!(!tree.is_empty().unwrap());
        assert_eq!(tree.get(&key(10)).unwrap(), Some(rid(10)));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let (_dir, tree) = small_tree();
        tree.insert(&key(10), rid(10)).unwrap();
        assert!(matches!(
            tree.insert(&key(10), rid(11)),
            Err(BTreeError::DuplicateKey)
        ));
        assert_eq!(tree.get(&key(10)).unwrap(), Some(rid(10)));
    }

    #[test]
    fn test_leaf_split_promotes_separator() {
        // Leaf max 3: inserting 10, 20, 30 splits the root leaf into [10]
        // and [20, 30] under a new internal root with separator 20.
        let (_dir, tree) = small_tree();
        tree.insert(&key(10), rid(10)).unwrap();
        tree.insert(&key(20), rid(20)).unwrap();
        tree.insert(&key(30), rid(30)).unwrap();

        let root_id = tree.root_page_id().unwrap();
        let root = tree.bpm().fetch_page_read(root_id).unwrap();
        let node = InternalNode::<_, 8>::new(root.data());
        assert_eq!(node.size(), 2);
        assert_eq!(node.key_at(1), &key(20));

        let left = node.child_at(0);
        let right = node.child_at(1);
        drop(root);

        let left_guard = tree.bpm().fetch_page_read(left).unwrap();
        let left_leaf = LeafNode::<_, 8>::new(left_guard.data());
        assert_eq!(left_leaf.size(), 1);
        assert_eq!(left_leaf.key_at(0), &key(10));
        assert_eq!(left_leaf.next_page_id(), right);
        drop(left_guard);

        let right_guard = tree.bpm().fetch_page_read(right).unwrap();
        let right_leaf = LeafNode::<_, 8>::new(right_guard.data());
        assert_eq!(right_leaf.size(), 2);
        assert_eq!(right_leaf.key_at(0), &key(20));
        assert_eq!(right_leaf.key_at(1), &key(30));
        assert!(!right_leaf.next_page_id().is_valid());
    }

    #[test]
    fn test_merge_after_remove() {
        // Build leaves [10], [20], [30, 40] with separators {20, 30}; then
        // removing 10 merges the underflowed leaf with its right sibling.
        let (_dir, tree) = small_tree();
        for v in [10u64, 20, 30, 40] {
            tree.insert(&key(v), rid(v as u32)).unwrap();
        }

        {
            let root_id = tree.root_page_id().unwrap();
            let root = tree.bpm().fetch_page_read(root_id).unwrap();
            let node = InternalNode::<_, 8>::new(root.data());
            assert_eq!(node.size(), 3);
            assert_eq!(node.key_at(1), &key(20));
            assert_eq!(node.key_at(2), &key(30));
        }

        tree.remove(&key(10)).unwrap();

        let root_id = tree.root_page_id().unwrap();
        let root = tree.bpm().fetch_page_read(root_id).unwrap();
        let node = InternalNode::<_, 8>::new(root.data());
        assert_eq!(node.size(), 2);
        assert_eq!(node.key_at(0), &key(20));
        assert_eq!(node.key_at(1), &key(30));
        let merged = node.child_at(0);
        drop(root);

        let merged_guard = tree.bpm().fetch_page_read(merged).unwrap();
        let leaf = LeafNode::<_, 8>::new(merged_guard.data());
        assert_eq!(leaf.size(), 1);
        assert_eq!(leaf.key_at(0), &key(20));
        drop(merged_guard);

        assert_eq!(tree.get(&key(10)).unwrap(), None);
        for v in [20u64, 30, 40] {
            assert_eq!(tree.get(&key(v)).unwrap(), Some(rid(v as u32)));
        }
    }

    #[test]
    fn test_drain_collapses_root() {
        let (_dir, tree) = small_tree();
        for v in 1..=8u64 {
            tree.insert(&key(v), rid(v as u32)).unwrap();
        }
        for v in 1..=8u64 {
            tree.remove(&key(v)).unwrap();
        }
        assert!(tree.is_empty().unwrap());

        // The tree is reusable after being drained.
        tree.insert(&key(5), rid(5)).unwrap();
        assert_eq!(tree.get(&key(5)).unwrap(), Some(rid(5)));
    }

    #[test]
    fn test_round_trip_law() {
        let (_dir, tree) = small_tree();
        for v in 1..=50u64 {
            tree.insert(&key(v), rid(v as u32)).unwrap();
        }
        for v in 1..=50u64 {
            assert_eq!(tree.get(&key(v)).unwrap(), Some(rid(v as u32)));
        }
        for v in (1..=50u64).step_by(2) {
            tree.remove(&key(v)).unwrap();
        }
        for v in 1..=50u64 {
            let expected = if v % 2 == 0 { Some(rid(v as u32)) } else { None };
            assert_eq!(tree.get(&key(v)).unwrap(), expected);
        }
    }

    #[test]
    fn test_descending_inserts() {
        let (_dir, tree) = small_tree();
        for v in (1..=40u64).rev() {
            tree.insert(&key(v), rid(v as u32)).unwrap();
        }
        for v in 1..=40u64 {
            assert_eq!(tree.get(&key(v)).unwrap(), Some(rid(v as u32)));
        }
    }
}
