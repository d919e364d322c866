//! Forward cursor over the leaf chain.
//!
//! The cursor holds a read guard on its current leaf and walks entries in
//! key order, following the next-leaf pointer under a fresh read guard when a
//! leaf is exhausted. Concurrent structural changes are serialized by the
//! page latches; the cursor makes no snapshot guarantee across leaves.

use granite_common::types::Rid;

use crate::buffer::ReadPageGuard;

use super::error::{BTreeError, BTreeResult};
use super::node::{node_type, InternalNode, LeafNode, NodeType};
use super::tree::{read_root, BPlusTree, KeyComparator};

/// A forward iterator over `(key, rid)` entries of a [`BPlusTree`].
pub struct TreeCursor<'a, const K: usize, C: KeyComparator> {
    tree: &'a BPlusTree<K, C>,
    guard: Option<ReadPageGuard<'a>>,
    index: usize,
}

impl<'a, const K: usize, C: KeyComparator> TreeCursor<'a, K, C> {
    /// Descends to the leftmost leaf.
    pub(super) fn at_start(tree: &'a BPlusTree<K, C>) -> BTreeResult<Self> {
        let guard = Self::descend(tree, None)?;
        Ok(Self {
            tree,
            guard: Some(guard),
            index: 0,
        })
    }

    /// Descends to the leaf that would contain `key` and positions at the
    /// first entry ≥ `key`.
    pub(super) fn at_key(tree: &'a BPlusTree<K, C>, key: &[u8; K]) -> BTreeResult<Self> {
        let guard = Self::descend(tree, Some(key))?;
        let index = {
            let leaf = LeafNode::<_, K>::new(guard.data());
            match leaf.search(key, tree.comparator()) {
                Ok(i) | Err(i) => i,
            }
        };
        Ok(Self {
            tree,
            guard: Some(guard),
            index,
        })
    }

    /// Read-crabs from the header down to a leaf: leftmost when `key` is
    /// `None`, the containing leaf otherwise.
    fn descend(
        tree: &'a BPlusTree<K, C>,
        key: Option<&[u8; K]>,
    ) -> BTreeResult<ReadPageGuard<'a>> {
        let bpm = tree.bpm();
        let header = bpm.fetch_page_read(tree.header_page_id())?;
        let root_id = read_root(header.data());
        if !root_id.is_valid() {
            return Err(BTreeError::EmptyTree);
        }
        let mut guard = bpm.fetch_page_read(root_id)?;
        drop(header);

        loop {
            match node_type(guard.data()).ok_or(BTreeError::Corrupted {
                page_id: guard.page_id(),
            })? {
                NodeType::Leaf => return Ok(guard),
                NodeType::Internal => {
                    let child = {
                        let node = InternalNode::<_, K>::new(guard.data());
                        match key {
                            Some(key) => node.child_for(key, tree.comparator()),
                            None => node.child_at(0),
                        }
                    };
                    let child_guard = bpm.fetch_page_read(child)?;
                    guard = child_guard;
                }
            }
        }
    }

    /// Returns true if the cursor has run off the end of the index.
    pub fn is_exhausted(&self) -> bool {
        self.guard.is_none()
    }
}

impl<const K: usize, C: KeyComparator> Iterator for TreeCursor<'_, K, C> {
    type Item = BTreeResult<([u8; K], Rid)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let guard = self.guard.as_ref()?;
            // Either the entry at the current slot, or the sibling to move
            // to once this leaf is exhausted.
            let step: Result<([u8; K], Rid), _> = {
                let leaf = LeafNode::<_, K>::new(guard.data());
                if self.index < leaf.size() {
                    let mut key = [0u8; K];
                    key.copy_from_slice(leaf.key_at(self.index));
                    Ok((key, leaf.rid_at(self.index)))
                } else {
                    Err(leaf.next_page_id())
                }
            };

            match step {
                Ok(entry) => {
                    self.index += 1;
                    return Some(Ok(entry));
                }
                Err(next_page) if !next_page.is_valid() => {
                    self.guard = None;
                    return None;
                }
                Err(next_page) => {
                    // Latch the next leaf before dropping the current one.
                    match self.tree.bpm().fetch_page_read(next_page) {
                        Ok(next_guard) => {
                            self.guard = Some(next_guard);
                            self.index = 0;
                        }
                        Err(e) => {
                            self.guard = None;
                            return Some(Err(e.into()));
                        }
                    }
                }
            }
        }
    }
}

impl<const K: usize, C: KeyComparator> std::fmt::Debug for TreeCursor<'_, K, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeCursor")
            .field("leaf", &self.guard.as_ref().map(|g| g.page_id()))
            .field("index", &self.index)
            .finish()
    }
}
