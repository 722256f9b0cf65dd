// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::alloc::BlockAllocator;
use crate::buffer::{BufferCache, LatchMode};
use crate::config::TreeConfig;
use crate::node::{Node, NodeFlags, NodeType};
use crate::path::Path;
use crate::{DiskPointer, Error, Result, MAX_KEYS, SPLIT_KEYS};
use parking_lot::RwLock;
use std::sync::Arc;

/// A single key/value record, used by bulk insert, range query, and the WAL
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Kvp {
    pub key: u64,
    pub value: Vec<u8>,
}

/// Capability-based abstraction over any concrete ordered key/value tree
///
/// Models the original's `vtreeops` function-pointer table as a trait: call
/// sites hold a `&dyn OrderedTree` rather than dispatching through mutable
/// field pointers.
pub trait OrderedTree {
    fn value_size(&self) -> usize;
    fn insert(&self, key: u64, value: &[u8]) -> Result<()>;
    fn bulk_insert(&self, kvs: &[Kvp]) -> Result<()>;
    fn delete(&self, key: u64) -> Result<Option<Vec<u8>>>;
    fn find(&self, key: u64) -> Result<Option<Vec<u8>>>;
    fn ge(&self, key: u64) -> Result<Option<Kvp>>;
    fn range_query(&self, low: u64, high: u64, max: usize) -> Result<Vec<Kvp>>;
    fn checkpoint(&self) -> Result<DiskPointer>;
}

/// A copy-on-write B+tree rooted at a [`DiskPointer`]
///
/// Holds no node state of its own between operations — every call opens a
/// fresh [`Path`] from the current root, does its work, and drops the path
/// on return, releasing every latch it acquired along the way.
pub struct BTree {
    cache: Arc<BufferCache>,
    alloc: Arc<BlockAllocator>,
    root: RwLock<DiskPointer>,
    config: TreeConfig,
}

impl BTree {
    /// Binds to an existing root block (e.g. one returned by [`Self::checkpoint`])
    pub fn init(
        cache: Arc<BufferCache>,
        alloc: Arc<BlockAllocator>,
        root: DiskPointer,
        config: TreeConfig,
    ) -> Self {
        Self {
            cache,
            alloc,
            root: RwLock::new(root),
            config,
        }
    }

    /// Allocates a fresh empty-leaf root and binds to it
    #[must_use]
    pub fn create(cache: Arc<BufferCache>, alloc: Arc<BlockAllocator>, config: TreeConfig) -> Self {
        let root = Node::create(&cache, &alloc, NodeType::Leaf);
        let root_ptr = root.ptr();
        Self::init(cache, alloc, root_ptr, config)
    }

    /// The tree's current root disk pointer
    #[must_use]
    pub fn root(&self) -> DiskPointer {
        *self.root.read()
    }

    fn traverse(&self, key: u64, mode: LatchMode) -> Result<Path> {
        let mut path = Path::new();
        path.push(Node::init(&self.cache, self.root(), mode))?;

        while path.cursor().is_inner() {
            let cur = path.cursor();
            let idx = cur.binary_search(key);
            let cidx = if idx == cur.len() {
                cur.len()
            } else if key > cur.key(idx) {
                idx + 1
            } else {
                idx
            };
            let child_ptr = cur.child(cidx);
            path.push(Node::init(&self.cache, child_ptr, mode))?;
        }

        Ok(path)
    }

    fn split_cascade(&self, path: &mut Path, mut idx: usize) -> Result<()> {
        loop {
            if idx == 0 {
                let mut parent = Node::create(&self.cache, &self.alloc, NodeType::Inner);
                parent.set_child(0, path.node(0).ptr());
                parent.mark_dirty(&self.cache);
                path.splice_root_parent(parent)?;
                *self.root.write() = path.node(0).ptr();
                idx = 1;
            }

            let is_leaf = path.node(idx).is_leaf();
            let full_len = path.node(idx).len();
            let max_key = path.node(idx).key(full_len - 1);
            let pivot = path.node(idx).key(SPLIT_KEYS - 1);

            let idx_in_parent = {
                let parent = path.node(idx - 1);
                if parent.is_empty() {
                    0
                } else {
                    parent.binary_search(max_key)
                }
            };

            let mut right = Node::create(
                &self.cache,
                &self.alloc,
                if is_leaf { NodeType::Leaf } else { NodeType::Inner },
            );

            {
                let node = path.node_mut(idx);
                right.copy_keys_from(node, SPLIT_KEYS..MAX_KEYS, 0);
                right.copy_slots_from(node, SPLIT_KEYS..MAX_KEYS + 1, 0);
                right.set_len(SPLIT_KEYS);
                node.set_len(if is_leaf { SPLIT_KEYS } else { SPLIT_KEYS - 1 });
                node.mark_dirty(&self.cache);
            }
            let right_ptr = right.ptr();
            drop(right);

            {
                let parent = path.node_mut(idx - 1);
                insert_inner_slot(parent, idx_in_parent, pivot, right_ptr);
                parent.mark_dirty(&self.cache);
            }

            log::debug!(
                "split node at idx {idx} (leaf={is_leaf}): pivot={pivot}, right={right_ptr}"
            );

            if path.node(idx - 1).is_full() {
                idx -= 1;
                continue;
            }
            return Ok(());
        }
    }

    fn collapse_cascade(&self, path: &mut Path, mut idx: usize) -> Result<()> {
        loop {
            if idx == 0 {
                path.node_mut(0).set_node_type(NodeType::Leaf);
                path.node_mut(0).mark_dirty(&self.cache);
                log::debug!("collapsed root back to an empty leaf");
                return Ok(());
            }

            let node_ptr = path.node(idx).ptr();
            let parent_len = path.node(idx - 1).len();

            // `parent_len == 0` means the parent already has exactly one
            // child (the one we're collapsing away) and zero separator keys:
            // there is nothing to shift out of it, because removing its last
            // child leaves it with no children at all. Such a parent is
            // itself now empty and must be unlinked from its own parent in
            // turn (or, if it's the root, collapsed to an empty leaf). Any
            // other `parent_len` means the parent retains at least one other
            // live child after this removal, however many keys that leaves
            // it with, and the cascade stops here: a node's key count
            // reaching zero is not the same as it having zero children.
            if parent_len == 0 {
                debug_assert_eq!(path.node(idx - 1).child(0), node_ptr);
                log::debug!("inner node at idx {} lost its only child, cascading further", idx - 1);
                idx -= 1;
                continue;
            }

            let mut slot = None;
            for i in 0..=parent_len {
                if path.node(idx - 1).child(i) == node_ptr {
                    slot = Some(i);
                    break;
                }
            }
            let slot = slot.ok_or(Error::InvariantViolation(
                "parent's child slot did not match cursor's disk pointer during collapse",
            ))?;

            {
                let parent = path.node_mut(idx - 1);
                if slot == 0 {
                    parent.copy_keys_within(1..parent_len, 0);
                    parent.copy_slots_within(1..parent_len + 1, 0);
                } else {
                    parent.copy_keys_within(slot..parent_len, slot - 1);
                    parent.copy_slots_within(slot + 1..parent_len + 1, slot);
                }
                parent.set_len(parent_len - 1);
                parent.mark_dirty(&self.cache);
            }

            log::debug!("collapsed empty child at slot {slot} out of parent at idx {idx}");
            return Ok(());
        }
    }

    fn checkpoint_node(&self, ptr: DiskPointer) -> Result<DiskPointer> {
        let is_dirty = self.cache.is_dirty(ptr.offset);
        let node = Node::init(&self.cache, ptr, LatchMode::Exclusive);

        if node.is_inner() {
            let len = node.len();
            let mut new_children = Vec::with_capacity(len + 1);
            let mut child_changed = false;
            for i in 0..=len {
                let child_ptr = node.child(i);
                let new_child_ptr = self.checkpoint_node(child_ptr)?;
                child_changed |= new_child_ptr != child_ptr;
                new_children.push(new_child_ptr);
            }

            if !is_dirty && !child_changed {
                return Ok(node.ptr());
            }

            let mut copy = node.cow_copy(&self.cache, &self.alloc);
            for (i, child_ptr) in new_children.into_iter().enumerate() {
                copy.set_child(i, child_ptr);
            }
            copy.set_flags(NodeFlags::FRESH_COW);
            log::trace!("checkpoint: copied inner node {} -> {}", ptr, copy.ptr());
            Ok(copy.ptr())
        } else {
            if !is_dirty {
                return Ok(node.ptr());
            }

            let mut copy = node.cow_copy(&self.cache, &self.alloc);
            copy.set_flags(NodeFlags::FRESH_COW);
            log::trace!("checkpoint: copied leaf {} -> {}", ptr, copy.ptr());
            Ok(copy.ptr())
        }
    }
}

fn insert_inner_slot(node: &mut Node, idx: usize, key: u64, right_child: DiskPointer) {
    let len = node.len();
    node.copy_keys_within(idx..len, idx + 1);
    node.copy_slots_within(idx + 1..len + 1, idx + 2);
    node.set_key(idx, key);
    node.set_child(idx + 1, right_child);
    node.set_len(len + 1);
}

impl OrderedTree for BTree {
    fn value_size(&self) -> usize {
        self.config.value_size()
    }

    fn insert(&self, key: u64, value: &[u8]) -> Result<()> {
        let mut path = self.traverse(key, LatchMode::Exclusive)?;
        let idx = path.cursor().binary_search(key);

        {
            let leaf = path.cursor_mut();
            let len = leaf.len();
            leaf.copy_keys_within(idx..len, idx + 1);
            leaf.copy_slots_within(idx + 1..len + 1, idx + 2);
            leaf.set_key(idx, key);
            leaf.set_value(idx, value);
            leaf.set_len(len + 1);
        }
        path.cursor().mark_dirty(&self.cache);

        log::trace!("insert {key} at index {idx}");

        if path.cursor().is_full() {
            self.split_cascade(&mut path, path.len() - 1)?;
        }

        Ok(())
    }

    fn bulk_insert(&self, kvs: &[Kvp]) -> Result<()> {
        for kv in kvs {
            self.insert(kv.key, &kv.value)?;
        }
        Ok(())
    }

    fn delete(&self, key: u64) -> Result<Option<Vec<u8>>> {
        let mut path = self.traverse(key, LatchMode::Exclusive)?;
        let idx = path.cursor().binary_search(key);
        let len = path.cursor().len();

        if idx >= len || path.cursor().key(idx) != key {
            log::trace!("delete {key}: not found");
            return Ok(None);
        }

        let removed = path.cursor().value(idx, self.value_size()).to_vec();

        {
            let leaf = path.cursor_mut();
            leaf.copy_keys_within(idx + 1..len, idx);
            leaf.copy_slots_within(idx + 2..len + 1, idx + 1);
            leaf.set_len(len - 1);
        }
        path.cursor().mark_dirty(&self.cache);

        log::trace!("delete {key} at index {idx}");

        if path.cursor().is_empty() {
            self.collapse_cascade(&mut path, path.len() - 1)?;
        }

        Ok(Some(removed))
    }

    fn find(&self, key: u64) -> Result<Option<Vec<u8>>> {
        let path = self.traverse(key, LatchMode::Shared)?;
        let leaf = path.cursor();
        let idx = leaf.binary_search(key);
        if idx >= leaf.len() || leaf.key(idx) != key {
            return Ok(None);
        }
        Ok(Some(leaf.value(idx, self.value_size()).to_vec()))
    }

    fn ge(&self, key: u64) -> Result<Option<Kvp>> {
        let path = self.traverse(key, LatchMode::Shared)?;
        let leaf = path.cursor();
        let idx = leaf.binary_search(key);
        if idx >= leaf.len() {
            return Ok(None);
        }
        Ok(Some(Kvp {
            key: leaf.key(idx),
            value: leaf.value(idx, self.value_size()).to_vec(),
        }))
    }

    fn range_query(&self, low: u64, high: u64, max: usize) -> Result<Vec<Kvp>> {
        let mut results = Vec::new();
        if low > high || max == 0 {
            return Ok(results);
        }

        let mut cursor = low;
        loop {
            if results.len() >= max {
                break;
            }

            let path = self.traverse(cursor, LatchMode::Shared)?;
            let leaf = path.cursor();
            let len = leaf.len();
            let mut i = leaf.binary_search(cursor);

            // `cursor` is past every key this leaf holds: since traversal
            // always lands on the leaf that would contain it, that can only
            // happen once the rightmost leaf in range is exhausted. Without
            // this, `leaf.key(len - 1) + 1` below would recompute the same
            // stale `cursor` forever.
            if i == len {
                break;
            }

            let mut stopped_past_high = false;

            while i < len && results.len() < max {
                let key = leaf.key(i);
                if key > high {
                    stopped_past_high = true;
                    break;
                }
                results.push(Kvp {
                    key,
                    value: leaf.value(i, self.value_size()).to_vec(),
                });
                i += 1;
            }

            if stopped_past_high || results.len() >= max || len == 0 {
                break;
            }

            match leaf.key(len - 1).checked_add(1) {
                Some(next) if next <= high => cursor = next,
                _ => break,
            }
        }

        Ok(results)
    }

    fn checkpoint(&self) -> Result<DiskPointer> {
        let new_root = self.checkpoint_node(self.root())?;
        *self.root.write() = new_root;
        self.cache.clear_dirty();
        log::info!("checkpoint complete, new root {new_root}");
        Ok(new_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeConfig;
    use test_log::test;

    fn new_tree(value_size: usize) -> BTree {
        let cache = Arc::new(BufferCache::new());
        let alloc = Arc::new(BlockAllocator::new());
        let config = TreeConfig::new(value_size).unwrap();
        BTree::create(cache, alloc, config)
    }

    #[test]
    fn find_after_insert() {
        let tree = new_tree(24);
        tree.insert(42, &[1u8; 24]).unwrap();
        assert_eq!(tree.find(42).unwrap(), Some(vec![1u8; 24]));
        assert_eq!(tree.find(43).unwrap(), None);
    }

    #[test]
    fn ascending_insert_past_one_leaf_splits() {
        let tree = new_tree(24);
        for i in 1..=(MAX_KEYS as u64 + 1) {
            tree.insert(i, &[(i % 256) as u8; 24]).unwrap();
        }
        for i in 1..=(MAX_KEYS as u64 + 1) {
            assert_eq!(tree.find(i).unwrap(), Some(vec![(i % 256) as u8; 24]));
        }
        assert_eq!(tree.find(MAX_KEYS as u64 + 2).unwrap(), None);
        assert!(tree.cache.latches_balanced());
    }

    #[test]
    fn delete_removes_key_and_leaves_tree_consistent() {
        let tree = new_tree(8);
        for i in 1..=10u64 {
            tree.insert(i, &i.to_be_bytes()).unwrap();
        }
        assert_eq!(tree.delete(5).unwrap(), Some(5u64.to_be_bytes().to_vec()));
        assert_eq!(tree.find(5).unwrap(), None);
        assert_eq!(tree.delete(5).unwrap(), None);
        for i in [1, 2, 3, 4, 6, 7, 8, 9, 10] {
            assert_eq!(tree.find(i).unwrap(), Some((i as u64).to_be_bytes().to_vec()));
        }
    }

    #[test]
    fn deleting_every_key_collapses_root_back_to_empty_leaf() {
        let tree = new_tree(8);
        for i in 1..=50u64 {
            tree.insert(i, &i.to_be_bytes()).unwrap();
        }
        for i in 1..=50u64 {
            tree.delete(i).unwrap();
        }
        assert_eq!(tree.find(1).unwrap(), None);
        assert!(tree.cache.latches_balanced());
    }

    #[test]
    fn emptying_parents_last_child_leaf_keeps_sibling_subtree_reachable() {
        let tree = new_tree(8);
        for i in 1..=2000u64 {
            tree.insert(i, &i.to_be_bytes()).unwrap();
        }
        // Ascending insert past MAX_KEYS splits exactly once here, giving a
        // two-leaf tree: leaf1 holds 1..=818, leaf2 (the parent's rightmost,
        // i.e. last, child) holds 819..=2000.
        for i in 819..=2000u64 {
            assert_eq!(tree.delete(i).unwrap(), Some(i.to_be_bytes().to_vec()));
        }
        assert!(tree.cache.latches_balanced());

        // leaf1's subtree must still be fully reachable through the parent,
        // which now has one live child and zero separator keys.
        for i in 1..=818u64 {
            assert_eq!(tree.find(i).unwrap(), Some(i.to_be_bytes().to_vec()));
        }
        for i in 819..=2000u64 {
            assert_eq!(tree.find(i).unwrap(), None);
        }

        let results = tree.range_query(1, 818, 2000).unwrap();
        assert_eq!(results.len(), 818);
        assert_eq!(results.first().unwrap().key, 1);
        assert_eq!(results.last().unwrap().key, 818);

        // Emptying the last remaining leaf too must cascade all the way to
        // the root without an arithmetic underflow, collapsing it back to an
        // empty leaf.
        for i in 1..=818u64 {
            tree.delete(i).unwrap();
        }
        assert!(tree.cache.latches_balanced());
        for i in 1..=2000u64 {
            assert_eq!(tree.find(i).unwrap(), None);
        }
        assert_eq!(tree.range_query(0, u64::MAX, 100).unwrap(), vec![]);
    }

    #[test]
    fn range_query_returns_ascending_inclusive_range() {
        let tree = new_tree(8);
        for i in 1..=2000u64 {
            tree.insert(i, &i.to_be_bytes()).unwrap();
        }
        for i in (1..=2000u64).step_by(2) {
            tree.delete(i).unwrap();
        }

        let results = tree.range_query(1, 2000, 2000).unwrap();
        assert_eq!(results.len(), 1000);
        for (expected, kv) in (2..=2000u64).step_by(2).zip(results.iter()) {
            assert_eq!(kv.key, expected);
        }
    }

    #[test]
    fn range_query_with_high_beyond_max_key_terminates() {
        let tree = new_tree(8);
        tree.insert(5, &5u64.to_be_bytes()).unwrap();

        let results = tree.range_query(0, 100, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, 5);
    }

    #[test]
    fn range_query_with_high_past_multi_leaf_tree_terminates() {
        let tree = new_tree(8);
        for i in 1..=5000u64 {
            tree.insert(i, &i.to_be_bytes()).unwrap();
        }

        let results = tree.range_query(4000, u64::MAX, usize::MAX).unwrap();
        assert_eq!(results.len(), 1001);
        assert_eq!(results.first().unwrap().key, 4000);
        assert_eq!(results.last().unwrap().key, 5000);
    }

    #[test]
    fn bulk_insert_then_range_query() {
        let tree = new_tree(8);
        let kvs: Vec<Kvp> = (1..=10_000u64)
            .map(|k| Kvp {
                key: k,
                value: k.to_be_bytes().to_vec(),
            })
            .collect();
        tree.bulk_insert(&kvs).unwrap();

        let results = tree.range_query(2001, 7000, 5000).unwrap();
        assert_eq!(results.len(), 5000);
        assert_eq!(results.first().unwrap().key, 2001);
        assert_eq!(results.last().unwrap().key, 7000);
    }

    #[test]
    fn checkpoint_is_idempotent_with_no_interleaved_writes() {
        let tree = new_tree(8);
        for i in 1..=5000u64 {
            tree.insert(i, &i.to_be_bytes()).unwrap();
        }
        let first = tree.checkpoint().unwrap();
        let second = tree.checkpoint().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn checkpoint_survives_reinit_from_returned_root() {
        let cache = Arc::new(BufferCache::new());
        let alloc = Arc::new(BlockAllocator::new());
        let config = TreeConfig::new(8).unwrap();
        let tree = BTree::create(cache.clone(), alloc.clone(), config);

        for i in 1..=2000u64 {
            tree.insert(i, &i.to_be_bytes()).unwrap();
        }
        let root = tree.checkpoint().unwrap();

        let reopened = BTree::init(cache, alloc, root, config);
        for i in 1..=2000u64 {
            assert_eq!(reopened.find(i).unwrap(), Some(i.to_be_bytes().to_vec()));
        }
    }
}
