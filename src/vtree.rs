// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::btree::{Kvp, OrderedTree};
use crate::config::{FlushMode, WalConfig};
use crate::{DiskPointer, Result};

/// A thin façade over any [`OrderedTree`], optionally fronted by a bounded,
/// sorted, in-memory write-coalescing buffer (WAL)
///
/// The WAL is not internally synchronized: per the single-writer contract,
/// `insert`/`checkpoint` take `&mut self`, which lets the borrow checker
/// enforce serialized access at compile time rather than with a runtime
/// lock. Read operations (`find`, `ge`, `range_query`, `delete`) never touch
/// the WAL and stay on `&self` — they delegate straight to the underlying
/// tree, and so do not observe WAL-buffered writes until the next flush.
pub struct VirtualTree<T: OrderedTree> {
    tree: T,
    wal: Vec<Kvp>,
    wal_config: Option<WalConfig>,
}

impl<T: OrderedTree> VirtualTree<T> {
    /// Creates a façade with no WAL: every write goes straight to `tree`
    pub fn new(tree: T) -> Self {
        Self {
            tree,
            wal: Vec::new(),
            wal_config: None,
        }
    }

    /// Creates a façade fronted by a WAL sized per `wal_config`
    #[must_use]
    pub fn with_wal(tree: T, wal_config: WalConfig) -> Self {
        Self {
            tree,
            wal: Vec::with_capacity(wal_config.capacity()),
            wal_config: Some(wal_config),
        }
    }

    /// Number of entries currently buffered in the WAL (0 if there is none)
    #[must_use]
    pub fn wal_len(&self) -> usize {
        self.wal.len()
    }

    /// Inserts `(key, value)`, buffering it in the WAL when one is configured
    pub fn insert(&mut self, key: u64, value: &[u8]) -> Result<()> {
        let Some(cfg) = self.wal_config else {
            return self.tree.insert(key, value);
        };

        if self.wal.len() == cfg.capacity() {
            self.flush()?;
        }

        wal_insert(&mut self.wal, key, value);
        Ok(())
    }

    /// Applies each buffered WAL entry to the underlying tree and empties it
    fn flush(&mut self) -> Result<()> {
        let Some(cfg) = self.wal_config else {
            return Ok(());
        };

        if self.wal.is_empty() {
            return Ok(());
        }

        log::debug!("flushing {} WAL entries ({:?})", self.wal.len(), cfg.flush_mode());

        match cfg.flush_mode() {
            FlushMode::Bulk => self.tree.bulk_insert(&self.wal)?,
            FlushMode::PointInserts => {
                for kv in &self.wal {
                    self.tree.insert(kv.key, &kv.value)?;
                }
            }
        }

        self.wal.clear();
        Ok(())
    }

    /// Bulk-inserts directly into the underlying tree (bypasses the WAL, as
    /// a batch is already exactly what a flush would have produced)
    pub fn bulk_insert(&self, kvs: &[Kvp]) -> Result<()> {
        self.tree.bulk_insert(kvs)
    }

    /// Deletes `key`; does not consult the WAL (see struct-level docs)
    pub fn delete(&self, key: u64) -> Result<Option<Vec<u8>>> {
        self.tree.delete(key)
    }

    /// Finds `key`; does not consult the WAL (see struct-level docs)
    pub fn find(&self, key: u64) -> Result<Option<Vec<u8>>> {
        self.tree.find(key)
    }

    /// Finds the least key `>= key`; does not consult the WAL
    pub fn ge(&self, key: u64) -> Result<Option<Kvp>> {
        self.tree.ge(key)
    }

    /// Range-scans `[low, high]`; does not consult the WAL
    pub fn range_query(&self, low: u64, high: u64, max: usize) -> Result<Vec<Kvp>> {
        self.tree.range_query(low, high, max)
    }

    /// Flushes the WAL, then checkpoints the underlying tree
    pub fn checkpoint(&mut self) -> Result<DiskPointer> {
        self.flush()?;
        self.tree.checkpoint()
    }

    /// Access to the wrapped tree, e.g. to reopen it after a checkpoint
    pub fn inner(&self) -> &T {
        &self.tree
    }
}

/// Sorted insert/overwrite into the WAL buffer
fn wal_insert(wal: &mut Vec<Kvp>, key: u64, value: &[u8]) {
    match wal.binary_search_by_key(&key, |kv| kv.key) {
        Ok(pos) => wal[pos].value = value.to_vec(),
        Err(pos) => wal.insert(
            pos,
            Kvp {
                key,
                value: value.to_vec(),
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::BlockAllocator;
    use crate::buffer::BufferCache;
    use crate::btree::BTree;
    use crate::config::TreeConfig;
    use std::sync::Arc;
    use test_log::test;

    fn new_vtree(wal_config: Option<WalConfig>) -> VirtualTree<BTree> {
        let cache = Arc::new(BufferCache::new());
        let alloc = Arc::new(BlockAllocator::new());
        let config = TreeConfig::new(8).unwrap();
        let tree = BTree::create(cache, alloc, config);
        match wal_config {
            Some(cfg) => VirtualTree::with_wal(tree, cfg),
            None => VirtualTree::new(tree),
        }
    }

    #[test]
    fn without_wal_writes_are_immediately_visible() {
        let mut vt = new_vtree(None);
        vt.insert(1, &1u64.to_be_bytes()).unwrap();
        assert_eq!(vt.find(1).unwrap(), Some(1u64.to_be_bytes().to_vec()));
    }

    #[test]
    fn wal_coalesces_and_flush_makes_writes_visible() {
        let cfg = WalConfig::with_byte_budget(64 * 1024, 8).with_flush_mode(FlushMode::PointInserts);
        let mut vt = new_vtree(Some(cfg));

        vt.insert(7, &7u64.to_be_bytes()).unwrap();
        assert_eq!(vt.wal_len(), 1);
        assert_eq!(vt.find(7).unwrap(), None, "WAL writes are not yet visible");

        vt.checkpoint().unwrap();
        assert_eq!(vt.wal_len(), 0);
        assert_eq!(vt.find(7).unwrap(), Some(7u64.to_be_bytes().to_vec()));
    }

    #[test]
    fn wal_overwrites_same_key_instead_of_duplicating() {
        let cfg = WalConfig::with_byte_budget(64 * 1024, 8);
        let mut vt = new_vtree(Some(cfg));

        vt.insert(3, &3u64.to_be_bytes()).unwrap();
        vt.insert(3, &30u64.to_be_bytes()).unwrap();
        assert_eq!(vt.wal_len(), 1);

        vt.checkpoint().unwrap();
        assert_eq!(vt.find(3).unwrap(), Some(30u64.to_be_bytes().to_vec()));
    }

    #[test]
    fn full_wal_flushes_before_accepting_more_inserts() {
        let cfg = WalConfig::with_byte_budget(64 * 1024, 8);
        let capacity = cfg.capacity();
        let mut vt = new_vtree(Some(cfg));

        for i in 0..10_000u64 {
            vt.insert(i, &i.to_be_bytes()).unwrap();
            assert!(vt.wal_len() <= capacity);
        }

        vt.checkpoint().unwrap();
        assert_eq!(vt.wal_len(), 0);
        for i in 0..10_000u64 {
            assert_eq!(vt.find(i).unwrap(), Some(i.to_be_bytes().to_vec()));
        }
    }
}
