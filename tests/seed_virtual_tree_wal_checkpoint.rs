use bp_tree::{BTree, BlockAllocator, BufferCache, OrderedTree, TreeConfig, VirtualTree, WalConfig};
use std::sync::Arc;
use test_log::test;

#[test]
fn wal_fronted_inserts_become_visible_and_durable_after_checkpoint() -> bp_tree::Result<()> {
    let cache = Arc::new(BufferCache::new());
    let alloc = Arc::new(BlockAllocator::new());
    let tree = BTree::create(cache.clone(), alloc.clone(), TreeConfig::new(8)?);

    let wal_config = WalConfig::with_byte_budget(bp_tree::VTREE_WALSIZE, 8);
    let mut vtree = VirtualTree::with_wal(tree, wal_config);

    for key in 0..10_000u64 {
        vtree.insert(key, &key.to_be_bytes())?;
    }

    vtree.checkpoint()?;
    assert_eq!(vtree.wal_len(), 0);

    for key in 0..10_000u64 {
        assert_eq!(vtree.find(key)?, Some(key.to_be_bytes().to_vec()));
    }

    Ok(())
}
