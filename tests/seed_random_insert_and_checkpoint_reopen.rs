use bp_tree::{BTree, BlockAllocator, BufferCache, OrderedTree, TreeConfig};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;
use test_log::test;

#[test]
fn random_inserts_survive_checkpoint_and_reopen() -> bp_tree::Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(0xC0FFEE);

    let mut keys: Vec<u64> = (1..=100_000u64).collect();
    keys.shuffle(&mut rng);

    let cache = Arc::new(BufferCache::new());
    let alloc = Arc::new(BlockAllocator::new());
    let tree = BTree::create(cache.clone(), alloc.clone(), TreeConfig::new(8)?);

    let mut inserted: Vec<u64> = Vec::with_capacity(keys.len());
    for &key in &keys {
        tree.insert(key, &key.to_be_bytes())?;
        inserted.push(key);

        // Loop invariant: the just-inserted key and ten previously inserted
        // keys must all still be findable.
        assert_eq!(tree.find(key)?, Some(key.to_be_bytes().to_vec()));
        for &prior in inserted.iter().rev().skip(1).take(10) {
            assert_eq!(tree.find(prior)?, Some(prior.to_be_bytes().to_vec()));
        }
    }

    let root = tree.checkpoint()?;
    let reopened = BTree::init(cache, alloc, root, TreeConfig::new(8)?);

    let distinct: HashSet<u64> = keys.iter().copied().collect();
    assert_eq!(distinct.len(), keys.len(), "seed must produce distinct keys");

    for &key in &keys {
        assert_eq!(reopened.find(key)?, Some(key.to_be_bytes().to_vec()));
    }

    Ok(())
}
