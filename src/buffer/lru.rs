// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::collections::VecDeque;

/// A fixed-capacity, eviction-free "LRU" used purely for hit/miss
/// accounting on the buffer cache
///
/// Ported from `descriptor_table/lru.rs`'s `LruList`: it tracks recency of
/// `access()`, but (unlike a real LRU) it never evicts anything from the
/// buffer cache itself — the cache here is a RAM-backed simulation that
/// keeps every buffer for the process lifetime. This list only decides
/// whether an access counts as a hit or a (simulated-latency) miss.
pub struct LruList<T> {
    capacity: usize,
    order: VecDeque<T>,
}

/// Outcome of touching the LRU with a given key
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    /// Key was already tracked
    Hit,
    /// Key was not tracked (and may have evicted the least-recently-used
    /// tracked key to make room)
    Miss,
}

impl<T: Clone + Eq> LruList<T> {
    /// Creates a tracker with room for `capacity` keys
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Records an access to `key`, returning whether it was a hit or miss
    pub fn access(&mut self, key: T) -> Access {
        if let Some(pos) = self.order.iter().position(|k| k == &key) {
            self.order.remove(pos);
            self.order.push_back(key);
            return Access::Hit;
        }

        if self.order.len() == self.capacity {
            self.order.pop_front();
        }

        self.order.push_back(key);
        Access::Miss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn first_access_is_a_miss() {
        let mut lru = LruList::with_capacity(2);
        assert_eq!(lru.access(1), Access::Miss);
    }

    #[test]
    fn repeated_access_is_a_hit() {
        let mut lru = LruList::with_capacity(2);
        lru.access(1);
        assert_eq!(lru.access(1), Access::Hit);
    }

    #[test]
    fn evicts_least_recently_used_tracking_slot() {
        let mut lru = LruList::with_capacity(2);
        lru.access(1);
        lru.access(2);
        lru.access(3); // evicts 1's tracking slot
        assert_eq!(lru.access(1), Access::Miss);
        assert_eq!(lru.access(2), Access::Hit);
    }
}
