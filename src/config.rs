// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{Error, Result, MAX_VALUE_SIZE};

/// Configuration for a single [`crate::BTree`]
///
/// Mirrors `btree_init`'s contract from the original implementation: the
/// only thing a tree needs to know besides its root pointer is the width of
/// the values it stores.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TreeConfig {
    pub(crate) value_size: usize,
}

impl TreeConfig {
    /// Creates a new config, rejecting value sizes above [`MAX_VALUE_SIZE`]
    pub fn new(value_size: usize) -> Result<Self> {
        if value_size > MAX_VALUE_SIZE {
            return Err(Error::CapacityExceeded {
                requested: value_size,
                max: MAX_VALUE_SIZE,
            });
        }

        Ok(Self { value_size })
    }

    /// The configured value width in bytes
    #[must_use]
    pub fn value_size(&self) -> usize {
        self.value_size
    }
}

/// How a full WAL is applied to the underlying tree on flush
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Apply each buffered entry with a point insert
    #[default]
    PointInserts,
    /// Apply the whole sorted buffer as a single `bulk_insert`
    Bulk,
}

/// Configuration for the WAL fronting a [`crate::VirtualTree`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WalConfig {
    pub(crate) capacity: usize,
    pub(crate) flush_mode: FlushMode,
}

impl WalConfig {
    /// `VTREE_WALSIZE` (64 KiB) worth of `(key, value)` entries for the
    /// given value size, matching the original's
    /// `malloc(VTREE_WALSIZE)` sizing of `v_wal`.
    #[must_use]
    pub fn with_byte_budget(byte_budget: usize, value_size: usize) -> Self {
        let entry_size = std::mem::size_of::<u64>() + value_size;
        let capacity = (byte_budget / entry_size.max(1)).max(1);
        Self {
            capacity,
            flush_mode: FlushMode::default(),
        }
    }

    /// Sets the flush mode (point inserts vs. one bulk insert)
    #[must_use]
    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    /// Number of entries the WAL can hold before it must flush
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// How a full WAL gets applied to the underlying tree
    #[must_use]
    pub fn flush_mode(&self) -> FlushMode {
        self.flush_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn rejects_oversized_value() {
        assert!(TreeConfig::new(MAX_VALUE_SIZE + 1).is_err());
    }

    #[test]
    fn accepts_max_value_size() {
        assert!(TreeConfig::new(MAX_VALUE_SIZE).is_ok());
    }

    #[test]
    fn wal_capacity_from_byte_budget() {
        let cfg = WalConfig::with_byte_budget(64 * 1024, 24);
        assert_eq!(cfg.capacity(), (64 * 1024) / (8 + 24));
    }
}
