// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{DiskPointer, PointerFlags, PAGE_SIZE};
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out monotonically increasing disk offsets in [`PAGE_SIZE`] units
///
/// Ported from `allocate_blk` in the original buffer-cache simulation: there
/// is no freeing. Copy-on-write semantics mean an old block is never reused
/// within the life of the process, so a bare atomic counter is all that is
/// needed.
#[derive(Debug, Default)]
pub struct BlockAllocator {
    next_page: AtomicU64,
}

impl BlockAllocator {
    /// Creates a fresh allocator starting at page 0
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_page: AtomicU64::new(0),
        }
    }

    /// Allocates `size_bytes` worth of contiguous pages, rounding up, and
    /// returns a pointer tagged with `flags` at `epoch` 0
    pub fn allocate(&self, size_bytes: u64, flags: PointerFlags) -> DiskPointer {
        let pages = size_bytes.div_ceil(PAGE_SIZE as u64);
        let offset = self.next_page.fetch_add(pages, Ordering::Relaxed);

        DiskPointer {
            offset,
            size: pages,
            epoch: 0,
            flags,
        }
    }

    /// Resets the allocator to page 0
    ///
    /// Used between test phases, mirroring `reset_buf_cache`'s counter
    /// reset in the original implementation.
    pub fn reset(&self) {
        self.next_page.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn allocates_monotonically_and_rounds_up_to_pages() {
        let alloc = BlockAllocator::new();

        let a = alloc.allocate(PAGE_SIZE as u64 + 1, PointerFlags::DATA);
        assert_eq!(a.offset, 0);
        assert_eq!(a.size, 2);

        let b = alloc.allocate(PAGE_SIZE as u64, PointerFlags::DATA);
        assert_eq!(b.offset, 2);
        assert_eq!(b.size, 1);
    }

    #[test]
    fn reset_rewinds_counter() {
        let alloc = BlockAllocator::new();
        alloc.allocate(PAGE_SIZE as u64, PointerFlags::DATA);
        alloc.reset();
        let a = alloc.allocate(PAGE_SIZE as u64, PointerFlags::DATA);
        assert_eq!(a.offset, 0);
    }
}
