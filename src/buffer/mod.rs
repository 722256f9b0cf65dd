// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod lru;

use lru::{Access, LruList};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Mode to latch a [`Buffer`] in, mirroring `LK_SHARED`/`LK_EXCLUSIVE`
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LatchMode {
    /// Multiple readers may hold the latch concurrently
    Shared,
    /// Exactly one writer may hold the latch
    Exclusive,
}

type BufferData = RwLock<Vec<u8>>;

struct Inner {
    buffers: HashMap<u64, Arc<BufferData>>,
    dirty: HashSet<u64>,
    lru: LruList<u64>,
}

/// Number of entries tracked for hit/miss accounting ("LRU_CAPACITY")
pub const LRU_CAPACITY: usize = 10_000;

/// Simulated device throughput in bytes/second, used only when the
/// `disk_latency` feature is enabled
pub const THROUGHPUT: u64 = 2 * 1024 * 1024 * 1024;

/// Snapshot of buffer cache accounting counters
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Latches acquired over the cache's lifetime
    pub acquires: u64,
    /// Latches released over the cache's lifetime
    pub releases: u64,
    /// LRU hits (buffer was already tracked as hot)
    pub hits: u64,
    /// LRU misses (buffer was cold; induces simulated latency if enabled)
    pub misses: u64,
    /// Number of buffers currently marked dirty
    pub dirty_count: usize,
}

/// Maps disk-pointer offsets to in-memory buffers
///
/// The only concurrency primitive the B+tree engine sees: a buffer's latch
/// (shared/exclusive reader-writer lock) is acquired and released through
/// this cache. The map never evicts a cached buffer — this is a RAM-backed
/// simulation of a real buffer pool, not one — but it does track recency of
/// access for hit/miss statistics, and will optionally sleep on a miss to
/// simulate device latency (`disk_latency` feature).
pub struct BufferCache {
    inner: Mutex<Inner>,
    acquires: AtomicU64,
    releases: Arc<AtomicU64>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for BufferCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferCache {
    /// Creates an empty buffer cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffers: HashMap::new(),
                dirty: HashSet::new(),
                lru: LruList::with_capacity(LRU_CAPACITY),
            }),
            acquires: AtomicU64::new(0),
            releases: Arc::new(AtomicU64::new(0)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Resolves `offset` to a buffer of `size_bytes`, zero-allocating it on
    /// first reference, then latches it in `mode`
    pub fn get(&self, offset: u64, size_bytes: usize, mode: LatchMode) -> BufferGuard {
        let (buffer, access) = {
            let mut inner = self.inner.lock().expect("buffer cache lock poisoned");
            let access = inner.lru.access(offset);

            match access {
                Access::Hit => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                Access::Miss => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                }
            }

            let buffer = inner
                .buffers
                .entry(offset)
                .or_insert_with(|| Arc::new(RwLock::new(vec![0u8; size_bytes])))
                .clone();

            (buffer, access)
        };

        #[cfg(feature = "disk_latency")]
        if access == Access::Miss {
            let secs = size_bytes as f64 / THROUGHPUT as f64;
            std::thread::sleep(std::time::Duration::from_secs_f64(secs));
        }
        #[cfg(not(feature = "disk_latency"))]
        let _ = access;

        self.lock(buffer, offset, mode)
    }

    fn lock(&self, buffer: Arc<BufferData>, offset: u64, mode: LatchMode) -> BufferGuard {
        self.acquires.fetch_add(1, Ordering::Relaxed);
        let releases = self.releases.clone();

        match mode {
            LatchMode::Shared => BufferGuard::Shared {
                offset,
                guard: parking_lot::RwLock::read_arc(&buffer),
                releases,
            },
            LatchMode::Exclusive => BufferGuard::Exclusive {
                offset,
                guard: parking_lot::RwLock::write_arc(&buffer),
                releases,
            },
        }
    }

    /// Allocates a brand-new, already-exclusively-latched buffer for `offset`
    ///
    /// Used by `Node::create`: the offset is freshly minted by the
    /// [`crate::BlockAllocator`] so there can be no existing entry.
    pub fn create(&self, offset: u64, size_bytes: usize) -> BufferGuard {
        let mut inner = self.inner.lock().expect("buffer cache lock poisoned");
        inner.lru.access(offset);
        let buffer = inner
            .buffers
            .entry(offset)
            .or_insert_with(|| Arc::new(RwLock::new(vec![0u8; size_bytes])))
            .clone();
        drop(inner);

        self.lock(buffer, offset, LatchMode::Exclusive)
    }

    /// Marks `offset` dirty (pending a checkpoint)
    pub fn dirty(&self, offset: u64) {
        let mut inner = self.inner.lock().expect("buffer cache lock poisoned");
        inner.dirty.insert(offset);
    }

    /// Removes `offset` from the dirty set (checkpoint has persisted it)
    pub fn clean(&self, offset: u64) {
        let mut inner = self.inner.lock().expect("buffer cache lock poisoned");
        inner.dirty.remove(&offset);
    }

    /// Returns a snapshot of the dirty set, consumed only by checkpoint
    pub fn dirty_set(&self) -> Vec<u64> {
        let inner = self.inner.lock().expect("buffer cache lock poisoned");
        inner.dirty.iter().copied().collect()
    }

    /// Whether `offset` is currently marked dirty
    #[must_use]
    pub fn is_dirty(&self, offset: u64) -> bool {
        let inner = self.inner.lock().expect("buffer cache lock poisoned");
        inner.dirty.contains(&offset)
    }

    /// Clears the entire dirty set in one step, used once a checkpoint walk completes
    pub fn clear_dirty(&self) {
        let mut inner = self.inner.lock().expect("buffer cache lock poisoned");
        inner.dirty.clear();
    }

    /// Frees every buffer and rewinds LRU tracking
    ///
    /// Does **not** reset the [`crate::BlockAllocator`]; callers that want
    /// a fully clean slate should reset both.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("buffer cache lock poisoned");
        inner.buffers.clear();
        inner.dirty.clear();
        inner.lru = LruList::with_capacity(LRU_CAPACITY);
    }

    /// `true` if every acquired latch has since been released
    #[must_use]
    pub fn latches_balanced(&self) -> bool {
        self.acquires.load(Ordering::Relaxed) == self.releases.load(Ordering::Relaxed)
    }

    /// Snapshot of cache accounting counters
    #[must_use]
    pub fn stats(&self) -> Stats {
        let dirty_count = self
            .inner
            .lock()
            .expect("buffer cache lock poisoned")
            .dirty
            .len();

        Stats {
            acquires: self.acquires.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            dirty_count,
        }
    }
}

/// A latched view onto a buffer's bytes
///
/// Released on `Drop`, the same guard/defer idiom the engine's
/// [`crate::path::Path`] relies on to release every latch it holds on every
/// exit path (success, `NotFound`, or panic).
pub enum BufferGuard {
    /// Shared (read) latch
    Shared {
        /// The disk offset this buffer is for
        offset: u64,
        guard: ArcRwLockReadGuard<RawRwLock, Vec<u8>>,
        releases: Arc<AtomicU64>,
    },
    /// Exclusive (write) latch
    Exclusive {
        /// The disk offset this buffer is for
        offset: u64,
        guard: ArcRwLockWriteGuard<RawRwLock, Vec<u8>>,
        releases: Arc<AtomicU64>,
    },
}

impl BufferGuard {
    /// The disk offset this buffer is for
    #[must_use]
    pub fn offset(&self) -> u64 {
        match self {
            Self::Shared { offset, .. } | Self::Exclusive { offset, .. } => *offset,
        }
    }

    /// Whether this guard holds an exclusive latch
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive { .. })
    }

    /// Read-only access to the buffer's bytes
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Shared { guard, .. } => guard,
            Self::Exclusive { guard, .. } => guard,
        }
    }

    /// Mutable access to the buffer's bytes
    ///
    /// # Panics
    ///
    /// Panics if this guard only holds a shared latch — callers must
    /// request [`LatchMode::Exclusive`] up front, the same way the original
    /// buffer cache requires `LK_EXCLUSIVE` before any write.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Exclusive { guard, .. } => guard,
            Self::Shared { .. } => {
                panic!("attempted to mutate a buffer latched only in shared mode")
            }
        }
    }
}

impl Drop for BufferGuard {
    fn drop(&mut self) {
        let releases = match self {
            Self::Shared { releases, .. } | Self::Exclusive { releases, .. } => releases,
        };
        releases.fetch_add(1, Ordering::Relaxed);
    }
}
