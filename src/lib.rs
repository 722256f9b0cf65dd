// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A disk-oriented, copy-on-write B+tree storage engine over a simulated
//! buffer cache.
//!
//! ##### NOTE
//!
//! > This crate implements the core of a storage engine, not a full
//! > database. The buffer cache is a RAM-backed simulation — nothing here
//! > ever touches a real file — and the WAL fronting [`VirtualTree`] is a
//! > write-coalescing buffer, not a durability log.
//!
//! ##### About
//!
//! [`BTree`] maps 64-bit unsigned keys to fixed-width values (up to
//! [`MAX_VALUE_SIZE`] bytes) on top of a [`BufferCache`] of 64 KiB nodes.
//! Every node is reached only through a [`DiskPointer`], never a direct
//! in-memory reference, and every mutating operation that overflows a node
//! resolves by splitting (insert) or collapsing (delete) up the path it
//! traversed to get there. [`BTree::checkpoint`] takes an immutable
//! snapshot by copying every node touched since the last checkpoint to a
//! fresh block and rewriting ancestor pointers, so a reader holding an
//! older root pointer keeps seeing a consistent earlier snapshot.
//!
//! [`VirtualTree`] wraps any [`OrderedTree`] with an optional bounded,
//! sorted, in-memory write buffer (a WAL, in the write-coalescing sense
//! only) that batches small writes into one flush.
//!
//! # Example usage
//!
//! ```
//! use bp_tree::{BTree, BufferCache, BlockAllocator, OrderedTree, TreeConfig};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(BufferCache::new());
//! let alloc = Arc::new(BlockAllocator::new());
//! let tree = BTree::create(cache, alloc, TreeConfig::new(8)?);
//!
//! tree.insert(42, &42u64.to_be_bytes())?;
//! assert_eq!(tree.find(42)?, Some(42u64.to_be_bytes().to_vec()));
//! # Ok::<(), bp_tree::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate
)]

mod alloc;
mod btree;
mod buffer;
mod coding;
mod config;
mod disk_ptr;
mod error;
mod node;
mod path;
mod vtree;

pub use alloc::BlockAllocator;
pub use btree::{BTree, Kvp, OrderedTree};
pub use buffer::{BufferCache, BufferGuard, LatchMode, Stats as BufferStats};
pub use coding::{Decode, DecodeError, Encode, EncodeError};
pub use config::{FlushMode, TreeConfig, WalConfig};
pub use disk_ptr::{DiskPointer, PointerFlags};
pub use error::{Error, Result};
pub use node::{NodeFlags, NodeType};
pub use path::Path;
pub use vtree::VirtualTree;

/// Page size in bytes: the block allocator's unit of allocation
pub const PAGE_SIZE: usize = 4 * 1024;

/// Block size in bytes: the size of a node, always a whole number of pages
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Maximum number of keys a single node may hold before it must split
pub const MAX_KEYS: usize = 1636;

/// Key count a split leaves on each side of a leaf (half of [`MAX_KEYS`])
pub const SPLIT_KEYS: usize = MAX_KEYS / 2;

/// Maximum depth of a traversal path, root to leaf
pub const MAX_PATH: usize = 10;

/// Maximum width, in bytes, of a stored value
pub const MAX_VALUE_SIZE: usize = 32;

/// Default byte budget for a WAL-fronted [`VirtualTree`]'s write buffer
pub const VTREE_WALSIZE: usize = 64 * 1024;
