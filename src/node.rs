// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::buffer::{BufferCache, BufferGuard, LatchMode};
use crate::{BlockAllocator, DiskPointer, PointerFlags};
use crate::{Decode, Encode};
use byteorder::{BigEndian, ByteOrder};
use std::ops::Range;

/// Header length in bytes: `len:u32, type:u8, flags:u8, padding:u16`
pub const HEADER_LEN: usize = 8;

/// Width of a single child/value slot
pub const SLOT_SIZE: usize = crate::MAX_VALUE_SIZE;

const KEYS_BYTES: usize = crate::MAX_KEYS * 8;
const SLOTS_OFFSET: usize = HEADER_LEN + KEYS_BYTES;

/// Whether a node is a leaf (stores values) or inner (stores child pointers)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeType {
    Leaf = 0,
    Inner = 1,
}

impl NodeType {
    fn from_byte(b: u8) -> Self {
        if b == NodeType::Inner as u8 {
            NodeType::Inner
        } else {
            NodeType::Leaf
        }
    }
}

bitflags::bitflags! {
    /// Header flags used during checkpointing
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct NodeFlags: u8 {
        /// Block is part of an in-progress copy-on-write checkpoint
        const COW = 0b01;
        /// This node has already been copied during the current checkpoint walk
        const FRESH_COW = 0b10;
    }
}

/// An in-memory handle onto a latched 64 KiB node buffer
///
/// Bundles the buffer guard, the block's disk pointer, and typed accessors
/// over the header/key-array/slot-array layout described in `lib.rs`. Nodes
/// never hold references to other nodes — only [`DiskPointer`]s, resolved
/// fresh through the [`BufferCache`] on every traversal step.
pub struct Node {
    ptr: DiskPointer,
    guard: BufferGuard,
}

impl Node {
    /// Binds to the existing buffer for `ptr`, latching it in `mode`
    pub fn init(cache: &BufferCache, ptr: DiskPointer, mode: LatchMode) -> Self {
        let guard = cache.get(ptr.offset, ptr.byte_len() as usize, mode);
        Self { ptr, guard }
    }

    /// Allocates a fresh block and initializes it as an empty node of `node_type`
    pub fn create(cache: &BufferCache, alloc: &BlockAllocator, node_type: NodeType) -> Self {
        let ptr = alloc.allocate(crate::BLOCK_SIZE as u64, PointerFlags::DATA);
        let guard = cache.create(ptr.offset, crate::BLOCK_SIZE);
        cache.dirty(ptr.offset);
        let mut node = Self { ptr, guard };
        node.set_len(0);
        node.set_node_type(node_type);
        node.set_flags(NodeFlags::empty());
        node
    }

    /// This node's disk pointer
    #[must_use]
    pub fn ptr(&self) -> DiskPointer {
        self.ptr
    }

    /// Marks the underlying buffer dirty (pending the next checkpoint)
    pub fn mark_dirty(&self, cache: &BufferCache) {
        cache.dirty(self.ptr.offset);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        BigEndian::read_u32(&self.guard.bytes()[0..4]) as usize
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() == crate::MAX_KEYS
    }

    pub fn set_len(&mut self, len: usize) {
        BigEndian::write_u32(&mut self.guard.bytes_mut()[0..4], len as u32);
    }

    #[must_use]
    pub fn node_type(&self) -> NodeType {
        NodeType::from_byte(self.guard.bytes()[4])
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.guard.bytes_mut()[4] = node_type as u8;
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.node_type() == NodeType::Leaf
    }

    #[must_use]
    pub fn is_inner(&self) -> bool {
        self.node_type() == NodeType::Inner
    }

    #[must_use]
    pub fn flags(&self) -> NodeFlags {
        NodeFlags::from_bits_truncate(self.guard.bytes()[5])
    }

    pub fn set_flags(&mut self, flags: NodeFlags) {
        self.guard.bytes_mut()[5] = flags.bits();
    }

    fn key_offset(i: usize) -> usize {
        HEADER_LEN + i * 8
    }

    fn slot_offset(i: usize) -> usize {
        SLOTS_OFFSET + i * SLOT_SIZE
    }

    #[must_use]
    pub fn key(&self, i: usize) -> u64 {
        let off = Self::key_offset(i);
        BigEndian::read_u64(&self.guard.bytes()[off..off + 8])
    }

    pub fn set_key(&mut self, i: usize, key: u64) {
        let off = Self::key_offset(i);
        BigEndian::write_u64(&mut self.guard.bytes_mut()[off..off + 8], key);
    }

    /// Reads the first `value_size` bytes of leaf slot `i + 1`
    #[must_use]
    pub fn value(&self, i: usize, value_size: usize) -> &[u8] {
        let off = Self::slot_offset(i + 1);
        &self.guard.bytes()[off..off + value_size]
    }

    pub fn set_value(&mut self, i: usize, value: &[u8]) {
        let off = Self::slot_offset(i + 1);
        self.guard.bytes_mut()[off..off + value.len()].copy_from_slice(value);
    }

    /// Reads child slot `i` (inner nodes only) as a disk pointer
    #[must_use]
    pub fn child(&self, i: usize) -> DiskPointer {
        let off = Self::slot_offset(i);
        DiskPointer::decode_from(&mut &self.guard.bytes()[off..off + SLOT_SIZE])
            .expect("a child slot always holds a well-formed disk pointer")
    }

    pub fn set_child(&mut self, i: usize, ptr: DiskPointer) {
        let off = Self::slot_offset(i);
        let encoded = ptr.encode_into_vec();
        self.guard.bytes_mut()[off..off + encoded.len()].copy_from_slice(&encoded);
    }

    /// Lower-bound binary search: the smallest index `i` with `keys[i] >= key`,
    /// or `len()` if no such key exists
    #[must_use]
    pub fn binary_search(&self, key: u64) -> usize {
        let mut low = 0usize;
        let mut high = self.len();
        while low < high {
            let mid = low + (high - low) / 2;
            if self.key(mid) >= key {
                high = mid;
            } else {
                low = mid + 1;
            }
        }
        low
    }

    /// Shifts `keys[range]` to start at `dst_start` within this node (same-node move)
    pub fn copy_keys_within(&mut self, range: Range<usize>, dst_start: usize) {
        if range.start >= range.end {
            return;
        }
        let src = Self::key_offset(range.start)..Self::key_offset(range.end);
        let dst = Self::key_offset(dst_start);
        self.guard.bytes_mut().copy_within(src, dst);
    }

    /// Shifts `slots[range]` to start at `dst_start` within this node (same-node move)
    pub fn copy_slots_within(&mut self, range: Range<usize>, dst_start: usize) {
        if range.start >= range.end {
            return;
        }
        let src = Self::slot_offset(range.start)..Self::slot_offset(range.end);
        let dst = Self::slot_offset(dst_start);
        self.guard.bytes_mut().copy_within(src, dst);
    }

    /// Copies `other.keys[range]` into this node starting at `dst_start` (cross-node copy)
    pub fn copy_keys_from(&mut self, other: &Node, range: Range<usize>, dst_start: usize) {
        if range.start >= range.end {
            return;
        }
        let src = Self::key_offset(range.start)..Self::key_offset(range.end);
        let dst = Self::key_offset(dst_start);
        let len = src.end - src.start;
        self.guard.bytes_mut()[dst..dst + len].copy_from_slice(&other.guard.bytes()[src]);
    }

    /// Copies `other.slots[range]` into this node starting at `dst_start` (cross-node copy)
    pub fn copy_slots_from(&mut self, other: &Node, range: Range<usize>, dst_start: usize) {
        if range.start >= range.end {
            return;
        }
        let src = Self::slot_offset(range.start)..Self::slot_offset(range.end);
        let dst = Self::slot_offset(dst_start);
        let len = src.end - src.start;
        self.guard.bytes_mut()[dst..dst + len].copy_from_slice(&other.guard.bytes()[src]);
    }

    /// Allocates a fresh block and copies this node's bytes into it verbatim
    ///
    /// The copy-on-write primitive checkpoint builds on: the caller is
    /// responsible for rewriting whatever child pointers need to change in
    /// the copy afterward.
    #[must_use]
    pub fn cow_copy(&self, cache: &BufferCache, alloc: &BlockAllocator) -> Node {
        let new_ptr = alloc.allocate(self.ptr.byte_len(), self.ptr.flags);
        let mut guard = cache.create(new_ptr.offset, new_ptr.byte_len() as usize);
        guard.bytes_mut().copy_from_slice(self.guard.bytes());
        Node {
            ptr: new_ptr,
            guard,
        }
    }
}
