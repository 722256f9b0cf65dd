// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

bitflags::bitflags! {
    /// Flags carried alongside a [`DiskPointer`]
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct PointerFlags: u16 {
        /// Block is part of an in-progress copy-on-write checkpoint
        const COW = 0b0001;
        /// Radix-tree leaf block (reserved, the radix-tree experiment is out of scope)
        const RDX_LEAF = 0b0010;
        /// Radix-tree inner block (reserved, out of scope)
        const RDX_INNER = 0b0100;
        /// Ordinary data block
        const DATA = 0b1000;
    }
}

/// An on-disk pointer: the only inter-node linkage in the tree
///
/// Nodes never hold direct references to other nodes; every traversal
/// resolves a `DiskPointer` through the [`crate::BufferCache`] to obtain a
/// latched handle.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DiskPointer {
    /// Page index (page size is [`crate::PAGE_SIZE`] bytes)
    pub offset: u64,
    /// Count of contiguous pages
    pub size: u64,
    /// Checkpoint generation this block belongs to
    pub epoch: u64,
    /// Bitset of [`PointerFlags`]
    pub flags: PointerFlags,
}

impl DiskPointer {
    /// A pointer that can never be a legitimate allocation (offset/size both zero)
    pub const NULL: Self = Self {
        offset: 0,
        size: 0,
        epoch: 0,
        flags: PointerFlags::empty(),
    };

    /// Byte length of a block this pointer addresses
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        self.size * crate::PAGE_SIZE as u64
    }
}

impl std::fmt::Display for DiskPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DiskPointer(offset={}, size={}, epoch={}, flags={:?})",
            self.offset, self.size, self.epoch, self.flags
        )
    }
}

impl Encode for DiskPointer {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<BigEndian>(self.offset)?;
        writer.write_u64::<BigEndian>(self.size)?;
        writer.write_u64::<BigEndian>(self.epoch)?;
        writer.write_u16::<BigEndian>(self.flags.bits())?;
        Ok(())
    }
}

impl Decode for DiskPointer {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let offset = reader.read_u64::<BigEndian>()?;
        let size = reader.read_u64::<BigEndian>()?;
        let epoch = reader.read_u64::<BigEndian>()?;
        let flags = PointerFlags::from_bits_truncate(reader.read_u16::<BigEndian>()?);
        Ok(Self {
            offset,
            size,
            epoch,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn round_trips_through_encode_decode() {
        let ptr = DiskPointer {
            offset: 42,
            size: 16,
            epoch: 3,
            flags: PointerFlags::COW | PointerFlags::DATA,
        };

        let bytes = ptr.encode_into_vec();
        let decoded = DiskPointer::decode_from(&mut &bytes[..]).unwrap();
        assert_eq!(ptr, decoded);
    }

    #[test]
    fn byte_len_scales_with_page_size() {
        let ptr = DiskPointer {
            offset: 0,
            size: 16,
            epoch: 0,
            flags: PointerFlags::empty(),
        };
        assert_eq!(ptr.byte_len(), 16 * crate::PAGE_SIZE as u64);
    }
}
