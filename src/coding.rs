// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::io::{Read, Write};

/// Error during serialization of a node header or disk pointer
#[derive(Debug)]
pub struct EncodeError(std::io::Error);

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodeError({})", self.0)
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self(value)
    }
}

impl std::error::Error for EncodeError {}

/// Error during deserialization of a node header or disk pointer
#[derive(Debug)]
pub struct DecodeError(std::io::Error);

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecodeError({})", self.0)
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self(value)
    }
}

impl std::error::Error for DecodeError {}

/// Trait for the handful of fixed-width structures that have an explicit
/// on-the-wire layout: the node header and the disk pointer.
///
/// Nothing in this crate persists these bytes anywhere real (the buffer
/// cache is RAM-backed), but giving them a byte-exact encoding keeps the
/// `checkpoint` copy and the block format in sync with spec, and is cheap
/// to unit test independently of the in-memory node view.
pub trait Encode {
    /// Serializes into a writer
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into a freshly allocated vector
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("writing to a Vec cannot fail");
        v
    }
}

/// Trait for deserializing the structures in [`Encode`]
pub trait Decode: Sized {
    /// Deserializes from a reader
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>;
}
