// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Represents errors that can occur in the B+tree engine
#[derive(Debug)]
pub enum Error {
    /// A configured value size exceeds [`crate::MAX_VALUE_SIZE`]
    CapacityExceeded {
        /// The value size that was requested
        requested: usize,
        /// The maximum allowed value size
        max: usize,
    },

    /// An on-disk invariant was violated
    ///
    /// This is a programmer-facing, fatal condition (a parent's child slot
    /// disagreeing with the cursor during a split/collapse cascade, a path
    /// deeper than `MAX_PATH`, ...). It should never be observed in a
    /// correct caller.
    InvariantViolation(&'static str),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded { requested, max } => write!(
                f,
                "value size {requested} exceeds maximum of {max} bytes"
            ),
            Self::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Tree result
pub type Result<T> = std::result::Result<T, Error>;
