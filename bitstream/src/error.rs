//! Error types for bitstream operations.

/// Result type for bitstream operations.
pub type BitResult<T> = Result<T, BitError>;

/// Errors that can occur during bit-level encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitError {
    /// Attempted to read past the end of the buffer.
    ///
    /// Truncated captures surface as this variant; callers may keep whatever
    /// state was decoded before it.
    #[error("unexpected end of buffer: attempted to read {requested} bits but only {available} bits available")]
    UnexpectedEndOfBuffer {
        /// Number of bits requested.
        requested: usize,
        /// Number of bits available.
        available: usize,
    },

    /// Invalid bit count for the operation.
    #[error("invalid bit count {bits}, maximum allowed is {max_bits}")]
    InvalidBitCount {
        /// The invalid bit count provided.
        bits: usize,
        /// Maximum allowed bits for this operation.
        max_bits: usize,
    },

    /// A 64-bit varint ran past ten bytes or overflowed on the tenth.
    #[error("malformed varint after {bytes} bytes")]
    InvalidVarint {
        /// Bytes consumed before the overflow was detected.
        bytes: usize,
    },

    /// Value exceeds the range representable by the specified number of bits.
    #[error("value {value} cannot be represented in {bits} bits")]
    ValueOutOfRange {
        /// The value that was out of range.
        value: u64,
        /// Number of bits available.
        bits: usize,
    },
}

impl BitError {
    /// Returns `true` for the buffer underrun condition.
    #[must_use]
    pub const fn is_unexpected_end(&self) -> bool {
        matches!(self, Self::UnexpectedEndOfBuffer { .. })
    }
}
