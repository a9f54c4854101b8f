//! Error types for the core building blocks.
//!
//! Container crates wrap [`CoreError`] in their own error enums via `#[from]`.

use thiserror::Error;

/// Errors raised by scalar/index conversions and raw buffer handling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Index value {value} does not fit into {target}")]
    IndexOverflow { value: u64, target: &'static str },

    #[error("Buffer length {len} is not a multiple of block size {block}")]
    NotBlockAligned { len: usize, block: usize },

    #[error("Length mismatch in {operation}: expected {expected}, got {got}")]
    LengthMismatch {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Range {offset}..{end} exceeds buffer of length {len}")]
    RangeOutOfBounds { offset: usize, end: usize, len: usize },

    #[error("Unknown {what} tag {tag}")]
    UnknownTag { what: &'static str, tag: u8 },
}

/// Result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Shorthand for a [`CoreError::LengthMismatch`].
    pub fn length_mismatch(operation: &'static str, expected: usize, got: usize) -> Self {
        CoreError::LengthMismatch {
            operation,
            expected,
            got,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::NotBlockAligned { len: 7, block: 2 };
        assert_eq!(
            err.to_string(),
            "Buffer length 7 is not a multiple of block size 2"
        );

        let err = CoreError::length_mismatch("axpy", 4, 3);
        assert_eq!(
            err.to_string(),
            "Length mismatch in axpy: expected 4, got 3"
        );
    }
}
