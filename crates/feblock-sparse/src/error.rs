//! Unified error types for the block containers
//!
//! # Design
//!
//! - **`SparseError`**: Top-level enum covering all error cases
//! - **Validation errors**: malformed construction input (value arrays, patterns, permutations)
//! - **Shape mismatches**: operands with incompatible dimensions
//! - **Operation errors**: aliasing violations and unsupported requests
//! - **Assembly errors**: scatter targets missing from the sparsity pattern
//! - **I/O errors**: malformed binary streams and text files
//!
//! Every error is returned at the call that detected it, before the target
//! container is modified.
//!
//! # Examples
//!
//! ```
//! use feblock_sparse::error::{SparseError, ShapeMismatchError};
//!
//! fn check_sizes(expected: usize, got: usize) -> Result<(), SparseError> {
//!     if expected != got {
//!         return Err(ShapeMismatchError::VectorSize {
//!             operation: "dot",
//!             expected,
//!             got,
//!         }
//!         .into());
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_sizes(3, 3).is_ok());
//! assert!(matches!(check_sizes(3, 4), Err(SparseError::ShapeMismatch(_))));
//! ```

use feblock_core::CoreError;
use thiserror::Error;

/// Top-level error type for all container operations
#[derive(Error, Debug)]
pub enum SparseError {
    /// Validation errors (construction input)
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Shape mismatch errors
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(#[from] ShapeMismatchError),

    /// Operation errors
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),

    /// Assembly errors
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Serialization and text format errors
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Errors from the core layer
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Validation errors for construction input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Value array of length {len} is not a multiple of the block size {block}")]
    ValueLength { len: usize, block: usize },

    #[error("Row pointer has length {len}, expected {expected}")]
    RowPtrLength { len: usize, expected: usize },

    #[error("Row pointer must start at 0 and end at {used}, got {first}..{last}")]
    RowPtrBounds { first: usize, last: usize, used: usize },

    #[error("Row pointer decreases at row {row}: {curr} > {next}")]
    RowPtrNotSorted { row: usize, curr: usize, next: usize },

    #[error("Column index array has {col_ind} entries but {blocks} value blocks are given")]
    LengthMismatch { col_ind: usize, blocks: usize },

    #[error("Column index {col} out of bounds for {columns} columns (row {row})")]
    ColumnOutOfBounds { row: usize, col: usize, columns: usize },

    #[error("Column indices in row {row} are not strictly ascending at position {position}")]
    UnsortedColumns { row: usize, position: usize },

    #[error("Block ({row}, {col}) outside a {rows}×{columns} block grid")]
    BlockOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        columns: usize,
    },

    #[error("Cannot allocate {what} for {count} entries")]
    TooLarge { what: &'static str, count: usize },

    #[error("Invalid permutation: {reason}")]
    InvalidPermutation { reason: String },

    #[error("Invalid graph: {reason}")]
    InvalidGraph { reason: String },
}

/// Shape mismatch errors between operands
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeMismatchError {
    #[error("Vector size mismatch in {operation}: expected {expected}, got {got}")]
    VectorSize {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Matrix dimension mismatch in {operation}: expected {expected:?}, got {got:?}")]
    MatrixDims {
        operation: &'static str,
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },

    #[error("Matrix-vector dimension mismatch in {operation}: ({rows}×{columns}) with vector of size {size}")]
    MatVec {
        operation: &'static str,
        rows: usize,
        columns: usize,
        size: usize,
    },

    #[error("Sparsity patterns differ in {operation}")]
    Pattern { operation: &'static str },

    #[error("Operation {operation} requires a square matrix, got {rows}×{columns}")]
    NotSquare {
        operation: &'static str,
        rows: usize,
        columns: usize,
    },

    #[error("Permutation of size {perm} does not match dimension {dim}")]
    Permutation { perm: usize, dim: usize },
}

/// Errors raised by operations on valid containers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error("In {operation}, the result must not share memory with the input vector")]
    Aliasing { operation: &'static str },

    #[error("Block ({row}, {col}) is not part of the sparsity pattern")]
    NotInPattern { row: usize, col: usize },

    #[error("Range {offset}..{end} exceeds vector of size {size}")]
    RangeOutOfBounds { offset: usize, end: usize, size: usize },
}

/// Errors raised by scatter/gather assembly adapters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    #[error("Invalid column index: global entry ({row}, {col}) is missing from the sparsity pattern")]
    MissingEntry { row: usize, col: usize },

    #[error("Global index {index} out of bounds for {size} entries")]
    IndexOutOfBounds { index: usize, size: usize },

    #[error("Local container is {got_rows}×{got_cols} but the mappings describe {rows}×{cols}")]
    LocalShape {
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },
}

/// Serialization and text format errors
#[derive(Error, Debug)]
pub enum IoError {
    #[error("Cannot access file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Malformed binary stream: {field}: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("Malformed text input at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("Filemode not supported: {mode} for {container}")]
    FileModeNotSupported {
        mode: &'static str,
        container: &'static str,
    },

    #[error("Compression failed: {0}")]
    Compression(String),
}

/// Result type alias for container operations
pub type SparseResult<T> = Result<T, SparseError>;

impl From<std::io::Error> for SparseError {
    fn from(err: std::io::Error) -> Self {
        SparseError::Io(IoError::Stream(err))
    }
}

// Convenience constructors for common error patterns
impl SparseError {
    /// Vector size mismatch in `operation`
    pub fn size_mismatch(operation: &'static str, expected: usize, got: usize) -> Self {
        SparseError::ShapeMismatch(ShapeMismatchError::VectorSize {
            operation,
            expected,
            got,
        })
    }

    /// Aliasing violation in `operation`
    pub fn aliasing(operation: &'static str) -> Self {
        SparseError::Operation(OperationError::Aliasing { operation })
    }

    /// Malformed binary stream field
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        SparseError::Io(IoError::Malformed {
            field,
            reason: reason.into(),
        })
    }

    /// Text parse failure at `line` (1-based)
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        SparseError::Io(IoError::Parse {
            line,
            reason: reason.into(),
        })
    }

    /// Unsupported file mode for a container kind
    pub fn file_mode(mode: &'static str, container: &'static str) -> Self {
        SparseError::Io(IoError::FileModeNotSupported { mode, container })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = ValidationError::ValueLength { len: 7, block: 6 };
        assert_eq!(
            err.to_string(),
            "Value array of length 7 is not a multiple of the block size 6"
        );
    }

    #[test]
    fn test_shape_mismatch_error() {
        let err = ShapeMismatchError::MatVec {
            operation: "apply",
            rows: 3,
            columns: 4,
            size: 5,
        };
        assert_eq!(
            err.to_string(),
            "Matrix-vector dimension mismatch in apply: (3×4) with vector of size 5"
        );
    }

    #[test]
    fn test_sparse_error_from_assembly() {
        let err: SparseError = AssemblyError::MissingEntry { row: 1, col: 2 }.into();
        assert!(matches!(err, SparseError::Assembly(_)));
        assert!(err.to_string().contains("Invalid column index"));
    }

    #[test]
    fn test_convenience_constructors() {
        assert!(matches!(
            SparseError::aliasing("apply"),
            SparseError::Operation(OperationError::Aliasing { operation: "apply" })
        ));
        assert_eq!(
            SparseError::file_mode("exp", "SparseMatrixBcsr").to_string(),
            "I/O error: Filemode not supported: exp for SparseMatrixBcsr"
        );
        let core: SparseError = CoreError::NotBlockAligned { len: 5, block: 2 }.into();
        assert_eq!(core.to_string(), "Buffer length 5 is not a multiple of block size 2");
    }
}
