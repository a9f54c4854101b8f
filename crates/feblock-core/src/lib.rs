//! # feblock-core
//!
//! Foundational types shared by the feblock containers:
//!
//! - **Scalar and index traits** ([`Scalar`], [`IndexType`]) parameterizing every container
//! - **Block value types** ([`Vector`], [`Matrix`]) stored per container entry
//! - **Shared value storage** ([`SharedBuffer`]) backing exclusive and shared handles
//! - **Backend memory model** ([`Backend`], [`Main`], `Threaded`) with memory primitives
//!   and the slice [`kernels`] every container operation dispatches to
//!
//! ## Memory Layout
//!
//! Blocks are stored contiguously as raw scalars. A vector of `n` blocks of
//! size `B` occupies `n * B` scalars; a BCSR value array stores each
//! `BH × BW` block row-major, one block after the other.
//!
//! ## Safety
//!
//! No unsafe code. Element access is bounds-checked.
//!
//! ## Quick Start
//!
//! ```
//! use feblock_core::{kernels, Matrix, Vector};
//!
//! let block = Matrix::new([[2.0, 0.0], [1.0, 3.0]]);
//! let x = Vector::new([1.0, 1.0]);
//! assert_eq!((block * x).as_slice(), &[2.0, 4.0]);
//!
//! let mut r = [0.0; 3];
//! kernels::axpy(&mut r, &[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0], 2.0);
//! assert_eq!(r, [3.0, 5.0, 7.0]);
//! ```
//!
//! ## Features
//!
//! - `parallel` (default): enables the rayon-backed `Threaded` backend

#![deny(warnings)]

pub mod backend;
pub mod block;
pub mod buffer;
pub mod error;
pub mod kernels;
pub mod scalar;

pub use backend::{transfer, Backend, Main};
#[cfg(feature = "parallel")]
pub use backend::Threaded;
pub use block::{Matrix, Vector};
pub use buffer::{ReadGuard, ReadView, SharedBuffer, WriteGuard};
pub use error::{CoreError, CoreResult};
pub use scalar::{to_index_vec, IndexKind, IndexType, Scalar, ScalarType};
