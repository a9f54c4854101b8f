//! # feblock - Block Sparse Linear Algebra for Finite Elements
//!
//! Containers for the linear systems that finite element codes assemble and
//! solve: vectors of fixed-size blocks, block compressed sparse row matrices,
//! scatter/gather assembly, reordering and a compact binary codec.
//!
//! This is the **meta crate** that re-exports the feblock components for convenient access.
//!
//! ## Quick Start
//!
//! ```
//! use feblock::prelude::*;
//!
//! // Pattern of a 1D mesh with three nodes
//! let graph = Graph::from_element_connectivity(3, &[vec![0, 1], vec![1, 2]])?;
//! let mut a = SparseMatrixBcsr::<f64, 1, 1>::from_graph(&graph)?;
//!
//! // Assemble the element stiffness [[1, -1], [-1, 1]]
//! let mut local = LocalMatrix::<f64, 1, 1>::new(2, 2);
//! for i in 0..2 {
//!     for j in 0..2 {
//!         local[(i, j)] = Matrix::splat(if i == j { 1.0 } else { -1.0 });
//!     }
//! }
//! {
//!     let mut scatter = a.scatter_axpy();
//!     scatter.scatter(&local, &DirectMapping::new(vec![0, 1]), &DirectMapping::new(vec![0, 1]), 1.0)?;
//!     scatter.scatter(&local, &DirectMapping::new(vec![1, 2]), &DirectMapping::new(vec![1, 2]), 1.0)?;
//! }
//! assert_eq!(a.get(1, 1)[(0, 0)], 2.0);
//!
//! // r = A x
//! let x = DenseVectorBlocked::<f64, 1>::from_value(3, 1.0);
//! let mut r = a.create_vector_l();
//! a.apply(&mut r, &x)?;
//! assert_eq!(r.norm2(), 0.0);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Components
//!
//! ### Core Types ([`core`])
//!
//! Scalar and index traits, fixed-size [`Vector`](core::Vector) and
//! [`Matrix`](core::Matrix) blocks, shared value buffers and the backend
//! memory model.
//!
//! ### Containers ([`sparse`])
//!
//! [`DenseVectorBlocked`](sparse::DenseVectorBlocked),
//! [`SparseMatrixBcsr`](sparse::SparseMatrixBcsr), assembly adapters,
//! permutations and file I/O.
//!
//! ```
//! use feblock::sparse::{DenseVectorBlocked, SerialConfig};
//!
//! let v = DenseVectorBlocked::<f64, 3>::from_value(4, 0.5);
//! let bytes = v.serialize(&SerialConfig::zlib())?;
//! assert_eq!(DenseVectorBlocked::<f64, 3>::deserialize(&bytes)?, v);
//! # Ok::<(), feblock::sparse::SparseError>(())
//! ```
//!
//! ### Logging ([`logging`])
//!
//! Subscriber setup for the `tracing` events the containers emit.
//!
//! ## Features
//!
//! - `parallel` (default): rayon-backed `Threaded` backend
//! - `tracing` (default): [`logging::init_tracing`] installs a `tracing-subscriber` stack

#![deny(warnings)]

pub mod logging;

// Re-export all components
pub use feblock_core as core;
pub use feblock_sparse as sparse;

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use feblock::prelude::*;
    //!
    //! let v = DenseVectorBlocked::<f64, 2>::new(10);
    //! assert_eq!(v.raw_size(), 20);
    //! ```

    // Core types
    pub use crate::core::{Backend, IndexType, Main, Matrix, Scalar, Vector};
    #[cfg(feature = "parallel")]
    pub use crate::core::Threaded;

    // Containers
    pub use crate::sparse::{DenseVector, DenseVectorBlocked, SparseLayout, SparseMatrixBcsr};

    // Assembly
    pub use crate::sparse::{
        DirectMapping, DofMapping, LocalMatrix, MatrixGather, MatrixScatter, VectorGather,
        VectorScatter, WeightedMapping,
    };

    // Structure and reordering
    pub use crate::sparse::{reverse_cuthill_mckee, Graph, Permutation};

    // I/O
    pub use crate::sparse::{Compression, FileMode, SerialConfig};

    // Errors
    pub use crate::sparse::{SparseError, SparseResult};
}
