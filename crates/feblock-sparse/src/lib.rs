//! # feblock-sparse
//!
//! Block-structured containers for finite element linear algebra.
//!
//! This crate provides:
//! - [`DenseVectorBlocked`] vectors of fixed-size blocks (and the unblocked [`DenseVector`])
//! - [`SparseMatrixBcsr`] matrices of dense `BH × BW` blocks on a shared [`SparseLayout`]
//! - SpMV, axpy, norms, diagonal extraction, row lumping and the fused trace kernel
//! - [`Graph`] adjacency structures and [`Permutation`] reordering (including RCM)
//! - Scatter/gather assembly adapters in [`assembly`]
//! - A binary codec with zlib or lossy compression and Matrix Market text I/O in [`io`]

#![deny(warnings)]

pub mod assembly;
pub mod bcsr;
pub mod dense_vector;
pub mod error;
pub mod graph;
pub mod io;
pub mod layout;
pub mod permutation;

// Re-exports
pub use assembly::{
    DirectMapping, DofMapping, LocalMatrix, MatrixGather, MatrixGatherAxpy, MatrixScatter,
    MatrixScatterAxpy, VectorGather, VectorGatherAxpy, VectorScatter, VectorScatterAxpy,
    WeightedMapping,
};
pub use bcsr::SparseMatrixBcsr;
pub use dense_vector::{DenseVector, DenseVectorBlocked};
pub use error::*;
pub use graph::Graph;
pub use io::{Compression, FileMode, SerialConfig};
pub use layout::SparseLayout;
pub use permutation::{bandwidth, permute_graph, reverse_cuthill_mckee, Permutation};
