//! BCSR (Block Compressed Sparse Row) matrices
//!
//! A [`SparseMatrixBcsr<T, BH, BW>`] stores a `rows × columns` grid of
//! `BH × BW` blocks. The sparsity pattern lives in a [`SparseLayout`] shared
//! through an `Arc`; the values are one contiguous array holding each stored
//! block row-major, in pattern order.
//!
//! # Structure
//!
//! - **row_ptr**: `rows + 1` offsets into `col_ind`, starting at 0
//! - **col_ind**: block column of every stored block, ascending within a row
//! - **values**: `used_elements * BH * BW` scalars
//!
//! # Clones
//!
//! | factory          | pattern              | values                   |
//! |------------------|----------------------|--------------------------|
//! | `deep_clone`     | copied               | copied                   |
//! | `layout_clone`   | shared               | new, zero                |
//! | `weak_clone`     | shared               | shared                   |
//! | `allocate_clone` | copied               | new, zero                |
//!
//! # Examples
//!
//! ```
//! use feblock_core::Matrix;
//! use feblock_sparse::{DenseVectorBlocked, SparseMatrixBcsr};
//!
//! // 2×2 block grid of 2×3 blocks on the diagonal
//! let values: Vec<f64> = (1..=12).map(f64::from).collect();
//! let a = SparseMatrixBcsr::<f64, 2, 3>::from_arrays(2, 2, vec![0, 1, 2], vec![0, 1], values).unwrap();
//! assert_eq!(a.get(1, 0), Matrix::zeros());
//! assert_eq!(a.get(1, 1)[(1, 1)], 11.0);
//!
//! let x = DenseVectorBlocked::<f64, 3>::from_value(2, 1.0);
//! let mut r = a.create_vector_l();
//! a.apply(&mut r, &x).unwrap();
//! assert_eq!(r.to_vec(), vec![6.0, 15.0, 24.0, 33.0]);
//! ```

use crate::dense_vector::DenseVectorBlocked;
use crate::error::{
    OperationError, ShapeMismatchError, SparseError, SparseResult, ValidationError,
};
use crate::graph::Graph;
use crate::io::matrix_market;
use crate::io::{self, BinaryImage, ContainerKind, FileMode, SerialConfig};
use crate::layout::SparseLayout;
use crate::permutation::{check_len, Permutation};
use feblock_core::{
    kernels, transfer, Backend, IndexType, Main, Matrix, ReadGuard, Scalar, ScalarType,
    SharedBuffer, WriteGuard,
};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, Write};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

const CONTAINER: &str = "SparseMatrixBcsr";

/// Sparse matrix of dense `BH × BW` blocks
pub struct SparseMatrixBcsr<T, const BH: usize, const BW: usize, I = u64, A = Main> {
    layout: Arc<SparseLayout<I>>,
    values: SharedBuffer<T>,
    _marker: PhantomData<fn() -> A>,
}

impl<T, const BH: usize, const BW: usize, I, A> SparseMatrixBcsr<T, BH, BW, I, A>
where
    T: Scalar,
    I: IndexType,
    A: Backend,
{
    /// Scalars per block
    pub const BLOCK: usize = BH * BW;

    fn wrap(layout: Arc<SparseLayout<I>>, values: SharedBuffer<T>) -> Self {
        debug_assert_eq!(values.len(), layout.used_elements() * Self::BLOCK);
        Self {
            layout,
            values,
            _marker: PhantomData,
        }
    }

    fn zero_values(layout: &SparseLayout<I>) -> SharedBuffer<T> {
        SharedBuffer::from_vec(A::allocate(layout.used_elements() * Self::BLOCK))
    }

    // ========== Construction ==========

    /// Matrix with an empty pattern
    pub fn new(rows: usize, columns: usize) -> Self {
        Self::from_layout(Arc::new(SparseLayout::empty(rows, columns)))
    }

    /// Zero matrix on a shared pattern
    pub fn from_layout(layout: Arc<SparseLayout<I>>) -> Self {
        let values = Self::zero_values(&layout);
        Self::wrap(layout, values)
    }

    /// Zero matrix with one block per graph edge
    pub fn from_graph(graph: &Graph) -> SparseResult<Self> {
        Ok(Self::from_layout(Arc::new(SparseLayout::from_graph(graph)?)))
    }

    /// Matrix from raw CSR arrays
    ///
    /// # Arguments
    ///
    /// * `rows`, `columns` - block grid dimensions
    /// * `row_ptr` - `rows + 1` offsets into `col_ind`
    /// * `col_ind` - block column of every stored block
    /// * `values` - row-major block values, `col_ind.len() * BH * BW` scalars
    ///
    /// # Errors
    ///
    /// - `ValueLength` if `values` is not a whole number of blocks
    /// - `LengthMismatch` if the block count differs from `col_ind.len()`
    /// - `RowPtrLength`/`RowPtrBounds` for a malformed row pointer
    /// - any [`SparseLayout::validate`] failure (decreasing row pointer,
    ///   column out of range, unsorted or repeated columns)
    pub fn from_arrays(
        rows: usize,
        columns: usize,
        row_ptr: Vec<I>,
        col_ind: Vec<I>,
        values: Vec<T>,
    ) -> SparseResult<Self> {
        if values.len() % Self::BLOCK != 0 {
            return Err(ValidationError::ValueLength {
                len: values.len(),
                block: Self::BLOCK,
            }
            .into());
        }
        let blocks = values.len() / Self::BLOCK;
        if blocks != col_ind.len() {
            return Err(ValidationError::LengthMismatch {
                col_ind: col_ind.len(),
                blocks,
            }
            .into());
        }
        let layout = SparseLayout::new(rows, columns, row_ptr, col_ind)?;
        layout.validate()?;
        let mut raw = A::allocate(values.len());
        A::upload(&mut raw, &values);
        Ok(Self::wrap(Arc::new(layout), SharedBuffer::from_vec(raw)))
    }

    /// Matrix from `(row, col, block)` triples
    ///
    /// Triples may come in any order; for repeated positions the last block
    /// wins.
    pub fn from_blocks<It>(rows: usize, columns: usize, blocks: It) -> SparseResult<Self>
    where
        It: IntoIterator<Item = (usize, usize, Matrix<T, BH, BW>)>,
    {
        let mut sorted = BTreeMap::new();
        for (row, col, block) in blocks {
            if row >= rows || col >= columns {
                return Err(ValidationError::BlockOutOfBounds {
                    row,
                    col,
                    rows,
                    columns,
                }
                .into());
            }
            sorted.insert((row, col), block);
        }

        let len = rows.checked_add(1).ok_or(ValidationError::TooLarge {
            what: "row pointer",
            count: rows,
        })?;
        let mut counts = Vec::new();
        counts
            .try_reserve_exact(len)
            .map_err(|_| ValidationError::TooLarge { what: "row pointer", count: len })?;
        counts.resize(len, 0usize);
        let mut col_ind = Vec::with_capacity(sorted.len());
        let mut host = Vec::with_capacity(sorted.len() * Self::BLOCK);
        for ((row, col), block) in sorted {
            counts[row + 1] += 1;
            col_ind.push(col);
            host.extend_from_slice(&block.to_vec());
        }
        for row in 0..rows {
            counts[row + 1] += counts[row];
        }
        Self::from_arrays(
            rows,
            columns,
            crate::layout::index_vec(&counts)?,
            crate::layout::index_vec(&col_ind)?,
            host,
        )
    }

    /// Swap in another pattern; values are reset to zero
    pub fn replace_layout(&mut self, layout: Arc<SparseLayout<I>>) {
        self.values = Self::zero_values(&layout);
        self.layout = layout;
    }

    /// Full pattern consistency check
    pub fn validate(&self) -> SparseResult<()> {
        self.layout.validate()
    }

    // ========== Clones ==========

    /// Independent copy of pattern and values
    pub fn deep_clone(&self) -> Self {
        let mut raw = A::allocate(self.values.len());
        A::copy(&mut raw, &self.values.read());
        Self::wrap(Arc::new((*self.layout).clone()), SharedBuffer::from_vec(raw))
    }

    /// Zero matrix sharing this pattern
    pub fn layout_clone(&self) -> Self {
        Self::from_layout(Arc::clone(&self.layout))
    }

    /// Handle sharing pattern and values
    pub fn weak_clone(&self) -> Self {
        Self::wrap(Arc::clone(&self.layout), self.values.share())
    }

    /// Zero matrix with a private copy of this pattern
    pub fn allocate_clone(&self) -> Self {
        Self::from_layout(Arc::new((*self.layout).clone()))
    }

    pub fn shares_layout_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.layout, &other.layout)
    }

    pub fn shares_values_with(&self, other: &Self) -> bool {
        self.values.overlaps(&other.values)
    }

    /// Overwrite the values with those of `x`, possibly living on another backend
    ///
    /// # Errors
    ///
    /// Fails unless both matrices have the same pattern.
    pub fn copy_from<A2: Backend>(&mut self, x: &SparseMatrixBcsr<T, BH, BW, I, A2>) -> SparseResult<()> {
        self.check_pattern("copy", &x.layout)?;
        if self.values.same_window(&x.values) {
            return Ok(());
        }
        let src = x.values.read_for(&self.values);
        transfer::<A2, A, T>(&mut self.values.write(), &src);
        Ok(())
    }

    /// Copy into a matrix with other scalar, index or backend types
    ///
    /// # Errors
    ///
    /// Fails if an index does not fit `I2`.
    pub fn convert<T2: Scalar, I2: IndexType, A2: Backend>(
        &self,
    ) -> SparseResult<SparseMatrixBcsr<T2, BH, BW, I2, A2>> {
        let layout = self.layout.convert::<I2>()?;
        let host: Vec<T2> = self.to_host().into_iter().map(|v| T2::from_f64(v.as_f64())).collect();
        let mut raw = A2::allocate(host.len());
        A2::upload(&mut raw, &host);
        Ok(SparseMatrixBcsr::wrap(Arc::new(layout), SharedBuffer::from_vec(raw)))
    }

    // ========== Accessors ==========

    /// Number of block rows
    pub fn rows(&self) -> usize {
        self.layout.rows()
    }

    /// Number of block columns
    pub fn columns(&self) -> usize {
        self.layout.columns()
    }

    /// Number of stored blocks
    pub fn used_elements(&self) -> usize {
        self.layout.used_elements()
    }

    pub fn raw_rows(&self) -> usize {
        self.rows() * BH
    }

    pub fn raw_columns(&self) -> usize {
        self.columns() * BW
    }

    /// Number of stored scalars
    pub fn raw_used_elements(&self) -> usize {
        self.used_elements() * Self::BLOCK
    }

    /// Scalar entries of the dense equivalent
    pub fn size(&self) -> usize {
        self.raw_rows() * self.raw_columns()
    }

    /// Memory footprint of values and index arrays
    pub fn bytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<T>() + self.layout.bytes()
    }

    /// The shared pattern
    pub fn layout(&self) -> &Arc<SparseLayout<I>> {
        &self.layout
    }

    pub fn row_ptr(&self) -> &[I] {
        self.layout.row_ptr()
    }

    pub fn col_ind(&self) -> &[I] {
        self.layout.col_ind()
    }

    /// Read access to the raw block values
    pub fn values(&self) -> ReadGuard<'_, T> {
        self.values.read()
    }

    /// Write access to the raw block values
    pub fn values_mut(&mut self) -> WriteGuard<'_, T> {
        self.values.write()
    }

    /// The values buffer
    pub fn buffer(&self) -> &SharedBuffer<T> {
        &self.values
    }

    fn assert_in_grid(&self, row: usize, col: usize) {
        assert!(
            row < self.rows() && col < self.columns(),
            "block ({row}, {col}) out of range for a {}×{} grid",
            self.rows(),
            self.columns()
        );
    }

    /// Block `(row, col)`; zero if not stored
    ///
    /// # Panics
    ///
    /// Panics if `(row, col)` lies outside the block grid.
    pub fn get(&self, row: usize, col: usize) -> Matrix<T, BH, BW> {
        self.assert_in_grid(row, col);
        match self.layout.find(row, col) {
            Some(k) => {
                let mut block = vec![T::zero(); Self::BLOCK];
                A::download(&mut block, &self.values.read()[k * Self::BLOCK..(k + 1) * Self::BLOCK]);
                Matrix::from_slice(&block)
            }
            None => Matrix::zeros(),
        }
    }

    /// Overwrite a stored block
    ///
    /// # Errors
    ///
    /// Returns `OperationError::NotInPattern` if `(row, col)` is not stored.
    ///
    /// # Panics
    ///
    /// Panics if `(row, col)` lies outside the block grid.
    pub fn set(&mut self, row: usize, col: usize, block: Matrix<T, BH, BW>) -> SparseResult<()> {
        self.assert_in_grid(row, col);
        let k = self
            .layout
            .find(row, col)
            .ok_or(OperationError::NotInPattern { row, col })?;
        A::upload(
            &mut self.values.write()[k * Self::BLOCK..(k + 1) * Self::BLOCK],
            &block.to_vec(),
        );
        Ok(())
    }

    fn to_host(&self) -> Vec<T> {
        let mut host = vec![T::zero(); self.values.len()];
        A::download(&mut host, &self.values.read());
        host
    }

    /// Stored blocks as `(row, col, block)` in pattern order
    pub fn blocks(&self) -> Vec<(usize, usize, Matrix<T, BH, BW>)> {
        let host = self.to_host();
        let col_ind = self.col_ind();
        (0..self.rows())
            .flat_map(|row| self.layout.row_range(row).map(move |k| (row, k)))
            .map(|(row, k)| {
                let block = &host[k * Self::BLOCK..(k + 1) * Self::BLOCK];
                (row, col_ind[k].index(), Matrix::from_slice(block))
            })
            .collect()
    }

    /// Row-major dense copy of `raw_rows × raw_columns` scalars
    pub fn to_dense(&self) -> Vec<T> {
        let width = self.raw_columns();
        let mut dense = vec![T::zero(); self.size()];
        for (row, col, block) in self.blocks() {
            for h in 0..BH {
                for w in 0..BW {
                    dense[(row * BH + h) * width + col * BW + w] = block[(h, w)];
                }
            }
        }
        dense
    }

    /// Zero vector matching the row space
    pub fn create_vector_l(&self) -> DenseVectorBlocked<T, BH, I, A> {
        DenseVectorBlocked::new(self.rows())
    }

    /// Zero vector matching the column space
    pub fn create_vector_r(&self) -> DenseVectorBlocked<T, BW, I, A> {
        DenseVectorBlocked::new(self.columns())
    }

    /// Set every stored scalar to `value`
    pub fn format(&mut self, value: T) {
        A::set(&mut self.values.write(), value);
    }

    fn check_pattern(&self, operation: &'static str, other: &Arc<SparseLayout<I>>) -> SparseResult<()> {
        let dims = |l: &SparseLayout<I>| (l.rows(), l.columns(), l.used_elements());
        if dims(&self.layout) != dims(other) {
            return Err(ShapeMismatchError::MatrixDims {
                operation,
                expected: dims(&self.layout),
                got: dims(other),
            }
            .into());
        }
        if !Arc::ptr_eq(&self.layout, other) && *self.layout != **other {
            return Err(ShapeMismatchError::Pattern { operation }.into());
        }
        Ok(())
    }

    fn check_vector(&self, operation: &'static str, expected: usize, size: usize) -> SparseResult<()> {
        if expected != size {
            return Err(ShapeMismatchError::MatVec {
                operation,
                rows: self.rows(),
                columns: self.columns(),
                size,
            }
            .into());
        }
        Ok(())
    }

    // ========== Arithmetic ==========

    /// `self = alpha * x + y` over the stored values
    ///
    /// # Errors
    ///
    /// All three matrices must have the same pattern.
    pub fn axpy(&mut self, x: &Self, y: &Self, alpha: T) -> SparseResult<()> {
        self.check_pattern("axpy", &x.layout)?;
        self.check_pattern("axpy", &y.layout)?;
        if y.values.same_window(&self.values) && !x.values.is_shared_with(&self.values) {
            A::axpy_in_place(&mut self.values.write(), &x.values.read(), alpha);
            return Ok(());
        }
        let xs = x.values.read_for(&self.values);
        let ys = y.values.read_for(&self.values);
        A::axpy(&mut self.values.write(), &xs, &ys, alpha);
        Ok(())
    }

    /// `self = alpha * x`
    pub fn scale(&mut self, x: &Self, alpha: T) -> SparseResult<()> {
        self.check_pattern("scale", &x.layout)?;
        let xs = x.values.read_for(&self.values);
        A::scale(&mut self.values.write(), &xs, alpha);
        Ok(())
    }

    pub fn scale_in_place(&mut self, alpha: T) {
        A::scale_in_place(&mut self.values.write(), alpha);
    }

    /// Frobenius norm of the stored values
    pub fn norm_frobenius(&self) -> T {
        A::norm2sqr(&self.values.read()).sqrt()
    }

    /// `r = A x`
    ///
    /// # Errors
    ///
    /// - `MatVec` if `r` does not have `rows` blocks or `x` `columns` blocks
    /// - `Aliasing` if `r` and `x` overlap and the pattern is not empty
    ///
    /// An empty pattern zeroes `r` without reading `x`.
    ///
    /// # Complexity
    ///
    /// O(used_elements × BH × BW)
    pub fn apply(
        &self,
        r: &mut DenseVectorBlocked<T, BH, I, A>,
        x: &DenseVectorBlocked<T, BW, I, A>,
    ) -> SparseResult<()> {
        self.check_vector("apply", self.rows(), r.size())?;
        self.check_vector("apply", self.columns(), x.size())?;
        if self.used_elements() == 0 {
            r.format(T::zero());
            return Ok(());
        }
        if r.buffer().overlaps(x.buffer()) {
            return Err(SparseError::aliasing("apply"));
        }
        let xs = x.buffer().read_for(r.buffer());
        let vals = self.values.read_for(r.buffer());
        A::bcsr_apply::<T, I, BH, BW>(
            &mut r.raw_elements_mut(),
            self.layout.row_ptr(),
            self.layout.col_ind(),
            &vals,
            &xs,
        );
        Ok(())
    }

    /// `r = y + alpha * A x`
    ///
    /// `alpha` equal to zero (within machine epsilon) or an empty pattern
    /// copies `y` without reading `x`, so `r` may then overlap `x`. Otherwise
    /// `r` may be `y` itself but must not overlap `x`.
    pub fn apply_axpy(
        &self,
        r: &mut DenseVectorBlocked<T, BH, I, A>,
        x: &DenseVectorBlocked<T, BW, I, A>,
        y: &DenseVectorBlocked<T, BH, I, A>,
        alpha: T,
    ) -> SparseResult<()> {
        self.check_vector("apply_axpy", self.rows(), r.size())?;
        self.check_vector("apply_axpy", self.columns(), x.size())?;
        self.check_vector("apply_axpy", self.rows(), y.size())?;
        if self.used_elements() == 0 || alpha.abs() < T::epsilon() {
            return r.copy_from(y);
        }
        if r.buffer().overlaps(x.buffer()) {
            return Err(SparseError::aliasing("apply_axpy"));
        }

        let ys = (!y.buffer().same_window(r.buffer())).then(|| y.buffer().read_for(r.buffer()));
        let xs = x.buffer().read_for(r.buffer());
        let vals = self.values.read_for(r.buffer());
        let mut out = r.raw_elements_mut();
        if let Some(ys) = ys {
            A::copy(&mut out, &ys);
        }
        A::bcsr_apply_add::<T, I, BH, BW>(
            &mut out,
            self.layout.row_ptr(),
            self.layout.col_ind(),
            &vals,
            &xs,
            alpha,
        );
        Ok(())
    }

    /// Sum of every scalar row: `lump[i] = Σ_j A(i, j)`
    pub fn lump_rows(&self) -> DenseVectorBlocked<T, BH, I, A> {
        let mut lump = self.create_vector_l();
        A::bcsr_lump_rows::<T, I, BH, BW>(&mut lump.raw_elements_mut(), self.layout.row_ptr(), &self.values.read());
        lump
    }

    /// Squared Euclidean norm of every scalar row
    pub fn row_norm2sqr(&self) -> DenseVectorBlocked<T, BH, I, A> {
        let mut norms = self.create_vector_l();
        A::bcsr_row_norm2sqr::<T, I, BH, BW>(
            &mut norms.raw_elements_mut(),
            self.layout.row_ptr(),
            self.layout.col_ind(),
            &self.values.read(),
            None,
        );
        norms
    }

    /// Euclidean norm of every scalar row
    pub fn row_norm2(&self) -> DenseVectorBlocked<T, BH, I, A> {
        let mut norms = self.row_norm2sqr();
        for v in norms.raw_elements_mut().iter_mut() {
            *v = v.sqrt();
        }
        norms
    }

    /// Weighted squared row norms: `Σ_j scal_j * A(i, j)^2`
    pub fn row_norm2sqr_scaled(
        &self,
        scal: &DenseVectorBlocked<T, BW, I, A>,
    ) -> SparseResult<DenseVectorBlocked<T, BH, I, A>> {
        self.check_vector("row_norm2sqr_scaled", self.columns(), scal.size())?;
        let mut norms = self.create_vector_l();
        A::bcsr_row_norm2sqr::<T, I, BH, BW>(
            &mut norms.raw_elements_mut(),
            self.layout.row_ptr(),
            self.layout.col_ind(),
            &self.values.read(),
            Some(&scal.raw_elements()[..]),
        );
        Ok(norms)
    }

    /// `v += alpha * blockdiag(D · diag(a) · self)`
    ///
    /// `self` is `m × n` blocks of `BH × BW`, `d` is `n × m` blocks of
    /// `BHD × BH`, `a` has `m` blocks and `v` has `n` blocks of `BHD`. Only
    /// pairs `D(i, k)`, `self(k, i)` that are both stored contribute.
    ///
    /// `BHD` must not exceed `BW`; larger values fail to compile.
    pub fn add_trace_double_mat_mult<const BHD: usize>(
        &self,
        v: &mut DenseVectorBlocked<T, BHD, I, A>,
        d: &SparseMatrixBcsr<T, BHD, BH, I, A>,
        a: &DenseVectorBlocked<T, BH, I, A>,
        alpha: T,
    ) -> SparseResult<()> {
        let operation = "add_trace_double_mat_mult";
        if d.rows() != self.columns() || d.columns() != self.rows() {
            return Err(ShapeMismatchError::MatrixDims {
                operation,
                expected: (self.columns(), self.rows(), d.used_elements()),
                got: (d.rows(), d.columns(), d.used_elements()),
            }
            .into());
        }
        self.check_vector(operation, self.columns(), v.size())?;
        self.check_vector(operation, self.rows(), a.size())?;

        let d_vals = d.values.read_for(v.buffer());
        let b_vals = self.values.read_for(v.buffer());
        let av = a.buffer().read_for(v.buffer());
        kernels::trace_double_mat_mult::<T, I, BHD, BH, BW>(
            &mut v.raw_elements_mut(),
            d.row_ptr(),
            d.col_ind(),
            &d_vals,
            &av,
            self.row_ptr(),
            self.col_ind(),
            &b_vals,
            alpha,
        );
        Ok(())
    }

    /// Symmetric-style reordering: `new(i, j) = old(rp.map(i), cp.map(j))`
    ///
    /// The pattern is rebuilt with ascending columns per row and a fresh
    /// values buffer, so handles that shared this matrix keep the old state.
    pub fn permute(&mut self, rp: &Permutation, cp: &Permutation) -> SparseResult<()> {
        let (rows, columns) = (self.rows(), self.columns());
        check_len(rp, rows)?;
        check_len(cp, columns)?;

        let old = Arc::clone(&self.layout);
        let old_values = self.to_host();
        let block = Self::BLOCK;
        let mut row_ptr = Vec::with_capacity(rows + 1);
        let mut col_ind = Vec::with_capacity(old.used_elements());
        let mut host = Vec::with_capacity(old_values.len());
        let mut entries: Vec<(usize, usize)> = Vec::new();
        row_ptr.push(I::zero());
        for i in 0..rows {
            entries.clear();
            entries.extend(
                old.row_range(rp.map(i))
                    .map(|k| (cp.map_inverse(old.col_ind()[k].index()), k)),
            );
            entries.sort_unstable_by_key(|&(col, _)| col);
            for &(col, k) in &entries {
                col_ind.push(I::from_usize(col));
                host.extend_from_slice(&old_values[k * block..(k + 1) * block]);
            }
            row_ptr.push(I::from_usize(col_ind.len()));
        }

        let mut raw = A::allocate(host.len());
        A::upload(&mut raw, &host);
        self.layout = Arc::new(SparseLayout::new(rows, columns, row_ptr, col_ind)?);
        self.values = SharedBuffer::from_vec(raw);
        Ok(())
    }

    // ========== Serialization ==========

    fn warn_precision(operation: &str) {
        if T::SCALAR_TYPE != ScalarType::F64 {
            tracing::warn!(
                operation,
                scalar = ?T::SCALAR_TYPE,
                "binary containers store f64 values; precision is converted"
            );
        }
    }

    /// Encode in the native binary format
    pub fn serialize(&self, config: &SerialConfig) -> SparseResult<Vec<u8>> {
        Self::warn_precision("serialize");
        let widen = |v: &[I]| -> Vec<u64> { v.iter().map(|i| i.index() as u64).collect() };
        BinaryImage::bcsr(
            T::SCALAR_TYPE,
            I::INDEX_TYPE,
            (BH, BW),
            [
                self.size() as u64,
                self.rows() as u64,
                self.columns() as u64,
                self.used_elements() as u64,
            ],
            self.to_host().into_iter().map(Scalar::as_f64).collect(),
            widen(self.row_ptr()),
            widen(self.col_ind()),
        )?
        .encode(config)
    }

    /// Decode from the native binary format
    ///
    /// # Errors
    ///
    /// Fails if the stream is malformed, holds a vector, was written with
    /// another block shape, or describes an inconsistent pattern.
    pub fn deserialize(bytes: &[u8]) -> SparseResult<Self> {
        let image = BinaryImage::decode(bytes)?;
        image.expect(ContainerKind::Bcsr, BH, BW)?;
        let size = image.scalar(0, "size")?;
        let rows = image.scalar(1, "rows")?;
        let columns = image.scalar(2, "columns")?;
        let used = image.scalar(3, "used_elements")?;
        let expected = rows
            .checked_mul(BH)
            .zip(columns.checked_mul(BW))
            .and_then(|(r, c)| r.checked_mul(c));
        if expected != Some(size) {
            return Err(SparseError::malformed(
                "size",
                format!("{size} does not match a {rows}×{columns} grid of {BH}×{BW} blocks"),
            ));
        }
        if rows.checked_add(1) != Some(image.row_ptr.len()) {
            return Err(SparseError::malformed(
                "row_ptr",
                format!("{rows} rows need {rows}+1 entries, found {}", image.row_ptr.len()),
            ));
        }
        if image.col_ind.len() != used {
            return Err(SparseError::malformed(
                "col_ind",
                format!("expected {used} entries, found {}", image.col_ind.len()),
            ));
        }
        let narrow = |v: &[u64]| -> SparseResult<Vec<I>> {
            v.iter().map(|&i| Ok(I::from_u64(i)?)).collect()
        };
        let layout = SparseLayout::new(rows, columns, narrow(&image.row_ptr)?, narrow(&image.col_ind)?)?;
        layout.validate()?;
        if used.checked_mul(Self::BLOCK) != Some(image.values.len()) {
            return Err(SparseError::malformed(
                "values",
                format!("{used} blocks of {} scalars do not match {} values", Self::BLOCK, image.values.len()),
            ));
        }
        Self::warn_precision("deserialize");
        let host: Vec<T> = image.values.into_iter().map(T::from_f64).collect();
        let mut raw = A::allocate(host.len());
        A::upload(&mut raw, &host);
        Ok(Self::wrap(Arc::new(layout), SharedBuffer::from_vec(raw)))
    }

    /// Stored scalars as 0-based `(row, col, value)`, row by row
    fn scalar_entries(&self) -> Vec<(usize, usize, T)> {
        let host = self.to_host();
        let col_ind = self.col_ind();
        let mut entries = Vec::with_capacity(host.len());
        for row in 0..self.rows() {
            for h in 0..BH {
                for k in self.layout.row_range(row) {
                    let col = col_ind[k].index();
                    for w in 0..BW {
                        entries.push((row * BH + h, col * BW + w, host[k * Self::BLOCK + h * BW + w]));
                    }
                }
            }
        }
        entries
    }

    fn from_coordinate(data: matrix_market::CoordinateData<T>) -> SparseResult<Self> {
        if data.rows % BH != 0 || data.columns % BW != 0 {
            return Err(SparseError::malformed(
                "dimensions",
                format!("{}×{} does not split into {BH}×{BW} blocks", data.rows, data.columns),
            ));
        }
        let mut blocks: BTreeMap<(usize, usize), Matrix<T, BH, BW>> = BTreeMap::new();
        for (r, c, v) in data.entries {
            blocks.entry((r / BH, c / BW)).or_insert_with(Matrix::zeros)[(r % BH, c % BW)] = v;
        }
        Self::from_blocks(
            data.rows / BH,
            data.columns / BW,
            blocks.into_iter().map(|((r, c), b)| (r, c, b)),
        )
    }

    /// Write in `mode`
    ///
    /// # Errors
    ///
    /// `FileMode::Exp` is a vector-only format and is rejected.
    pub fn write_out<W: Write>(&self, mode: FileMode, writer: &mut W) -> SparseResult<()> {
        match mode {
            FileMode::Binary => writer.write_all(&self.serialize(&SerialConfig::default())?)?,
            FileMode::Mtx => matrix_market::write_coordinate(
                writer,
                self.raw_rows(),
                self.raw_columns(),
                self.scalar_entries().into_iter(),
            )?,
            FileMode::Exp => return Err(SparseError::file_mode(mode.name(), CONTAINER)),
        }
        Ok(())
    }

    /// Read in `mode`
    pub fn read_from<R: BufRead>(mode: FileMode, mut reader: R) -> SparseResult<Self> {
        match mode {
            FileMode::Binary => {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes)?;
                Self::deserialize(&bytes)
            }
            FileMode::Mtx => Self::from_coordinate(matrix_market::read_coordinate(reader)?),
            FileMode::Exp => Err(SparseError::file_mode(mode.name(), CONTAINER)),
        }
    }

    pub fn write_out_file(&self, mode: FileMode, path: impl AsRef<Path>) -> SparseResult<()> {
        let mut writer = io::create_file(path.as_ref())?;
        self.write_out(mode, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn read_from_file(mode: FileMode, path: impl AsRef<Path>) -> SparseResult<Self> {
        Self::read_from(mode, io::open_file(path.as_ref())?)
    }
}

impl<T, const B: usize, I, A> SparseMatrixBcsr<T, B, B, I, A>
where
    T: Scalar,
    I: IndexType,
    A: Backend,
{
    /// Main diagonal as a blocked vector
    ///
    /// Rows without a stored diagonal block give zeros.
    pub fn extract_diag(&self) -> SparseResult<DenseVectorBlocked<T, B, I, A>> {
        let mut diag = self.create_vector_l();
        self.extract_diag_into(&mut diag)?;
        Ok(diag)
    }

    /// Write the main diagonal into `diag`
    pub fn extract_diag_into(&self, diag: &mut DenseVectorBlocked<T, B, I, A>) -> SparseResult<()> {
        if self.rows() != self.columns() {
            return Err(ShapeMismatchError::NotSquare {
                operation: "extract_diag",
                rows: self.rows(),
                columns: self.columns(),
            }
            .into());
        }
        self.check_vector("extract_diag", self.rows(), diag.size())?;
        let vals = self.values.read_for(diag.buffer());
        kernels::bcsr_extract_diag::<T, I, B>(
            &mut diag.raw_elements_mut(),
            self.row_ptr(),
            self.col_ind(),
            &vals,
        );
        Ok(())
    }
}

impl<T: Scalar, const BH: usize, const BW: usize, I: IndexType, A: Backend> Clone
    for SparseMatrixBcsr<T, BH, BW, I, A>
{
    /// Same as [`SparseMatrixBcsr::deep_clone`]
    fn clone(&self) -> Self {
        self.deep_clone()
    }
}

impl<T: Scalar, const BH: usize, const BW: usize, I: IndexType, A: Backend> Default
    for SparseMatrixBcsr<T, BH, BW, I, A>
{
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl<T: Scalar, const BH: usize, const BW: usize, I: IndexType, A: Backend> PartialEq
    for SparseMatrixBcsr<T, BH, BW, I, A>
{
    /// Exact comparison of pattern and values
    fn eq(&self, other: &Self) -> bool {
        (Arc::ptr_eq(&self.layout, &other.layout) || *self.layout == *other.layout)
            && *self.values.read() == *other.values.read()
    }
}

impl<T: Scalar, const BH: usize, const BW: usize, I: IndexType, A: Backend> fmt::Debug
    for SparseMatrixBcsr<T, BH, BW, I, A>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseMatrixBcsr")
            .field("block", &(BH, BW))
            .field("rows", &self.rows())
            .field("columns", &self.columns())
            .field("used_elements", &self.used_elements())
            .field("backend", &A::name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Compression;
    use approx::assert_relative_eq;

    type Bcsr23 = SparseMatrixBcsr<f64, 2, 3>;

    fn block_diag_23() -> Bcsr23 {
        let values: Vec<f64> = (1..=12).map(f64::from).collect();
        Bcsr23::from_arrays(2, 2, vec![0, 1, 2], vec![0, 1], values).unwrap()
    }

    /// 3×3 scalar matrix with a non-trivial pattern
    fn scalar_3x3() -> SparseMatrixBcsr<f64, 1, 1> {
        let blocks = [(0, 0, 1.0), (0, 2, 2.0), (1, 1, 3.0), (2, 0, 4.0), (2, 1, 5.0)];
        SparseMatrixBcsr::from_blocks(3, 3, blocks.map(|(r, c, v)| (r, c, Matrix::splat(v)))).unwrap()
    }

    fn dense_matvec(dense: &[f64], width: usize, x: &[f64]) -> Vec<f64> {
        dense
            .chunks_exact(width)
            .map(|row| row.iter().zip(x).map(|(a, b)| a * b).sum())
            .collect()
    }

    #[test]
    fn test_from_arrays_and_access() {
        let a = block_diag_23();
        assert_eq!(a.rows(), 2);
        assert_eq!(a.columns(), 2);
        assert_eq!(a.raw_rows(), 4);
        assert_eq!(a.raw_columns(), 6);
        assert_eq!(a.used_elements(), 2);
        assert_eq!(a.raw_used_elements(), 12);
        assert_eq!(a.size(), 24);
        assert_eq!(a.bytes(), 12 * 8 + 5 * 8);
        assert_eq!(a.get(1, 0), Matrix::zeros());
        assert_eq!(a.get(1, 1)[(1, 1)], 11.0);
        assert_eq!(a.get(0, 0)[(1, 0)], 4.0);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_from_arrays_rejects_bad_input() {
        // three rows need four row pointer entries
        let err = SparseMatrixBcsr::<f64, 1, 1>::from_arrays(3, 3, vec![0, 1, 2], vec![0, 1], vec![1.0, 2.0]);
        assert!(matches!(
            err,
            Err(SparseError::Validation(ValidationError::RowPtrLength { len: 3, expected: 4 }))
        ));

        let err = Bcsr23::from_arrays(2, 2, vec![0, 1, 2], vec![0, 1], vec![1.0; 11]);
        assert!(matches!(err, Err(SparseError::Validation(ValidationError::ValueLength { .. }))));

        let err = Bcsr23::from_arrays(2, 2, vec![0, 1, 2], vec![0, 1], vec![1.0; 18]);
        assert!(matches!(
            err,
            Err(SparseError::Validation(ValidationError::LengthMismatch { col_ind: 2, blocks: 3 }))
        ));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_outside_grid_panics() {
        block_diag_23().get(2, 0);
    }

    #[test]
    fn test_set_respects_pattern() {
        let mut a = block_diag_23();
        let block = Matrix::splat(-1.0);
        a.set(0, 0, block).unwrap();
        assert_eq!(a.get(0, 0), block);
        let err = a.set(0, 1, block).unwrap_err();
        assert!(matches!(
            err,
            SparseError::Operation(OperationError::NotInPattern { row: 0, col: 1 })
        ));
    }

    #[test]
    fn test_extract_diag() {
        let values: Vec<f64> = (1..=18).map(f64::from).collect();
        let a = SparseMatrixBcsr::<f64, 3, 3>::from_arrays(2, 2, vec![0, 1, 2], vec![0, 1], values).unwrap();
        let diag = a.extract_diag().unwrap();
        assert_eq!(diag.to_vec(), vec![1.0, 5.0, 9.0, 10.0, 14.0, 18.0]);

        let rect = SparseMatrixBcsr::<f64, 1, 1>::new(2, 3).extract_diag();
        assert!(matches!(
            rect,
            Err(SparseError::ShapeMismatch(ShapeMismatchError::NotSquare { .. }))
        ));
    }

    #[test]
    fn test_apply_matches_dense() {
        let a = block_diag_23();
        let dense = a.to_dense();
        let mut x = a.create_vector_r();
        for (i, v) in x.raw_elements_mut().iter_mut().enumerate() {
            *v = i as f64;
        }
        let mut y = a.create_vector_l();
        for (i, v) in y.raw_elements_mut().iter_mut().enumerate() {
            *v = (i % 100) as f64;
        }
        let ax = dense_matvec(&dense, a.raw_columns(), &x.to_vec());

        let mut r = a.create_vector_l();
        a.apply(&mut r, &x).unwrap();
        for (got, want) in r.to_vec().iter().zip(&ax) {
            assert_relative_eq!(got, want, epsilon = 1e-12);
        }

        for alpha in [-1.0, 1.234] {
            a.apply_axpy(&mut r, &x, &y, alpha).unwrap();
            for ((got, want), yv) in r.to_vec().iter().zip(&ax).zip(y.to_vec()) {
                assert_relative_eq!(*got, yv + alpha * want, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_apply_axpy_in_place_and_zero_alpha() {
        let a = block_diag_23();
        let x = DenseVectorBlocked::<f64, 3>::from_value(2, 1.0);
        let y = DenseVectorBlocked::<f64, 2>::from_value(2, 0.5);

        let mut r = y.deep_clone();
        let alias = r.weak_clone();
        a.apply_axpy(&mut r, &x, &alias, 2.0).unwrap();
        assert_eq!(r.to_vec(), vec![12.5, 30.5, 48.5, 66.5]);

        a.apply_axpy(&mut r, &x, &y, 0.0).unwrap();
        assert_eq!(r, y);
    }

    #[test]
    fn test_apply_rejects_aliasing_and_bad_sizes() {
        let a = SparseMatrixBcsr::<f64, 1, 1>::from_blocks(2, 2, [(0, 0, Matrix::splat(1.0))]).unwrap();
        let x = DenseVectorBlocked::<f64, 1>::from_value(2, 1.0);
        let mut r = x.weak_clone();
        assert!(matches!(
            a.apply(&mut r, &x),
            Err(SparseError::Operation(OperationError::Aliasing { .. }))
        ));

        let mut short = DenseVectorBlocked::<f64, 1>::new(1);
        assert!(matches!(
            a.apply(&mut short, &x),
            Err(SparseError::ShapeMismatch(ShapeMismatchError::MatVec { size: 1, .. }))
        ));
    }

    #[test]
    fn test_apply_with_empty_pattern() {
        let a = SparseMatrixBcsr::<f64, 2, 2>::new(3, 3);
        assert_eq!(a.used_elements(), 0);
        let x = DenseVectorBlocked::<f64, 2>::from_value(3, 1.0);
        let y = DenseVectorBlocked::<f64, 2>::from_value(3, 0.25);

        let mut r = DenseVectorBlocked::<f64, 2>::from_value(3, 7.0);
        a.apply(&mut r, &x).unwrap();
        assert_eq!(r.to_vec(), vec![0.0; 6]);
        a.apply_axpy(&mut r, &x, &y, 3.0).unwrap();
        assert_eq!(r, y);

        // x is never read, so sharing storage with r is allowed
        let mut alias = x.weak_clone();
        a.apply_axpy(&mut alias, &x, &y, 3.0).unwrap();
        assert_eq!(x.to_vec(), vec![0.25; 6]);
        a.apply(&mut alias, &x).unwrap();
        assert_eq!(x.to_vec(), vec![0.0; 6]);
    }

    #[test]
    fn test_apply_axpy_zero_alpha_ignores_aliasing() {
        let a = SparseMatrixBcsr::<f64, 1, 1>::from_blocks(2, 2, [(0, 0, Matrix::splat(1.0))]).unwrap();
        let x = DenseVectorBlocked::<f64, 1>::from_value(2, 1.0);
        let y = DenseVectorBlocked::<f64, 1>::from_value(2, 4.0);
        let mut r = x.weak_clone();
        a.apply_axpy(&mut r, &x, &y, 0.0).unwrap();
        assert_eq!(x.to_vec(), vec![4.0, 4.0]);
        assert!(matches!(
            a.apply_axpy(&mut r, &x, &y, 1.0),
            Err(SparseError::Operation(OperationError::Aliasing { .. }))
        ));
    }

    #[test]
    fn test_clone_semantics() {
        let a = block_diag_23();
        let deep = a.deep_clone();
        let layout = a.layout_clone();
        let weak = a.weak_clone();
        let alloc = a.allocate_clone();

        assert!(!deep.shares_layout_with(&a));
        assert!(layout.shares_layout_with(&a));
        assert!(weak.shares_layout_with(&a) && weak.shares_values_with(&a));
        assert!(!alloc.shares_layout_with(&a) && !alloc.shares_values_with(&a));
        assert_eq!(layout.norm_frobenius(), 0.0);
        assert_eq!(alloc.norm_frobenius(), 0.0);

        let mut writer = a.weak_clone();
        writer.format(2.0);
        assert_eq!(a.get(1, 1), Matrix::splat(2.0));
        assert_ne!(deep, a);
    }

    #[test]
    fn test_axpy_scale_and_norms() {
        let a = block_diag_23();
        let mut r = a.layout_clone();
        r.axpy(&a, &a, 1.0).unwrap();
        let mut twice = a.layout_clone();
        twice.scale(&a, 2.0).unwrap();
        assert_eq!(r, twice);

        let mut acc = a.deep_clone();
        let alias = acc.weak_clone();
        acc.axpy(&a, &alias, -1.0).unwrap();
        assert_eq!(acc.norm_frobenius(), 0.0);

        let expected: f64 = (1..=12).map(|v| f64::from(v * v)).sum();
        assert_relative_eq!(a.norm_frobenius(), expected.sqrt(), epsilon = 1e-12);

        let other = scalar_3x3();
        let mut mismatched = SparseMatrixBcsr::<f64, 1, 1>::from_blocks(
            3,
            3,
            (0..5).map(|k| (k / 2, k % 3, Matrix::splat(1.0))),
        )
        .unwrap();
        assert_eq!(mismatched.used_elements(), other.used_elements());
        assert!(matches!(
            mismatched.scale(&other, 1.0),
            Err(SparseError::ShapeMismatch(ShapeMismatchError::Pattern { .. }))
        ));
    }

    #[test]
    fn test_row_reductions() {
        let a = block_diag_23();
        assert_eq!(a.lump_rows().to_vec(), vec![6.0, 15.0, 24.0, 33.0]);
        assert_eq!(a.row_norm2sqr().to_vec(), vec![14.0, 77.0, 194.0, 365.0]);
        assert_relative_eq!(a.row_norm2().to_vec()[0], 14f64.sqrt());

        let mut scal = a.create_vector_r();
        for (i, v) in scal.raw_elements_mut().iter_mut().enumerate() {
            *v = if i % 3 == 0 { 2.0 } else { 0.0 };
        }
        let weighted = a.row_norm2sqr_scaled(&scal).unwrap();
        assert_eq!(weighted.to_vec(), vec![2.0, 32.0, 98.0, 200.0]);
        assert!(a.row_norm2sqr_scaled(&DenseVectorBlocked::new(3)).is_err());
    }

    #[test]
    fn test_add_trace_double_mat_mult() {
        let full = |vals: [f64; 4]| {
            SparseMatrixBcsr::<f64, 1, 1>::from_blocks(
                2,
                2,
                (0..4).map(move |k| (k / 2, k % 2, Matrix::splat(vals[k]))),
            )
            .unwrap()
        };
        let b = full([1.0, 2.0, 3.0, 4.0]);
        let d = full([5.0, 6.0, 7.0, 8.0]);
        let a = DenseVectorBlocked::<f64, 1>::from_raw(vec![1.0, 2.0]).unwrap();
        let mut v = DenseVectorBlocked::<f64, 1>::new(2);
        b.add_trace_double_mat_mult(&mut v, &d, &a, 1.0).unwrap();
        assert_eq!(v.to_vec(), vec![41.0, 78.0]);

        b.add_trace_double_mat_mult(&mut v, &d, &a, -0.5).unwrap();
        assert_eq!(v.to_vec(), vec![20.5, 39.0]);

        let wrong = SparseMatrixBcsr::<f64, 1, 1>::new(3, 2);
        assert!(b.add_trace_double_mat_mult(&mut v, &wrong, &a, 1.0).is_err());
    }

    #[test]
    fn test_add_trace_double_mat_mult_narrow_d_blocks() {
        // B block [[1, 2, 3], [4, 5, 6]], D block [[1, 2], [3, 4]], a = [1, 10]
        let b = Bcsr23::from_arrays(1, 1, vec![0, 1], vec![0], (1..=6).map(f64::from).collect()).unwrap();
        let d = SparseMatrixBcsr::<f64, 2, 2>::from_arrays(1, 1, vec![0, 1], vec![0], vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let a = DenseVectorBlocked::<f64, 2>::from_raw(vec![1.0, 10.0]).unwrap();
        let mut v = DenseVectorBlocked::<f64, 2>::new(1);
        b.add_trace_double_mat_mult(&mut v, &d, &a, 1.0).unwrap();
        // v_0 = 1*1*1 + 2*10*4, v_1 = 3*1*2 + 4*10*5
        assert_eq!(v.to_vec(), vec![81.0, 206.0]);

        let d_full = SparseMatrixBcsr::<f64, 3, 2>::from_arrays(1, 1, vec![0, 1], vec![0], vec![1.0; 6]).unwrap();
        let mut v_full = DenseVectorBlocked::<f64, 3>::new(1);
        b.add_trace_double_mat_mult(&mut v_full, &d_full, &a, 0.5).unwrap();
        // column r of B weighted by a: (1 + 40, 2 + 50, 3 + 60) / 2
        assert_eq!(v_full.to_vec(), vec![20.5, 26.0, 31.5]);
    }

    #[test]
    fn test_permute_matches_dense() {
        let original = scalar_3x3();
        let mut a = original.deep_clone();
        let rp = Permutation::from_perm(vec![2, 0, 1]).unwrap();
        let cp = Permutation::from_perm(vec![1, 2, 0]).unwrap();
        a.permute(&rp, &cp).unwrap();
        assert!(a.validate().is_ok());
        assert_eq!(a.used_elements(), original.used_elements());
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(a.get(i, j), original.get(rp.map(i), cp.map(j)));
            }
        }

        a.permute(&rp.inverse(), &cp.inverse()).unwrap();
        assert_eq!(a, original);

        let wrong = Permutation::identity(2);
        assert!(a.permute(&wrong, &cp).is_err());
    }

    #[test]
    fn test_permute_detaches_weak_clones() {
        let mut a = scalar_3x3();
        let before = a.weak_clone();
        let p = Permutation::from_perm(vec![1, 0, 2]).unwrap();
        a.permute(&p, &p).unwrap();
        assert_eq!(before, scalar_3x3());
        assert!(!a.shares_values_with(&before));
    }

    #[test]
    fn test_copy_and_convert() {
        let a = block_diag_23();
        let mut target = a.layout_clone();
        target.copy_from(&a).unwrap();
        assert_eq!(target, a);
        assert!(SparseMatrixBcsr::<f64, 2, 3>::new(2, 2).copy_from(&a).is_err());

        let narrow: SparseMatrixBcsr<f32, 2, 3, u32> = a.convert().unwrap();
        assert_eq!(narrow.get(1, 1)[(1, 2)], 12.0f32);
        assert_eq!(narrow.bytes(), 12 * 4 + 5 * 4);
    }

    #[test]
    fn test_binary_roundtrip() {
        let a = block_diag_23();
        for config in [SerialConfig::default(), SerialConfig::zlib()] {
            let bytes = a.serialize(&config).unwrap();
            assert_eq!(Bcsr23::deserialize(&bytes).unwrap(), a);
        }
        let lossy = a
            .serialize(&SerialConfig::default().with_compression(Compression::Lossy { tolerance: 1e-3 }))
            .unwrap();
        let back = Bcsr23::deserialize(&lossy).unwrap();
        for (x, y) in back.to_dense().iter().zip(a.to_dense()) {
            assert!((x - y).abs() <= 1e-3);
        }

        let bytes = a.serialize(&SerialConfig::default()).unwrap();
        assert!(SparseMatrixBcsr::<f64, 3, 2>::deserialize(&bytes).is_err());
        assert!(DenseVectorBlocked::<f64, 2>::deserialize(&bytes).is_err());
    }

    fn forged_image(scalars: [u64; 4], row_ptr: Vec<u64>, col_ind: Vec<u64>, values: Vec<f64>) -> Vec<u8> {
        BinaryImage::bcsr(ScalarType::F64, feblock_core::IndexKind::U64, (1, 1), scalars, values, row_ptr, col_ind)
            .unwrap()
            .encode(&SerialConfig::default())
            .unwrap()
    }

    fn malformed_field(result: SparseResult<SparseMatrixBcsr<f64, 1, 1>>) -> &'static str {
        match result {
            Err(SparseError::Io(crate::error::IoError::Malformed { field, .. })) => field,
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_rejects_forged_header() {
        let bytes = forged_image([0, u64::MAX, 0, 0], vec![0], vec![], vec![]);
        let field = malformed_field(SparseMatrixBcsr::<f64, 1, 1>::deserialize(&bytes));
        assert!(matches!(field, "row_ptr" | "rows"), "{field}");

        // grid size and row count disagree
        let bytes = forged_image([6, 2, 2, 1], vec![0, 1, 1], vec![0], vec![1.0]);
        assert_eq!(malformed_field(SparseMatrixBcsr::<f64, 1, 1>::deserialize(&bytes)), "size");
        let bytes = forged_image([u64::MAX, 1 << 32, 1 << 32, 1], vec![0, 1, 1], vec![0], vec![1.0]);
        assert_eq!(malformed_field(SparseMatrixBcsr::<f64, 1, 1>::deserialize(&bytes)), "size");

        // used block count disagrees with the column index array
        let bytes = forged_image([4, 2, 2, 3], vec![0, 1, 1], vec![0], vec![1.0]);
        assert_eq!(malformed_field(SparseMatrixBcsr::<f64, 1, 1>::deserialize(&bytes)), "col_ind");
        let bytes = forged_image([4, 2, 2, 1], vec![0, 1, 1], vec![0], vec![1.0, 2.0]);
        assert_eq!(malformed_field(SparseMatrixBcsr::<f64, 1, 1>::deserialize(&bytes)), "values");

        let bytes = forged_image([4, 2, 2, 1], vec![0, 1, 1], vec![0], vec![1.0]);
        let a = SparseMatrixBcsr::<f64, 1, 1>::deserialize(&bytes).unwrap();
        assert_eq!(a.get(0, 0), Matrix::splat(1.0));
    }

    #[test]
    fn test_from_blocks_rejects_unaddressable_grid() {
        let none = std::iter::empty::<(usize, usize, Matrix<f64, 1, 1>)>;
        assert!(matches!(
            SparseMatrixBcsr::<f64, 1, 1>::from_blocks(usize::MAX, 1, none()),
            Err(SparseError::Validation(ValidationError::TooLarge { .. }))
        ));
        #[cfg(target_pointer_width = "64")]
        {
            assert!(matches!(
                SparseMatrixBcsr::<f64, 1, 1>::from_blocks(1 << 62, 1, none()),
                Err(SparseError::Validation(ValidationError::TooLarge { .. }))
            ));
        }
        assert_eq!(SparseMatrixBcsr::<f64, 1, 1>::from_blocks(3, 1, none()).unwrap().used_elements(), 0);
    }

    #[test]
    fn test_read_mtx_rejects_unaddressable_size() {
        let text = b"%%MatrixMarket matrix coordinate real general\n18446744073709551615 1 0\n";
        assert!(matches!(
            SparseMatrixBcsr::<f64, 1, 1>::read_from(FileMode::Mtx, &text[..]),
            Err(SparseError::Io(crate::error::IoError::Parse { line: 2, .. }))
        ));
    }

    #[test]
    fn test_from_graph_with_unordered_neighbours() {
        let graph = Graph::new(1, 3, vec![0, 2], vec![2, 0]).unwrap();
        let mut a = SparseMatrixBcsr::<f64, 1, 1>::from_graph(&graph).unwrap();
        a.format(5.0);
        assert_eq!(a.get(0, 0), Matrix::splat(5.0));
        assert_eq!(a.get(0, 2), Matrix::splat(5.0));
        assert_eq!(a.get(0, 1), Matrix::zeros());

        let repeated = Graph::new(1, 3, vec![0, 2], vec![1, 1]).unwrap();
        assert!(SparseMatrixBcsr::<f64, 1, 1>::from_graph(&repeated).is_err());
    }

    #[test]
    fn test_text_roundtrip() {
        let a = block_diag_23();
        let mut out = Vec::new();
        a.write_out(FileMode::Mtx, &mut out).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("4 6 12"));
        let back = Bcsr23::read_from(FileMode::Mtx, out.as_slice()).unwrap();
        assert_eq!(back, a);

        assert!(SparseMatrixBcsr::<f64, 3, 3>::read_from(FileMode::Mtx, out.as_slice()).is_err());
        assert!(matches!(
            a.write_out(FileMode::Exp, &mut Vec::new()),
            Err(SparseError::Io(crate::error::IoError::FileModeNotSupported { .. }))
        ));
    }

    #[test]
    fn test_from_blocks_sorts_and_checks_bounds() {
        let a = SparseMatrixBcsr::<f64, 1, 1>::from_blocks(
            2,
            2,
            [(1, 1, Matrix::splat(4.0)), (0, 1, Matrix::splat(2.0)), (1, 0, Matrix::splat(3.0))],
        )
        .unwrap();
        assert_eq!(a.row_ptr(), &[0, 1, 3]);
        assert_eq!(a.col_ind(), &[1, 0, 1]);
        assert!(a.validate().is_ok());
        assert!(SparseMatrixBcsr::<f64, 1, 1>::from_blocks(2, 2, [(2, 0, Matrix::zeros())]).is_err());
    }
}
