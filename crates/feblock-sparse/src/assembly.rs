//! Scatter/gather adapters for element assembly
//!
//! Assembly code computes small dense local matrices and vectors per mesh
//! entity and accumulates them into the global containers. A [`DofMapping`]
//! maps every local degree of freedom to one or more weighted global ones
//! (a single unit-weight entry for ordinary dofs, several for constrained
//! dofs such as hanging nodes).
//!
//! Scatter adds `alpha * w_I * w_J * local[i][j]` to `global[I][J]` for every
//! contribution pair. The global sparsity pattern must already contain every
//! target block; scatter resolves all target slots before writing, so a
//! missing slot leaves the container untouched.
//!
//! # Examples
//!
//! ```
//! use feblock_core::Matrix;
//! use feblock_sparse::assembly::{DirectMapping, LocalMatrix};
//! use feblock_sparse::{Graph, SparseMatrixBcsr};
//!
//! // two 1D elements on three nodes
//! let graph = Graph::from_element_connectivity(3, &[vec![0, 1], vec![1, 2]]).unwrap();
//! let mut a = SparseMatrixBcsr::<f64, 1, 1>::from_graph(&graph).unwrap();
//!
//! let mut local = LocalMatrix::<f64, 1, 1>::new(2, 2);
//! local[(0, 0)] = Matrix::splat(1.0);
//! local[(0, 1)] = Matrix::splat(-1.0);
//! local[(1, 0)] = Matrix::splat(-1.0);
//! local[(1, 1)] = Matrix::splat(1.0);
//!
//! let mut scatter = a.scatter_axpy();
//! for element in [[0, 1], [1, 2]] {
//!     let map = DirectMapping::new(element.to_vec());
//!     scatter.scatter(&local, &map, &map, 1.0).unwrap();
//! }
//! assert_eq!(a.get(1, 1)[(0, 0)], 2.0);
//! ```

use crate::bcsr::SparseMatrixBcsr;
use crate::dense_vector::DenseVectorBlocked;
use crate::error::{AssemblyError, SparseResult};
use feblock_core::{Backend, IndexType, Matrix, Scalar, Vector};
use std::ops::{Index, IndexMut};

/// Local-to-global map of degrees of freedom
pub trait DofMapping {
    /// Number of local dofs
    fn num_local_dofs(&self) -> usize;

    /// Number of global contributions of local dof `i`
    fn num_contribs(&self, i: usize) -> usize;

    /// Global index of contribution `ic` of local dof `i`
    fn index(&self, i: usize, ic: usize) -> usize;

    /// Weight of contribution `ic` of local dof `i`
    fn weight(&self, i: usize, ic: usize) -> f64;
}

/// One global dof per local dof, weight 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMapping {
    indices: Vec<usize>,
}

impl DirectMapping {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl From<Vec<usize>> for DirectMapping {
    fn from(indices: Vec<usize>) -> Self {
        Self::new(indices)
    }
}

impl DofMapping for DirectMapping {
    fn num_local_dofs(&self) -> usize {
        self.indices.len()
    }

    fn num_contribs(&self, _i: usize) -> usize {
        1
    }

    fn index(&self, i: usize, _ic: usize) -> usize {
        self.indices[i]
    }

    fn weight(&self, _i: usize, _ic: usize) -> f64 {
        1.0
    }
}

/// Weighted contributions per local dof
///
/// ```
/// use feblock_sparse::assembly::{DofMapping, WeightedMapping};
///
/// // dof 1 is a hanging node averaging global dofs 4 and 6
/// let map = WeightedMapping::new()
///     .with_dof([(3, 1.0)])
///     .with_dof([(4, 0.5), (6, 0.5)]);
/// assert_eq!(map.num_local_dofs(), 2);
/// assert_eq!(map.num_contribs(1), 2);
/// assert_eq!(map.index(1, 1), 6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMapping {
    ptr: Vec<usize>,
    contribs: Vec<(usize, f64)>,
}

impl WeightedMapping {
    pub fn new() -> Self {
        Self {
            ptr: vec![0],
            contribs: Vec::new(),
        }
    }

    /// Append a local dof with its `(global index, weight)` contributions
    pub fn push_dof(&mut self, contribs: impl IntoIterator<Item = (usize, f64)>) -> &mut Self {
        self.contribs.extend(contribs);
        self.ptr.push(self.contribs.len());
        self
    }

    pub fn with_dof(mut self, contribs: impl IntoIterator<Item = (usize, f64)>) -> Self {
        self.push_dof(contribs);
        self
    }

    fn contrib(&self, i: usize, ic: usize) -> (usize, f64) {
        debug_assert!(ic < self.num_contribs(i));
        self.contribs[self.ptr[i] + ic]
    }
}

impl Default for WeightedMapping {
    fn default() -> Self {
        Self::new()
    }
}

impl DofMapping for WeightedMapping {
    fn num_local_dofs(&self) -> usize {
        self.ptr.len() - 1
    }

    fn num_contribs(&self, i: usize) -> usize {
        self.ptr[i + 1] - self.ptr[i]
    }

    fn index(&self, i: usize, ic: usize) -> usize {
        self.contrib(i, ic).0
    }

    fn weight(&self, i: usize, ic: usize) -> f64 {
        self.contrib(i, ic).1
    }
}

/// Dense `rows × cols` matrix of `BH × BW` blocks
#[derive(Debug, Clone, PartialEq)]
pub struct LocalMatrix<T, const BH: usize, const BW: usize> {
    rows: usize,
    cols: usize,
    data: Vec<Matrix<T, BH, BW>>,
}

impl<T: Scalar, const BH: usize, const BW: usize> LocalMatrix<T, BH, BW> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![Matrix::zeros(); rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Set every block to zero
    pub fn clear(&mut self) {
        self.data.fill(Matrix::zeros());
    }
}

impl<T, const BH: usize, const BW: usize> Index<(usize, usize)> for LocalMatrix<T, BH, BW> {
    type Output = Matrix<T, BH, BW>;

    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        assert!(i < self.rows && j < self.cols, "local block ({i}, {j}) out of range");
        &self.data[i * self.cols + j]
    }
}

impl<T, const BH: usize, const BW: usize> IndexMut<(usize, usize)> for LocalMatrix<T, BH, BW> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        assert!(i < self.rows && j < self.cols, "local block ({i}, {j}) out of range");
        &mut self.data[i * self.cols + j]
    }
}

fn check_local_shape(rows: usize, cols: usize, got_rows: usize, got_cols: usize) -> SparseResult<()> {
    if rows != got_rows || cols != got_cols {
        return Err(AssemblyError::LocalShape {
            rows,
            cols,
            got_rows,
            got_cols,
        }
        .into());
    }
    Ok(())
}

/// Every global index of `map` must be below `size`
fn check_indices(map: &dyn DofMapping, size: usize) -> SparseResult<()> {
    for i in 0..map.num_local_dofs() {
        for ic in 0..map.num_contribs(i) {
            let index = map.index(i, ic);
            if index >= size {
                return Err(AssemblyError::IndexOutOfBounds { index, size }.into());
            }
        }
    }
    Ok(())
}

/// Column lookup for one matrix row at a time
///
/// `slot[col]` holds the storage position of `(row, col)` while `row` is
/// loaded and `None` otherwise.
#[derive(Debug)]
struct RowLookup {
    slot: Vec<Option<usize>>,
}

impl RowLookup {
    fn new(columns: usize) -> Self {
        Self {
            slot: vec![None; columns],
        }
    }

    fn load<I: IndexType>(&mut self, row_ptr: &[I], col_ind: &[I], row: usize) {
        for k in row_ptr[row].index()..row_ptr[row + 1].index() {
            self.slot[col_ind[k].index()] = Some(k);
        }
    }

    fn unload<I: IndexType>(&mut self, row_ptr: &[I], col_ind: &[I], row: usize) {
        for k in row_ptr[row].index()..row_ptr[row + 1].index() {
            self.slot[col_ind[k].index()] = None;
        }
    }
}

// ========== Matrix adapters ==========

/// A resolved scatter target: storage slot, local block and weight product
type Target<T> = (usize, usize, usize, T);

/// Scatter-axpy into a BCSR matrix
pub struct MatrixScatterAxpy<'a, T, const BH: usize, const BW: usize, I, A> {
    matrix: &'a mut SparseMatrixBcsr<T, BH, BW, I, A>,
    lookup: RowLookup,
    targets: Vec<Target<T>>,
}

impl<'a, T, const BH: usize, const BW: usize, I, A> MatrixScatterAxpy<'a, T, BH, BW, I, A>
where
    T: Scalar,
    I: IndexType,
    A: Backend,
{
    pub fn new(matrix: &'a mut SparseMatrixBcsr<T, BH, BW, I, A>) -> Self {
        let lookup = RowLookup::new(matrix.columns());
        Self {
            matrix,
            lookup,
            targets: Vec::new(),
        }
    }

    fn resolve(&mut self, row_map: &dyn DofMapping, col_map: &dyn DofMapping) -> SparseResult<()> {
        let (row_ptr, col_ind) = (self.matrix.row_ptr(), self.matrix.col_ind());
        for i in 0..row_map.num_local_dofs() {
            for ic in 0..row_map.num_contribs(i) {
                let (row, wr) = (row_map.index(i, ic), row_map.weight(i, ic));
                self.lookup.load(row_ptr, col_ind, row);
                let mut missing = None;
                'cols: for j in 0..col_map.num_local_dofs() {
                    for jc in 0..col_map.num_contribs(j) {
                        let col = col_map.index(j, jc);
                        match self.lookup.slot[col] {
                            Some(k) => self
                                .targets
                                .push((k, i, j, T::from_f64(wr * col_map.weight(j, jc)))),
                            None => {
                                missing = Some(col);
                                break 'cols;
                            }
                        }
                    }
                }
                self.lookup.unload(row_ptr, col_ind, row);
                if let Some(col) = missing {
                    return Err(AssemblyError::MissingEntry { row, col }.into());
                }
            }
        }
        Ok(())
    }

    /// `global[I][J] += alpha * w_I * w_J * local[i][j]`
    ///
    /// # Errors
    ///
    /// - `LocalShape` if `local` does not match the mappings
    /// - `IndexOutOfBounds` for a global index outside the block grid
    /// - `MissingEntry` if a target block is not in the pattern
    ///
    /// On error the matrix is unchanged.
    pub fn scatter(
        &mut self,
        local: &LocalMatrix<T, BH, BW>,
        row_map: &dyn DofMapping,
        col_map: &dyn DofMapping,
        alpha: T,
    ) -> SparseResult<()> {
        tracing::trace!(rows = row_map.num_local_dofs(), cols = col_map.num_local_dofs(), "scatter_axpy");
        check_local_shape(row_map.num_local_dofs(), col_map.num_local_dofs(), local.rows(), local.cols())?;
        check_indices(row_map, self.matrix.rows())?;
        check_indices(col_map, self.matrix.columns())?;

        self.targets.clear();
        self.resolve(row_map, col_map)?;

        let block = BH * BW;
        let mut values = self.matrix.values_mut();
        for &(k, i, j, w) in &self.targets {
            let factor = alpha * w;
            let dst = &mut values[k * block..(k + 1) * block];
            for (d, &s) in dst.iter_mut().zip(local[(i, j)].rows().iter().flatten()) {
                *d += factor * s;
            }
        }
        Ok(())
    }
}

/// Gather-axpy out of a BCSR matrix
pub struct MatrixGatherAxpy<'a, T, const BH: usize, const BW: usize, I, A> {
    matrix: &'a SparseMatrixBcsr<T, BH, BW, I, A>,
    lookup: RowLookup,
}

impl<'a, T, const BH: usize, const BW: usize, I, A> MatrixGatherAxpy<'a, T, BH, BW, I, A>
where
    T: Scalar,
    I: IndexType,
    A: Backend,
{
    pub fn new(matrix: &'a SparseMatrixBcsr<T, BH, BW, I, A>) -> Self {
        Self {
            matrix,
            lookup: RowLookup::new(matrix.columns()),
        }
    }

    /// `local[i][j] += alpha * Σ w_I * w_J * global[I][J]`
    ///
    /// Blocks missing from the pattern read as zero.
    pub fn gather(
        &mut self,
        local: &mut LocalMatrix<T, BH, BW>,
        row_map: &dyn DofMapping,
        col_map: &dyn DofMapping,
        alpha: T,
    ) -> SparseResult<()> {
        tracing::trace!(rows = row_map.num_local_dofs(), cols = col_map.num_local_dofs(), "gather_axpy");
        check_local_shape(row_map.num_local_dofs(), col_map.num_local_dofs(), local.rows(), local.cols())?;
        check_indices(row_map, self.matrix.rows())?;
        check_indices(col_map, self.matrix.columns())?;

        let matrix = self.matrix;
        let (row_ptr, col_ind) = (matrix.row_ptr(), matrix.col_ind());
        let values = matrix.values();
        let block = BH * BW;
        for i in 0..row_map.num_local_dofs() {
            for ic in 0..row_map.num_contribs(i) {
                let (row, wr) = (row_map.index(i, ic), row_map.weight(i, ic));
                self.lookup.load(row_ptr, col_ind, row);
                for j in 0..col_map.num_local_dofs() {
                    for jc in 0..col_map.num_contribs(j) {
                        let Some(k) = self.lookup.slot[col_map.index(j, jc)] else {
                            continue;
                        };
                        let factor = alpha * T::from_f64(wr * col_map.weight(j, jc));
                        local[(i, j)] += Matrix::from_slice(&values[k * block..(k + 1) * block]) * factor;
                    }
                }
                self.lookup.unload(row_ptr, col_ind, row);
            }
        }
        Ok(())
    }
}

// ========== Vector adapters ==========

/// Scatter-axpy into a blocked vector
pub struct VectorScatterAxpy<'a, T, const B: usize, I, A> {
    vector: &'a mut DenseVectorBlocked<T, B, I, A>,
}

impl<'a, T, const B: usize, I, A> VectorScatterAxpy<'a, T, B, I, A>
where
    T: Scalar,
    I: IndexType,
    A: Backend,
{
    pub fn new(vector: &'a mut DenseVectorBlocked<T, B, I, A>) -> Self {
        Self { vector }
    }

    /// `global[I] += alpha * w_I * local[i]`; on error the vector is unchanged
    pub fn scatter(&mut self, local: &[Vector<T, B>], map: &dyn DofMapping, alpha: T) -> SparseResult<()> {
        tracing::trace!(dofs = map.num_local_dofs(), "scatter_axpy");
        check_local_shape(map.num_local_dofs(), 1, local.len(), 1)?;
        check_indices(map, self.vector.size())?;

        let mut data = self.vector.raw_elements_mut();
        for (i, loc) in local.iter().enumerate() {
            for ic in 0..map.num_contribs(i) {
                let index = map.index(i, ic);
                let factor = alpha * T::from_f64(map.weight(i, ic));
                for (d, &s) in data[index * B..(index + 1) * B].iter_mut().zip(loc.as_slice()) {
                    *d += factor * s;
                }
            }
        }
        Ok(())
    }
}

/// Gather-axpy out of a blocked vector
pub struct VectorGatherAxpy<'a, T, const B: usize, I, A> {
    vector: &'a DenseVectorBlocked<T, B, I, A>,
}

impl<'a, T, const B: usize, I, A> VectorGatherAxpy<'a, T, B, I, A>
where
    T: Scalar,
    I: IndexType,
    A: Backend,
{
    pub fn new(vector: &'a DenseVectorBlocked<T, B, I, A>) -> Self {
        Self { vector }
    }

    /// `local[i] += alpha * Σ w_I * global[I]`
    pub fn gather(&mut self, local: &mut [Vector<T, B>], map: &dyn DofMapping, alpha: T) -> SparseResult<()> {
        tracing::trace!(dofs = map.num_local_dofs(), "gather_axpy");
        check_local_shape(map.num_local_dofs(), 1, local.len(), 1)?;
        check_indices(map, self.vector.size())?;

        let data = self.vector.raw_elements();
        for (i, loc) in local.iter_mut().enumerate() {
            let mut acc = Vector::<T, B>::zeros();
            for ic in 0..map.num_contribs(i) {
                let index = map.index(i, ic);
                acc += Vector::from_slice(&data[index * B..(index + 1) * B]) * T::from_f64(map.weight(i, ic));
            }
            *loc += acc * alpha;
        }
        Ok(())
    }
}

// ========== Erased interfaces ==========

/// Object-safe scatter into a matrix of `BH × BW` blocks
pub trait MatrixScatter<T, const BH: usize, const BW: usize> {
    fn scatter_axpy(
        &mut self,
        local: &LocalMatrix<T, BH, BW>,
        row_map: &dyn DofMapping,
        col_map: &dyn DofMapping,
        alpha: T,
    ) -> SparseResult<()>;
}

/// Object-safe gather out of a matrix of `BH × BW` blocks
pub trait MatrixGather<T, const BH: usize, const BW: usize> {
    fn gather_axpy(
        &mut self,
        local: &mut LocalMatrix<T, BH, BW>,
        row_map: &dyn DofMapping,
        col_map: &dyn DofMapping,
        alpha: T,
    ) -> SparseResult<()>;
}

/// Object-safe scatter into a vector of `B`-blocks
pub trait VectorScatter<T, const B: usize> {
    fn scatter_axpy(&mut self, local: &[Vector<T, B>], map: &dyn DofMapping, alpha: T) -> SparseResult<()>;
}

/// Object-safe gather out of a vector of `B`-blocks
pub trait VectorGather<T, const B: usize> {
    fn gather_axpy(&mut self, local: &mut [Vector<T, B>], map: &dyn DofMapping, alpha: T) -> SparseResult<()>;
}

impl<T: Scalar, const BH: usize, const BW: usize, I: IndexType, A: Backend> MatrixScatter<T, BH, BW>
    for MatrixScatterAxpy<'_, T, BH, BW, I, A>
{
    fn scatter_axpy(
        &mut self,
        local: &LocalMatrix<T, BH, BW>,
        row_map: &dyn DofMapping,
        col_map: &dyn DofMapping,
        alpha: T,
    ) -> SparseResult<()> {
        self.scatter(local, row_map, col_map, alpha)
    }
}

impl<T: Scalar, const BH: usize, const BW: usize, I: IndexType, A: Backend> MatrixGather<T, BH, BW>
    for MatrixGatherAxpy<'_, T, BH, BW, I, A>
{
    fn gather_axpy(
        &mut self,
        local: &mut LocalMatrix<T, BH, BW>,
        row_map: &dyn DofMapping,
        col_map: &dyn DofMapping,
        alpha: T,
    ) -> SparseResult<()> {
        self.gather(local, row_map, col_map, alpha)
    }
}

impl<T: Scalar, const B: usize, I: IndexType, A: Backend> VectorScatter<T, B> for VectorScatterAxpy<'_, T, B, I, A> {
    fn scatter_axpy(&mut self, local: &[Vector<T, B>], map: &dyn DofMapping, alpha: T) -> SparseResult<()> {
        self.scatter(local, map, alpha)
    }
}

impl<T: Scalar, const B: usize, I: IndexType, A: Backend> VectorGather<T, B> for VectorGatherAxpy<'_, T, B, I, A> {
    fn gather_axpy(&mut self, local: &mut [Vector<T, B>], map: &dyn DofMapping, alpha: T) -> SparseResult<()> {
        self.gather(local, map, alpha)
    }
}

impl<T: Scalar, const BH: usize, const BW: usize, I: IndexType, A: Backend> SparseMatrixBcsr<T, BH, BW, I, A> {
    /// Scatter adapter borrowing this matrix
    pub fn scatter_axpy(&mut self) -> MatrixScatterAxpy<'_, T, BH, BW, I, A> {
        MatrixScatterAxpy::new(self)
    }

    /// Gather adapter borrowing this matrix
    pub fn gather_axpy(&self) -> MatrixGatherAxpy<'_, T, BH, BW, I, A> {
        MatrixGatherAxpy::new(self)
    }
}

impl<T: Scalar, const B: usize, I: IndexType, A: Backend> DenseVectorBlocked<T, B, I, A> {
    /// Scatter adapter borrowing this vector
    pub fn scatter_axpy(&mut self) -> VectorScatterAxpy<'_, T, B, I, A> {
        VectorScatterAxpy::new(self)
    }

    /// Gather adapter borrowing this vector
    pub fn gather_axpy(&self) -> VectorGatherAxpy<'_, T, B, I, A> {
        VectorGatherAxpy::new(self)
    }
}
