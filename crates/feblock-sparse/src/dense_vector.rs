//! Blocked dense vectors
//!
//! A [`DenseVectorBlocked<T, B>`] stores `size` blocks of `B` scalars in one
//! contiguous buffer (`raw_size = size * B` scalars). Arithmetic works on the
//! raw scalar stream; only [`DenseVectorBlocked::permute`] and block access
//! see the block structure. [`DenseVector`] is the unblocked case `B = 1`.
//!
//! # Ownership
//!
//! | factory            | values buffer                         | contents |
//! |--------------------|---------------------------------------|----------|
//! | `deep_clone`/`clone` | new, independent                    | copied   |
//! | `layout_clone`     | new, independent, same size           | zero     |
//! | `weak_clone`       | shared with the source                | shared   |
//! | `allocate_clone`   | new, independent, same size           | zero     |
//!
//! Writes through a weak clone are observed by every holder. Operands that
//! share memory with the written vector are read through a snapshot, so
//! `x.axpy(&x.weak_clone(), ..)` computes the mathematically expected result.
//!
//! # Examples
//!
//! ```rust
//! use feblock_core::Vector;
//! use feblock_sparse::DenseVectorBlocked;
//!
//! let x = DenseVectorBlocked::<f64, 2>::from_block(3, Vector::new([1.0, 2.0]));
//! let y = DenseVectorBlocked::<f64, 2>::from_value(3, 1.0);
//! let mut r = x.allocate_clone();
//! r.axpy(&x, &y, 2.0).unwrap();
//! assert_eq!(r.get(1).as_slice(), &[3.0, 5.0]);
//! assert_eq!(x.dot(&y).unwrap(), 9.0);
//! assert_eq!(r.raw_size(), 6);
//! ```

use crate::error::{OperationError, SparseError, SparseResult, ValidationError};
use crate::io::matrix_market;
use crate::io::{self, BinaryImage, ContainerKind, FileMode, SerialConfig};
use crate::permutation::Permutation;
use feblock_core::{
    transfer, Backend, IndexType, Main, ReadGuard, Scalar, ScalarType, SharedBuffer, Vector,
    WriteGuard,
};
use rand::Rng;
use std::fmt;
use std::io::{BufRead, Write};
use std::marker::PhantomData;
use std::path::Path;

/// Dense vector of `B`-scalar blocks
pub struct DenseVectorBlocked<T, const B: usize, I = u64, A = Main> {
    size: usize,
    data: SharedBuffer<T>,
    _marker: PhantomData<fn() -> (I, A)>,
}

/// Unblocked dense vector
pub type DenseVector<T, I = u64, A = Main> = DenseVectorBlocked<T, 1, I, A>;

impl<T, const B: usize, I, A> DenseVectorBlocked<T, B, I, A>
where
    T: Scalar,
    I: IndexType,
    A: Backend,
{
    fn wrap(size: usize, data: SharedBuffer<T>) -> Self {
        debug_assert_eq!(data.len(), size * B);
        Self {
            size,
            data,
            _marker: PhantomData,
        }
    }

    // ========== Construction ==========

    /// Vector of `size` zero blocks
    pub fn new(size: usize) -> Self {
        Self::wrap(size, SharedBuffer::from_vec(A::allocate(size * B)))
    }

    /// Vector with every scalar set to `value`
    pub fn from_value(size: usize, value: T) -> Self {
        let mut raw = A::allocate(size * B);
        A::set(&mut raw, value);
        Self::wrap(size, SharedBuffer::from_vec(raw))
    }

    /// Vector with every block set to `block`
    pub fn from_block(size: usize, block: Vector<T, B>) -> Self {
        let mut raw = A::allocate(size * B);
        for chunk in raw.chunks_exact_mut(B) {
            A::upload(chunk, block.as_slice());
        }
        Self::wrap(size, SharedBuffer::from_vec(raw))
    }

    /// Take ownership of a raw scalar array
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ValueLength` if `raw.len()` is not a
    /// multiple of `B`.
    pub fn from_raw(raw: Vec<T>) -> SparseResult<Self> {
        Self::from_buffer(SharedBuffer::from_vec(raw))
    }

    /// Wrap a buffer window; the vector shares its memory
    pub fn from_buffer(data: SharedBuffer<T>) -> SparseResult<Self> {
        if data.len() % B != 0 {
            return Err(ValidationError::ValueLength {
                len: data.len(),
                block: B,
            }
            .into());
        }
        Ok(Self::wrap(data.len() / B, data))
    }

    /// Blocked view of an unblocked vector, sharing its memory
    pub fn from_unblocked(vector: &DenseVector<T, I, A>) -> SparseResult<Self> {
        Self::from_buffer(vector.data.share())
    }

    /// Unblocked view sharing this vector's memory
    pub fn to_unblocked(&self) -> DenseVector<T, I, A> {
        DenseVectorBlocked::wrap(self.raw_size(), self.data.share())
    }

    /// View with block size `B2` sharing this vector's memory
    pub fn reblock<const B2: usize>(&self) -> SparseResult<DenseVectorBlocked<T, B2, I, A>> {
        DenseVectorBlocked::from_buffer(self.data.share())
    }

    /// Sub-vector of blocks `offset..offset + len` sharing this vector's memory
    pub fn range(&self, offset: usize, len: usize) -> SparseResult<Self> {
        if offset + len > self.size {
            return Err(OperationError::RangeOutOfBounds {
                offset,
                end: offset + len,
                size: self.size,
            }
            .into());
        }
        Ok(Self::wrap(len, self.data.range(offset * B, len * B)?))
    }

    /// Vector of independent uniform scalars in `[lo, hi]`
    ///
    /// # Panics
    ///
    /// Panics if `lo > hi`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, size: usize, lo: T, hi: T) -> Self {
        let (lo, hi) = (lo.as_f64(), hi.as_f64());
        let host: Vec<T> = (0..size * B)
            .map(|_| T::from_f64(rng.random_range(lo..=hi)))
            .collect();
        let mut raw = A::allocate(size * B);
        A::upload(&mut raw, &host);
        Self::wrap(size, SharedBuffer::from_vec(raw))
    }

    // ========== Clones ==========

    /// Independent copy of size and values
    pub fn deep_clone(&self) -> Self {
        let mut raw = A::allocate(self.raw_size());
        A::copy(&mut raw, &self.data.read());
        Self::wrap(self.size, SharedBuffer::from_vec(raw))
    }

    /// Independent vector of the same size, zero-filled
    pub fn layout_clone(&self) -> Self {
        Self::new(self.size)
    }

    /// Handle sharing this vector's memory
    pub fn weak_clone(&self) -> Self {
        Self::wrap(self.size, self.data.share())
    }

    /// Independent vector of the same size, zero-filled
    pub fn allocate_clone(&self) -> Self {
        Self::new(self.size)
    }

    /// Overwrite with the values of `x`, possibly living on another backend
    pub fn copy_from<A2: Backend>(&mut self, x: &DenseVectorBlocked<T, B, I, A2>) -> SparseResult<()> {
        self.check_size("copy", x.size)?;
        if self.data.same_window(&x.data) {
            return Ok(());
        }
        let src = x.data.read_for(&self.data);
        transfer::<A2, A, T>(&mut self.data.write(), &src);
        Ok(())
    }

    /// Copy into a vector with other scalar, index or backend types
    pub fn convert<T2: Scalar, I2: IndexType, A2: Backend>(&self) -> DenseVectorBlocked<T2, B, I2, A2> {
        let host: Vec<T2> = self.to_vec().into_iter().map(|v| T2::from_f64(v.as_f64())).collect();
        let mut raw = A2::allocate(host.len());
        A2::upload(&mut raw, &host);
        DenseVectorBlocked::wrap(self.size, SharedBuffer::from_vec(raw))
    }

    // ========== Accessors ==========

    /// Number of blocks
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of scalars
    pub fn raw_size(&self) -> usize {
        self.size * B
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Memory footprint: the raw values plus one size field
    pub fn bytes(&self) -> usize {
        self.raw_size() * std::mem::size_of::<T>() + std::mem::size_of::<I>()
    }

    /// Block `i`
    ///
    /// # Panics
    ///
    /// Panics if `i >= size`.
    pub fn get(&self, i: usize) -> Vector<T, B> {
        assert!(i < self.size, "block index {i} out of range for size {}", self.size);
        let mut block = [T::zero(); B];
        A::download(&mut block, &self.data.read()[i * B..(i + 1) * B]);
        Vector::new(block)
    }

    /// Overwrite block `i`
    ///
    /// # Panics
    ///
    /// Panics if `i >= size`.
    pub fn set(&mut self, i: usize, block: Vector<T, B>) {
        assert!(i < self.size, "block index {i} out of range for size {}", self.size);
        A::upload(&mut self.data.write()[i * B..(i + 1) * B], block.as_slice());
    }

    /// Read access to the raw scalars
    pub fn raw_elements(&self) -> ReadGuard<'_, T> {
        self.data.read()
    }

    /// Write access to the raw scalars
    pub fn raw_elements_mut(&mut self) -> WriteGuard<'_, T> {
        self.data.write()
    }

    /// Host copy of the raw scalars
    pub fn to_vec(&self) -> Vec<T> {
        let mut host = vec![T::zero(); self.raw_size()];
        A::download(&mut host, &self.data.read());
        host
    }

    /// Host copy of the blocks
    pub fn blocks(&self) -> Vec<Vector<T, B>> {
        self.to_vec().chunks_exact(B).map(Vector::from_slice).collect()
    }

    /// Set every scalar to `value`
    pub fn format(&mut self, value: T) {
        A::set(&mut self.data.write(), value);
    }

    /// The values buffer
    pub fn buffer(&self) -> &SharedBuffer<T> {
        &self.data
    }

    /// Whether both vectors read and write the same memory
    pub fn shares_values_with<const B2: usize>(&self, other: &DenseVectorBlocked<T, B2, I, A>) -> bool {
        self.data.overlaps(&other.data)
    }

    fn check_size(&self, operation: &'static str, got: usize) -> SparseResult<()> {
        if got != self.size {
            return Err(SparseError::size_mismatch(operation, self.size, got));
        }
        Ok(())
    }

    // ========== Arithmetic ==========

    /// `self = alpha * x + y`
    ///
    /// `alpha` equal to 1, -1 or 0 (within machine epsilon) selects the
    /// exact sum, difference or copy.
    pub fn axpy(&mut self, x: &Self, y: &Self, alpha: T) -> SparseResult<()> {
        self.check_size("axpy", x.size)?;
        self.check_size("axpy", y.size)?;
        if y.data.same_window(&self.data) && !x.data.is_shared_with(&self.data) {
            A::axpy_in_place(&mut self.data.write(), &x.data.read(), alpha);
            return Ok(());
        }
        let xs = x.data.read_for(&self.data);
        let ys = y.data.read_for(&self.data);
        A::axpy(&mut self.data.write(), &xs, &ys, alpha);
        Ok(())
    }

    /// `self += alpha * x`
    pub fn add_scaled(&mut self, x: &Self, alpha: T) -> SparseResult<()> {
        self.check_size("add_scaled", x.size)?;
        let xs = x.data.read_for(&self.data);
        A::axpy_in_place(&mut self.data.write(), &xs, alpha);
        Ok(())
    }

    /// `self = alpha * x`
    pub fn scale(&mut self, x: &Self, alpha: T) -> SparseResult<()> {
        self.check_size("scale", x.size)?;
        let xs = x.data.read_for(&self.data);
        A::scale(&mut self.data.write(), &xs, alpha);
        Ok(())
    }

    /// `self *= alpha`
    pub fn scale_in_place(&mut self, alpha: T) {
        A::scale_in_place(&mut self.data.write(), alpha);
    }

    /// Scalar-wise `self = x * y`
    pub fn component_product(&mut self, x: &Self, y: &Self) -> SparseResult<()> {
        self.check_size("component_product", x.size)?;
        self.check_size("component_product", y.size)?;
        let xs = x.data.read_for(&self.data);
        let ys = y.data.read_for(&self.data);
        A::component_product(&mut self.data.write(), &xs, &ys);
        Ok(())
    }

    /// Scalar-wise `self = alpha / x`; zeros in `x` give IEEE infinities
    pub fn component_invert(&mut self, x: &Self, alpha: T) -> SparseResult<()> {
        self.check_size("component_invert", x.size)?;
        let xs = x.data.read_for(&self.data);
        A::component_invert(&mut self.data.write(), &xs, alpha);
        Ok(())
    }

    /// `Σ self_i * x_i` over the raw scalars
    pub fn dot(&self, x: &Self) -> SparseResult<T> {
        self.check_size("dot", x.size)?;
        Ok(A::dot(&self.data.read(), &x.data.read()))
    }

    /// `Σ self_i * x_i * y_i` over the raw scalars
    pub fn triple_dot(&self, x: &Self, y: &Self) -> SparseResult<T> {
        self.check_size("triple_dot", x.size)?;
        self.check_size("triple_dot", y.size)?;
        Ok(A::triple_dot(&self.data.read(), &x.data.read(), &y.data.read()))
    }

    /// Squared Euclidean norm of the raw scalars
    pub fn norm2sqr(&self) -> T {
        A::norm2sqr(&self.data.read())
    }

    pub fn norm2(&self) -> T {
        self.norm2sqr().sqrt()
    }

    /// Largest `|x_i|`; zero for an empty vector
    pub fn max_abs_element(&self) -> T {
        A::max_abs(&self.data.read())
    }

    /// Smallest `|x_i|`; zero for an empty vector
    pub fn min_abs_element(&self) -> T {
        A::min_abs(&self.data.read())
    }

    pub fn max_element(&self) -> T {
        A::max(&self.data.read())
    }

    pub fn min_element(&self) -> T {
        A::min(&self.data.read())
    }

    /// Reorder blocks: `new[i] = old[perm.map(i)]`
    pub fn permute(&mut self, perm: &Permutation) -> SparseResult<()> {
        crate::permutation::check_len(perm, self.size)?;
        perm.apply_chunks_in_place(&mut self.data.write(), B);
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
        let values = self.to_vec().into_iter().map(Scalar::as_f64).collect();
        BinaryImage::vector(T::SCALAR_TYPE, I::INDEX_TYPE, B, self.size, values)?.encode(config)
    }

    /// Decode from the native binary format
    ///
    /// # Errors
    ///
    /// Fails if the stream is malformed, holds a matrix, or was written with
    /// another block size.
    pub fn deserialize(bytes: &[u8]) -> SparseResult<Self> {
        let image = BinaryImage::decode(bytes)?;
        image.expect(ContainerKind::Vector, B, 1)?;
        let size = image.scalar(0, "size")?;
        if size.checked_mul(B) != Some(image.values.len()) {
            return Err(SparseError::malformed(
                "values",
                format!("{size} blocks of {B} do not fit {} scalars", image.values.len()),
            ));
        }
        Self::warn_precision("deserialize");
        Ok(Self::from_host(image.values.into_iter().map(T::from_f64).collect()))
    }

    fn from_host(host: Vec<T>) -> Self {
        let mut raw = A::allocate(host.len());
        A::upload(&mut raw, &host);
        Self::wrap(host.len() / B, SharedBuffer::from_vec(raw))
    }

    fn from_text(raw: Vec<T>) -> SparseResult<Self> {
        if raw.len() % B != 0 {
            return Err(ValidationError::ValueLength {
                len: raw.len(),
                block: B,
            }
            .into());
        }
        Ok(Self::from_host(raw))
    }

    /// Write in `mode`; binary output is uncompressed
    pub fn write_out<W: Write>(&self, mode: FileMode, writer: &mut W) -> SparseResult<()> {
        match mode {
            FileMode::Binary => writer.write_all(&self.serialize(&SerialConfig::default())?)?,
            FileMode::Mtx => matrix_market::write_array(writer, &self.to_vec())?,
            FileMode::Exp => matrix_market::write_exp(writer, &self.to_vec())?,
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
            FileMode::Mtx => Self::from_text(matrix_market::read_array(reader)?),
            FileMode::Exp => Self::from_text(matrix_market::read_exp(reader)?),
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

impl<T: Scalar, const B: usize, I: IndexType, A: Backend> Clone for DenseVectorBlocked<T, B, I, A> {
    /// Same as [`DenseVectorBlocked::deep_clone`]
    fn clone(&self) -> Self {
        self.deep_clone()
    }
}

impl<T: Scalar, const B: usize, I: IndexType, A: Backend> Default for DenseVectorBlocked<T, B, I, A> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Scalar, const B: usize, I: IndexType, A: Backend> PartialEq for DenseVectorBlocked<T, B, I, A> {
    /// Exact comparison of size and raw scalars
    fn eq(&self, other: &Self) -> bool {
        self.size == other.size && *self.data.read() == *other.data.read()
    }
}

impl<T: Scalar, const B: usize, I: IndexType, A: Backend> fmt::Debug for DenseVectorBlocked<T, B, I, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseVectorBlocked")
            .field("block", &B)
            .field("size", &self.size)
            .field("backend", &A::name())
            .field("values", &self.data)
            .finish()
    }
}

impl<T: Scalar, const B: usize, I: IndexType, A: Backend> fmt::Display for DenseVectorBlocked<T, B, I, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (k, v) in self.to_vec().iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type Dvb2 = DenseVectorBlocked<f64, 2>;

    #[test]
    fn test_construction_and_size() {
        let v = DenseVectorBlocked::<f64, 2, u32>::from_block(10, Vector::new([7.0, 7.0]));
        assert_eq!(v.size(), 10);
        assert_eq!(v.raw_size(), 20);
        assert_eq!(v.bytes(), 20 * 8 + 4);
        assert!(v.blocks().iter().all(|b| b.as_slice() == [7.0, 7.0]));

        let empty = Dvb2::default();
        assert!(empty.is_empty());
        assert_eq!(empty.norm2(), 0.0);
        assert_eq!(empty.max_abs_element(), 0.0);
        assert_eq!(empty.min_element(), 0.0);
    }

    #[test]
    fn test_from_raw_validates_length() {
        assert!(Dvb2::from_raw(vec![1.0, 2.0, 3.0]).is_err());
        let v = Dvb2::from_raw(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(v.get(1).as_slice(), &[3.0, 4.0]);
    }

    #[test]
    fn test_block_access() {
        let mut v = DenseVectorBlocked::<f32, 3>::new(4);
        v.set(2, Vector::new([1.0, 2.0, 3.0]));
        assert_eq!(v.get(2).as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(v.get(1).as_slice(), &[0.0; 3]);
        assert_eq!(&v.raw_elements()[6..9], &[1.0, 2.0, 3.0]);
        v.raw_elements_mut()[0] = -1.0;
        assert_eq!(v.min_element(), -1.0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_out_of_range() {
        let v = Dvb2::new(2);
        let _ = v.get(2);
    }

    #[test]
    fn test_clone_semantics() {
        let mut a = Dvb2::from_raw((0..8).map(f64::from).collect()).unwrap();

        let deep = a.deep_clone();
        let weak = a.weak_clone();
        let layout = a.layout_clone();
        let alloc = a.allocate_clone();

        a.set(0, Vector::new([-1.0, -1.0]));
        assert_eq!(deep.get(0).as_slice(), &[0.0, 1.0]);
        assert_eq!(weak.get(0).as_slice(), &[-1.0, -1.0]);
        assert_eq!(layout.size(), 4);
        assert_eq!(layout.norm2(), 0.0);
        assert_eq!(alloc.norm2(), 0.0);

        assert!(a.shares_values_with(&weak));
        assert!(!a.shares_values_with(&deep));
        assert!(!a.shares_values_with(&layout));
        assert_eq!(a.buffer().holders(), 2);
        drop(a);
        assert_eq!(weak.buffer().holders(), 1);
        assert_eq!(weak.get(3).as_slice(), &[6.0, 7.0]);
    }

    #[test]
    fn test_unblocked_views_share_memory() {
        let v = Dvb2::from_value(3, 1.0);
        let mut flat = v.to_unblocked();
        assert_eq!(flat.size(), 6);
        flat.set(5, Vector::new([9.0]));
        assert_eq!(v.get(2).as_slice(), &[1.0, 9.0]);

        let back = Dvb2::from_unblocked(&flat).unwrap();
        assert!(back.shares_values_with(&v));
        assert!(DenseVectorBlocked::<f64, 4>::from_unblocked(&flat).is_err());
        assert_eq!(v.reblock::<3>().unwrap().size(), 2);
    }

    #[test]
    fn test_range_is_a_view() {
        let v = Dvb2::from_raw((0..10).map(f64::from).collect()).unwrap();
        let mut mid = v.range(1, 3).unwrap();
        assert_eq!(mid.to_vec(), vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        mid.scale_in_place(10.0);
        assert_eq!(v.get(1).as_slice(), &[20.0, 30.0]);
        assert_eq!(v.get(4).as_slice(), &[8.0, 9.0]);
        assert!(v.range(3, 3).is_err());
    }

    #[test]
    fn test_axpy_fast_paths() {
        let mut rng = StdRng::seed_from_u64(42);
        let x = Dvb2::random(&mut rng, 50, -1.0, 1.0);
        let y = Dvb2::random(&mut rng, 50, -1.0, 1.0);
        let mut r = x.allocate_clone();

        r.axpy(&x, &y, 1.0).unwrap();
        let xs = x.to_vec();
        let ys = y.to_vec();
        assert!(r.to_vec().iter().zip(xs.iter().zip(&ys)).all(|(r, (x, y))| *r == x + y));
        r.axpy(&x, &y, -1.0).unwrap();
        assert!(r.to_vec().iter().zip(xs.iter().zip(&ys)).all(|(r, (x, y))| *r == y - x));
        r.axpy(&x, &y, 0.0).unwrap();
        assert_eq!(r, y);
    }

    #[test]
    fn test_axpy_general_and_in_place() {
        let s = 4711.1;
        let x = Dvb2::from_raw((0..20).map(|i| f64::from(i) / 7.0).collect()).unwrap();
        let y = Dvb2::from_raw((0..20).map(|i| f64::from(i % 3)).collect()).unwrap();

        let mut r = x.allocate_clone();
        r.axpy(&x, &y, s).unwrap();
        for ((r, x), y) in r.to_vec().iter().zip(x.to_vec()).zip(y.to_vec()) {
            assert_relative_eq!(*r, s * x + y, epsilon = 1e-10);
        }

        // r and y alias: in-place accumulation
        let mut acc = y.deep_clone();
        let alias = acc.weak_clone();
        acc.axpy(&x, &alias, s).unwrap();
        assert_eq!(acc, r);

        // x aliases the result
        let mut acc = x.deep_clone();
        let alias = acc.weak_clone();
        acc.axpy(&alias, &y, s).unwrap();
        assert_eq!(acc, r);

        let mut acc = y.deep_clone();
        acc.add_scaled(&x, s).unwrap();
        assert_eq!(acc, r);
    }

    #[test]
    fn test_size_mismatch_leaves_target_untouched() {
        let mut r = Dvb2::from_value(3, 5.0);
        let x = Dvb2::new(4);
        let err = r.axpy(&x, &x, 2.0).unwrap_err();
        assert!(matches!(err, SparseError::ShapeMismatch(_)));
        assert_eq!(r, Dvb2::from_value(3, 5.0));
        assert!(r.dot(&x).is_err());
    }

    #[test]
    fn test_dot_self_test() {
        let eps = f64::EPSILON.powf(0.8);
        let mut n = 1;
        while n <= 1024 {
            let a = DenseVector::<f64>::from_raw((0..n).map(|i| (i + 1) as f64 / n as f64).collect())
                .unwrap();
            let b = DenseVector::<f64>::from_raw((0..n).map(|i| 1.0 / (i + 1) as f64).collect())
                .unwrap();
            assert_relative_eq!(a.dot(&b).unwrap(), 1.0, epsilon = eps);
            n *= 2;
        }
    }

    #[test]
    fn test_triple_dot_symmetry() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = Dvb2::random(&mut rng, 33, -2.0, 2.0);
        let b = Dvb2::random(&mut rng, 33, -2.0, 2.0);
        let c = Dvb2::random(&mut rng, 33, -2.0, 2.0);
        let abc = a.triple_dot(&b, &c).unwrap();
        assert_relative_eq!(abc, b.triple_dot(&a, &c).unwrap(), epsilon = 1e-12);
        assert_relative_eq!(abc, c.triple_dot(&a, &b).unwrap(), epsilon = 1e-12);
    }

    #[test]
    fn test_norms_and_extrema() {
        let n = 40;
        let v = DenseVector::<f64>::from_raw((0..n).map(|k| 0.5f64.powf(0.5 * k as f64)).collect())
            .unwrap();
        // Σ 0.5^k over k < n
        let expected = (2.0 - 2.0 * 0.5f64.powi(n)).sqrt();
        assert_relative_eq!(v.norm2(), expected, epsilon = 1e-12);

        let w = Dvb2::from_raw(vec![3.0, -7.0, 0.5, 2.0]).unwrap();
        assert_eq!(w.max_abs_element(), 7.0);
        assert_eq!(w.min_abs_element(), 0.5);
        assert_eq!(w.max_element(), 3.0);
        assert_eq!(w.min_element(), -7.0);
    }

    #[test]
    fn test_component_ops() {
        let x = Dvb2::from_raw(vec![1.0, 2.0, 4.0, 0.0]).unwrap();
        let y = Dvb2::from_raw(vec![3.0, 3.0, 0.5, 1.0]).unwrap();
        let mut r = x.allocate_clone();
        r.component_product(&x, &y).unwrap();
        assert_eq!(r.to_vec(), vec![3.0, 6.0, 2.0, 0.0]);

        r.component_invert(&x, 2.0).unwrap();
        assert_eq!(&r.to_vec()[..3], &[2.0, 1.0, 0.5]);
        assert!(r.to_vec()[3].is_infinite());

        r.scale(&y, -2.0).unwrap();
        assert_eq!(r.to_vec(), vec![-6.0, -6.0, -1.0, -2.0]);
    }

    #[test]
    fn test_permute_moves_whole_blocks() {
        let mut v = Dvb2::from_raw(vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]).unwrap();
        let p = Permutation::from_perm(vec![2, 0, 1]).unwrap();
        let original = v.deep_clone();
        v.permute(&p).unwrap();
        assert_eq!(v.to_vec(), vec![2.0, 2.5, 0.0, 0.5, 1.0, 1.5]);
        v.permute(&p.inverse()).unwrap();
        assert_eq!(v, original);
        assert!(v.permute(&Permutation::identity(2)).is_err());
    }

    #[test]
    fn test_copy_and_convert() {
        let x = Dvb2::from_raw(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut y = Dvb2::new(2);
        y.copy_from(&x).unwrap();
        assert_eq!(y, x);
        assert!(!y.shares_values_with(&x));

        let single: DenseVectorBlocked<f32, 2, u32> = x.convert();
        assert_eq!(single.to_vec(), vec![1.0f32, 2.0, 3.0, 4.0]);
        let back: Dvb2 = single.convert();
        assert_eq!(back, x);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_copy_across_backends() {
        use feblock_core::Threaded;

        let x = DenseVectorBlocked::<f64, 2, u64, Threaded>::from_value(3, 2.5);
        let mut y = Dvb2::new(3);
        y.copy_from(&x).unwrap();
        assert_eq!(y, Dvb2::from_value(3, 2.5));
    }

    #[test]
    fn test_display_and_format() {
        let mut v = Dvb2::from_raw(vec![1.0, -2.5, 0.0, 4.0]).unwrap();
        assert_eq!(v.to_string(), "[1, -2.5, 0, 4]");
        v.format(3.0);
        assert_eq!(v.to_string(), "[3, 3, 3, 3]");
    }

    #[test]
    fn test_binary_roundtrip() {
        let mut rng = StdRng::seed_from_u64(1);
        let v = DenseVectorBlocked::<f64, 3, u32>::random(&mut rng, 17, -10.0, 10.0);
        for config in [SerialConfig::default(), SerialConfig::zlib()] {
            let bytes = v.serialize(&config).unwrap();
            assert_eq!(DenseVectorBlocked::<f64, 3, u32>::deserialize(&bytes).unwrap(), v);
        }

        let bytes = v.serialize(&SerialConfig::lossy(1e-4)).unwrap();
        let back = DenseVectorBlocked::<f64, 3, u32>::deserialize(&bytes).unwrap();
        for (a, b) in v.to_vec().iter().zip(back.to_vec()) {
            assert!((a - b).abs() <= 1e-4);
        }

        // wrong block size is rejected
        assert!(DenseVectorBlocked::<f64, 2, u32>::deserialize(&bytes).is_err());
    }

    #[test]
    fn test_deserialize_rejects_forged_size() {
        let v = Dvb2::from_value(3, 1.5);
        let bytes = v.serialize(&SerialConfig::default()).unwrap();
        // the size field follows the 25 byte header
        for forged in [u64::MAX, u64::MAX / 2 + 1, 4, 0] {
            let mut patched = bytes.clone();
            patched[25..33].copy_from_slice(&forged.to_le_bytes());
            assert!(matches!(
                Dvb2::deserialize(&patched),
                Err(SparseError::Io(crate::error::IoError::Malformed { field: "values", .. }))
            ));
        }
        assert_eq!(Dvb2::deserialize(&bytes).unwrap(), v);
    }

    #[test]
    fn test_text_roundtrips() {
        let v = Dvb2::from_raw(vec![1.25, -3.0, 1e-12, 6.5e20]).unwrap();
        for mode in [FileMode::Binary, FileMode::Mtx, FileMode::Exp] {
            let mut out = Vec::new();
            v.write_out(mode, &mut out).unwrap();
            let back = Dvb2::read_from(mode, out.as_slice()).unwrap();
            assert_eq!(back, v, "mode {mode}");
        }

        let odd = b"1\n2\n3\n";
        assert!(Dvb2::read_from(FileMode::Exp, &odd[..]).is_err());
    }
}
