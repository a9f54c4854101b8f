//! Fixed-size block value types.
//!
//! A [`Vector`] of length `N` is the unit stored per entry of a blocked dense
//! vector; a [`Matrix`] of shape `H × W` is the unit stored per nonzero of a
//! BCSR matrix. All arithmetic is component-wise except [`Matrix::mat_vec`].
//!
//! # Examples
//!
//! ```
//! use feblock_core::{Matrix, Vector};
//!
//! let v = Vector::new([1.0, 2.0]);
//! let w = Vector::splat(3.0);
//! assert_eq!((v + w).as_slice(), &[4.0, 5.0]);
//! assert_eq!(v.dot(&w), 9.0);
//!
//! let m = Matrix::new([[1.0, 2.0], [3.0, 4.0]]);
//! assert_eq!(m.mat_vec(&v).as_slice(), &[5.0, 11.0]);
//! assert_eq!(m.trace(), 5.0);
//! ```

use crate::scalar::Scalar;
use std::fmt;
use std::ops::{Add, AddAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign};

/// Block of `N` scalars.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector<T, const N: usize> {
    data: [T; N],
}

impl<T: Scalar, const N: usize> Vector<T, N> {
    /// Number of scalars in the block.
    pub const LEN: usize = N;

    pub fn new(data: [T; N]) -> Self {
        Self { data }
    }

    /// Block with every component set to `value`.
    pub fn splat(value: T) -> Self {
        Self { data: [value; N] }
    }

    pub fn zeros() -> Self {
        Self::splat(T::zero())
    }

    /// Copies the first `N` scalars of `slice`.
    ///
    /// # Panics
    ///
    /// Panics if `slice` is shorter than `N`.
    pub fn from_slice(slice: &[T]) -> Self {
        let mut data = [T::zero(); N];
        data.copy_from_slice(&slice[..N]);
        Self { data }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_array(self) -> [T; N] {
        self.data
    }

    pub fn dot(&self, other: &Self) -> T {
        self.data
            .iter()
            .zip(other.data.iter())
            .fold(T::zero(), |acc, (&a, &b)| acc + a * b)
    }

    pub fn norm_euclid_sqr(&self) -> T {
        self.dot(self)
    }

    pub fn norm_euclid(&self) -> T {
        self.norm_euclid_sqr().sqrt()
    }

    /// Component-wise product.
    pub fn component_product(&self, other: &Self) -> Self {
        let mut out = *self;
        for (o, &b) in out.data.iter_mut().zip(other.data.iter()) {
            *o *= b;
        }
        out
    }

    /// Sum of the components.
    pub fn sum(&self) -> T {
        self.data.iter().copied().sum()
    }
}

impl<T: Scalar, const N: usize> Default for Vector<T, N> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<T, const N: usize> Index<usize> for Vector<T, N> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.data[i]
    }
}

impl<T, const N: usize> IndexMut<usize> for Vector<T, N> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.data[i]
    }
}

impl<T: Scalar, const N: usize> From<[T; N]> for Vector<T, N> {
    fn from(data: [T; N]) -> Self {
        Self { data }
    }
}

impl<T: Scalar, const N: usize> Add for Vector<T, N> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl<T: Scalar, const N: usize> AddAssign for Vector<T, N> {
    fn add_assign(&mut self, rhs: Self) {
        for (a, b) in self.data.iter_mut().zip(rhs.data) {
            *a += b;
        }
    }
}

impl<T: Scalar, const N: usize> Sub for Vector<T, N> {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        self -= rhs;
        self
    }
}

impl<T: Scalar, const N: usize> SubAssign for Vector<T, N> {
    fn sub_assign(&mut self, rhs: Self) {
        for (a, b) in self.data.iter_mut().zip(rhs.data) {
            *a -= b;
        }
    }
}

impl<T: Scalar, const N: usize> Neg for Vector<T, N> {
    type Output = Self;

    fn neg(mut self) -> Self {
        for a in self.data.iter_mut() {
            *a = -*a;
        }
        self
    }
}

impl<T: Scalar, const N: usize> Mul<T> for Vector<T, N> {
    type Output = Self;

    fn mul(mut self, rhs: T) -> Self {
        self *= rhs;
        self
    }
}

impl<T: Scalar, const N: usize> MulAssign<T> for Vector<T, N> {
    fn mul_assign(&mut self, rhs: T) {
        for a in self.data.iter_mut() {
            *a *= rhs;
        }
    }
}

impl<T: Scalar, const N: usize> fmt::Display for Vector<T, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

/// Dense `H × W` block of scalars in row-major order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix<T, const H: usize, const W: usize> {
    data: [[T; W]; H],
}

impl<T: Scalar, const H: usize, const W: usize> Matrix<T, H, W> {
    /// Number of scalars in the block.
    pub const LEN: usize = H * W;

    pub fn new(data: [[T; W]; H]) -> Self {
        Self { data }
    }

    pub fn splat(value: T) -> Self {
        Self {
            data: [[value; W]; H],
        }
    }

    pub fn zeros() -> Self {
        Self::splat(T::zero())
    }

    /// Reads `H * W` scalars in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `slice` is shorter than `H * W`.
    pub fn from_slice(slice: &[T]) -> Self {
        let mut data = [[T::zero(); W]; H];
        for (r, row) in data.iter_mut().enumerate() {
            row.copy_from_slice(&slice[r * W..(r + 1) * W]);
        }
        Self { data }
    }

    /// Writes the block in row-major order into `out`.
    pub fn write_to_slice(&self, out: &mut [T]) {
        for (r, row) in self.data.iter().enumerate() {
            out[r * W..(r + 1) * W].copy_from_slice(row);
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.data.iter().flat_map(|row| row.iter().copied()).collect()
    }

    pub fn rows(&self) -> &[[T; W]; H] {
        &self.data
    }

    pub fn row(&self, r: usize) -> Vector<T, W> {
        Vector::new(self.data[r])
    }

    pub fn norm_frobenius_sqr(&self) -> T {
        self.data
            .iter()
            .flat_map(|row| row.iter())
            .fold(T::zero(), |acc, &v| acc + v * v)
    }

    pub fn norm_frobenius(&self) -> T {
        self.norm_frobenius_sqr().sqrt()
    }

    /// Matrix-vector product `self * x`.
    pub fn mat_vec(&self, x: &Vector<T, W>) -> Vector<T, H> {
        let mut out = Vector::zeros();
        for (r, row) in self.data.iter().enumerate() {
            out[r] = row
                .iter()
                .zip(x.as_slice())
                .fold(T::zero(), |acc, (&a, &b)| acc + a * b);
        }
        out
    }

    /// Row sums, i.e. the product with the all-ones vector.
    pub fn row_sums(&self) -> Vector<T, H> {
        let mut out = Vector::zeros();
        for (r, row) in self.data.iter().enumerate() {
            out[r] = row.iter().copied().sum();
        }
        out
    }

    pub fn transpose(&self) -> Matrix<T, W, H> {
        let mut out = Matrix::<T, W, H>::zeros();
        for r in 0..H {
            for c in 0..W {
                out.data[c][r] = self.data[r][c];
            }
        }
        out
    }
}

impl<T: Scalar, const N: usize> Matrix<T, N, N> {
    pub fn identity() -> Self {
        let mut out = Self::zeros();
        for i in 0..N {
            out.data[i][i] = T::one();
        }
        out
    }

    /// Diagonal as a vector block.
    pub fn diagonal(&self) -> Vector<T, N> {
        let mut out = Vector::zeros();
        for i in 0..N {
            out[i] = self.data[i][i];
        }
        out
    }

    pub fn trace(&self) -> T {
        self.diagonal().sum()
    }
}

impl<T: Scalar, const H: usize, const W: usize> Default for Matrix<T, H, W> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<T, const H: usize, const W: usize> Index<(usize, usize)> for Matrix<T, H, W> {
    type Output = T;

    fn index(&self, (r, c): (usize, usize)) -> &T {
        &self.data[r][c]
    }
}

impl<T, const H: usize, const W: usize> IndexMut<(usize, usize)> for Matrix<T, H, W> {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut T {
        &mut self.data[r][c]
    }
}

impl<T: Scalar, const H: usize, const W: usize> From<[[T; W]; H]> for Matrix<T, H, W> {
    fn from(data: [[T; W]; H]) -> Self {
        Self { data }
    }
}

impl<T: Scalar, const H: usize, const W: usize> Add for Matrix<T, H, W> {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl<T: Scalar, const H: usize, const W: usize> AddAssign for Matrix<T, H, W> {
    fn add_assign(&mut self, rhs: Self) {
        for (row, rhs_row) in self.data.iter_mut().zip(rhs.data) {
            for (a, b) in row.iter_mut().zip(rhs_row) {
                *a += b;
            }
        }
    }
}

impl<T: Scalar, const H: usize, const W: usize> Sub for Matrix<T, H, W> {
    type Output = Self;

    fn sub(mut self, rhs: Self) -> Self {
        self -= rhs;
        self
    }
}

impl<T: Scalar, const H: usize, const W: usize> SubAssign for Matrix<T, H, W> {
    fn sub_assign(&mut self, rhs: Self) {
        for (row, rhs_row) in self.data.iter_mut().zip(rhs.data) {
            for (a, b) in row.iter_mut().zip(rhs_row) {
                *a -= b;
            }
        }
    }
}

impl<T: Scalar, const H: usize, const W: usize> Neg for Matrix<T, H, W> {
    type Output = Self;

    fn neg(mut self) -> Self {
        self *= -T::one();
        self
    }
}

impl<T: Scalar, const H: usize, const W: usize> Mul<T> for Matrix<T, H, W> {
    type Output = Self;

    fn mul(mut self, rhs: T) -> Self {
        self *= rhs;
        self
    }
}

impl<T: Scalar, const H: usize, const W: usize> MulAssign<T> for Matrix<T, H, W> {
    fn mul_assign(&mut self, rhs: T) {
        for row in self.data.iter_mut() {
            for a in row.iter_mut() {
                *a *= rhs;
            }
        }
    }
}

impl<T: Scalar, const H: usize, const W: usize> Mul<Vector<T, W>> for Matrix<T, H, W> {
    type Output = Vector<T, H>;

    fn mul(self, rhs: Vector<T, W>) -> Vector<T, H> {
        self.mat_vec(&rhs)
    }
}

impl<T: Scalar, const H: usize, const W: usize> fmt::Display for Matrix<T, H, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (r, row) in self.data.iter().enumerate() {
            if r > 0 {
                write!(f, "; ")?;
            }
            for (c, v) in row.iter().enumerate() {
                if c > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{v}")?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_arithmetic() {
        let a = Vector::new([1.0, -2.0, 3.0]);
        let b = Vector::new([0.5, 0.5, 0.5]);

        assert_eq!((a + b).into_array(), [1.5, -1.5, 3.5]);
        assert_eq!((a - b).into_array(), [0.5, -2.5, 2.5]);
        assert_eq!((a * 2.0).into_array(), [2.0, -4.0, 6.0]);
        assert_eq!((-a).into_array(), [-1.0, 2.0, -3.0]);
        assert_eq!(a.component_product(&b).into_array(), [0.5, -1.0, 1.5]);
        assert_eq!(a.dot(&b), 1.0);
        assert_eq!(a.sum(), 2.0);
        assert!((a.norm_euclid() - 14.0f64.sqrt()).abs() < 1e-14);
    }

    #[test]
    fn test_vector_slices() {
        let raw = [4.0f32, 5.0, 6.0, 7.0];
        let v = Vector::<f32, 2>::from_slice(&raw[2..]);
        assert_eq!(v.as_slice(), &[6.0, 7.0]);
        assert_eq!(Vector::<f32, 2>::LEN, 2);
        assert_eq!(v.to_string(), "[6, 7]");
    }

    #[test]
    fn test_matrix_layout_is_row_major() {
        let raw: Vec<f64> = (1..=6).map(f64::from).collect();
        let m = Matrix::<f64, 2, 3>::from_slice(&raw);
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m.to_vec(), raw);

        let mut out = vec![0.0; 6];
        m.transpose().transpose().write_to_slice(&mut out);
        assert_eq!(out, raw);
        assert_eq!(m.transpose()[(2, 1)], 6.0);
    }

    #[test]
    fn test_matrix_products() {
        let m = Matrix::new([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let x = Vector::new([1.0, 0.0, -1.0]);
        assert_eq!((m * x).into_array(), [-2.0, -2.0]);
        assert_eq!(m.row_sums().into_array(), [6.0, 15.0]);
        assert_eq!(m.norm_frobenius_sqr(), 91.0);
    }

    #[test]
    fn test_square_matrix_helpers() {
        let m = Matrix::new([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        assert_eq!(m.diagonal().into_array(), [1.0, 5.0, 9.0]);
        assert_eq!(m.trace(), 15.0);

        let id = Matrix::<f64, 3, 3>::identity();
        assert_eq!(id.mat_vec(&Vector::new([1.0, 2.0, 3.0])).into_array(), [1.0, 2.0, 3.0]);
        assert_eq!(m + id - m, id);
    }
}
