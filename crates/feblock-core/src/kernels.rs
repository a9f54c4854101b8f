//! Slice kernels shared by all backends.
//!
//! These are the sequential reference implementations. Vector kernels work on
//! the raw scalar stream; BCSR kernels take the row pointer, column index and
//! flattened value arrays explicitly, with block shape `BH × BW` fixed at
//! compile time. Each value block occupies `BH * BW` consecutive scalars in
//! row-major order.
//!
//! Row-local kernels are split into a `*_row` function computing one block row
//! so that the threaded backend can distribute rows without duplicating the
//! arithmetic.

use crate::scalar::{IndexType, Scalar};

#[inline]
fn is_value<T: Scalar>(alpha: T, target: T) -> bool {
    (alpha - target).abs() < T::epsilon()
}

/// `r = alpha * x + y`.
///
/// `alpha == 1`, `alpha == -1` and `alpha == 0` (within machine epsilon)
/// reduce to `x + y`, `y - x` and a copy of `y` without any multiplication.
pub fn axpy<T: Scalar>(r: &mut [T], x: &[T], y: &[T], alpha: T) {
    debug_assert_eq!(r.len(), x.len());
    debug_assert_eq!(r.len(), y.len());
    if is_value(alpha, T::one()) {
        for ((r, &x), &y) in r.iter_mut().zip(x).zip(y) {
            *r = x + y;
        }
    } else if is_value(alpha, -T::one()) {
        for ((r, &x), &y) in r.iter_mut().zip(x).zip(y) {
            *r = y - x;
        }
    } else if is_value(alpha, T::zero()) {
        r.copy_from_slice(y);
    } else {
        for ((r, &x), &y) in r.iter_mut().zip(x).zip(y) {
            *r = alpha * x + y;
        }
    }
}

/// `r = alpha * x + r`, bitwise identical to [`axpy`] with `y == r`.
pub fn axpy_in_place<T: Scalar>(r: &mut [T], x: &[T], alpha: T) {
    debug_assert_eq!(r.len(), x.len());
    if is_value(alpha, T::one()) {
        for (r, &x) in r.iter_mut().zip(x) {
            *r = x + *r;
        }
    } else if is_value(alpha, -T::one()) {
        for (r, &x) in r.iter_mut().zip(x) {
            *r = *r - x;
        }
    } else if !is_value(alpha, T::zero()) {
        for (r, &x) in r.iter_mut().zip(x) {
            *r = alpha * x + *r;
        }
    }
}

/// `r = alpha * x`.
pub fn scale<T: Scalar>(r: &mut [T], x: &[T], alpha: T) {
    debug_assert_eq!(r.len(), x.len());
    for (r, &x) in r.iter_mut().zip(x) {
        *r = x * alpha;
    }
}

/// `r = alpha * r`.
pub fn scale_in_place<T: Scalar>(r: &mut [T], alpha: T) {
    for r in r.iter_mut() {
        *r = *r * alpha;
    }
}

/// `r_i = x_i * y_i`.
pub fn component_product<T: Scalar>(r: &mut [T], x: &[T], y: &[T]) {
    debug_assert_eq!(r.len(), x.len());
    debug_assert_eq!(r.len(), y.len());
    for ((r, &x), &y) in r.iter_mut().zip(x).zip(y) {
        *r = x * y;
    }
}

/// `r_i = alpha / x_i`. Zero entries yield IEEE infinities.
pub fn component_invert<T: Scalar>(r: &mut [T], x: &[T], alpha: T) {
    debug_assert_eq!(r.len(), x.len());
    for (r, &x) in r.iter_mut().zip(x) {
        *r = alpha / x;
    }
}

pub fn dot<T: Scalar>(x: &[T], y: &[T]) -> T {
    debug_assert_eq!(x.len(), y.len());
    x.iter()
        .zip(y)
        .fold(T::zero(), |acc, (&a, &b)| acc + a * b)
}

pub fn triple_dot<T: Scalar>(x: &[T], y: &[T], z: &[T]) -> T {
    debug_assert_eq!(x.len(), y.len());
    debug_assert_eq!(x.len(), z.len());
    x.iter()
        .zip(y)
        .zip(z)
        .fold(T::zero(), |acc, ((&a, &b), &c)| acc + a * b * c)
}

pub fn norm2sqr<T: Scalar>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, &a| acc + a * a)
}

/// Largest absolute value, zero for an empty slice.
pub fn max_abs<T: Scalar>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, &a| acc.max(a.abs()))
}

/// Smallest absolute value, zero for an empty slice.
pub fn min_abs<T: Scalar>(x: &[T]) -> T {
    x.iter()
        .map(|a| a.abs())
        .reduce(|acc, a| acc.min(a))
        .unwrap_or_else(T::zero)
}

/// Largest value, zero for an empty slice.
pub fn max<T: Scalar>(x: &[T]) -> T {
    x.iter()
        .copied()
        .reduce(|acc, a| acc.max(a))
        .unwrap_or_else(T::zero)
}

/// Smallest value, zero for an empty slice.
pub fn min<T: Scalar>(x: &[T]) -> T {
    x.iter()
        .copied()
        .reduce(|acc, a| acc.min(a))
        .unwrap_or_else(T::zero)
}

/// One block row of `r += alpha * A x`; `out` holds the `BH` scalars of row `row`.
#[inline]
pub fn bcsr_apply_add_row<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
    out: &mut [T],
    row: usize,
    row_ptr: &[I],
    col_ind: &[I],
    val: &[T],
    x: &[T],
    alpha: T,
) {
    let block = BH * BW;
    let mut sums = [T::zero(); BH];
    for k in row_ptr[row].index()..row_ptr[row + 1].index() {
        let col = col_ind[k].index();
        let a = &val[k * block..(k + 1) * block];
        let xb = &x[col * BW..(col + 1) * BW];
        for (h, sum) in sums.iter_mut().enumerate() {
            let a_row = &a[h * BW..(h + 1) * BW];
            for (&a, &xv) in a_row.iter().zip(xb) {
                *sum += a * xv;
            }
        }
    }
    for (o, s) in out.iter_mut().zip(sums) {
        *o = *o + alpha * s;
    }
}

/// One block row of `r = A x`.
#[inline]
pub fn bcsr_apply_row<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
    out: &mut [T],
    row: usize,
    row_ptr: &[I],
    col_ind: &[I],
    val: &[T],
    x: &[T],
) {
    let block = BH * BW;
    out.fill(T::zero());
    for k in row_ptr[row].index()..row_ptr[row + 1].index() {
        let col = col_ind[k].index();
        let a = &val[k * block..(k + 1) * block];
        let xb = &x[col * BW..(col + 1) * BW];
        for (h, o) in out.iter_mut().enumerate() {
            let a_row = &a[h * BW..(h + 1) * BW];
            for (&a, &xv) in a_row.iter().zip(xb) {
                *o += a * xv;
            }
        }
    }
}

/// `r = A x` over all block rows.
pub fn bcsr_apply<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
    r: &mut [T],
    row_ptr: &[I],
    col_ind: &[I],
    val: &[T],
    x: &[T],
) {
    for (row, out) in r.chunks_exact_mut(BH).enumerate() {
        bcsr_apply_row::<T, I, BH, BW>(out, row, row_ptr, col_ind, val, x);
    }
}

/// `r = r + alpha * A x` over all block rows.
pub fn bcsr_apply_add<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
    r: &mut [T],
    row_ptr: &[I],
    col_ind: &[I],
    val: &[T],
    x: &[T],
    alpha: T,
) {
    for (row, out) in r.chunks_exact_mut(BH).enumerate() {
        bcsr_apply_add_row::<T, I, BH, BW>(out, row, row_ptr, col_ind, val, x, alpha);
    }
}

/// One block row of the row lumping: `out[h] = Σ_k Σ_c A_k[h][c]`.
#[inline]
pub fn bcsr_lump_row<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
    out: &mut [T],
    row: usize,
    row_ptr: &[I],
    val: &[T],
) {
    let block = BH * BW;
    out.fill(T::zero());
    for k in row_ptr[row].index()..row_ptr[row + 1].index() {
        let a = &val[k * block..(k + 1) * block];
        for (h, o) in out.iter_mut().enumerate() {
            for &v in &a[h * BW..(h + 1) * BW] {
                *o += v;
            }
        }
    }
}

pub fn bcsr_lump_rows<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
    lump: &mut [T],
    row_ptr: &[I],
    val: &[T],
) {
    for (row, out) in lump.chunks_exact_mut(BH).enumerate() {
        bcsr_lump_row::<T, I, BH, BW>(out, row, row_ptr, val);
    }
}

/// One block row of the squared scalar-row norms.
///
/// With `scal = Some(s)` each squared entry in block column `col`, component
/// `c` is weighted by `s[col * BW + c]`, giving `Σ_j s_j * A(i, j)^2`.
#[inline]
pub fn bcsr_row_norm2sqr_row<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
    out: &mut [T],
    row: usize,
    row_ptr: &[I],
    col_ind: &[I],
    val: &[T],
    scal: Option<&[T]>,
) {
    let block = BH * BW;
    out.fill(T::zero());
    for k in row_ptr[row].index()..row_ptr[row + 1].index() {
        let col = col_ind[k].index();
        let a = &val[k * block..(k + 1) * block];
        for (h, o) in out.iter_mut().enumerate() {
            for (c, &v) in a[h * BW..(h + 1) * BW].iter().enumerate() {
                let w = scal.map_or(T::one(), |s| s[col * BW + c]);
                *o += w * v * v;
            }
        }
    }
}

/// Squared norms of every scalar row, optionally weighted per scalar column.
pub fn bcsr_row_norm2sqr<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
    norms: &mut [T],
    row_ptr: &[I],
    col_ind: &[I],
    val: &[T],
    scal: Option<&[T]>,
) {
    for (row, out) in norms.chunks_exact_mut(BH).enumerate() {
        bcsr_row_norm2sqr_row::<T, I, BH, BW>(out, row, row_ptr, col_ind, val, scal);
    }
}

/// Copies the diagonal of every diagonal block `A(i, i)` into `diag`.
///
/// Rows without a stored diagonal block yield zeros.
pub fn bcsr_extract_diag<T: Scalar, I: IndexType, const B: usize>(
    diag: &mut [T],
    row_ptr: &[I],
    col_ind: &[I],
    val: &[T],
) {
    let block = B * B;
    for (row, out) in diag.chunks_exact_mut(B).enumerate() {
        out.fill(T::zero());
        for k in row_ptr[row].index()..row_ptr[row + 1].index() {
            if col_ind[k].index() == row {
                let a = &val[k * block..(k + 1) * block];
                for (h, o) in out.iter_mut().enumerate() {
                    *o = a[h * B + h];
                }
                break;
            }
        }
    }
}

/// Block diagonal of `D · diag(a) · B`, accumulated into `v`.
///
/// Shapes, with `n` block rows of `D`:
/// - `D`: `n × m` blocks of `BHD × BH` (`d_row_ptr`, `d_col_ind`, `d_val`)
/// - `a`: `m` blocks of `BH`
/// - `B`: `m × n` blocks of `BH × BW` (`b_row_ptr`, `b_col_ind`, `b_val`)
/// - `v`: `n` blocks of `BHD`
///
/// For every stored `D(i, k)` the matching block `B(k, i)` is located in row
/// `k` of `B`, and `v[i][r] += alpha * Σ_j D(i,k)[r][j] * a[k][j] * B(k,i)[j][r]`.
/// Only the leading `BHD` columns of each `B` block take part, so `BHD` may not
/// exceed `BW`. Pairs whose `B(k, i)` is not stored contribute nothing.
#[allow(clippy::too_many_arguments)]
pub fn trace_double_mat_mult<
    T: Scalar,
    I: IndexType,
    const BHD: usize,
    const BH: usize,
    const BW: usize,
>(
    v: &mut [T],
    d_row_ptr: &[I],
    d_col_ind: &[I],
    d_val: &[T],
    a: &[T],
    b_row_ptr: &[I],
    b_col_ind: &[I],
    b_val: &[T],
    alpha: T,
) {
    const { assert!(BHD <= BW, "trace block height exceeds the block width of B") };
    let d_block = BHD * BH;
    let b_block = BH * BW;
    for (i, out) in v.chunks_exact_mut(BHD).enumerate() {
        for pd in d_row_ptr[i].index()..d_row_ptr[i + 1].index() {
            let k = d_col_ind[pd].index();
            let Some(pb) = (b_row_ptr[k].index()..b_row_ptr[k + 1].index())
                .find(|&pb| b_col_ind[pb].index() == i)
            else {
                continue;
            };
            let d = &d_val[pd * d_block..(pd + 1) * d_block];
            let b = &b_val[pb * b_block..(pb + 1) * b_block];
            let ak = &a[k * BH..(k + 1) * BH];
            for (r, o) in out.iter_mut().enumerate() {
                let mut sum = T::zero();
                for j in 0..BH {
                    sum += d[r * BH + j] * ak[j] * b[j * BW + r];
                }
                *o += alpha * sum;
            }
        }
    }
}
