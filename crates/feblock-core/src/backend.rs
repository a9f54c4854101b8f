//! Backend memory model and kernel dispatch.
//!
//! A [`Backend`] is a zero-sized compile-time tag. Containers carry it as a
//! type parameter and route every memory touch and every arithmetic kernel
//! through it, so the same logical container can be instantiated over
//! different execution targets without runtime dispatch.
//!
//! Two backends are provided:
//!
//! - [`Main`]: sequential host execution using the reference [`kernels`].
//! - [`Threaded`] (feature `parallel`): host execution that distributes block
//!   rows and vector chunks over the rayon thread pool. Row-local kernels give
//!   bitwise identical results; reductions agree within rounding.
//!
//! Transfers between containers living on different backends go through
//! [`transfer`], i.e. a `download` into host staging memory followed by an
//! `upload` on the destination backend.
//!
//! # Examples
//!
//! ```
//! use feblock_core::backend::{transfer, Backend, Main};
//!
//! let mut buf = Main::allocate::<f64>(4);
//! Main::set(&mut buf, 2.5);
//! Main::set_element(&mut buf, 1, -1.0);
//! assert_eq!(Main::get_element(&buf, 1), -1.0);
//!
//! let mut dst = vec![0.0; 4];
//! transfer::<Main, Main, f64>(&mut dst, &buf);
//! assert_eq!(dst, vec![2.5, -1.0, 2.5, 2.5]);
//! ```

use crate::kernels;
use crate::scalar::{IndexType, Scalar};
use bytemuck::Pod;
use std::fmt::Debug;

/// Compile-time tag selecting where container memory lives and how kernels run.
pub trait Backend: Copy + Clone + Debug + Default + PartialEq + Eq + Send + Sync + 'static {
    /// Human readable backend name.
    fn name() -> &'static str;

    // ========== Memory primitives ==========

    /// Allocates `len` zero-initialized elements.
    fn allocate<T: Pod>(len: usize) -> Vec<T> {
        vec![T::zeroed(); len]
    }

    /// Releases memory obtained from [`Backend::allocate`].
    fn release<T>(buffer: Vec<T>) {
        drop(buffer);
    }

    /// Copies host memory `src` into backend memory `dst`.
    fn upload<T: Pod>(dst: &mut [T], src: &[T]) {
        dst.copy_from_slice(src);
    }

    /// Copies backend memory `src` into host memory `dst`.
    fn download<T: Pod>(dst: &mut [T], src: &[T]) {
        dst.copy_from_slice(src);
    }

    /// Copies within backend memory.
    fn copy<T: Pod>(dst: &mut [T], src: &[T]) {
        dst.copy_from_slice(src);
    }

    /// Fills `dst` with `value`.
    fn set<T: Pod>(dst: &mut [T], value: T) {
        dst.fill(value);
    }

    /// Reads one element. Panics when `i` is out of range.
    fn get_element<T: Pod>(src: &[T], i: usize) -> T {
        src[i]
    }

    /// Writes one element. Panics when `i` is out of range.
    fn set_element<T: Pod>(dst: &mut [T], i: usize, value: T) {
        dst[i] = value;
    }

    /// Waits until all previously issued work is complete.
    ///
    /// Host backends execute synchronously, so this is a no-op for them.
    fn synchronize() {}

    // ========== Vector kernels ==========

    fn axpy<T: Scalar>(r: &mut [T], x: &[T], y: &[T], alpha: T) {
        kernels::axpy(r, x, y, alpha);
    }

    fn axpy_in_place<T: Scalar>(r: &mut [T], x: &[T], alpha: T) {
        kernels::axpy_in_place(r, x, alpha);
    }

    fn scale<T: Scalar>(r: &mut [T], x: &[T], alpha: T) {
        kernels::scale(r, x, alpha);
    }

    fn scale_in_place<T: Scalar>(r: &mut [T], alpha: T) {
        kernels::scale_in_place(r, alpha);
    }

    fn component_product<T: Scalar>(r: &mut [T], x: &[T], y: &[T]) {
        kernels::component_product(r, x, y);
    }

    fn component_invert<T: Scalar>(r: &mut [T], x: &[T], alpha: T) {
        kernels::component_invert(r, x, alpha);
    }

    fn dot<T: Scalar>(x: &[T], y: &[T]) -> T {
        kernels::dot(x, y)
    }

    fn triple_dot<T: Scalar>(x: &[T], y: &[T], z: &[T]) -> T {
        kernels::triple_dot(x, y, z)
    }

    fn norm2sqr<T: Scalar>(x: &[T]) -> T {
        kernels::norm2sqr(x)
    }

    fn max_abs<T: Scalar>(x: &[T]) -> T {
        kernels::max_abs(x)
    }

    fn min_abs<T: Scalar>(x: &[T]) -> T {
        kernels::min_abs(x)
    }

    fn max<T: Scalar>(x: &[T]) -> T {
        kernels::max(x)
    }

    fn min<T: Scalar>(x: &[T]) -> T {
        kernels::min(x)
    }

    // ========== BCSR kernels ==========

    fn bcsr_apply<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
        r: &mut [T],
        row_ptr: &[I],
        col_ind: &[I],
        val: &[T],
        x: &[T],
    ) {
        kernels::bcsr_apply::<T, I, BH, BW>(r, row_ptr, col_ind, val, x);
    }

    fn bcsr_apply_add<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
        r: &mut [T],
        row_ptr: &[I],
        col_ind: &[I],
        val: &[T],
        x: &[T],
        alpha: T,
    ) {
        kernels::bcsr_apply_add::<T, I, BH, BW>(r, row_ptr, col_ind, val, x, alpha);
    }

    fn bcsr_lump_rows<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
        lump: &mut [T],
        row_ptr: &[I],
        val: &[T],
    ) {
        kernels::bcsr_lump_rows::<T, I, BH, BW>(lump, row_ptr, val);
    }

    fn bcsr_row_norm2sqr<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
        norms: &mut [T],
        row_ptr: &[I],
        col_ind: &[I],
        val: &[T],
        scal: Option<&[T]>,
    ) {
        kernels::bcsr_row_norm2sqr::<T, I, BH, BW>(norms, row_ptr, col_ind, val, scal);
    }
}

/// Sequential host backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Main;

impl Backend for Main {
    fn name() -> &'static str {
        "Main"
    }
}

/// Moves the contents of `src` (living on `Src`) into `dst` (living on `Dst`).
pub fn transfer<Src: Backend, Dst: Backend, T: Pod>(dst: &mut [T], src: &[T]) {
    assert_eq!(dst.len(), src.len(), "transfer length mismatch");
    tracing::trace!(from = Src::name(), to = Dst::name(), len = src.len(), "transfer");
    Src::synchronize();
    let mut staging = vec![T::zeroed(); src.len()];
    Src::download(&mut staging, src);
    Dst::upload(dst, &staging);
    Dst::synchronize();
}

#[cfg(feature = "parallel")]
pub use threaded::Threaded;

#[cfg(feature = "parallel")]
mod threaded {
    use super::Backend;
    use crate::kernels;
    use crate::scalar::{IndexType, Scalar};
    use rayon::prelude::*;

    /// Scalars per task for element-wise kernels and reductions.
    const CHUNK: usize = 4096;

    /// Host backend running kernels on the rayon thread pool.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Threaded;

    impl Backend for Threaded {
        fn name() -> &'static str {
            "Threaded"
        }

        fn axpy<T: Scalar>(r: &mut [T], x: &[T], y: &[T], alpha: T) {
            r.par_chunks_mut(CHUNK)
                .zip(x.par_chunks(CHUNK))
                .zip(y.par_chunks(CHUNK))
                .for_each(|((r, x), y)| kernels::axpy(r, x, y, alpha));
        }

        fn axpy_in_place<T: Scalar>(r: &mut [T], x: &[T], alpha: T) {
            r.par_chunks_mut(CHUNK)
                .zip(x.par_chunks(CHUNK))
                .for_each(|(r, x)| kernels::axpy_in_place(r, x, alpha));
        }

        fn scale<T: Scalar>(r: &mut [T], x: &[T], alpha: T) {
            r.par_chunks_mut(CHUNK)
                .zip(x.par_chunks(CHUNK))
                .for_each(|(r, x)| kernels::scale(r, x, alpha));
        }

        fn component_product<T: Scalar>(r: &mut [T], x: &[T], y: &[T]) {
            r.par_chunks_mut(CHUNK)
                .zip(x.par_chunks(CHUNK))
                .zip(y.par_chunks(CHUNK))
                .for_each(|((r, x), y)| kernels::component_product(r, x, y));
        }

        fn dot<T: Scalar>(x: &[T], y: &[T]) -> T {
            x.par_chunks(CHUNK)
                .zip(y.par_chunks(CHUNK))
                .map(|(x, y)| kernels::dot(x, y))
                .sum()
        }

        fn triple_dot<T: Scalar>(x: &[T], y: &[T], z: &[T]) -> T {
            x.par_chunks(CHUNK)
                .zip(y.par_chunks(CHUNK))
                .zip(z.par_chunks(CHUNK))
                .map(|((x, y), z)| kernels::triple_dot(x, y, z))
                .sum()
        }

        fn norm2sqr<T: Scalar>(x: &[T]) -> T {
            x.par_chunks(CHUNK).map(kernels::norm2sqr).sum()
        }

        fn max_abs<T: Scalar>(x: &[T]) -> T {
            x.par_chunks(CHUNK)
                .map(kernels::max_abs)
                .reduce(T::zero, |a, b| a.max(b))
        }

        fn bcsr_apply<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
            r: &mut [T],
            row_ptr: &[I],
            col_ind: &[I],
            val: &[T],
            x: &[T],
        ) {
            r.par_chunks_exact_mut(BH)
                .enumerate()
                .for_each(|(row, out)| {
                    kernels::bcsr_apply_row::<T, I, BH, BW>(out, row, row_ptr, col_ind, val, x)
                });
        }

        fn bcsr_apply_add<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
            r: &mut [T],
            row_ptr: &[I],
            col_ind: &[I],
            val: &[T],
            x: &[T],
            alpha: T,
        ) {
            r.par_chunks_exact_mut(BH)
                .enumerate()
                .for_each(|(row, out)| {
                    kernels::bcsr_apply_add_row::<T, I, BH, BW>(
                        out, row, row_ptr, col_ind, val, x, alpha,
                    )
                });
        }

        fn bcsr_lump_rows<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
            lump: &mut [T],
            row_ptr: &[I],
            val: &[T],
        ) {
            lump.par_chunks_exact_mut(BH)
                .enumerate()
                .for_each(|(row, out)| kernels::bcsr_lump_row::<T, I, BH, BW>(out, row, row_ptr, val));
        }

        fn bcsr_row_norm2sqr<T: Scalar, I: IndexType, const BH: usize, const BW: usize>(
            norms: &mut [T],
            row_ptr: &[I],
            col_ind: &[I],
            val: &[T],
            scal: Option<&[T]>,
        ) {
            norms
                .par_chunks_exact_mut(BH)
                .enumerate()
                .for_each(|(row, out)| {
                    kernels::bcsr_row_norm2sqr_row::<T, I, BH, BW>(
                        out, row, row_ptr, col_ind, val, scal,
                    )
                });
        }
    }
}
