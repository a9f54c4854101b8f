//! Property-based tests for the slice kernels, block types and shared buffers

use approx::assert_relative_eq;
use feblock_core::{kernels, Backend, Main, Matrix, SharedBuffer, Vector};
use proptest::prelude::*;

/// Pair of equal-length scalar vectors
fn vec_pair(max_len: usize) -> impl Strategy<Value = (Vec<f64>, Vec<f64>)> {
    (0..max_len).prop_flat_map(|n| {
        (
            prop::collection::vec(-100.0..100.0f64, n),
            prop::collection::vec(-100.0..100.0f64, n),
        )
    })
}

/// Block-diagonal 2×3 BCSR arrays with `n` block rows plus a matching `x`
fn block_diagonal(max_rows: usize) -> impl Strategy<Value = (Vec<u32>, Vec<u32>, Vec<f64>, Vec<f64>)> {
    (1..max_rows).prop_flat_map(|n| {
        (
            prop::collection::vec(-10.0..10.0f64, n * 6),
            prop::collection::vec(-10.0..10.0f64, n * 3),
        )
            .prop_map(move |(val, x)| {
                let row_ptr: Vec<u32> = (0..=n as u32).collect();
                let col_ind: Vec<u32> = (0..n as u32).collect();
                (row_ptr, col_ind, val, x)
            })
    })
}

// ============================================================================
// Vector kernels
// ============================================================================

proptest! {
    #[test]
    fn prop_axpy_matches_elementwise((x, y) in vec_pair(64), alpha in -5.0..5.0f64) {
        let mut r = vec![0.0; x.len()];
        kernels::axpy(&mut r, &x, &y, alpha);
        for i in 0..x.len() {
            assert_relative_eq!(r[i], alpha * x[i] + y[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn prop_axpy_in_place_is_bitwise_axpy((x, y) in vec_pair(64), alpha in prop::sample::select(vec![1.0, -1.0, 0.0, 0.37, -2.5])) {
        let mut r = vec![0.0; x.len()];
        kernels::axpy(&mut r, &x, &y, alpha);
        let mut in_place = y.clone();
        kernels::axpy_in_place(&mut in_place, &x, alpha);
        prop_assert_eq!(r, in_place);
    }

    #[test]
    fn prop_dot_is_symmetric_and_bounds_norm((x, y) in vec_pair(64)) {
        assert_relative_eq!(kernels::dot(&x, &y), kernels::dot(&y, &x), epsilon = 1e-9);
        let xx = kernels::norm2sqr(&x);
        assert_relative_eq!(kernels::dot(&x, &x), xx, epsilon = 1e-9);
        // Cauchy-Schwarz
        let xy = kernels::dot(&x, &y);
        prop_assert!(xy * xy <= xx * kernels::norm2sqr(&y) * (1.0 + 1e-12) + 1e-9);
    }

    #[test]
    fn prop_extrema_are_ordered((x, _y) in vec_pair(64)) {
        prop_assert!(kernels::min(&x) <= kernels::max(&x));
        prop_assert!(kernels::min_abs(&x) <= kernels::max_abs(&x));
        prop_assert!(kernels::max_abs(&x) >= kernels::max(&x).abs());
        prop_assert!(kernels::max_abs(&x) >= kernels::min(&x).abs());
    }
}

// ============================================================================
// BCSR kernels
// ============================================================================

proptest! {
    #[test]
    fn prop_apply_matches_block_mat_vec((row_ptr, col_ind, val, x) in block_diagonal(12)) {
        let n = row_ptr.len() - 1;
        let mut r = vec![0.0; n * 2];
        kernels::bcsr_apply::<f64, u32, 2, 3>(&mut r, &row_ptr, &col_ind, &val, &x);
        for i in 0..n {
            let block = Matrix::<f64, 2, 3>::from_slice(&val[i * 6..(i + 1) * 6]);
            let expected = block * Vector::<f64, 3>::from_slice(&x[i * 3..(i + 1) * 3]);
            assert_relative_eq!(r[i * 2], expected[0], epsilon = 1e-10);
            assert_relative_eq!(r[i * 2 + 1], expected[1], epsilon = 1e-10);
        }
    }

    #[test]
    fn prop_apply_add_accumulates((row_ptr, col_ind, val, x) in block_diagonal(12), alpha in -3.0..3.0f64) {
        let n = row_ptr.len() - 1;
        let mut ax = vec![0.0; n * 2];
        kernels::bcsr_apply::<f64, u32, 2, 3>(&mut ax, &row_ptr, &col_ind, &val, &x);
        let start: Vec<f64> = (0..n * 2).map(|i| i as f64).collect();
        let mut r = start.clone();
        kernels::bcsr_apply_add::<f64, u32, 2, 3>(&mut r, &row_ptr, &col_ind, &val, &x, alpha);
        for i in 0..n * 2 {
            assert_relative_eq!(r[i], start[i] + alpha * ax[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn prop_lump_is_apply_of_ones((row_ptr, col_ind, val, _x) in block_diagonal(12)) {
        let n = row_ptr.len() - 1;
        let ones = vec![1.0; n * 3];
        let mut applied = vec![0.0; n * 2];
        kernels::bcsr_apply::<f64, u32, 2, 3>(&mut applied, &row_ptr, &col_ind, &val, &ones);
        let mut lumped = vec![0.0; n * 2];
        kernels::bcsr_lump_rows::<f64, u32, 2, 3>(&mut lumped, &row_ptr, &val);
        for i in 0..n * 2 {
            assert_relative_eq!(lumped[i], applied[i], epsilon = 1e-10);
        }
    }

    #[test]
    fn prop_unit_weighted_row_norms_match_plain((row_ptr, col_ind, val, _x) in block_diagonal(12)) {
        let n = row_ptr.len() - 1;
        let mut plain = vec![0.0; n * 2];
        kernels::bcsr_row_norm2sqr::<f64, u32, 2, 3>(&mut plain, &row_ptr, &col_ind, &val, None);
        let ones = vec![1.0; n * 3];
        let mut weighted = vec![0.0; n * 2];
        kernels::bcsr_row_norm2sqr::<f64, u32, 2, 3>(&mut weighted, &row_ptr, &col_ind, &val, Some(&ones));
        prop_assert_eq!(plain, weighted);
    }
}

// ============================================================================
// Block types
// ============================================================================

proptest! {
    #[test]
    fn prop_transpose_is_involution(data in prop::collection::vec(-10.0..10.0f64, 6)) {
        let m = Matrix::<f64, 2, 3>::from_slice(&data);
        prop_assert_eq!(m.transpose().transpose(), m);
        assert_relative_eq!(m.transpose().norm_frobenius(), m.norm_frobenius(), epsilon = 1e-12);
    }

    #[test]
    fn prop_mat_vec_operator_agrees(data in prop::collection::vec(-10.0..10.0f64, 6), x in prop::collection::vec(-10.0..10.0f64, 3)) {
        let m = Matrix::<f64, 2, 3>::from_slice(&data);
        let x = Vector::<f64, 3>::from_slice(&x);
        prop_assert_eq!(m * x, m.mat_vec(&x));
        prop_assert_eq!(m.row_sums(), m * Vector::splat(1.0));
    }
}

// ============================================================================
// Shared buffers and backends
// ============================================================================

proptest! {
    #[test]
    fn prop_range_overlap_matches_intervals(
        len in 1usize..40,
        a in (0usize..40, 1usize..10),
        b in (0usize..40, 1usize..10),
    ) {
        let buffer = SharedBuffer::from_vec(vec![0.0f64; len]);
        let (Ok(wa), Ok(wb)) = (buffer.range(a.0, a.1), buffer.range(b.0, b.1)) else {
            prop_assert!(a.0 + a.1 > len || b.0 + b.1 > len);
            return Ok(());
        };
        let intersect = a.0 < b.0 + b.1 && b.0 < a.0 + a.1;
        prop_assert_eq!(wa.overlaps(&wb), intersect);
        prop_assert!(!wa.overlaps(&SharedBuffer::from_vec(vec![0.0f64; len])));
    }

    #[test]
    fn prop_upload_download_round_trip(data in prop::collection::vec(-1e6..1e6f64, 0..64)) {
        let mut device = Main::allocate::<f64>(data.len());
        Main::upload(&mut device, &data);
        let mut host = vec![0.0; data.len()];
        Main::download(&mut host, &device);
        prop_assert_eq!(host, data);
    }
}

#[cfg(feature = "parallel")]
proptest! {
    #[test]
    fn prop_threaded_backend_matches_main((row_ptr, col_ind, val, x) in block_diagonal(40)) {
        use feblock_core::Threaded;

        let n = row_ptr.len() - 1;
        let mut seq = vec![0.0; n * 2];
        Main::bcsr_apply::<f64, u32, 2, 3>(&mut seq, &row_ptr, &col_ind, &val, &x);
        let mut par = vec![0.0; n * 2];
        Threaded::bcsr_apply::<f64, u32, 2, 3>(&mut par, &row_ptr, &col_ind, &val, &x);
        prop_assert_eq!(seq, par);

        let (a, b) = (&x[..], &x[..]);
        assert_relative_eq!(Main::dot(a, b), Threaded::dot(a, b), epsilon = 1e-9, max_relative = 1e-12);
    }
}
