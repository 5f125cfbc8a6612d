//! Dense vector kernels over slices.
//!
//! These are the small BLAS-level primitives the FETI operators are written with:
//! `axpy`, `axpby`, the conjugated dot product, and column-major `gemv` in both
//! directions. Dual vectors are stored contiguously, so a single call covers every
//! neighbor block at once.
//!
//! With the `rayon` feature the reductions run on the global thread pool for long
//! vectors; the result is the same up to floating-point reassociation.

use crate::core::traits::Scalar;

#[cfg(feature = "rayon")]
const PAR_THRESHOLD: usize = 1 << 14;

/// y ← y + alpha · x
pub fn axpy<K: Scalar>(alpha: K, x: &[K], y: &mut [K]) {
    debug_assert_eq!(x.len(), y.len(), "axpy: length mismatch");
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

/// y ← alpha · x + beta · y
pub fn axpby<K: Scalar>(alpha: K, x: &[K], beta: K, y: &mut [K]) {
    debug_assert_eq!(x.len(), y.len(), "axpby: length mismatch");
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = alpha * xi + beta * *yi;
    }
}

/// Σ conj(xᵢ) · yᵢ
pub fn dot<K: Scalar>(x: &[K], y: &[K]) -> K {
    debug_assert_eq!(x.len(), y.len(), "dot: length mismatch");
    #[cfg(feature = "rayon")]
    {
        if x.len() >= PAR_THRESHOLD {
            use rayon::prelude::*;
            return x
                .par_iter()
                .zip(y.par_iter())
                .map(|(&xi, &yi)| xi.conj() * yi)
                .reduce(K::zero, |acc, v| acc + v);
        }
    }
    x.iter()
        .zip(y)
        .fold(K::zero(), |acc, (&xi, &yi)| acc + xi.conj() * yi)
}

/// y ← A x, with `A` stored column-major as `nrows × ncols`.
pub fn gemv<K: Scalar>(a: &[K], nrows: usize, ncols: usize, x: &[K], y: &mut [K]) {
    debug_assert_eq!(a.len(), nrows * ncols);
    debug_assert_eq!(x.len(), ncols);
    debug_assert_eq!(y.len(), nrows);
    y.iter_mut().for_each(|yi| *yi = K::zero());
    for (j, &xj) in x.iter().enumerate() {
        if xj.is_zero() {
            continue;
        }
        let col = &a[j * nrows..(j + 1) * nrows];
        axpy(xj, col, y);
    }
}

/// y ← Aᵀ x (plain transpose, no conjugation), with `A` column-major `nrows × ncols`.
pub fn gemv_transpose<K: Scalar>(a: &[K], nrows: usize, ncols: usize, x: &[K], y: &mut [K]) {
    debug_assert_eq!(a.len(), nrows * ncols);
    debug_assert_eq!(x.len(), nrows);
    debug_assert_eq!(y.len(), ncols);
    for (j, yj) in y.iter_mut().enumerate() {
        let col = &a[j * nrows..(j + 1) * nrows];
        *yj = col
            .iter()
            .zip(x)
            .fold(K::zero(), |acc, (&aij, &xi)| acc + aij * xi);
    }
}
