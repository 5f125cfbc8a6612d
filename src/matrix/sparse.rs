// SparseMatrix trait and the CSR container used for local subdomain matrices

use crate::core::traits::Scalar;
use crate::error::FetiError;
use num_traits::ToPrimitive;
use std::io::{self, Write};
use std::ops::Range;

/// Entries below this magnitude may be dropped when adopting another pattern.
const PATTERN_EPS: f64 = 1e-12;

/// A read‐only sparse matrix supporting y = A * x.
pub trait SparseMatrix<T> {
    /// Number of rows.
    fn nrows(&self) -> usize;
    /// Number of columns.
    fn ncols(&self) -> usize;
    /// Compute y = A * x.  `x.len() == ncols()`, `y.len() == nrows()`.
    fn spmv(&self, x: &[T], y: &mut [T]);
}

/// Compressed sparse row matrix with 0-based indices.
///
/// When `symmetric` is set only the upper triangle (diagonal included) is stored
/// and products account for the mirrored entries.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix<K> {
    nrows: usize,
    ncols: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<K>,
    symmetric: bool,
}

impl<K: Scalar> CsrMatrix<K> {
    /// Build a CSR from raw row‐ptr, col‐idx, and values.
    pub fn from_csr(
        nrows: usize,
        ncols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<K>,
        symmetric: bool,
    ) -> Result<Self, FetiError> {
        FetiError::check_len("row pointer", nrows + 1, row_ptr.len())?;
        FetiError::check_len("column indices", values.len(), col_idx.len())?;
        FetiError::check_len("nonzeros", row_ptr[nrows], values.len())?;
        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(FetiError::Unsupported("row pointer must be non-decreasing"));
        }
        if col_idx.iter().any(|&j| j >= ncols) {
            return Err(FetiError::Unsupported("column index out of range"));
        }
        if symmetric && nrows != ncols {
            return Err(FetiError::Unsupported("symmetric storage requires a square matrix"));
        }
        Ok(Self { nrows, ncols, row_ptr, col_idx, values, symmetric })
    }

    /// Build a general (non-symmetric storage) CSR from `(row, col, value)` triplets.
    /// Duplicate entries are summed; columns are sorted within each row.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, K)]) -> Self {
        let mut rows: Vec<Vec<(usize, K)>> = vec![Vec::new(); nrows];
        for &(i, j, v) in triplets {
            debug_assert!(i < nrows && j < ncols, "triplet ({i}, {j}) out of range");
            rows[i].push((j, v));
        }
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_idx = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for mut row in rows {
            row.sort_by_key(|&(j, _)| j);
            for (j, v) in row {
                if col_idx.len() > *row_ptr.last().unwrap_or(&0) && col_idx.last() == Some(&j) {
                    if let Some(last) = values.last_mut() {
                        *last += v;
                    }
                } else {
                    col_idx.push(j);
                    values.push(v);
                }
            }
            row_ptr.push(col_idx.len());
        }
        Self { nrows, ncols, row_ptr, col_idx, values, symmetric: false }
    }

    /// n × n identity.
    pub fn identity(n: usize) -> Self {
        Self {
            nrows: n,
            ncols: n,
            row_ptr: (0..=n).collect(),
            col_idx: (0..n).collect(),
            values: vec![K::one(); n],
            symmetric: false,
        }
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    pub fn col_idx(&self) -> &[usize] {
        &self.col_idx
    }

    pub fn values(&self) -> &[K] {
        &self.values
    }

    /// Stored entries of row `i` as `(column, value)` pairs.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, K)> + '_ {
        let range = self.row_ptr[i]..self.row_ptr[i + 1];
        self.col_idx[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// Diagonal entries (zero where not stored).
    pub fn diagonal(&self) -> Vec<K> {
        let n = self.nrows.min(self.ncols);
        let mut diag = vec![K::zero(); n];
        for (i, d) in diag.iter_mut().enumerate() {
            for (j, v) in self.row(i) {
                if j == i {
                    *d += v;
                }
            }
        }
        diag
    }

    /// Compute y = Aᵀ x.  `x.len() == nrows()`, `y.len() == ncols()`.
    pub fn spmv_transpose(&self, x: &[K], y: &mut [K]) {
        assert_eq!(x.len(), self.nrows);
        assert_eq!(y.len(), self.ncols);
        if self.symmetric {
            self.spmv(x, y);
            return;
        }
        y.iter_mut().for_each(|yi| *yi = K::zero());
        for (i, &xi) in x.iter().enumerate() {
            if xi.is_zero() {
                continue;
            }
            for (j, v) in self.row(i) {
                y[j] += v * xi;
            }
        }
    }

    /// Extract the dense-indexed sub-block `A[rows, cols]` in general storage.
    pub fn block(&self, rows: Range<usize>, cols: Range<usize>) -> Self {
        let nrows = rows.len();
        let ncols = cols.len();
        let mut triplets = Vec::new();
        for i in 0..self.nrows {
            for (j, v) in self.row(i) {
                if rows.contains(&i) && cols.contains(&j) {
                    triplets.push((i - rows.start, j - cols.start, v));
                }
                if self.symmetric && i != j && rows.contains(&j) && cols.contains(&i) {
                    triplets.push((j - rows.start, i - cols.start, v));
                }
            }
        }
        Self::from_triplets(nrows, ncols, &triplets)
    }

    /// Checks whether `other` can take the sparsity pattern of `self`.
    ///
    /// On success `other` is rewritten on the pattern of `self` (entries missing from
    /// `other` become explicit zeros) and `true` is returned. Entries of `other`
    /// outside the pattern must be negligible, otherwise `other` is left untouched.
    pub fn same_sparsity(&self, other: &mut Self) -> bool {
        if other.symmetric != self.symmetric
            || other.nrows != self.nrows
            || other.ncols != self.ncols
            || other.nnz() < self.nnz()
        {
            return false;
        }
        if other.row_ptr == self.row_ptr && other.col_idx == self.col_idx {
            return true;
        }
        let mut values = vec![K::zero(); self.nnz()];
        for i in 0..self.nrows {
            let mut k = self.row_ptr[i];
            let end = self.row_ptr[i + 1];
            for (j, v) in other.row(i) {
                while k < end && self.col_idx[k] < j {
                    k += 1;
                }
                if k < end && self.col_idx[k] == j {
                    values[k] = v;
                    k += 1;
                } else if v.abs2().to_f64().unwrap_or(f64::INFINITY).sqrt() > PATTERN_EPS {
                    return false;
                }
            }
        }
        other.row_ptr = self.row_ptr.clone();
        other.col_idx = self.col_idx.clone();
        other.values = values;
        true
    }

    /// Write the matrix in coordinate text form with 1-based indices.
    pub fn dump<W: Write>(&self, mut w: W) -> io::Result<()>
    where
        K: std::fmt::Display,
    {
        writeln!(w, "# First line: n m (is symmetric) nnz indexing")?;
        writeln!(w, "# For each nonzero coefficient: i j a_ij such that (i, j) \\in  {{1, ..., n}} x {{1, ..., m}}")?;
        writeln!(w, "{} {} {} {} C", self.nrows, self.ncols, u8::from(self.symmetric), self.nnz())?;
        for i in 0..self.nrows {
            for (j, v) in self.row(i) {
                writeln!(w, "{:>9} {:>9} {:.20}", i + 1, j + 1, v)?;
            }
        }
        Ok(())
    }
}

impl<K: Scalar> SparseMatrix<K> for CsrMatrix<K> {
    fn nrows(&self) -> usize {
        self.nrows
    }
    fn ncols(&self) -> usize {
        self.ncols
    }
    fn spmv(&self, x: &[K], y: &mut [K]) {
        assert_eq!(x.len(), self.ncols);
        assert_eq!(y.len(), self.nrows);
        y.iter_mut().for_each(|yi| *yi = K::zero());
        for i in 0..self.nrows {
            for (j, v) in self.row(i) {
                y[i] += v * x[j];
                if self.symmetric && i != j {
                    y[j] += v * x[i];
                }
            }
        }
    }
}

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "rayon")]
impl<K: Scalar> CsrMatrix<K> {
    /// Parallel SpMV using Rayon. Symmetric storage falls back to the serial kernel.
    pub fn spmv_parallel(&self, x: &[K], y: &mut [K]) {
        if self.symmetric {
            self.spmv(x, y);
            return;
        }
        assert_eq!(x.len(), self.ncols);
        assert_eq!(y.len(), self.nrows);
        y.par_iter_mut().enumerate().for_each(|(i, yi)| {
            *yi = self.row(i).fold(K::zero(), |acc, (j, v)| acc + v * x[j]);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_spmv() {
        let m = CsrMatrix::<f64>::identity(3);
        let x = vec![2.0, 3.0, 5.0];
        let mut y = vec![0.0; 3];
        m.spmv(&x, &mut y);
        assert_eq!(y, x);
    }

    #[test]
    fn simple_pattern() {
        // 2×3 matrix [[1,2,0],[0,3,4]]
        let m = CsrMatrix::from_csr(
            2, 3,
            vec![0, 2, 4],
            vec![0, 1, 1, 2],
            vec![1.0, 2.0, 3.0, 4.0],
            false,
        )
        .unwrap();
        let x = vec![1.0, 1.0, 1.0];
        let mut y = vec![0.0; 2];
        m.spmv(&x, &mut y);
        assert_eq!(y, vec![3.0, 7.0]);
        let mut z = vec![0.0; 3];
        m.spmv_transpose(&[1.0, 1.0], &mut z);
        assert_eq!(z, vec![1.0, 5.0, 4.0]);
    }

    #[test]
    fn symmetric_storage_matches_general() {
        // [[2,-1,0],[-1,2,-1],[0,-1,2]] upper triangle only
        let upper = CsrMatrix::from_csr(
            3, 3,
            vec![0, 2, 4, 5],
            vec![0, 1, 1, 2, 2],
            vec![2.0, -1.0, 2.0, -1.0, 2.0],
            true,
        )
        .unwrap();
        let full = upper.block(0..3, 0..3);
        assert!(!full.is_symmetric());
        assert_eq!(full.nnz(), 7);
        let x = vec![1.0, 2.0, 3.0];
        let mut y1 = vec![0.0; 3];
        let mut y2 = vec![0.0; 3];
        upper.spmv(&x, &mut y1);
        full.spmv(&x, &mut y2);
        assert_eq!(y1, y2);
        assert_eq!(y1, vec![0.0, 0.0, 4.0]);
    }

    #[test]
    fn triplets_sum_duplicates() {
        let m = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 1, 2.0), (0, 0, 3.0), (0, 1, -1.0)]);
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.diagonal(), vec![4.0, 2.0]);
    }

    #[test]
    fn blocks_split_interior_and_interface() {
        let m = CsrMatrix::from_triplets(
            3, 3,
            &[(0, 0, 4.0), (0, 2, -1.0), (1, 1, 5.0), (2, 0, -1.0), (2, 2, 6.0)],
        );
        let a_ib = m.block(0..2, 2..3);
        assert_eq!(a_ib.nrows(), 2);
        assert_eq!(a_ib.ncols(), 1);
        let mut y = vec![0.0; 2];
        a_ib.spmv(&[1.0], &mut y);
        assert_eq!(y, vec![-1.0, 0.0]);
    }

    #[test]
    fn same_sparsity_adopts_larger_pattern() {
        let pattern = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0)]);
        let mut other = CsrMatrix::from_triplets(2, 2, &[(0, 0, 3.0), (1, 1, 4.0), (1, 0, 0.0)]);
        // other has 3 entries, (1,0) is an explicit zero outside the pattern
        assert!(pattern.same_sparsity(&mut other));
        assert_eq!(other.col_idx(), pattern.col_idx());
        assert_eq!(other.values(), &[3.0, 0.0, 4.0]);

        let mut incompatible = CsrMatrix::from_triplets(2, 2, &[(0, 0, 3.0), (1, 0, 2.0), (1, 1, 4.0)]);
        assert!(!pattern.same_sparsity(&mut incompatible));
        assert_eq!(incompatible.values(), &[3.0, 2.0, 4.0]);
    }

    #[test]
    fn dump_uses_one_based_indices() {
        let m = CsrMatrix::from_triplets(1, 2, &[(0, 1, 2.5)]);
        let mut out = Vec::new();
        m.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "1 2 0 1 C");
        let fields: Vec<&str> = lines[3].split_whitespace().collect();
        assert_eq!(&fields[..2], &["1", "2"]);
        assert!(fields[2].starts_with("2.5"));
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn parallel_spmv_matches_serial() {
        let n = 200;
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0 + i as f64));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -0.5));
            }
        }
        let m = CsrMatrix::from_triplets(n, n, &triplets);
        let x: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
        let mut serial = vec![0.0; n];
        let mut parallel = vec![1.0; n];
        m.spmv(&x, &mut serial);
        m.spmv_parallel(&x, &mut parallel);
        assert_eq!(serial, parallel);
    }
}
