//! Small sparse-matrix kernels used by the AD algebra.
//!
//! Everything here works on CSR matrices and allocates a fresh result; inputs
//! are never modified.

use crate::error::{Error, Result};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Sparse diagonal matrix with `d` on the diagonal.
pub fn diag(d: &DVector<f64>) -> CsrMatrix<f64> {
    let n = d.len();
    let mut coo = CooMatrix::new(n, n);
    for (i, &v) in d.iter().enumerate() {
        coo.push(i, i, v);
    }
    CsrMatrix::from(&coo)
}

pub fn identity(n: usize) -> CsrMatrix<f64> {
    CsrMatrix::identity(n)
}

pub fn zeros(nrows: usize, ncols: usize) -> CsrMatrix<f64> {
    CsrMatrix::zeros(nrows, ncols)
}

/// `diag(d) * m`, without forming the diagonal matrix. `d.len()` must equal `m.nrows()`.
pub(crate) fn scale_rows(m: &CsrMatrix<f64>, d: &DVector<f64>) -> CsrMatrix<f64> {
    debug_assert_eq!(d.len(), m.nrows());
    let mut out = m.clone();
    let offsets = m.row_offsets();
    let values = out.values_mut();
    for i in 0..m.nrows() {
        for value in &mut values[offsets[i]..offsets[i + 1]] {
            *value *= d[i];
        }
    }
    out
}

/// `m * diag(d)`. `d.len()` must equal `m.ncols()`.
pub(crate) fn scale_cols(m: &CsrMatrix<f64>, d: &DVector<f64>) -> CsrMatrix<f64> {
    debug_assert_eq!(d.len(), m.ncols());
    let mut out = m.clone();
    let cols = m.col_indices();
    for (value, &j) in out.values_mut().iter_mut().zip(cols) {
        *value *= d[j];
    }
    out
}

pub(crate) fn scale(m: &CsrMatrix<f64>, s: f64) -> CsrMatrix<f64> {
    let mut out = m.clone();
    for value in out.values_mut() {
        *value *= s;
    }
    out
}

pub(crate) fn negate(m: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    scale(m, -1.0)
}

/// Sparse matrix times dense vector.
pub fn mat_vec(m: &CsrMatrix<f64>, v: &DVector<f64>) -> Result<DVector<f64>> {
    if m.ncols() != v.len() {
        return Err(Error::shape("matrix-vector product", m.ncols(), v.len()));
    }
    let mut out = DVector::zeros(m.nrows());
    for (i, row) in m.row_iter().enumerate() {
        out[i] = row
            .col_indices()
            .iter()
            .zip(row.values())
            .map(|(&j, &a)| a * v[j])
            .sum();
    }
    Ok(out)
}

pub(crate) fn add(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>, context: &'static str) -> Result<CsrMatrix<f64>> {
    check_same_shape(a, b, context)?;
    Ok(a + b)
}

pub(crate) fn sub(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>, context: &'static str) -> Result<CsrMatrix<f64>> {
    check_same_shape(a, b, context)?;
    Ok(a - b)
}

pub(crate) fn mat_mul(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>) -> Result<CsrMatrix<f64>> {
    if a.ncols() != b.nrows() {
        return Err(Error::shape(
            "sparse matrix product",
            format!("{} rows on the right operand", a.ncols()),
            b.nrows(),
        ));
    }
    Ok(a * b)
}

fn check_same_shape(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>, context: &'static str) -> Result<()> {
    if a.nrows() != b.nrows() || a.ncols() != b.ncols() {
        return Err(Error::shape(
            context,
            format!("{}x{}", a.nrows(), a.ncols()),
            format!("{}x{}", b.nrows(), b.ncols()),
        ));
    }
    Ok(())
}

/// Stacks matrices with a common column count on top of each other.
pub fn vstack(blocks: &[CsrMatrix<f64>]) -> Result<CsrMatrix<f64>> {
    let ncols = blocks.first().map_or(0, |b| b.ncols());
    let mut nrows = 0;
    for block in blocks {
        if block.ncols() != ncols {
            return Err(Error::shape("vertical stacking", ncols, block.ncols()));
        }
        nrows += block.nrows();
    }
    let mut coo = CooMatrix::new(nrows, ncols);
    let mut row_offset = 0;
    for block in blocks {
        for (i, j, &v) in block.triplet_iter() {
            coo.push(row_offset + i, j, v);
        }
        row_offset += block.nrows();
    }
    Ok(CsrMatrix::from(&coo))
}

/// Places matrices with a common row count side by side.
pub fn hstack(blocks: &[CsrMatrix<f64>]) -> Result<CsrMatrix<f64>> {
    let nrows = blocks.first().map_or(0, |b| b.nrows());
    let mut ncols = 0;
    for block in blocks {
        if block.nrows() != nrows {
            return Err(Error::shape("horizontal stacking", nrows, block.nrows()));
        }
        ncols += block.ncols();
    }
    let mut coo = CooMatrix::new(nrows, ncols);
    let mut col_offset = 0;
    for block in blocks {
        for (i, j, &v) in block.triplet_iter() {
            coo.push(i, col_offset + j, v);
        }
        col_offset += block.ncols();
    }
    Ok(CsrMatrix::from(&coo))
}

/// Row `i` of the result is row `i` of `b` where `take_b[i]`, else row `i` of `a`.
pub(crate) fn merge_rows(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>, take_b: &[bool]) -> CsrMatrix<f64> {
    debug_assert_eq!(a.nrows(), b.nrows());
    debug_assert_eq!(take_b.len(), a.nrows());
    let mut coo = CooMatrix::new(a.nrows(), a.ncols());
    for (i, &use_b) in take_b.iter().enumerate() {
        let row = if use_b { b.row(i) } else { a.row(i) };
        for (&j, &v) in row.col_indices().iter().zip(row.values()) {
            coo.push(i, j, v);
        }
    }
    CsrMatrix::from(&coo)
}

/// Repeats the single row of `m` `n` times.
pub(crate) fn repeat_row(m: &CsrMatrix<f64>, n: usize) -> CsrMatrix<f64> {
    debug_assert_eq!(m.nrows(), 1);
    let mut coo = CooMatrix::new(n, m.ncols());
    for i in 0..n {
        for (_, j, &v) in m.triplet_iter() {
            coo.push(i, j, v);
        }
    }
    CsrMatrix::from(&coo)
}

pub fn to_dense(m: &CsrMatrix<f64>) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(m.nrows(), m.ncols());
    for (i, j, &v) in m.triplet_iter() {
        dense[(i, j)] += v;
    }
    dense
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::dvector;

    fn sample() -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(2, 3);
        coo.push(0, 0, 1.0);
        coo.push(0, 2, 2.0);
        coo.push(1, 1, 3.0);
        CsrMatrix::from(&coo)
    }

    #[test]
    fn scale_rows_matches_diagonal_product() {
        let m = sample();
        let d = dvector![2.0, -1.0];
        let scaled = to_dense(&scale_rows(&m, &d));
        let expected = to_dense(&(&diag(&d) * &m));
        assert_eq!(scaled, expected);
        assert_eq!(scaled[(0, 2)], 4.0);
        assert_eq!(scaled[(1, 1)], -3.0);
    }

    #[test]
    fn scale_cols_matches_diagonal_product() {
        let m = sample();
        let d = dvector![1.0, 10.0, 100.0];
        let scaled = to_dense(&scale_cols(&m, &d));
        let expected = to_dense(&(&m * &diag(&d)));
        assert_eq!(scaled, expected);
    }

    #[test]
    fn mat_vec_checks_shape() {
        let m = sample();
        let out = mat_vec(&m, &dvector![1.0, 1.0, 1.0]).expect("product should succeed");
        assert_eq!(out, dvector![3.0, 3.0]);
        assert!(matches!(mat_vec(&m, &dvector![1.0]), Err(Error::Shape { .. })));
    }

    #[test]
    fn stacking_places_blocks() {
        let m = sample();
        let v = to_dense(&vstack(&[m.clone(), identity(3)]).expect("vstack"));
        assert_eq!(v.shape(), (5, 3));
        assert_eq!(v[(4, 2)], 1.0);
        assert_eq!(v[(0, 2)], 2.0);

        let h = to_dense(&hstack(&[m.clone(), zeros(2, 1), m]).expect("hstack"));
        assert_eq!(h.shape(), (2, 7));
        assert_eq!(h[(1, 5)], 3.0);
        assert_eq!(h[(1, 3)], 0.0);

        assert!(hstack(&[sample(), identity(3)]).is_err());
    }

    #[test]
    fn merge_rows_picks_rows_per_mask() {
        let a = sample();
        let b = scale(&sample(), 10.0);
        let merged = to_dense(&merge_rows(&a, &b, &[false, true]));
        assert_eq!(merged[(0, 2)], 2.0);
        assert_eq!(merged[(1, 1)], 30.0);
    }

    #[test]
    fn repeat_row_broadcasts() {
        let row = hstack(&[identity(1), zeros(1, 2)]).expect("hstack");
        let repeated = to_dense(&repeat_row(&row, 3));
        assert_eq!(repeated.shape(), (3, 3));
        assert!((0..3).all(|i| repeated[(i, 0)] == 1.0));
    }
}
