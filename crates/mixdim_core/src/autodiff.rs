//! Forward-mode automatic differentiation on whole vectors.
//!
//! An [`AdArray`] pairs a value vector with its sparse Jacobian with respect to
//! one global vector of unknowns. Seeds are created by [`init_ad_arrays`] (or
//! [`init_ad_array`] for a single unknown vector); every other AdArray is the
//! result of arithmetic on seeds, which applies the chain rule to the Jacobian.

pub mod functions;
pub mod ops;
pub mod sparse;

pub use ops::{Exponent, Operand, Value};

use crate::error::{Error, Result};
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use std::fmt;

/// A value vector together with its Jacobian.
///
/// The Jacobian has one row per entry of the value and one column per scalar
/// unknown in the global vector. AdArrays own their storage; all operations
/// return fresh arrays and leave their operands untouched.
#[derive(Debug, Clone)]
pub struct AdArray {
    val: DVector<f64>,
    jac: CsrMatrix<f64>,
}

/// How a Jacobian is scaled by [`AdArray::diagvec_mul_jac`] and
/// [`AdArray::jac_mul_diagvec`].
#[derive(Debug, Clone, Copy)]
pub enum Scaling<'a> {
    /// Uniform scaling.
    Scalar(f64),
    /// The vector is placed on the diagonal of a matrix.
    Diagonal(&'a DVector<f64>),
    /// A pre-built linear map, used as-is.
    Matrix(&'a CsrMatrix<f64>),
}

impl From<f64> for Scaling<'_> {
    fn from(value: f64) -> Self {
        Scaling::Scalar(value)
    }
}

impl<'a> From<&'a DVector<f64>> for Scaling<'a> {
    fn from(value: &'a DVector<f64>) -> Self {
        Scaling::Diagonal(value)
    }
}

impl<'a> From<&'a CsrMatrix<f64>> for Scaling<'a> {
    fn from(value: &'a CsrMatrix<f64>) -> Self {
        Scaling::Matrix(value)
    }
}

impl AdArray {
    /// Pairs a value with its Jacobian. The Jacobian must have one row per value.
    pub fn new(val: DVector<f64>, jac: CsrMatrix<f64>) -> Result<Self> {
        if jac.nrows() != val.len() {
            return Err(Error::shape(
                "AdArray construction",
                format!("{} Jacobian rows", val.len()),
                jac.nrows(),
            ));
        }
        Ok(Self { val, jac })
    }

    /// Constructor for results whose shapes are consistent by construction.
    pub(crate) fn from_parts(val: DVector<f64>, jac: CsrMatrix<f64>) -> Self {
        debug_assert_eq!(jac.nrows(), val.len());
        Self { val, jac }
    }

    /// A constant: the Jacobian is zero with respect to `num_unknowns` unknowns.
    pub fn constant(val: DVector<f64>, num_unknowns: usize) -> Self {
        let jac = sparse::zeros(val.len(), num_unknowns);
        Self { val, jac }
    }

    /// Builds an AdArray whose Jacobian is assembled from per-component matrices,
    /// stacked on top of each other in the given order.
    ///
    /// This is the representation used for vector-valued quantities: component
    /// `k` contributes the rows of `components[k]`.
    pub fn from_components(val: DVector<f64>, components: &[CsrMatrix<f64>]) -> Result<Self> {
        let jac = sparse::vstack(components)?;
        Self::new(val, jac)
    }

    pub fn val(&self) -> &DVector<f64> {
        &self.val
    }

    pub fn jac(&self) -> &CsrMatrix<f64> {
        &self.jac
    }

    pub fn full_jac(&self) -> &CsrMatrix<f64> {
        &self.jac
    }

    pub fn into_parts(self) -> (DVector<f64>, CsrMatrix<f64>) {
        (self.val, self.jac)
    }

    /// Number of scalar values.
    pub fn len(&self) -> usize {
        self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.val.is_empty()
    }

    /// Size of the global unknown vector this array is differentiated against.
    pub fn num_unknowns(&self) -> usize {
        self.jac.ncols()
    }

    /// Independent deep copy of value and Jacobian.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// `diag(a) * J`. A matrix-shaped `a` is used as the left factor directly.
    pub fn diagvec_mul_jac<'a>(&self, a: impl Into<Scaling<'a>>) -> Result<CsrMatrix<f64>> {
        match a.into() {
            Scaling::Scalar(s) => Ok(sparse::scale(&self.jac, s)),
            Scaling::Diagonal(d) => {
                if d.len() != self.jac.nrows() {
                    return Err(Error::shape("diagonal scaling of Jacobian rows", self.jac.nrows(), d.len()));
                }
                Ok(sparse::scale_rows(&self.jac, d))
            }
            Scaling::Matrix(m) => sparse::mat_mul(m, &self.jac),
        }
    }

    /// `J * diag(a)`. A matrix-shaped `a` is used as the right factor directly.
    pub fn jac_mul_diagvec<'a>(&self, a: impl Into<Scaling<'a>>) -> Result<CsrMatrix<f64>> {
        match a.into() {
            Scaling::Scalar(s) => Ok(sparse::scale(&self.jac, s)),
            Scaling::Diagonal(d) => {
                if d.len() != self.jac.ncols() {
                    return Err(Error::shape("diagonal scaling of Jacobian columns", self.jac.ncols(), d.len()));
                }
                Ok(sparse::scale_cols(&self.jac, d))
            }
            Scaling::Matrix(m) => sparse::mat_mul(&self.jac, m),
        }
    }

    /// Applies a linear map to both value and Jacobian: `(op * val, op * J)`.
    pub fn left_apply(&self, op: &CsrMatrix<f64>) -> Result<Self> {
        let val = sparse::mat_vec(op, &self.val)?;
        let jac = sparse::mat_mul(op, &self.jac)?;
        Ok(Self::from_parts(val, jac))
    }

    /// Row scaling with a vector known to match the value length.
    pub(crate) fn chain(&self, val: DVector<f64>, derivative: &DVector<f64>) -> Self {
        Self::from_parts(val, sparse::scale_rows(&self.jac, derivative))
    }
}

impl fmt::Display for AdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ad array of size {}", self.val.len())?;
        write!(
            f,
            "Jacobian is of size ({}, {}) and has {} elements",
            self.jac.nrows(),
            self.jac.ncols(),
            self.jac.nnz()
        )
    }
}

/// Seeds a single vector of unknowns: the Jacobian is the identity.
pub fn init_ad_array(values: DVector<f64>) -> AdArray {
    let n = values.len();
    AdArray::from_parts(values, sparse::identity(n))
}

/// Seeds one AdArray per block of unknowns.
///
/// The blocks are laid out consecutively in the global vector; the Jacobian of
/// the `i`-th array is zero except for an identity block in the columns of
/// block `i`.
pub fn init_ad_arrays(variables: &[DVector<f64>]) -> Vec<AdArray> {
    let total: usize = variables.iter().map(|v| v.len()).sum();
    let mut offset = 0;
    variables
        .iter()
        .map(|values| {
            let n = values.len();
            let mut coo = nalgebra_sparse::CooMatrix::new(n, total);
            for i in 0..n {
                coo.push(i, offset + i, 1.0);
            }
            offset += n;
            AdArray::from_parts(values.clone(), CsrMatrix::from(&coo))
        })
        .collect()
}
