//! Differentiable elementary functions.
//!
//! Every function takes a [`Value`]. Plain scalars and arrays are mapped
//! through the underlying math function; AdArrays additionally get their
//! Jacobian left-multiplied by the diagonal of the derivative.
//!
//! Out-of-domain inputs (e.g. `log` of a negative number) produce NaN entries
//! rather than errors.

use super::{sparse, AdArray, Value};
use crate::error::{Error, Result};
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::f64::consts::PI;

/// Groups with a Euclidean norm at or below this value get a zero Jacobian row in [`l2_norm`].
pub const NORM_TOLERANCE: f64 = 1e-12;

/// Default value of [`heaviside`] at zero.
pub const HEAVISIDE_ZERO_VALUE: f64 = 0.5;

/// Default regularization width of [`heaviside_smooth`].
pub const HEAVISIDE_SMOOTH_EPS: f64 = 1e-3;

pub fn exp(var: &Value) -> Value {
    var.map_chain(f64::exp, f64::exp)
}

pub fn log(var: &Value) -> Value {
    var.map_chain(f64::ln, |x| 1.0 / x)
}

/// Sign of the values: -1, 0 or 1. Never differentiable.
pub fn sign(var: &Value) -> Value {
    match var {
        Value::Scalar(x) => Value::Scalar(sign_of(*x)),
        Value::Array(a) => Value::Array(a.map(sign_of)),
        Value::Ad(ad) => Value::Array(ad.val().map(sign_of)),
    }
}

fn sign_of(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        // zero stays zero, NaN stays NaN
        x * 0.0
    }
}

pub fn abs(var: &Value) -> Value {
    var.map_chain(f64::abs, sign_of)
}

/// Euclidean norm of interleaved vectors.
///
/// With `dim` components per vector the values are laid out as
/// `[u0, v0, w0, u1, v1, w1, ...]`. Row `i` of the resulting Jacobian is
/// `(x_i / |x_i|)` applied to the Jacobian rows of group `i`; groups with norm
/// at or below [`NORM_TOLERANCE`] get a zero row. For `dim == 1` this is [`abs`].
pub fn l2_norm(dim: usize, var: &Value) -> Result<Value> {
    if dim == 0 {
        return Err(Error::shape("l2 norm", "a positive dimension", dim));
    }
    if dim == 1 {
        return Ok(abs(var));
    }
    let values = match var {
        Value::Scalar(_) => return Err(Error::shape("l2 norm", dim, 1)),
        Value::Array(a) => a,
        Value::Ad(ad) => ad.val(),
    };
    if values.len() % dim != 0 {
        return Err(Error::shape(
            "l2 norm",
            format!("a multiple of {dim} values"),
            values.len(),
        ));
    }
    let size = values.len() / dim;
    let norms = DVector::from_iterator(
        size,
        values
            .as_slice()
            .chunks(dim)
            .map(|group| group.iter().map(|x| x * x).sum::<f64>().sqrt()),
    );

    let ad = match var {
        Value::Ad(ad) => ad,
        _ => return Ok(Value::Array(norms)),
    };

    let mut coo = CooMatrix::new(size, values.len());
    for (k, &norm) in norms.iter().enumerate() {
        if norm > NORM_TOLERANCE {
            for c in 0..dim {
                let col = k * dim + c;
                coo.push(k, col, values[col] / norm);
            }
        }
    }
    let norm_jac = CsrMatrix::from(&coo);
    let jac = sparse::mat_mul(&norm_jac, ad.jac())?;
    Ok(Value::Ad(AdArray::from_parts(norms, jac)))
}

pub fn sin(var: &Value) -> Value {
    var.map_chain(f64::sin, f64::cos)
}

pub fn cos(var: &Value) -> Value {
    var.map_chain(f64::cos, |x| -x.sin())
}

pub fn tan(var: &Value) -> Value {
    var.map_chain(f64::tan, |x| x.cos().powi(2).powf(-1.0))
}

pub fn arcsin(var: &Value) -> Value {
    var.map_chain(f64::asin, |x| (1.0 - x * x).powf(-0.5))
}

pub fn arccos(var: &Value) -> Value {
    var.map_chain(f64::acos, |x| -(1.0 - x * x).powf(-0.5))
}

pub fn arctan(var: &Value) -> Value {
    var.map_chain(f64::atan, |x| (x * x + 1.0).powf(-1.0))
}

pub fn sinh(var: &Value) -> Value {
    var.map_chain(f64::sinh, f64::cosh)
}

pub fn cosh(var: &Value) -> Value {
    var.map_chain(f64::cosh, f64::sinh)
}

pub fn tanh(var: &Value) -> Value {
    var.map_chain(f64::tanh, |x| x.cosh().powf(-2.0))
}

pub fn arcsinh(var: &Value) -> Value {
    var.map_chain(f64::asinh, |x| (x * x + 1.0).powf(-0.5))
}

pub fn arccosh(var: &Value) -> Value {
    var.map_chain(f64::acosh, |x| (x - 1.0).powf(-0.5) * (x + 1.0).powf(-0.5))
}

pub fn arctanh(var: &Value) -> Value {
    var.map_chain(f64::atanh, |x| (1.0 - x * x).powf(-1.0))
}

fn step(x: f64, zerovalue: f64) -> f64 {
    if x.is_nan() {
        x
    } else if x < 0.0 {
        0.0
    } else if x > 0.0 {
        1.0
    } else {
        zerovalue
    }
}

/// Heaviside step function. The derivative is not tracked: AdArrays come back
/// as plain arrays.
pub fn heaviside(var: &Value, zerovalue: f64) -> Value {
    match var {
        Value::Scalar(x) => Value::Scalar(step(*x, zerovalue)),
        Value::Array(a) => Value::Array(a.map(|x| step(x, zerovalue))),
        Value::Ad(ad) => Value::Array(ad.val().map(|x| step(x, zerovalue))),
    }
}

/// `H_eps(x) = 0.5 (1 + (2/pi) atan(x/eps))`, with derivative
/// `(1/pi) eps / (eps^2 + x^2)`. Tends to the step function as `eps -> 0`.
pub fn heaviside_smooth(var: &Value, eps: f64) -> Value {
    var.map_chain(
        |x| 0.5 * (1.0 + 2.0 * PI.powf(-1.0) * (x * eps.powf(-1.0)).atan()),
        |x| PI.powf(-1.0) * eps * (eps * eps + x * x).powf(-1.0),
    )
}

/// Heaviside function whose Jacobian is borrowed from a regularization.
///
/// The value is the sharp step (zero at the origin); the Jacobian is that of
/// `regularization(x)`, typically a smoothed step such as [`heaviside_smooth`].
pub struct RegularizedHeaviside<F> {
    regularization: F,
}

impl<F> RegularizedHeaviside<F>
where
    F: Fn(&AdArray) -> AdArray,
{
    pub fn new(regularization: F) -> Self {
        Self { regularization }
    }

    pub fn apply(&self, var: &Value, zerovalue: f64) -> Result<Value> {
        match var {
            Value::Ad(ad) => {
                let val = ad.val().map(|x| step(x, 0.0));
                let regularized = (self.regularization)(ad);
                let (_, jac) = regularized.into_parts();
                AdArray::new(val, jac).map(Value::Ad)
            }
            constant => Ok(heaviside(constant, zerovalue)),
        }
    }
}

/// Elementwise maximum.
///
/// Either argument may be a constant; scalars are broadcast. Row `i` of the
/// Jacobian is taken from `var_1` whenever `var_1[i] >= var_0[i]`, otherwise
/// from `var_0`. Constants contribute zero rows.
pub fn maximum(var_0: &Value, var_1: &Value) -> Result<Value> {
    let (n, num_unknowns) = match (var_0, var_1) {
        (Value::Ad(a), Value::Ad(b)) => {
            if a.len() != b.len() {
                return Err(Error::shape("maximum", a.len(), b.len()));
            }
            if a.num_unknowns() != b.num_unknowns() {
                return Err(Error::shape(
                    "maximum",
                    format!("{} Jacobian columns", a.num_unknowns()),
                    b.num_unknowns(),
                ));
            }
            (a.len(), a.num_unknowns())
        }
        (Value::Ad(ad), _) | (_, Value::Ad(ad)) => (ad.len(), ad.num_unknowns()),
        _ => return maximum_of_constants(var_0, var_1),
    };

    let v0 = broadcast(var_0, n)?;
    let v1 = broadcast(var_1, n)?;
    let take_second: Vec<bool> = v0.iter().zip(v1.iter()).map(|(a, b)| b >= a).collect();
    let val = DVector::from_iterator(
        n,
        v0.iter()
            .zip(v1.iter())
            .zip(&take_second)
            .map(|((&a, &b), &second)| if second { b } else { a }),
    );

    let zero = sparse::zeros(n, num_unknowns);
    let jac_0 = var_0.as_ad().map_or(&zero, |ad| ad.jac());
    let jac_1 = var_1.as_ad().map_or(&zero, |ad| ad.jac());
    let jac = sparse::merge_rows(jac_0, jac_1, &take_second);
    Ok(Value::Ad(AdArray::from_parts(val, jac)))
}

fn broadcast(var: &Value, n: usize) -> Result<DVector<f64>> {
    match var {
        Value::Scalar(s) => Ok(DVector::from_element(n, *s)),
        Value::Array(a) if a.len() == n => Ok(a.clone()),
        Value::Ad(ad) if ad.len() == n => Ok(ad.val().clone()),
        other => Err(Error::shape(
            "maximum",
            n,
            other.values().map_or(1, |v| v.len()),
        )),
    }
}

fn maximum_of_constants(var_0: &Value, var_1: &Value) -> Result<Value> {
    let pick = |a: f64, b: f64| if b >= a { b } else { a };
    match (var_0, var_1) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(pick(*a, *b))),
        (Value::Array(a), Value::Scalar(b)) => Ok(Value::Array(a.map(|x| pick(x, *b)))),
        (Value::Scalar(a), Value::Array(b)) => Ok(Value::Array(b.map(|y| pick(*a, y)))),
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return Err(Error::shape("maximum", a.len(), b.len()));
            }
            Ok(Value::Array(a.zip_map(b, pick)))
        }
        _ => Err(Error::Type("maximum of constants received an AdArray".into())),
    }
}

/// Indicator of values within `tol` of zero. The Jacobian is identically zero.
pub fn characteristic_function(tol: f64, var: &Value) -> Value {
    let indicator = |x: f64| if x.abs() <= tol { 1.0 } else { 0.0 };
    match var {
        Value::Scalar(x) => Value::Scalar(indicator(*x)),
        Value::Array(a) => Value::Array(a.map(indicator)),
        Value::Ad(ad) => Value::Ad(AdArray::constant(ad.val().map(indicator), ad.num_unknowns())),
    }
}
