//! Arithmetic on [`AdArray`]s and the [`Value`] sum type.
//!
//! The `try_*` methods report shape mismatches as errors. The `std::ops`
//! operators call them and panic on mismatch, like nalgebra's own operators.

use super::{sparse, AdArray};
use crate::error::{Error, Result};
use nalgebra::DVector;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Either a plain numeric quantity or a differentiable one.
///
/// Plain quantities carry no derivative information; combining them with an
/// AdArray treats them as constants with a zero Jacobian.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(f64),
    Array(DVector<f64>),
    Ad(AdArray),
}

/// Borrowed view of an operand.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Scalar(f64),
    Array(&'a DVector<f64>),
    Ad(&'a AdArray),
}

/// Exponent of [`AdArray::pow`].
///
/// Integer exponents are converted to floating point before the power is taken.
#[derive(Debug, Clone)]
pub enum Exponent {
    Int(i64),
    Float(f64),
    IntArray(Vec<i64>),
    FloatArray(DVector<f64>),
    Ad(AdArray),
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Scalar(value)
    }
}

impl From<DVector<f64>> for Value {
    fn from(value: DVector<f64>) -> Self {
        Value::Array(value)
    }
}

impl From<AdArray> for Value {
    fn from(value: AdArray) -> Self {
        Value::Ad(value)
    }
}

impl From<f64> for Operand<'_> {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

impl<'a> From<&'a DVector<f64>> for Operand<'a> {
    fn from(value: &'a DVector<f64>) -> Self {
        Operand::Array(value)
    }
}

impl<'a> From<&'a AdArray> for Operand<'a> {
    fn from(value: &'a AdArray) -> Self {
        Operand::Ad(value)
    }
}

impl<'a> From<&'a Value> for Operand<'a> {
    fn from(value: &'a Value) -> Self {
        value.as_operand()
    }
}

impl From<i32> for Exponent {
    fn from(value: i32) -> Self {
        Exponent::Int(value as i64)
    }
}

impl From<i64> for Exponent {
    fn from(value: i64) -> Self {
        Exponent::Int(value)
    }
}

impl From<f64> for Exponent {
    fn from(value: f64) -> Self {
        Exponent::Float(value)
    }
}

impl From<Vec<i64>> for Exponent {
    fn from(value: Vec<i64>) -> Self {
        Exponent::IntArray(value)
    }
}

impl From<DVector<f64>> for Exponent {
    fn from(value: DVector<f64>) -> Self {
        Exponent::FloatArray(value)
    }
}

impl From<AdArray> for Exponent {
    fn from(value: AdArray) -> Self {
        Exponent::Ad(value)
    }
}

impl From<&AdArray> for Exponent {
    fn from(value: &AdArray) -> Self {
        Exponent::Ad(value.clone())
    }
}

impl Value {
    pub fn as_operand(&self) -> Operand<'_> {
        match self {
            Value::Scalar(s) => Operand::Scalar(*s),
            Value::Array(a) => Operand::Array(a),
            Value::Ad(ad) => Operand::Ad(ad),
        }
    }

    pub fn is_ad(&self) -> bool {
        matches!(self, Value::Ad(_))
    }

    pub fn as_ad(&self) -> Option<&AdArray> {
        match self {
            Value::Ad(ad) => Some(ad),
            _ => None,
        }
    }

    pub fn into_ad(self) -> Result<AdArray> {
        match self {
            Value::Ad(ad) => Ok(ad),
            Value::Scalar(_) => Err(Error::Type("expected an AdArray, got a scalar".into())),
            Value::Array(_) => Err(Error::Type("expected an AdArray, got a plain array".into())),
        }
    }

    /// Plain values of an array or AdArray. `None` for scalars.
    pub fn values(&self) -> Option<&DVector<f64>> {
        match self {
            Value::Scalar(_) => None,
            Value::Array(a) => Some(a),
            Value::Ad(ad) => Some(ad.val()),
        }
    }

    pub fn try_add(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Ad(a), r) => a.try_add(r).map(Value::Ad),
            (l, Value::Ad(b)) => b.try_add(l).map(Value::Ad),
            (l, r) => combine_constants(l, r, "addition", |a, b| a + b),
        }
    }

    pub fn try_sub(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Ad(a), r) => a.try_sub(r).map(Value::Ad),
            (l, Value::Ad(b)) => b.try_rsub(l).map(Value::Ad),
            (l, r) => combine_constants(l, r, "subtraction", |a, b| a - b),
        }
    }

    pub fn try_mul(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Ad(a), r) => a.try_mul(r).map(Value::Ad),
            (l, Value::Ad(b)) => b.try_mul(l).map(Value::Ad),
            (l, r) => combine_constants(l, r, "multiplication", |a, b| a * b),
        }
    }

    pub fn try_div(&self, rhs: &Value) -> Result<Value> {
        match (self, rhs) {
            (Value::Ad(a), r) => a.try_div(r).map(Value::Ad),
            (l, Value::Ad(b)) => b.try_rdiv(l).map(Value::Ad),
            (l, r) => combine_constants(l, r, "division", |a, b| a / b),
        }
    }

    /// Elementwise map of plain values; the derivative is applied to AdArrays.
    pub(crate) fn map_chain(&self, f: impl Fn(f64) -> f64, df: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(x) => Value::Scalar(f(*x)),
            Value::Array(a) => Value::Array(a.map(f)),
            Value::Ad(ad) => {
                let val = ad.val().map(&f);
                let derivative = ad.val().map(&df);
                Value::Ad(ad.chain(val, &derivative))
            }
        }
    }
}

fn combine_constants(lhs: &Value, rhs: &Value, context: &'static str, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
    match (lhs, rhs) {
        (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(*a, *b))),
        (Value::Array(a), Value::Scalar(b)) => Ok(Value::Array(a.map(|x| f(x, *b)))),
        (Value::Scalar(a), Value::Array(b)) => Ok(Value::Array(b.map(|y| f(*a, y)))),
        (Value::Array(a), Value::Array(b)) => {
            check_len(context, a.len(), b.len())?;
            Ok(Value::Array(a.zip_map(b, f)))
        }
        _ => Err(Error::Type(format!("{context} of constants received an AdArray"))),
    }
}

fn check_len(context: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(Error::shape(context, expected, found));
    }
    Ok(())
}

fn check_unknowns(context: &'static str, a: &AdArray, b: &AdArray) -> Result<()> {
    if a.num_unknowns() != b.num_unknowns() {
        return Err(Error::shape(
            context,
            format!("{} Jacobian columns", a.num_unknowns()),
            b.num_unknowns(),
        ));
    }
    Ok(())
}

impl AdArray {
    pub fn try_add<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<AdArray> {
        match rhs.into() {
            Operand::Scalar(s) => Ok(AdArray::from_parts(self.val().add_scalar(s), self.jac().clone())),
            Operand::Array(v) => {
                check_len("addition", self.len(), v.len())?;
                Ok(AdArray::from_parts(self.val() + v, self.jac().clone()))
            }
            Operand::Ad(other) => {
                check_len("addition", self.len(), other.len())?;
                let jac = sparse::add(self.jac(), other.jac(), "addition")?;
                Ok(AdArray::from_parts(self.val() + other.val(), jac))
            }
        }
    }

    pub fn try_sub<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<AdArray> {
        match rhs.into() {
            Operand::Scalar(s) => Ok(AdArray::from_parts(self.val().add_scalar(-s), self.jac().clone())),
            Operand::Array(v) => {
                check_len("subtraction", self.len(), v.len())?;
                Ok(AdArray::from_parts(self.val() - v, self.jac().clone()))
            }
            Operand::Ad(other) => {
                check_len("subtraction", self.len(), other.len())?;
                let jac = sparse::sub(self.jac(), other.jac(), "subtraction")?;
                Ok(AdArray::from_parts(self.val() - other.val(), jac))
            }
        }
    }

    /// `lhs - self`.
    pub fn try_rsub<'a>(&self, lhs: impl Into<Operand<'a>>) -> Result<AdArray> {
        Ok(-self.try_sub(lhs)?)
    }

    /// Product rule: `diag(b) * J_a + diag(a) * J_b`. Plain operands only scale `J_a`.
    pub fn try_mul<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<AdArray> {
        match rhs.into() {
            Operand::Scalar(s) => Ok(AdArray::from_parts(self.val() * s, sparse::scale(self.jac(), s))),
            Operand::Array(v) => {
                check_len("multiplication", self.len(), v.len())?;
                Ok(AdArray::from_parts(self.val().component_mul(v), self.diagvec_mul_jac(v)?))
            }
            Operand::Ad(other) => {
                check_len("multiplication", self.len(), other.len())?;
                check_unknowns("multiplication", self, other)?;
                let jac = sparse::add(
                    &self.diagvec_mul_jac(other.val())?,
                    &other.diagvec_mul_jac(self.val())?,
                    "multiplication",
                )?;
                Ok(AdArray::from_parts(self.val().component_mul(other.val()), jac))
            }
        }
    }

    /// Division as multiplication with `rhs^-1`.
    pub fn try_div<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<AdArray> {
        match rhs.into() {
            Operand::Scalar(s) => self.try_mul(s.powf(-1.0)),
            Operand::Array(v) => self.try_mul(&v.map(|x| x.powf(-1.0))),
            Operand::Ad(other) => self.try_mul(&other.pow(-1)?),
        }
    }

    /// `lhs / self`, computed as `lhs * self^-1`.
    pub fn try_rdiv<'a>(&self, lhs: impl Into<Operand<'a>>) -> Result<AdArray> {
        self.pow(-1)?.try_mul(lhs)
    }

    /// `self ^ exponent`.
    ///
    /// Non-positive bases combined with fractional or differentiable exponents
    /// yield NaN entries; they are propagated, not reported.
    pub fn pow(&self, exponent: impl Into<Exponent>) -> Result<AdArray> {
        match exponent.into() {
            Exponent::Int(e) => Ok(self.pow_uniform(e as f64)),
            Exponent::Float(e) => Ok(self.pow_uniform(e)),
            Exponent::IntArray(e) => {
                check_len("power", self.len(), e.len())?;
                let e = DVector::from_iterator(e.len(), e.iter().map(|&k| k as f64));
                Ok(self.pow_elementwise(&e))
            }
            Exponent::FloatArray(e) => {
                check_len("power", self.len(), e.len())?;
                Ok(self.pow_elementwise(&e))
            }
            Exponent::Ad(e) => self.pow_ad(&e),
        }
    }

    fn pow_uniform(&self, e: f64) -> AdArray {
        let val = self.val().map(|u| u.powf(e));
        let derivative = self.val().map(|u| e * u.powf(e - 1.0));
        self.chain(val, &derivative)
    }

    fn pow_elementwise(&self, e: &DVector<f64>) -> AdArray {
        let val = self.val().zip_map(e, |u, k| u.powf(k));
        let derivative = self.val().zip_map(e, |u, k| k * u.powf(k - 1.0));
        self.chain(val, &derivative)
    }

    /// `d(u^v) = diag(v u^(v-1)) J_u + diag(u^v ln u) J_v`. A single-valued
    /// exponent is broadcast over all entries of the base.
    fn pow_ad(&self, exponent: &AdArray) -> Result<AdArray> {
        check_unknowns("power", self, exponent)?;
        let n = self.len();
        let (v, jac_v) = if exponent.len() == n {
            (exponent.val().clone(), exponent.jac().clone())
        } else if exponent.len() == 1 {
            (
                DVector::from_element(n, exponent.val()[0]),
                sparse::repeat_row(exponent.jac(), n),
            )
        } else {
            return Err(Error::shape("power", n, exponent.len()));
        };
        let val = self.val().zip_map(&v, |u, k| u.powf(k));
        let d_base = self.val().zip_map(&v, |u, k| k * u.powf(k - 1.0));
        let d_exponent = self.val().zip_map(&val, |u, p| p * u.ln());
        let jac = sparse::add(
            &sparse::scale_rows(self.jac(), &d_base),
            &sparse::scale_rows(&jac_v, &d_exponent),
            "power",
        )?;
        Ok(AdArray::from_parts(val, jac))
    }

    /// `base ^ self`.
    pub fn rpow(&self, base: f64) -> AdArray {
        let val = self.val().map(|x| base.powf(x));
        let derivative = val.map(|p| p * base.ln());
        self.chain(val, &derivative)
    }

    pub fn lt<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Vec<bool>> {
        self.compare(rhs.into(), |a, b| a < b)
    }

    pub fn le<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Vec<bool>> {
        self.compare(rhs.into(), |a, b| a <= b)
    }

    pub fn gt<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Vec<bool>> {
        self.compare(rhs.into(), |a, b| a > b)
    }

    pub fn ge<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Vec<bool>> {
        self.compare(rhs.into(), |a, b| a >= b)
    }

    /// Elementwise equality of values. Jacobians are not compared.
    pub fn elementwise_eq<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<Vec<bool>> {
        self.compare(rhs.into(), |a, b| a == b)
    }

    fn compare(&self, rhs: Operand<'_>, f: impl Fn(f64, f64) -> bool) -> Result<Vec<bool>> {
        let other = match rhs {
            Operand::Scalar(s) => return Ok(self.val().iter().map(|&a| f(a, s)).collect()),
            Operand::Array(v) => v,
            Operand::Ad(ad) => ad.val(),
        };
        check_len("comparison", self.len(), other.len())?;
        Ok(self.val().iter().zip(other.iter()).map(|(&a, &b)| f(a, b)).collect())
    }
}

impl Neg for &AdArray {
    type Output = AdArray;

    fn neg(self) -> AdArray {
        AdArray::from_parts(-self.val(), sparse::negate(self.jac()))
    }
}

impl Neg for AdArray {
    type Output = AdArray;

    fn neg(self) -> AdArray {
        -&self
    }
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $checked:ident) => {
        impl_binop!(@rhs $trait, $method, $checked, &AdArray);
        impl_binop!(@rhs $trait, $method, $checked, &DVector<f64>);
        impl_binop!(@rhs $trait, $method, $checked, f64);

        impl $trait<AdArray> for AdArray {
            type Output = AdArray;

            fn $method(self, rhs: AdArray) -> AdArray {
                (&self).$method(&rhs)
            }
        }
    };
    (@rhs $trait:ident, $method:ident, $checked:ident, $rhs:ty) => {
        impl $trait<$rhs> for &AdArray {
            type Output = AdArray;

            /// # Panics
            /// On operand shape mismatch.
            fn $method(self, rhs: $rhs) -> AdArray {
                match self.$checked(rhs) {
                    Ok(result) => result,
                    Err(err) => panic!("{err}"),
                }
            }
        }

        impl $trait<$rhs> for AdArray {
            type Output = AdArray;

            fn $method(self, rhs: $rhs) -> AdArray {
                (&self).$method(rhs)
            }
        }
    };
}

impl_binop!(Add, add, try_add);
impl_binop!(Sub, sub, try_sub);
impl_binop!(Mul, mul, try_mul);
impl_binop!(Div, div, try_div);

macro_rules! impl_scalar_lhs {
    ($trait:ident, $method:ident, $checked:ident) => {
        impl $trait<&AdArray> for f64 {
            type Output = AdArray;

            fn $method(self, rhs: &AdArray) -> AdArray {
                match rhs.$checked(self) {
                    Ok(result) => result,
                    Err(err) => panic!("{err}"),
                }
            }
        }

        impl $trait<AdArray> for f64 {
            type Output = AdArray;

            fn $method(self, rhs: AdArray) -> AdArray {
                self.$method(&rhs)
            }
        }
    };
}

impl_scalar_lhs!(Add, add, try_add);
impl_scalar_lhs!(Sub, sub, try_rsub);
impl_scalar_lhs!(Mul, mul, try_mul);
impl_scalar_lhs!(Div, div, try_rdiv);
