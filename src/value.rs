use std::cmp::Ordering;

use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Value attached to a bucket or used as a feature default.
///
/// Bucket values are opaque to evaluation, so any JSON value is accepted. `serde_json` keeps
/// integers and floats apart, which is what the document format requires.
pub type FeatureValue = serde_json::Value;

/// A scalar produced by an [`Attribute`](crate::Attribute) or written as a comparison operand.
///
/// Untagged: integers and floats are distinguished by their JSON spelling (`1` vs `1.0`), so they
/// survive a round-trip unchanged. Integers above `i64::MAX` are kept as [`Scalar::UInt`].
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum Scalar {
    /// A boolean value.
    Boolean(bool),
    /// An integer value.
    Integer(i64),
    /// An integer too large for `i64`.
    #[from(ignore)]
    UInt(u64),
    /// A floating-point value.
    Float(f64),
    /// A string value.
    String(String),
}

/// Numeric subset of [`Scalar`], used by [`Attribute::StaticNumber`](crate::Attribute).
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone, Copy)]
#[serde(untagged)]
pub enum Number {
    /// An integer value.
    Integer(i64),
    /// An integer too large for `i64`.
    #[from(ignore)]
    UInt(u64),
    /// A floating-point value.
    Float(f64),
}

/// Kind of a [`Scalar`], reported in type mismatch errors.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum ScalarKind {
    Boolean,
    Integer,
    Float,
    String,
}

impl Scalar {
    /// Return the kind of this scalar.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Boolean(_) => ScalarKind::Boolean,
            Scalar::Integer(_) | Scalar::UInt(_) => ScalarKind::Integer,
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::String(_) => ScalarKind::String,
        }
    }

    /// Return the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_numeric(&self) -> Option<Numeric> {
        match self {
            Scalar::Integer(i) => Some(Numeric::Int((*i).into())),
            Scalar::UInt(u) => Some(Numeric::Int((*u).into())),
            Scalar::Float(f) => Some(Numeric::Float(*f)),
            _ => None,
        }
    }

    /// Order `self` relative to `other`.
    ///
    /// Numbers compare with numbers (integer and float mix freely, and the comparison is exact
    /// for integers beyond 2^53), strings with strings. Any other pairing is a
    /// [`Error::TypeMismatch`]. `Ok(None)` is returned for unordered floats (NaN).
    pub(crate) fn compare(&self, other: &Scalar, operation: &'static str) -> Result<Option<Ordering>> {
        if let (Scalar::String(a), Scalar::String(b)) = (self, other) {
            return Ok(Some(a.cmp(b)));
        }
        match (self.as_numeric(), other.as_numeric()) {
            (Some(a), Some(b)) => Ok(a.compare(b)),
            _ => Err(self.mismatch(other, operation)),
        }
    }

    /// Equality under the same pairing rules as [`Scalar::compare`], with booleans comparable to
    /// booleans.
    pub(crate) fn equals(&self, other: &Scalar, operation: &'static str) -> Result<bool> {
        match (self, other) {
            (Scalar::Boolean(a), Scalar::Boolean(b)) => Ok(a == b),
            _ => Ok(self.compare(other, operation)? == Some(Ordering::Equal)),
        }
    }

    fn mismatch(&self, other: &Scalar, operation: &'static str) -> Error {
        Error::TypeMismatch {
            operation,
            left: self.kind(),
            right: other.kind(),
        }
    }
}

/// Integers widened to `i128` so every `i64` and `u64` fits.
#[derive(Clone, Copy)]
enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    fn compare(self, other: Numeric) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => Some(a.cmp(&b)),
            (Numeric::Float(a), Numeric::Float(b)) => a.partial_cmp(&b),
            (Numeric::Int(a), Numeric::Float(b)) => compare_int_float(a, b),
            (Numeric::Float(a), Numeric::Int(b)) => compare_int_float(b, a).map(Ordering::reverse),
        }
    }
}

/// Exact ordering of an integer in the `i64`/`u64` range against a float.
fn compare_int_float(int: i128, float: f64) -> Option<Ordering> {
    const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;
    const MIN_I64: f64 = -9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return None;
    }
    let whole = float.trunc();
    if whole >= TWO_POW_64 {
        return Some(Ordering::Less);
    }
    if whole < MIN_I64 {
        return Some(Ordering::Greater);
    }
    // `whole` is integral and within range, so the cast is exact.
    let fraction = float - whole;
    Some(
        int.cmp(&(whole as i128))
            .then_with(|| 0.0_f64.partial_cmp(&fraction).unwrap_or(Ordering::Equal)),
    )
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => Self::Integer(i),
            Err(_) => Self::UInt(value),
        }
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        match i64::try_from(value) {
            Ok(i) => Self::Integer(i),
            Err(_) => Self::UInt(value),
        }
    }
}

impl From<Number> for Scalar {
    fn from(value: Number) -> Self {
        match value {
            Number::Integer(i) => Scalar::Integer(i),
            Number::UInt(u) => Scalar::UInt(u),
            Number::Float(f) => Scalar::Float(f),
        }
    }
}
