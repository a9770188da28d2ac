//! Coercion rules for reading a tree node as a Rust primitive.
//!
//! The tree keeps one canonical integer (`i64`) and one canonical real
//! (`f64`). Reading a primitive of some other width tries, in order:
//!
//! 1. an exact tag match
//! 2. narrowing or widening from the canonical integer or real
//! 3. for unsigned targets, a non-negative source
//!
//! and fails with a type mismatch otherwise. A null node is always reported
//! as "value not found" so callers can tell it apart from a shape error.

use crate::config::NonFiniteFloatStrategy;
use crate::error::{Error, Result};
use crate::path::CodingPath;
use crate::values::Value;

/// Read an integer of any width.
///
/// Reals are accepted when they are finite and integral, which is how
/// integer columns sometimes come back from a row store.
pub fn integer<T>(value: &Value, expected: &'static str, path: &CodingPath) -> Result<T>
where
    T: TryFrom<i64>,
{
    let wide = match value {
        Value::Integer(i) => *i,
        Value::Real(f) if is_integral(*f) => *f as i64,
        Value::Null => return Err(Error::value_not_found(expected, path)),
        other => return Err(Error::type_mismatch(expected, other.kind(), path)),
    };
    T::try_from(wide).map_err(|_| Error::type_mismatch(expected, format!("integer {wide}"), path))
}

fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

/// Read a boolean. Integer columns holding 0 or 1 are accepted.
pub fn boolean(value: &Value, path: &CodingPath) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Integer(0) => Ok(false),
        Value::Integer(1) => Ok(true),
        Value::Null => Err(Error::value_not_found("bool", path)),
        Value::Integer(i) => Err(Error::type_mismatch("bool", format!("integer {i}"), path)),
        other => Err(Error::type_mismatch("bool", other.kind(), path)),
    }
}

/// Read a 64-bit float, widening integers.
pub fn double(value: &Value, non_finite: &NonFiniteFloatStrategy, path: &CodingPath) -> Result<f64> {
    match value {
        Value::Real(f) => Ok(*f),
        Value::Integer(i) => Ok(*i as f64),
        Value::Text(s) => non_finite
            .parse_placeholder(s)
            .ok_or_else(|| Error::type_mismatch("f64", "text", path)),
        Value::Null => Err(Error::value_not_found("f64", path)),
        other => Err(Error::type_mismatch("f64", other.kind(), path)),
    }
}

/// Read a 32-bit float. Finite values outside the `f32` range are rejected
/// rather than rounded to infinity.
pub fn float(value: &Value, non_finite: &NonFiniteFloatStrategy, path: &CodingPath) -> Result<f32> {
    let wide = double(value, non_finite, path).map_err(|e| match e {
        Error::ValueNotFound { path, .. } => Error::ValueNotFound {
            expected: "f32".to_string(),
            path,
        },
        Error::TypeMismatch { found, path, .. } => Error::TypeMismatch {
            expected: "f32".to_string(),
            found,
            path,
        },
        other => other,
    })?;
    if wide.is_finite() && wide.abs() > f32::MAX as f64 {
        return Err(Error::type_mismatch("f32", format!("real {wide}"), path));
    }
    Ok(wide as f32)
}

/// Read text.
pub fn text<'a>(value: &'a Value, path: &CodingPath) -> Result<&'a str> {
    match value {
        Value::Text(s) => Ok(s),
        Value::Null => Err(Error::value_not_found("text", path)),
        other => Err(Error::type_mismatch("text", other.kind(), path)),
    }
}

/// Read a single character from one-character text.
pub fn character(value: &Value, path: &CodingPath) -> Result<char> {
    let s = match value {
        Value::Text(s) => s,
        Value::Null => return Err(Error::value_not_found("char", path)),
        other => return Err(Error::type_mismatch("char", other.kind(), path)),
    };
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::type_mismatch("char", format!("text of length {}", s.chars().count()), path)),
    }
}
