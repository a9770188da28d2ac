//! Errors raised while decoding, encoding or introspecting.

use crate::path::CodingPath;
use serde::{de, ser};
use std::fmt::Display;

/// Every failure carries the path of the node being processed when it
/// happened.
///
/// Errors raised from inside a derived `Serialize`/`Deserialize`
/// implementation (a missing field, an unexpected type) start with an empty
/// path; the engine that called into that implementation fills it in on the
/// way out, see [`Error::or_path`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The key is present but holds null, and the target is not optional.
    #[error("value not found at {path}: expected {expected} but found null")]
    ValueNotFound { expected: String, path: CodingPath },

    /// The key is absent and no default may be substituted.
    #[error("key not found at {path}: no value associated with key '{key}'")]
    KeyNotFound { key: String, path: CodingPath },

    /// The node has a different shape than the target expects.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: String,
        path: CodingPath,
    },

    /// The node has the right shape but its content is unusable.
    #[error("data corrupted at {path}: {message}")]
    DataCorrupted { message: String, path: CodingPath },

    /// The encoder cannot represent a value.
    #[error("invalid value at {path}: {message}")]
    InvalidValue { message: String, path: CodingPath },

    /// The introspector was asked to walk a shape it does not support.
    #[error("unsupported structure at {path}: {message}")]
    Fatal { message: String, path: CodingPath },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn value_not_found(expected: impl Display, path: &CodingPath) -> Self {
        Error::ValueNotFound {
            expected: expected.to_string(),
            path: path.clone(),
        }
    }

    pub fn key_not_found(key: impl Into<String>, path: &CodingPath) -> Self {
        Error::KeyNotFound {
            key: key.into(),
            path: path.clone(),
        }
    }

    pub fn type_mismatch(expected: impl Display, found: impl Display, path: &CodingPath) -> Self {
        Error::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
            path: path.clone(),
        }
    }

    pub fn data_corrupted(message: impl Into<String>, path: &CodingPath) -> Self {
        Error::DataCorrupted {
            message: message.into(),
            path: path.clone(),
        }
    }

    pub fn invalid_value(message: impl Into<String>, path: &CodingPath) -> Self {
        Error::InvalidValue {
            message: message.into(),
            path: path.clone(),
        }
    }

    pub fn fatal(message: impl Into<String>, path: &CodingPath) -> Self {
        Error::Fatal {
            message: message.into(),
            path: path.clone(),
        }
    }

    pub fn path(&self) -> &CodingPath {
        match self {
            Error::ValueNotFound { path, .. }
            | Error::KeyNotFound { path, .. }
            | Error::TypeMismatch { path, .. }
            | Error::DataCorrupted { path, .. }
            | Error::InvalidValue { path, .. }
            | Error::Fatal { path, .. } => path,
        }
    }

    fn path_mut(&mut self) -> &mut CodingPath {
        match self {
            Error::ValueNotFound { path, .. }
            | Error::KeyNotFound { path, .. }
            | Error::TypeMismatch { path, .. }
            | Error::DataCorrupted { path, .. }
            | Error::InvalidValue { path, .. }
            | Error::Fatal { path, .. } => path,
        }
    }

    /// Attach `path` if the error does not know where it happened yet.
    pub fn or_path(mut self, path: &CodingPath) -> Self {
        let slot = self.path_mut();
        if slot.is_empty() {
            *slot = path.clone();
        }
        self
    }
}

impl de::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::data_corrupted(msg.to_string(), &CodingPath::new())
    }

    fn invalid_type(unexp: de::Unexpected, exp: &dyn de::Expected) -> Self {
        Error::type_mismatch(exp, unexp, &CodingPath::new())
    }

    fn invalid_value(unexp: de::Unexpected, exp: &dyn de::Expected) -> Self {
        Error::data_corrupted(
            format!("invalid value {unexp}, expected {exp}"),
            &CodingPath::new(),
        )
    }

    fn invalid_length(len: usize, exp: &dyn de::Expected) -> Self {
        Error::value_not_found(
            format!("{exp} (container is at end after {len} elements)"),
            &CodingPath::new(),
        )
    }

    fn unknown_variant(variant: &str, expected: &'static [&'static str]) -> Self {
        Error::data_corrupted(
            format!("unknown variant '{variant}', expected one of {expected:?}"),
            &CodingPath::new(),
        )
    }

    fn unknown_field(field: &str, expected: &'static [&'static str]) -> Self {
        Error::data_corrupted(
            format!("unknown field '{field}', expected one of {expected:?}"),
            &CodingPath::new(),
        )
    }

    fn missing_field(field: &'static str) -> Self {
        Error::key_not_found(field, &CodingPath::new())
    }

    fn duplicate_field(field: &'static str) -> Self {
        Error::data_corrupted(format!("duplicate field '{field}'"), &CodingPath::new())
    }
}

impl ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Error::invalid_value(msg.to_string(), &CodingPath::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::Error as _;

    #[test]
    fn test_display_includes_path() {
        let path = CodingPath::new().child_key("user").child_index(1);
        let err = Error::type_mismatch("integer", "text", &path);
        assert_eq!(
            err.to_string(),
            "type mismatch at user[1]: expected integer, found text"
        );
    }

    #[test]
    fn test_or_path_only_fills_empty() {
        let outer = CodingPath::new().child_key("outer");
        let inner = CodingPath::new().child_key("inner");

        let unplaced = Error::missing_field("count").or_path(&outer);
        assert_eq!(unplaced.path(), &outer);

        let placed = Error::key_not_found("count", &inner).or_path(&outer);
        assert_eq!(placed.path(), &inner);
    }

    #[test]
    fn test_serde_hooks_classify() {
        assert!(matches!(
            Error::missing_field("name"),
            Error::KeyNotFound { ref key, .. } if key == "name"
        ));
        assert!(matches!(
            Error::invalid_type(de::Unexpected::Str("x"), &"an integer"),
            Error::TypeMismatch { .. }
        ));
        assert!(matches!(
            Error::invalid_length(1, &"a tuple of size 2"),
            Error::ValueNotFound { .. }
        ));
        assert!(matches!(
            <Error as ser::Error>::custom("boom"),
            Error::InvalidValue { .. }
        ));
    }
}
