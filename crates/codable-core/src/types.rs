//! Storage classes of a column-oriented store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The coarse column type a field needs in a row store.
///
/// Every declared primitive kind falls into exactly one class: all integer
/// widths and booleans are `Integer`, floating point is `Real`, strings are
/// `Text`, and bytes, timestamps and serialized child records are `Blob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    Integer,
    Real,
    Text,
    Blob,
    Null,
}

impl StorageClass {
    /// Lowercase name, as used in serialized schemas.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Integer => "integer",
            StorageClass::Real => "real",
            StorageClass::Text => "text",
            StorageClass::Blob => "blob",
            StorageClass::Null => "null",
        }
    }

    /// Column type name for a create-table statement.
    pub fn sql_type(&self) -> &'static str {
        match self {
            StorageClass::Integer => "INTEGER",
            StorageClass::Real => "REAL",
            StorageClass::Text => "TEXT",
            StorageClass::Blob => "BLOB",
            StorageClass::Null => "NULL",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
