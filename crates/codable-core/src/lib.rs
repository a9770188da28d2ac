//! Core types for dict-codable.
//!
//! This crate holds everything the conversion engines share:
//!
//! - [`Value`]: the dynamic tree of maps, sequences and scalars that typed
//!   records are converted to and from
//! - [`coerce`]: the numeric and boolean coercion ladder used when a tree node
//!   is read back as a narrower Rust primitive
//! - [`StorageClass`]: the coarse column-store type of a field
//! - [`CodingPath`]: the location of a node inside a tree, carried by every error
//! - [`Error`]: the error taxonomy shared by decoding, encoding and introspection
//! - [`DecoderConfig`] / [`EncoderConfig`]: caller-selected strategies
//!
//! # Example
//!
//! ```
//! use codable_core::{Value, StorageClass};
//!
//! let row = Value::map([("id", Value::from(7)), ("name", Value::from("ada"))]);
//! assert_eq!(row.get("id").and_then(Value::as_i64), Some(7));
//! assert_eq!(row.get("name").map(Value::storage_class), Some(StorageClass::Text));
//! ```

pub mod coerce;
pub mod config;
pub mod error;
pub mod path;
pub mod types;
pub mod values;

pub use config::{
    CodingConfig, CodingContext, ConfigError, CustomDateDecoder, CustomDateEncoder,
    CustomKeyEncoder, DataDecodingStrategy, DataEncodingStrategy, DateDecodingStrategy,
    DateEncodingStrategy, DecoderConfig, EncoderConfig, KeyEncodingStrategy, MissingKeyStrategy,
    NonFiniteFloatStrategy, UserInfo,
};
pub use error::{Error, Result};
pub use path::{CodingPath, PathSegment};
pub use types::StorageClass;
pub use values::{Value, ValueKind};
