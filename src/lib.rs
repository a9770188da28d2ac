//! dict-codable
//!
//! Converts typed Rust values to and from a dynamic [`Value`] tree of maps,
//! sequences and scalars, the shape rows take in a key-value or column store.
//!
//! # Features
//!
//! - Encoding: any `Serialize` type becomes a [`Value`] tree
//! - Decoding: any `DeserializeOwned` type is rebuilt from a tree, with
//!   lenient numeric coercion and errors that name the failing path
//! - Strategies: dates, binary data, non-finite floats, missing keys and key
//!   casing are chosen per call through [`DecoderConfig`] / [`EncoderConfig`],
//!   or loaded from YAML with [`CodingConfig`]
//! - Introspection: [`column_types`] reports the [`StorageClass`] of every
//!   field of a record type without needing any data
//!
//! # Crates
//!
//! - `codable_core` - tree, path, error, coercion and configuration types
//! - `codable_tree` - the encode, decode and introspection engines
//!
//! # Usage
//!
//! ```
//! use dict_codable::{column_types, from_value, to_value, StorageClass, Value};
//!
//! #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
//! struct User { id: i64, name: String, active: bool }
//!
//! let user = User { id: 1, name: "ada".into(), active: true };
//! let tree = to_value(&user).unwrap();
//! assert_eq!(tree.get("name"), Some(&Value::from("ada")));
//!
//! let back: User = from_value(&tree).unwrap();
//! assert_eq!(back, user);
//!
//! let columns = column_types::<User>().unwrap();
//! assert_eq!(columns["active"], StorageClass::Integer);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

pub use codable_core::{
    coerce, CodingConfig, CodingContext, CodingPath, ConfigError, CustomDateDecoder,
    CustomDateEncoder, CustomKeyEncoder, DataDecodingStrategy, DataEncodingStrategy,
    DateDecodingStrategy, DateEncodingStrategy, DecoderConfig, EncoderConfig, Error,
    KeyEncodingStrategy, MissingKeyStrategy, NonFiniteFloatStrategy, PathSegment, Result,
    StorageClass, UserInfo, Value, ValueKind,
};
pub use codable_tree::{
    blob, timestamp, Blob, SchemaIntrospector, Timestamp, TreeDecoder, TreeEncoder,
};

/// Encode `value` into a tree with default strategies.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    TreeEncoder::new().encode(value)
}

/// Encode `value` into a tree with the given strategies.
pub fn to_value_with<T: Serialize + ?Sized>(value: &T, config: EncoderConfig) -> Result<Value> {
    TreeEncoder::with_config(config).encode(value)
}

/// Decode a `T` from `value` with default strategies.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    TreeDecoder::new().decode(value)
}

/// Decode a `T` from `value` with the given strategies.
pub fn from_value_with<T: DeserializeOwned>(value: &Value, config: DecoderConfig) -> Result<T> {
    TreeDecoder::with_config(config).decode(value)
}

/// Storage class of each field of record type `T`.
///
/// Fields that need a specific placeholder go through [`SchemaIntrospector`]
/// directly.
pub fn column_types<T: DeserializeOwned>() -> Result<HashMap<String, StorageClass>> {
    SchemaIntrospector::new().column_types::<T>()
}

/// Encoder and decoder built from one loaded [`CodingConfig`].
///
/// ```
/// use dict_codable::{Codec, CodingConfig};
///
/// let config = CodingConfig::from_yaml("keys: convert_to_snake_case\n").unwrap();
/// let codec = Codec::from_config(&config);
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct Row { #[serde(rename = "rowId")] row_id: i64 }
///
/// let tree = codec.encode(&Row { row_id: 4 }).unwrap();
/// assert!(tree.get("row_id").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Codec {
    encoder: TreeEncoder,
    decoder: TreeDecoder,
}

impl Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CodingConfig) -> Self {
        debug!("building codec from coding config");
        Self {
            encoder: TreeEncoder::with_config(config.encoder_config()),
            decoder: TreeDecoder::with_config(config.decoder_config()),
        }
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Value> {
        self.encoder.encode(value)
    }

    pub fn decode<T: DeserializeOwned>(&self, value: &Value) -> Result<T> {
        self.decoder.decode(value)
    }

    pub fn encoder(&self) -> &TreeEncoder {
        &self.encoder
    }

    pub fn decoder(&self) -> &TreeDecoder {
        &self.decoder
    }
}
