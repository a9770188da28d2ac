//! Strategy configuration for the decode and encode engines.
//!
//! A configuration is assembled once with the `with_*` builders (or loaded
//! from YAML through [`CodingConfig`]) and then only read while a call runs.
//! Strategies that take a closure cannot be written to YAML and are skipped
//! by serde.

use crate::error::Result;
use crate::path::CodingPath;
use crate::values::Value;
use chrono::{DateTime, Utc};
use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Error reading config file
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Error parsing YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

// ============================================================================
// User context
// ============================================================================

/// Opaque caller-supplied context, handed to custom closures.
#[derive(Clone, Default)]
pub struct UserInfo {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl UserInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Arc::new(value));
    }

    /// Typed lookup; `None` if the key is absent or holds another type.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.entries.keys().collect();
        keys.sort();
        f.debug_struct("UserInfo").field("keys", &keys).finish()
    }
}

/// What a custom closure gets to see about the call it is part of.
#[derive(Debug, Clone, Copy)]
pub struct CodingContext<'a> {
    pub path: &'a CodingPath,
    pub user_info: &'a UserInfo,
}

// ============================================================================
// Closure wrappers
// ============================================================================

type DateEncodeFn = dyn Fn(&DateTime<Utc>, &CodingContext<'_>) -> Result<Value> + Send + Sync;
type DateDecodeFn = dyn Fn(&Value, &CodingContext<'_>) -> Result<DateTime<Utc>> + Send + Sync;
type KeyEncodeFn = dyn Fn(&CodingPath) -> String + Send + Sync;

/// Caller-supplied conversion of an instant into a tree node.
#[derive(Clone)]
pub struct CustomDateEncoder(Arc<DateEncodeFn>);

impl CustomDateEncoder {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&DateTime<Utc>, &CodingContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, date: &DateTime<Utc>, ctx: &CodingContext<'_>) -> Result<Value> {
        (self.0)(date, ctx)
    }
}

impl fmt::Debug for CustomDateEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomDateEncoder(..)")
    }
}

/// Caller-supplied conversion of a tree node into an instant.
#[derive(Clone)]
pub struct CustomDateDecoder(Arc<DateDecodeFn>);

impl CustomDateDecoder {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &CodingContext<'_>) -> Result<DateTime<Utc>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &Value, ctx: &CodingContext<'_>) -> Result<DateTime<Utc>> {
        (self.0)(value, ctx)
    }
}

impl fmt::Debug for CustomDateDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomDateDecoder(..)")
    }
}

/// Caller-supplied key rewrite. Receives the full path, ending in the key
/// being written.
#[derive(Clone)]
pub struct CustomKeyEncoder(Arc<KeyEncodeFn>);

impl CustomKeyEncoder {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&CodingPath) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, path: &CodingPath) -> String {
        (self.0)(path)
    }
}

impl fmt::Debug for CustomKeyEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomKeyEncoder(..)")
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// How an instant is read from the tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateDecodingStrategy {
    /// Let the instant's own `Deserialize` read it (RFC 3339 text).
    #[default]
    Deferred,
    /// Seconds since the Unix epoch, real or integer.
    #[serde(rename = "seconds_since_1970")]
    SecondsSince1970,
    /// Milliseconds since the Unix epoch, real or integer.
    #[serde(rename = "milliseconds_since_1970")]
    MillisecondsSince1970,
    /// ISO 8601 / RFC 3339 text with any offset.
    Iso8601,
    /// Text in a chrono `strftime` pattern.
    Formatted(String),
    #[serde(skip)]
    Custom(CustomDateDecoder),
}

/// How an instant is written to the tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateEncodingStrategy {
    /// Let the instant's own `Serialize` write it (RFC 3339 text).
    #[default]
    Deferred,
    /// Seconds since the Unix epoch as a real.
    #[serde(rename = "seconds_since_1970")]
    SecondsSince1970,
    /// Milliseconds since the Unix epoch as a real.
    #[serde(rename = "milliseconds_since_1970")]
    MillisecondsSince1970,
    /// RFC 3339 text in UTC with a `Z` suffix.
    Iso8601,
    /// Text in a chrono `strftime` pattern.
    Formatted(String),
    #[serde(skip)]
    Custom(CustomDateEncoder),
}

/// How bytes are read from the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDecodingStrategy {
    /// A blob node.
    #[default]
    Raw,
    /// A sequence of byte integers.
    Deferred,
    /// Standard base64 text.
    Base64,
    /// Blob nodes standing in for a map or sequence are parsed as a
    /// serialized tree and decoded against the target.
    NestedTree,
}

/// How bytes are written to the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataEncodingStrategy {
    /// A blob node.
    #[default]
    Raw,
    /// A sequence of byte integers.
    Deferred,
    /// Standard base64 text.
    Base64,
    /// Nested records and sequences held by a field are serialized and
    /// stored as one blob node.
    NestedTree,
}

/// What to do with infinities and NaN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFiniteFloatStrategy {
    #[default]
    Fail,
    ConvertToText {
        positive_infinity: String,
        negative_infinity: String,
        nan: String,
    },
}

impl NonFiniteFloatStrategy {
    pub fn convert_to_text(
        positive_infinity: impl Into<String>,
        negative_infinity: impl Into<String>,
        nan: impl Into<String>,
    ) -> Self {
        NonFiniteFloatStrategy::ConvertToText {
            positive_infinity: positive_infinity.into(),
            negative_infinity: negative_infinity.into(),
            nan: nan.into(),
        }
    }

    /// Placeholder text for a non-finite value, if this strategy has one.
    pub fn placeholder(&self, f: f64) -> Option<&str> {
        match self {
            NonFiniteFloatStrategy::Fail => None,
            NonFiniteFloatStrategy::ConvertToText {
                positive_infinity,
                negative_infinity,
                nan,
            } => {
                if f.is_nan() {
                    Some(nan)
                } else if f == f64::INFINITY {
                    Some(positive_infinity)
                } else if f == f64::NEG_INFINITY {
                    Some(negative_infinity)
                } else {
                    None
                }
            }
        }
    }

    /// Reverse of [`placeholder`](Self::placeholder).
    pub fn parse_placeholder(&self, s: &str) -> Option<f64> {
        match self {
            NonFiniteFloatStrategy::Fail => None,
            NonFiniteFloatStrategy::ConvertToText {
                positive_infinity,
                negative_infinity,
                nan,
            } => {
                if s == positive_infinity {
                    Some(f64::INFINITY)
                } else if s == negative_infinity {
                    Some(f64::NEG_INFINITY)
                } else if s == nan {
                    Some(f64::NAN)
                } else {
                    None
                }
            }
        }
    }
}

/// What to do when a record field has no key in the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyStrategy {
    /// Raise key-not-found.
    #[default]
    Fail,
    /// Substitute the canonical default for the field's type.
    UseDefault,
}

/// How record field names are rewritten on encode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEncodingStrategy {
    #[default]
    UseDefaultKeys,
    /// `userName` and `UserName` both become `user_name`.
    ConvertToSnakeCase,
    #[serde(skip)]
    Custom(CustomKeyEncoder),
}

impl KeyEncodingStrategy {
    /// Rewrite `key`, which sits at the end of `path`.
    pub fn apply(&self, key: &str, path: &CodingPath) -> String {
        match self {
            KeyEncodingStrategy::UseDefaultKeys => key.to_string(),
            KeyEncodingStrategy::ConvertToSnakeCase => key.to_snake_case(),
            KeyEncodingStrategy::Custom(f) => f.call(path),
        }
    }
}

// ============================================================================
// Engine configurations
// ============================================================================

/// Options for the decode engine.
#[derive(Debug, Clone, Default)]
pub struct DecoderConfig {
    pub date: DateDecodingStrategy,
    pub data: DataDecodingStrategy,
    pub non_finite_floats: NonFiniteFloatStrategy,
    pub missing_keys: MissingKeyStrategy,
    /// Default trees for nested record types, keyed by the record's type
    /// name. Only consulted under [`MissingKeyStrategy::UseDefault`].
    pub defaults: HashMap<String, Value>,
    pub user_info: UserInfo,
}

impl DecoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_strategy(mut self, strategy: DateDecodingStrategy) -> Self {
        self.date = strategy;
        self
    }

    pub fn with_data_strategy(mut self, strategy: DataDecodingStrategy) -> Self {
        self.data = strategy;
        self
    }

    pub fn with_non_finite_floats(mut self, strategy: NonFiniteFloatStrategy) -> Self {
        self.non_finite_floats = strategy;
        self
    }

    pub fn with_missing_keys(mut self, strategy: MissingKeyStrategy) -> Self {
        self.missing_keys = strategy;
        self
    }

    /// Register the tree substituted when a field of record type
    /// `type_name` is absent.
    pub fn with_default(mut self, type_name: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(type_name.into(), value);
        self
    }

    pub fn with_user_info<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.user_info.insert(key, value);
        self
    }

    pub fn context<'a>(&'a self, path: &'a CodingPath) -> CodingContext<'a> {
        CodingContext {
            path,
            user_info: &self.user_info,
        }
    }
}

/// Options for the encode engine.
#[derive(Debug, Clone, Default)]
pub struct EncoderConfig {
    pub date: DateEncodingStrategy,
    pub data: DataEncodingStrategy,
    pub non_finite_floats: NonFiniteFloatStrategy,
    pub keys: KeyEncodingStrategy,
    pub user_info: UserInfo,
}

impl EncoderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_strategy(mut self, strategy: DateEncodingStrategy) -> Self {
        self.date = strategy;
        self
    }

    pub fn with_data_strategy(mut self, strategy: DataEncodingStrategy) -> Self {
        self.data = strategy;
        self
    }

    pub fn with_non_finite_floats(mut self, strategy: NonFiniteFloatStrategy) -> Self {
        self.non_finite_floats = strategy;
        self
    }

    pub fn with_key_strategy(mut self, strategy: KeyEncodingStrategy) -> Self {
        self.keys = strategy;
        self
    }

    pub fn with_user_info<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.user_info.insert(key, value);
        self
    }

    pub fn context<'a>(&'a self, path: &'a CodingPath) -> CodingContext<'a> {
        CodingContext {
            path,
            user_info: &self.user_info,
        }
    }
}

// ============================================================================
// File-based configuration
// ============================================================================

/// The serializable part of both engine configurations.
///
/// ```yaml
/// date_encoding: seconds_since_1970
/// date_decoding: seconds_since_1970
/// data_encoding: nested_tree
/// data_decoding: nested_tree
/// missing_keys: use_default
/// keys: convert_to_snake_case
/// defaults:
///   Address:
///     street: ""
///     zip: 0
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodingConfig {
    pub date_decoding: DateDecodingStrategy,
    pub date_encoding: DateEncodingStrategy,
    pub data_decoding: DataDecodingStrategy,
    pub data_encoding: DataEncodingStrategy,
    pub non_finite_floats: NonFiniteFloatStrategy,
    pub missing_keys: MissingKeyStrategy,
    pub keys: KeyEncodingStrategy,
    pub defaults: HashMap<String, Value>,
}

impl CodingConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            date: self.date_decoding.clone(),
            data: self.data_decoding,
            non_finite_floats: self.non_finite_floats.clone(),
            missing_keys: self.missing_keys,
            defaults: self.defaults.clone(),
            user_info: UserInfo::default(),
        }
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            date: self.date_encoding.clone(),
            data: self.data_encoding,
            non_finite_floats: self.non_finite_floats.clone(),
            keys: self.keys.clone(),
            user_info: UserInfo::default(),
        }
    }
}
