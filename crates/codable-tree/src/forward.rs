//! Forward conversion: typed value → value tree.
//!
//! [`TreeEncoder`] drives a type's `Serialize` implementation with a
//! serializer that builds a [`Value`] bottom-up. Every nested record, map or
//! sequence is collected by its own accumulator and turned into a finished
//! node when its `end` is called, so no shared stack is needed.

use crate::markers::TIMESTAMP_TOKEN;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use codable_core::{
    CodingPath, DataEncodingStrategy, DateEncodingStrategy, EncoderConfig, Error, Result, Value,
};
use serde::ser::{self, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, trace};

/// Encodes typed values into value trees.
///
/// ```
/// use codable_tree::TreeEncoder;
/// use codable_core::Value;
///
/// #[derive(serde::Serialize)]
/// struct Point { x: i32, y: i32 }
///
/// let tree = TreeEncoder::new().encode(&Point { x: 1, y: 2 }).unwrap();
/// assert_eq!(tree.get("x"), Some(&Value::Integer(1)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TreeEncoder {
    config: EncoderConfig,
}

impl TreeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Encode `value` into a tree.
    ///
    /// Fails with [`Error::InvalidValue`] if the value produced nothing at
    /// all (a top-level `None` or unit).
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Value> {
        debug!(target_type = std::any::type_name::<T>(), "encoding value tree");
        let root = CodingPath::new();
        let tree = value.serialize(Encoder::new(&self.config, root.clone()))?;
        if tree.is_null() {
            return Err(Error::invalid_value(
                format!(
                    "Top-level {} did not encode any values.",
                    std::any::type_name::<T>()
                ),
                &root,
            ));
        }
        Ok(tree)
    }
}

/// Serializer for one node. Consumed when the node is written, so a second
/// container can never be opened on the same encoder.
pub struct Encoder<'a> {
    config: &'a EncoderConfig,
    path: CodingPath,
}

impl<'a> Encoder<'a> {
    pub fn new(config: &'a EncoderConfig, path: CodingPath) -> Self {
        Self { config, path }
    }

    fn child(&self, path: CodingPath) -> Encoder<'a> {
        Encoder {
            config: self.config,
            path,
        }
    }

    fn encode_float(&self, f: f64) -> Result<Value> {
        if f.is_finite() {
            return Ok(Value::Real(f));
        }
        match self.config.non_finite_floats.placeholder(f) {
            Some(text) => Ok(Value::Text(text.to_string())),
            None => Err(Error::invalid_value(
                format!(
                    "Unable to encode {f} directly. Use a non-finite float strategy to encode it as text."
                ),
                &self.path,
            )),
        }
    }

    fn encode_integer<T>(&self, i: T) -> Result<Value>
    where
        T: TryInto<i64> + std::fmt::Display + Copy,
    {
        i.try_into().map(Value::Integer).map_err(|_| {
            Error::invalid_value(
                format!("{i} does not fit in a 64-bit signed integer node"),
                &self.path,
            )
        })
    }

    fn encode_bytes(&self, bytes: &[u8]) -> Value {
        trace!(path = %self.path, strategy = ?self.config.data, "encoding bytes");
        match self.config.data {
            DataEncodingStrategy::Raw | DataEncodingStrategy::NestedTree => Value::Blob(bytes.to_vec()),
            DataEncodingStrategy::Deferred => {
                Value::Sequence(bytes.iter().map(|b| Value::Integer(*b as i64)).collect())
            }
            DataEncodingStrategy::Base64 => {
                Value::Text(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }
    }

    fn encode_date<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        // The instant writes itself as RFC 3339 text first.
        let own = value.serialize(self.child(self.path.clone()))?;
        if matches!(self.config.date, DateEncodingStrategy::Deferred) {
            return Ok(own);
        }
        let date = match &own {
            Value::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| Error::invalid_value(format!("unreadable timestamp '{s}': {e}"), &self.path))?,
            other => {
                return Err(Error::invalid_value(
                    format!("timestamp wrote a {} node instead of text", other.kind()),
                    &self.path,
                ))
            }
        };
        trace!(path = %self.path, strategy = ?self.config.date, "encoding timestamp");
        match &self.config.date {
            DateEncodingStrategy::Deferred => Ok(own),
            DateEncodingStrategy::SecondsSince1970 => Ok(Value::Real(
                date.timestamp() as f64 + date.timestamp_subsec_nanos() as f64 / 1e9,
            )),
            DateEncodingStrategy::MillisecondsSince1970 => Ok(Value::Real(
                date.timestamp_millis() as f64
                    + (date.timestamp_subsec_nanos() % 1_000_000) as f64 / 1e6,
            )),
            DateEncodingStrategy::Iso8601 => {
                Ok(Value::Text(date.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            }
            DateEncodingStrategy::Formatted(pattern) => {
                let mut out = String::new();
                write!(out, "{}", date.format(pattern)).map_err(|_| {
                    Error::invalid_value(format!("invalid date format '{pattern}'"), &self.path)
                })?;
                Ok(Value::Text(out))
            }
            DateEncodingStrategy::Custom(f) => f.call(&date, &self.config.context(&self.path)),
        }
    }

    /// A record field holding a nested record or sequence is stored as one
    /// serialized blob under the nested-tree strategy.
    fn pack_field(&self, value: Value, path: &CodingPath) -> Result<Value> {
        if self.config.data != DataEncodingStrategy::NestedTree {
            return Ok(value);
        }
        match value {
            Value::Map(_) | Value::Sequence(_) => {
                trace!(path = %path, "packing nested tree into blob");
                serde_json::to_vec(&value)
                    .map(Value::Blob)
                    .map_err(|e| Error::invalid_value(format!("cannot serialize nested tree: {e}"), path))
            }
            other => Ok(other),
        }
    }
}

impl<'a> ser::Serializer for Encoder<'a> {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SequenceEncoder<'a>;
    type SerializeTuple = SequenceEncoder<'a>;
    type SerializeTupleStruct = SequenceEncoder<'a>;
    type SerializeTupleVariant = VariantEncoder<SequenceEncoder<'a>>;
    type SerializeMap = MapEncoder<'a>;
    type SerializeStruct = RecordEncoder<'a>;
    type SerializeStructVariant = VariantEncoder<RecordEncoder<'a>>;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Integer(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value> {
        self.encode_integer(v)
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        Ok(Value::Integer(v as i64))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        self.encode_integer(v)
    }

    fn serialize_u128(self, v: u128) -> Result<Value> {
        self.encode_integer(v)
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        self.encode_float(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        self.encode_float(v)
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::Text(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::Text(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Ok(self.encode_bytes(v))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::Text(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<Value> {
        if name == TIMESTAMP_TOKEN {
            return self.encode_date(value);
        }
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value> {
        let inner = value.serialize(self.child(self.path.child_key(variant)))?;
        Ok(Value::map([(variant, inner)]))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SequenceEncoder<'a>> {
        Ok(SequenceEncoder {
            encoder: self,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SequenceEncoder<'a>> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SequenceEncoder<'a>> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        let inner = self.child(self.path.child_key(variant));
        Ok(VariantEncoder {
            variant,
            inner: inner.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapEncoder<'a>> {
        Ok(MapEncoder {
            encoder: self,
            entries: BTreeMap::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<RecordEncoder<'a>> {
        Ok(RecordEncoder {
            encoder: self,
            fields: BTreeMap::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        let inner = self.child(self.path.child_key(variant));
        Ok(VariantEncoder {
            variant,
            inner: inner.serialize_struct(name, len)?,
        })
    }
}

// ============================================================================
// Containers
// ============================================================================

/// Accumulates the elements of a sequence or tuple.
pub struct SequenceEncoder<'a> {
    encoder: Encoder<'a>,
    items: Vec<Value>,
}

impl<'a> SequenceEncoder<'a> {
    fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let path = self.encoder.path.child_index(self.items.len());
        let item = value.serialize(self.encoder.child(path))?;
        self.items.push(item);
        Ok(())
    }
}

impl<'a> ser::SerializeSeq for SequenceEncoder<'a> {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Sequence(self.items))
    }
}

impl<'a> ser::SerializeTuple for SequenceEncoder<'a> {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Sequence(self.items))
    }
}

impl<'a> ser::SerializeTupleStruct for SequenceEncoder<'a> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.push(value)
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Sequence(self.items))
    }
}

/// Accumulates the fields of a record. Field names go through the key
/// strategy; values go through the nested-tree packing.
pub struct RecordEncoder<'a> {
    encoder: Encoder<'a>,
    fields: BTreeMap<String, Value>,
}

impl<'a> ser::SerializeStruct for RecordEncoder<'a> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        let path = self.encoder.path.child_key(key);
        let encoded = value.serialize(self.encoder.child(path.clone()))?;
        let encoded = self.encoder.pack_field(encoded, &path)?;
        let name = self.encoder.config.keys.apply(key, &path);
        self.fields.insert(name, encoded);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.fields))
    }
}

/// Accumulates map entries. Keys must be text or stringifiable scalars.
pub struct MapEncoder<'a> {
    encoder: Encoder<'a>,
    entries: BTreeMap<String, Value>,
    pending_key: Option<String>,
}

impl<'a> ser::SerializeMap for MapEncoder<'a> {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.pending_key = Some(key.serialize(MapKeyEncoder {
            path: &self.encoder.path,
        })?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self.pending_key.take().ok_or_else(|| {
            Error::invalid_value("map value written before its key", &self.encoder.path)
        })?;
        let encoded = value.serialize(self.encoder.child(self.encoder.path.child_key(key.as_str())))?;
        self.entries.insert(key, encoded);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.entries))
    }
}

/// Wraps a tuple or struct variant body as `{variant: body}`.
pub struct VariantEncoder<C> {
    variant: &'static str,
    inner: C,
}

impl<'a> ser::SerializeTupleVariant for VariantEncoder<SequenceEncoder<'a>> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.inner.push(value)
    }

    fn end(self) -> Result<Value> {
        let body = ser::SerializeSeq::end(self.inner)?;
        Ok(Value::map([(self.variant, body)]))
    }
}

impl<'a> ser::SerializeStructVariant for VariantEncoder<RecordEncoder<'a>> {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Result<Value> {
        let body = ser::SerializeStruct::end(self.inner)?;
        Ok(Value::map([(self.variant, body)]))
    }
}

// ============================================================================
// Map keys
// ============================================================================

struct MapKeyEncoder<'p> {
    path: &'p CodingPath,
}

impl<'p> MapKeyEncoder<'p> {
    fn reject(&self, kind: &str) -> Error {
        Error::invalid_value(format!("map keys must be text, found {kind}"), self.path)
    }
}

macro_rules! stringify_key {
    ($($method:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method(self, v: $ty) -> Result<String> {
                Ok(v.to_string())
            }
        )*
    };
}

impl<'p> ser::Serializer for MapKeyEncoder<'p> {
    type Ok = String;
    type Error = Error;

    type SerializeSeq = ser::Impossible<String, Error>;
    type SerializeTuple = ser::Impossible<String, Error>;
    type SerializeTupleStruct = ser::Impossible<String, Error>;
    type SerializeTupleVariant = ser::Impossible<String, Error>;
    type SerializeMap = ser::Impossible<String, Error>;
    type SerializeStruct = ser::Impossible<String, Error>;
    type SerializeStructVariant = ser::Impossible<String, Error>;

    stringify_key! {
        serialize_bool: bool,
        serialize_i8: i8,
        serialize_i16: i16,
        serialize_i32: i32,
        serialize_i64: i64,
        serialize_i128: i128,
        serialize_u8: u8,
        serialize_u16: u16,
        serialize_u32: u32,
        serialize_u64: u64,
        serialize_u128: u128,
        serialize_char: char,
        serialize_str: &str,
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(self.reject("real"))
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(self.reject("real"))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(self.reject("blob"))
    }

    fn serialize_none(self) -> Result<String> {
        Err(self.reject("null"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(self.reject("null"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(self.reject("null"))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String> {
        Err(self.reject("map"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(self.reject("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(self.reject("sequence"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(self.reject("sequence"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(self.reject("map"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(self.reject("map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(self.reject("map"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(self.reject("map"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{Blob, Timestamp};
    use chrono::TimeZone;
    use codable_core::{CustomDateEncoder, KeyEncodingStrategy, NonFiniteFloatStrategy};
    use serde::Serialize;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Child {
        title: String,
    }

    #[derive(Serialize)]
    struct Parent {
        title: String,
        child: Child,
    }

    #[derive(Serialize)]
    struct Event {
        #[serde(rename = "createdAt")]
        created_at: Timestamp,
    }

    #[derive(Serialize)]
    enum Shape {
        Empty,
        Circle(f64),
        Rect { w: i32, h: i32 },
        Pair(i32, i32),
    }

    fn event() -> Event {
        Event {
            created_at: Timestamp(Utc.timestamp_opt(1_335_000_000, 0).unwrap()),
        }
    }

    #[test]
    fn test_encode_record() {
        let parent = Parent {
            title: "x".to_string(),
            child: Child {
                title: "y".to_string(),
            },
        };
        let tree = TreeEncoder::new().encode(&parent).unwrap();

        assert_eq!(tree.get("title"), Some(&Value::from("x")));
        assert_eq!(
            tree.get("child"),
            Some(&Value::map([("title", Value::from("y"))]))
        );
    }

    #[test]
    fn test_nothing_encoded_is_invalid() {
        let err = TreeEncoder::new().encode(&None::<i32>).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));

        let err = TreeEncoder::new().encode(&()).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_bare_scalar_root() {
        assert_eq!(TreeEncoder::new().encode(&5u8).unwrap(), Value::Integer(5));
        assert_eq!(TreeEncoder::new().encode("hi").unwrap(), Value::from("hi"));
    }

    #[test]
    fn test_u64_overflow() {
        let err = TreeEncoder::new().encode(&vec![u64::MAX]).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
        assert_eq!(err.path().to_string(), "[0]");
    }

    #[test]
    fn test_non_finite_floats() {
        let err = TreeEncoder::new().encode(&vec![1.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));

        let config = EncoderConfig::new()
            .with_non_finite_floats(NonFiniteFloatStrategy::convert_to_text("+inf", "-inf", "nan"));
        let tree = TreeEncoder::with_config(config)
            .encode(&vec![f64::INFINITY, f64::NEG_INFINITY, f64::NAN, 2.5])
            .unwrap();
        assert_eq!(
            tree,
            Value::sequence([
                Value::from("+inf"),
                Value::from("-inf"),
                Value::from("nan"),
                Value::Real(2.5)
            ])
        );
    }

    #[test]
    fn test_date_strategies() {
        let encode = |strategy| {
            let config = EncoderConfig::new().with_date_strategy(strategy);
            TreeEncoder::with_config(config).encode(&event()).unwrap()
        };

        assert_eq!(
            encode(DateEncodingStrategy::Deferred).get("createdAt"),
            Some(&Value::from("2012-04-21T09:20:00Z"))
        );
        assert_eq!(
            encode(DateEncodingStrategy::SecondsSince1970).get("createdAt"),
            Some(&Value::Real(1_335_000_000.0))
        );
        assert_eq!(
            encode(DateEncodingStrategy::MillisecondsSince1970).get("createdAt"),
            Some(&Value::Real(1_335_000_000_000.0))
        );
        assert_eq!(
            encode(DateEncodingStrategy::Iso8601).get("createdAt"),
            Some(&Value::from("2012-04-21T09:20:00Z"))
        );
        assert_eq!(
            encode(DateEncodingStrategy::Formatted("%Y/%m/%d".to_string())).get("createdAt"),
            Some(&Value::from("2012/04/21"))
        );

        let custom = CustomDateEncoder::new(|date, ctx| {
            let offset = ctx.user_info.get::<i64>("offset").copied().unwrap_or(0);
            Ok(Value::Integer(date.timestamp() + offset))
        });
        let config = EncoderConfig::new()
            .with_date_strategy(DateEncodingStrategy::Custom(custom))
            .with_user_info("offset", 5i64);
        let tree = TreeEncoder::with_config(config).encode(&event()).unwrap();
        assert_eq!(tree.get("createdAt"), Some(&Value::Integer(1_335_000_005)));
    }

    #[test]
    fn test_data_strategies() {
        let payload = Blob(vec![0, 1, 255]);
        let encode = |strategy| {
            let config = EncoderConfig::new().with_data_strategy(strategy);
            TreeEncoder::with_config(config).encode(&vec![payload.clone()]).unwrap()
        };

        assert_eq!(
            encode(DataEncodingStrategy::Raw),
            Value::sequence([Value::Blob(vec![0, 1, 255])])
        );
        assert_eq!(
            encode(DataEncodingStrategy::Base64),
            Value::sequence([Value::from("AAH/")])
        );
        assert_eq!(
            encode(DataEncodingStrategy::Deferred),
            Value::sequence([Value::sequence([
                Value::Integer(0),
                Value::Integer(1),
                Value::Integer(255)
            ])])
        );
    }

    #[test]
    fn test_nested_tree_packs_child() {
        let parent = Parent {
            title: "x".to_string(),
            child: Child {
                title: "y".to_string(),
            },
        };
        let config = EncoderConfig::new().with_data_strategy(DataEncodingStrategy::NestedTree);
        let tree = TreeEncoder::with_config(config).encode(&parent).unwrap();

        assert_eq!(tree.get("title"), Some(&Value::from("x")));
        let packed = tree.get("child").and_then(Value::as_bytes).unwrap();
        let unpacked: Value = serde_json::from_slice(packed).unwrap();
        assert_eq!(unpacked, Value::map([("title", Value::from("y"))]));
    }

    #[test]
    fn test_snake_case_applies_to_fields_only() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Profile {
            user_name: String,
            extra_tags: HashMap<String, i32>,
        }

        let profile = Profile {
            user_name: "ada".to_string(),
            extra_tags: HashMap::from([("keepMe".to_string(), 1)]),
        };
        let config = EncoderConfig::new().with_key_strategy(KeyEncodingStrategy::ConvertToSnakeCase);
        let tree = TreeEncoder::with_config(config).encode(&profile).unwrap();

        assert_eq!(tree.get("user_name"), Some(&Value::from("ada")));
        assert_eq!(
            tree.get("extra_tags"),
            Some(&Value::map([("keepMe", Value::Integer(1))]))
        );
    }

    #[test]
    fn test_enum_shapes() {
        let tree = TreeEncoder::new()
            .encode(&vec![
                Shape::Empty,
                Shape::Circle(1.5),
                Shape::Rect { w: 2, h: 3 },
                Shape::Pair(4, 5),
            ])
            .unwrap();

        assert_eq!(
            tree,
            Value::sequence([
                Value::from("Empty"),
                Value::map([("Circle", Value::Real(1.5))]),
                Value::map([(
                    "Rect",
                    Value::map([("w", Value::Integer(2)), ("h", Value::Integer(3))])
                )]),
                Value::map([(
                    "Pair",
                    Value::sequence([Value::Integer(4), Value::Integer(5)])
                )]),
            ])
        );
    }

    #[test]
    fn test_map_keys_are_stringified() {
        let scores: BTreeMap<u32, &str> = BTreeMap::from([(1, "a"), (20, "b")]);
        let tree = TreeEncoder::new().encode(&scores).unwrap();
        assert_eq!(
            tree,
            Value::map([("1", Value::from("a")), ("20", Value::from("b"))])
        );

        let bad: Vec<(Vec<u8>, i32)> = vec![(vec![1], 1)];
        let map: HashMap<Vec<u8>, i32> = bad.into_iter().collect();
        assert!(TreeEncoder::new().encode(&map).is_err());
    }
}
