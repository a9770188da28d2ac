//! Reverse conversion: value tree → typed value.
//!
//! [`TreeDecoder`] drives a type's `Deserialize` implementation over a
//! borrowed [`Value`]. The decoder keeps a stack of the nodes it has
//! descended into together with the matching [`CodingPath`]; every map
//! value and sequence element is decoded with its node pushed on top, and
//! popped again once the child is finished.
//!
//! Under [`MissingKeyStrategy::UseDefault`] every declared field name with no
//! key is offered to the record after the keys that are present. serde lists
//! aliases among the declared names, so an offered name can resolve to a
//! field the record already has; the record then rejects it. The decoder
//! remembers that name for the record's path and decodes the tree again
//! without offering it.

use crate::defaults::DefaultDeserializer;
use crate::markers::TIMESTAMP_TOKEN;
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use codable_core::{
    coerce, CodingPath, DataDecodingStrategy, DateDecodingStrategy, DecoderConfig, Error,
    MissingKeyStrategy, PathSegment, Result, Value,
};
use serde::de::{
    self, value::SeqDeserializer, DeserializeOwned, DeserializeSeed, Deserializer,
    IntoDeserializer, Visitor,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::{debug, trace};

/// Declared names, per record path, that resolve to a field already present.
type Covered = Rc<RefCell<BTreeSet<(String, &'static str)>>>;

/// Decodes value trees into typed values.
///
/// ```
/// use codable_tree::TreeDecoder;
/// use codable_core::Value;
///
/// #[derive(serde::Deserialize, Debug, PartialEq)]
/// struct Point { x: i8, y: i8 }
///
/// let tree = Value::map([("x", Value::Integer(1)), ("y", Value::Integer(2))]);
/// let point: Point = TreeDecoder::new().decode(&tree).unwrap();
/// assert_eq!(point, Point { x: 1, y: 2 });
/// ```
#[derive(Debug, Clone, Default)]
pub struct TreeDecoder {
    config: DecoderConfig,
}

impl TreeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode a `T` from `value`.
    pub fn decode<T: DeserializeOwned>(&self, value: &Value) -> Result<T> {
        debug!(target_type = std::any::type_name::<T>(), "decoding value tree");
        let covered = Covered::default();
        loop {
            let known = covered.borrow().len();
            let mut decoder = Decoder {
                covered: Rc::clone(&covered),
                ..Decoder::new(&self.config, value, CodingPath::new())
            };
            match T::deserialize(&mut decoder) {
                Err(e) if covered.borrow().len() > known => {
                    debug!(error = %e, "retrying without defaults for aliased fields");
                }
                result => return result,
            }
        }
    }
}

/// Deserializer over one tree. Use through `&mut Decoder`.
pub struct Decoder<'a> {
    config: &'a DecoderConfig,
    storage: Vec<&'a Value>,
    path: CodingPath,
    covered: Covered,
}

impl<'a> Decoder<'a> {
    pub fn new(config: &'a DecoderConfig, root: &'a Value, path: CodingPath) -> Self {
        Self {
            config,
            storage: vec![root],
            path,
            covered: Covered::default(),
        }
    }

    pub fn path(&self) -> &CodingPath {
        &self.path
    }

    fn current(&self) -> Result<&'a Value> {
        self.storage
            .last()
            .copied()
            .ok_or_else(|| Error::fatal("decoder has no current node", &self.path))
    }

    /// Run `f` with `node` as the current node, one path segment deeper.
    fn descend<T>(
        &mut self,
        segment: PathSegment,
        node: &'a Value,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.path.push(segment);
        self.storage.push(node);
        let result = f(self).map_err(|e| e.or_path(&self.path));
        self.storage.pop();
        self.path.pop();
        result
    }

    /// Parse a blob as a serialized tree and decode it in a fresh decoder
    /// sharing this one's configuration and path.
    fn decode_nested_tree<T>(
        &self,
        bytes: &[u8],
        f: impl for<'n> FnOnce(&mut Decoder<'n>) -> Result<T>,
    ) -> Result<T> {
        trace!(path = %self.path, len = bytes.len(), "unpacking nested tree from blob");
        let parsed: Value = serde_json::from_slice(bytes).map_err(|e| {
            Error::data_corrupted(
                format!("Blob does not hold a serialized value tree: {e}"),
                &self.path,
            )
        })?;
        let mut nested = Decoder {
            config: self.config,
            storage: vec![&parsed],
            path: self.path.clone(),
            covered: Rc::clone(&self.covered),
        };
        f(&mut nested)
    }

    fn nested_tree_enabled(&self) -> bool {
        self.config.data == DataDecodingStrategy::NestedTree
    }

    fn decode_date(&self) -> Result<DateTime<Utc>> {
        let node = self.current()?;
        trace!(path = %self.path, strategy = ?self.config.date, "decoding timestamp");
        if node.is_null() {
            return Err(Error::value_not_found("timestamp", &self.path));
        }
        match &self.config.date {
            DateDecodingStrategy::Deferred => {
                let text = coerce::text(node, &self.path)?;
                DateTime::parse_from_rfc3339(text)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| Error::data_corrupted(format!("invalid timestamp: {e}"), &self.path))
            }
            DateDecodingStrategy::SecondsSince1970 => {
                let secs = self.epoch_number(node)?;
                self.from_epoch_seconds(secs)
            }
            DateDecodingStrategy::MillisecondsSince1970 => match node {
                Value::Integer(millis) => self.from_epoch_millis(*millis, 0),
                _ => {
                    let millis = self.epoch_number(node)?;
                    if !millis.is_finite() {
                        return Err(Error::data_corrupted(
                            format!("{millis} is not a valid epoch offset"),
                            &self.path,
                        ));
                    }
                    // Split before scaling: whole milliseconds are exact in f64.
                    let whole = millis.floor();
                    let nanos = ((millis - whole) * 1e6).round() as i64;
                    self.from_epoch_millis(whole as i64, nanos)
                }
            },
            DateDecodingStrategy::Iso8601 => {
                let text = coerce::text(node, &self.path)?;
                DateTime::parse_from_rfc3339(text)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| {
                        Error::data_corrupted("Expected date string to be ISO8601-formatted.", &self.path)
                    })
            }
            DateDecodingStrategy::Formatted(pattern) => {
                let text = coerce::text(node, &self.path)?;
                parse_formatted(text, pattern).ok_or_else(|| {
                    Error::data_corrupted(
                        format!("Date string '{text}' does not match format '{pattern}'."),
                        &self.path,
                    )
                })
            }
            DateDecodingStrategy::Custom(f) => f.call(node, &self.config.context(&self.path)),
        }
    }

    fn epoch_number(&self, node: &Value) -> Result<f64> {
        match node {
            Value::Real(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(Error::type_mismatch("seconds since 1970", other.kind(), &self.path)),
        }
    }

    fn from_epoch_seconds(&self, secs: f64) -> Result<DateTime<Utc>> {
        if !secs.is_finite() {
            return Err(Error::data_corrupted(
                format!("{secs} is not a valid epoch offset"),
                &self.path,
            ));
        }
        let whole = secs.floor();
        let mut nanos = ((secs - whole) * 1e9).round() as i64;
        let mut whole = whole as i64;
        if nanos >= 1_000_000_000 {
            whole += 1;
            nanos -= 1_000_000_000;
        }
        DateTime::<Utc>::from_timestamp(whole, nanos as u32).ok_or_else(|| {
            Error::data_corrupted(format!("{secs} is outside the supported date range"), &self.path)
        })
    }

    fn from_epoch_millis(&self, millis: i64, nanos: i64) -> Result<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(millis)
            .and_then(|dt| dt.checked_add_signed(Duration::nanoseconds(nanos)))
            .ok_or_else(|| {
                Error::data_corrupted(
                    format!("{millis} ms is outside the supported date range"),
                    &self.path,
                )
            })
    }

    /// Bytes under the configured data strategy. `None` means the node is a
    /// sequence that should be walked element by element.
    fn decode_bytes(&self) -> Result<Option<Vec<u8>>> {
        let node = self.current()?;
        trace!(path = %self.path, strategy = ?self.config.data, "decoding bytes");
        match (self.config.data, node) {
            (_, Value::Null) => Err(Error::value_not_found("blob", &self.path)),
            (DataDecodingStrategy::Base64, Value::Text(text)) => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(Some)
                .map_err(|_| Error::data_corrupted("Encountered Data is not valid Base64.", &self.path)),
            (DataDecodingStrategy::Base64, other) => {
                Err(Error::type_mismatch("base64 text", other.kind(), &self.path))
            }
            (_, Value::Blob(bytes)) => Ok(Some(bytes.clone())),
            (_, Value::Sequence(_)) => Ok(None),
            (_, other) => Err(Error::type_mismatch("blob", other.kind(), &self.path)),
        }
    }

    fn keyed_access<'d>(
        &'d mut self,
        map: &'a BTreeMap<String, Value>,
        fields: Option<&'static [&'static str]>,
    ) -> KeyedAccess<'d, 'a> {
        let mut slots = Vec::with_capacity(map.len());
        match fields {
            Some(fields) => {
                let mut absent = Vec::new();
                for field in fields {
                    match map.get_key_value(*field) {
                        Some((key, value)) => slots.push(Slot::Present(key.as_str(), value)),
                        None if self.config.missing_keys == MissingKeyStrategy::UseDefault
                            && !self.is_covered(*field) =>
                        {
                            absent.push(Slot::Absent(*field))
                        }
                        None => {}
                    }
                }
                for (key, value) in map {
                    if !fields.iter().any(|field| *field == key.as_str()) {
                        slots.push(Slot::Present(key.as_str(), value));
                    }
                }
                slots.extend(absent);
            }
            None => slots.extend(map.iter().map(|(k, v)| Slot::Present(k.as_str(), v))),
        }
        KeyedAccess {
            de: self,
            slots: slots.into_iter(),
            pending: None,
        }
    }

    fn is_covered(&self, field: &'static str) -> bool {
        self.covered.borrow().contains(&(self.path.to_string(), field))
    }

    fn cover(&self, field: &'static str) {
        trace!(path = %self.path, field, "declared name resolves to a field already present");
        self.covered.borrow_mut().insert((self.path.to_string(), field));
    }
}

/// Parse text with a strftime pattern, with or without an offset, or as a
/// bare date at midnight UTC.
fn parse_formatted(text: &str, pattern: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(text, pattern) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, pattern) {
        return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
    }
    None
}

macro_rules! decode_integer {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                let node = self.current()?;
                let value = coerce::integer::<$ty>(node, stringify!($ty), &self.path)?;
                visitor.$visit(value)
            }
        )*
    };
}

impl<'de, 'a, 'b> de::Deserializer<'de> for &'b mut Decoder<'a> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.current()? {
            Value::Null => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(*b),
            Value::Integer(i) => visitor.visit_i64(*i),
            Value::Real(f) => visitor.visit_f64(*f),
            Value::Text(s) => visitor.visit_str(s),
            Value::Blob(bytes) => visitor.visit_bytes(bytes),
            Value::Map(map) => visitor.visit_map(self.keyed_access(map, None)),
            Value::Sequence(items) => visitor.visit_seq(SequenceAccess::new(self, items)),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let value = coerce::boolean(self.current()?, &self.path)?;
        visitor.visit_bool(value)
    }

    decode_integer! {
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let value = coerce::float(self.current()?, &self.config.non_finite_floats, &self.path)?;
        visitor.visit_f32(value)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let value = coerce::double(self.current()?, &self.config.non_finite_floats, &self.path)?;
        visitor.visit_f64(value)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let value = coerce::character(self.current()?, &self.path)?;
        visitor.visit_char(value)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let value = coerce::text(self.current()?, &self.path)?;
        visitor.visit_str(value)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.decode_bytes()? {
            Some(bytes) => visitor.visit_byte_buf(bytes),
            None => self.deserialize_seq(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.current()?.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.current()? {
            Value::Null => visitor.visit_unit(),
            other => Err(Error::type_mismatch("null", other.kind(), &self.path)),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == TIMESTAMP_TOKEN {
            let date = self.decode_date()?;
            let text = date.to_rfc3339_opts(SecondsFormat::Nanos, true);
            return visitor.visit_newtype_struct(text.into_deserializer());
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let node = self.current()?;
        match node {
            Value::Null => Err(Error::value_not_found("sequence", &self.path)),
            Value::Sequence(items) => visitor.visit_seq(SequenceAccess::new(self, items)),
            Value::Blob(bytes) if self.nested_tree_enabled() => {
                self.decode_nested_tree(bytes, |nested| de::Deserializer::deserialize_seq(nested, visitor))
            }
            Value::Blob(bytes) => {
                visitor.visit_seq(SeqDeserializer::<_, Error>::new(bytes.iter().copied()))
            }
            Value::Map(_) => Err(Error::type_mismatch("sequence", "map", &self.path)),
            // A lone scalar reads as a one-element sequence.
            scalar => visitor.visit_seq(SequenceAccess::new(self, std::slice::from_ref(scalar))),
        }
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let node = self.current()?;
        let result = match node {
            Value::Map(map) => visitor.visit_map(self.keyed_access(map, None)),
            Value::Null => Err(Error::value_not_found("map", &self.path)),
            Value::Blob(bytes) if self.nested_tree_enabled() => {
                self.decode_nested_tree(bytes, |nested| de::Deserializer::deserialize_map(nested, visitor))
            }
            other => Err(Error::type_mismatch("map", other.kind(), &self.path)),
        };
        result.map_err(|e| e.or_path(&self.path))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let node = self.current()?;
        let result = match node {
            Value::Map(map) => {
                let mut access = self.keyed_access(map, Some(fields));
                let result = visitor.visit_map(&mut access);
                let rejected = access.rejected_default();
                if let (Err(_), Some(field)) = (&result, rejected) {
                    self.cover(field);
                }
                result
            }
            Value::Null => Err(Error::value_not_found(name, &self.path)),
            Value::Blob(bytes) if self.nested_tree_enabled() => self.decode_nested_tree(bytes, |nested| {
                de::Deserializer::deserialize_struct(nested, name, fields, visitor)
            }),
            other => Err(Error::type_mismatch(format!("map for {name}"), other.kind(), &self.path)),
        };
        result.map_err(|e| e.or_path(&self.path))
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match self.current()? {
            Value::Text(variant) => visitor.visit_enum(variant.as_str().into_deserializer()),
            Value::Map(map) if map.len() == 1 => {
                let Some((variant, body)) = map.iter().next() else {
                    return Err(Error::type_mismatch(name, "empty map", &self.path));
                };
                visitor.visit_enum(VariantAccess {
                    de: self,
                    name,
                    variant: variant.as_str(),
                    body,
                })
            }
            Value::Null => Err(Error::value_not_found(name, &self.path)),
            other => Err(Error::type_mismatch(
                format!("variant of {name}"),
                other.kind(),
                &self.path,
            )),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

// ============================================================================
// Keyed container
// ============================================================================

enum Slot<'a> {
    Present(&'a str, &'a Value),
    /// A declared field with no key, filled in from the defaults.
    Absent(&'static str),
}

struct KeyedAccess<'d, 'a> {
    de: &'d mut Decoder<'a>,
    slots: std::vec::IntoIter<Slot<'a>>,
    pending: Option<Slot<'a>>,
}

impl KeyedAccess<'_, '_> {
    /// A default offered as a key whose value was never asked for.
    fn rejected_default(&self) -> Option<&'static str> {
        match &self.pending {
            Some(Slot::Absent(field)) => Some(*field),
            _ => None,
        }
    }
}

impl<'de, 'd, 'a> de::MapAccess<'de> for KeyedAccess<'d, 'a> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let Some(slot) = self.slots.next() else {
            return Ok(None);
        };
        let key = match &slot {
            Slot::Present(key, _) => *key,
            Slot::Absent(field) => *field,
        };
        self.pending = Some(slot);
        seed.deserialize(KeyDeserializer::new(key, &self.de.path)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        match self.pending.take() {
            Some(Slot::Present(key, value)) => self
                .de
                .descend(PathSegment::Key(key.to_string()), value, |de| seed.deserialize(de)),
            Some(Slot::Absent(field)) => {
                trace!(path = %self.de.path, field, "substituting default for missing key");
                seed.deserialize(DefaultDeserializer::new(self.de.config, field, self.de.path.clone()))
            }
            None => Err(Error::fatal("map value requested before its key", &self.de.path)),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.slots.len())
    }
}

// ============================================================================
// Sequence container
// ============================================================================

struct SequenceAccess<'d, 'a> {
    de: &'d mut Decoder<'a>,
    items: &'a [Value],
    index: usize,
}

impl<'d, 'a> SequenceAccess<'d, 'a> {
    fn new(de: &'d mut Decoder<'a>, items: &'a [Value]) -> Self {
        Self { de, items, index: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.index >= self.items.len()
    }
}

impl<'de, 'd, 'a> de::SeqAccess<'de> for SequenceAccess<'d, 'a> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.is_at_end() {
            return Ok(None);
        }
        let index = self.index;
        let items = self.items;
        self.index += 1;
        self.de
            .descend(PathSegment::Index(index), &items[index], |de| seed.deserialize(de))
            .map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len() - self.index)
    }
}

// ============================================================================
// Enum variants
// ============================================================================

struct VariantAccess<'d, 'a> {
    de: &'d mut Decoder<'a>,
    name: &'static str,
    variant: &'a str,
    body: &'a Value,
}

impl<'de, 'd, 'a> de::EnumAccess<'de> for VariantAccess<'d, 'a> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self)> {
        let variant = seed.deserialize(KeyDeserializer::new(self.variant, &self.de.path))?;
        Ok((variant, self))
    }
}

impl<'de, 'd, 'a> de::VariantAccess<'de> for VariantAccess<'d, 'a> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        match self.body {
            Value::Null => Ok(()),
            other => Err(Error::type_mismatch("unit variant", other.kind(), &self.de.path)),
        }
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        self.de
            .descend(PathSegment::Key(self.variant.to_string()), self.body, |de| seed.deserialize(de))
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.de.descend(PathSegment::Key(self.variant.to_string()), self.body, |de| {
            de::Deserializer::deserialize_seq(de, visitor)
        })
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let (name, variant) = (self.name, self.variant);
        self.de.descend(PathSegment::Key(variant.to_string()), self.body, |de| {
            de::Deserializer::deserialize_struct(de, name, fields, visitor)
        })
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Deserializer for a map key or field name. Keys are always text in the
/// tree; numeric and boolean targets parse it.
pub(crate) struct KeyDeserializer<'k> {
    key: &'k str,
    path: &'k CodingPath,
}

impl<'k> KeyDeserializer<'k> {
    pub(crate) fn new(key: &'k str, path: &'k CodingPath) -> Self {
        Self { key, path }
    }

    fn parse<T: std::str::FromStr>(&self, expected: &str) -> Result<T> {
        self.key.parse::<T>().map_err(|_| {
            Error::type_mismatch(
                format!("{expected} map key"),
                format!("text '{}'", self.key),
                &self.path.child_key(self.key),
            )
        })
    }
}

macro_rules! parse_key {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                visitor.$visit(self.parse::<$ty>(stringify!($ty))?)
            }
        )*
    };
}

impl<'de, 'k> de::Deserializer<'de> for KeyDeserializer<'k> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_str(self.key)
    }

    parse_key! {
        deserialize_bool => visit_bool: bool,
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_i128 => visit_i128: i128,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_u128 => visit_u128: u128,
        deserialize_char => visit_char: char,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_enum(self.key.into_deserializer())
    }

    serde::forward_to_deserialize_any! {
        f32 f64 str string bytes byte_buf unit unit_struct seq tuple
        tuple_struct map struct identifier ignored_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{Blob, Timestamp};
    use codable_core::{CustomDateDecoder, NonFiniteFloatStrategy};
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Counter {
        name: String,
        count: u32,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Child {
        title: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Parent {
        title: String,
        child: Child,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    enum Shape {
        Empty,
        Circle(f64),
        Rect { w: i32, h: i32 },
        Pair(i32, i32),
    }

    fn decode<T: DeserializeOwned>(value: &Value) -> Result<T> {
        TreeDecoder::new().decode(value)
    }

    #[test]
    fn test_decode_record() {
        let tree = Value::map([("name", Value::from("hits")), ("count", Value::Integer(3))]);
        let counter: Counter = decode(&tree).unwrap();
        assert_eq!(
            counter,
            Counter {
                name: "hits".to_string(),
                count: 3
            }
        );
    }

    #[test]
    fn test_i8_range() {
        assert_eq!(decode::<i8>(&Value::Integer(127)).unwrap(), 127);
        let err = decode::<i8>(&Value::Integer(200)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_null_versus_missing() {
        let null_name = Value::map([("name", Value::Null), ("count", Value::Integer(1))]);
        let err = decode::<Counter>(&null_name).unwrap_err();
        assert!(matches!(err, Error::ValueNotFound { .. }));
        assert_eq!(err.path().to_string(), "name");

        let no_name = Value::map([("count", Value::Integer(1))]);
        let err = decode::<Counter>(&no_name).unwrap_err();
        assert!(matches!(err, Error::KeyNotFound { ref key, .. } if key == "name"));
    }

    #[test]
    fn test_missing_key_defaults() {
        let tree = Value::map([("name", Value::from("hits"))]);
        let config = DecoderConfig::new().with_missing_keys(MissingKeyStrategy::UseDefault);
        let counter: Counter = TreeDecoder::with_config(config).decode(&tree).unwrap();
        assert_eq!(counter.count, 0);
    }

    #[test]
    fn test_missing_key_defaults_with_aliases() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Named {
            #[serde(alias = "title")]
            name: String,
            count: u32,
        }

        let decoder = TreeDecoder::with_config(
            DecoderConfig::new().with_missing_keys(MissingKeyStrategy::UseDefault),
        );
        let named = |name: &str, count| Named {
            name: name.to_string(),
            count,
        };

        let by_name = Value::map([("name", Value::from("x"))]);
        assert_eq!(decoder.decode::<Named>(&by_name).unwrap(), named("x", 0));

        let by_alias = Value::map([("title", Value::from("y")), ("count", Value::Integer(2))]);
        assert_eq!(decoder.decode::<Named>(&by_alias).unwrap(), named("y", 2));

        let empty = Value::map::<&str, _>([]);
        assert_eq!(decoder.decode::<Named>(&empty).unwrap(), named("", 0));

        let mixed = Value::sequence([by_alias.clone(), by_name.clone(), empty.clone()]);
        assert_eq!(
            decoder.decode::<Vec<Named>>(&mixed).unwrap(),
            vec![named("y", 2), named("x", 0), named("", 0)]
        );
    }

    #[test]
    fn test_error_path_in_nested_sequence() {
        let tree = Value::sequence([
            Value::map([("name", Value::from("a")), ("count", Value::Integer(1))]),
            Value::map([("name", Value::from("b")), ("count", Value::Integer(-1))]),
        ]);
        let err = decode::<Vec<Counter>>(&tree).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(err.path().to_string(), "[1].count");

        let tree = Value::sequence([Value::map([("name", Value::from("a"))])]);
        let err = decode::<Vec<Counter>>(&tree).unwrap_err();
        assert!(matches!(err, Error::KeyNotFound { .. }));
        assert_eq!(err.path().to_string(), "[0]");
    }

    #[test]
    fn test_type_mismatch_for_non_map() {
        let err = decode::<Counter>(&Value::Integer(1)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        let err = decode::<Counter>(&Value::Null).unwrap_err();
        assert!(matches!(err, Error::ValueNotFound { .. }));
    }

    #[test]
    fn test_scalar_as_single_element_sequence() {
        let items: Vec<i32> = decode(&Value::Integer(4)).unwrap();
        assert_eq!(items, vec![4]);

        let err = decode::<Vec<i32>>(&Value::map([("a", Value::Integer(1))])).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_tuple_too_short() {
        let err = decode::<(i32, i32)>(&Value::sequence([Value::Integer(1)])).unwrap_err();
        assert!(matches!(err, Error::ValueNotFound { .. }));
    }

    #[test]
    fn test_optional_fields() {
        #[derive(Debug, Deserialize)]
        struct Note {
            body: Option<String>,
            pinned: Option<bool>,
        }

        let note: Note = decode(&Value::map([("body", Value::Null)])).unwrap();
        assert_eq!(note.body, None);
        assert_eq!(note.pinned, None);

        let note: Note = decode(&Value::map([("pinned", Value::Integer(1))])).unwrap();
        assert_eq!(note.pinned, Some(true));
    }

    #[test]
    fn test_enums() {
        let tree = Value::sequence([
            Value::from("Empty"),
            Value::map([("Circle", Value::Real(1.5))]),
            Value::map([(
                "Rect",
                Value::map([("w", Value::Integer(2)), ("h", Value::Integer(3))]),
            )]),
            Value::map([("Pair", Value::sequence([Value::Integer(4), Value::Integer(5)]))]),
        ]);
        let shapes: Vec<Shape> = decode(&tree).unwrap();
        assert_eq!(
            shapes,
            vec![
                Shape::Empty,
                Shape::Circle(1.5),
                Shape::Rect { w: 2, h: 3 },
                Shape::Pair(4, 5)
            ]
        );

        let err = decode::<Shape>(&Value::from("Hexagon")).unwrap_err();
        assert!(matches!(err, Error::DataCorrupted { .. }));
    }

    #[test]
    fn test_struct_variant_mismatch_names_enum() {
        let tree = Value::map([("Rect", Value::Integer(5))]);
        let err = decode::<Shape>(&tree).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref expected, .. } if expected == "map for Shape"));
        assert_eq!(err.path().to_string(), "Rect");
    }

    #[test]
    fn test_milliseconds_decode_exactly() {
        let config = DecoderConfig::new()
            .with_date_strategy(DateDecodingStrategy::MillisecondsSince1970);
        let decoder = TreeDecoder::with_config(config);
        let expected = DateTime::<Utc>::from_timestamp_millis(1_335_000_000_123).unwrap();

        let from_real: Timestamp = decoder.decode(&Value::Real(1_335_000_000_123.0)).unwrap();
        assert_eq!(from_real.0, expected);

        let from_integer: Timestamp = decoder.decode(&Value::Integer(1_335_000_000_123)).unwrap();
        assert_eq!(from_integer.0, expected);

        let before_epoch: Timestamp = decoder.decode(&Value::Real(-1.5)).unwrap();
        assert_eq!(
            before_epoch.0,
            DateTime::<Utc>::from_timestamp(-1, 998_500_000).unwrap()
        );

        let err = decoder.decode::<Timestamp>(&Value::Real(f64::MAX)).unwrap_err();
        assert!(matches!(err, Error::DataCorrupted { .. }));
    }

    #[test]
    fn test_map_with_numeric_keys() {
        let tree = Value::map([("1", Value::from("a")), ("20", Value::from("b"))]);
        let map: HashMap<u32, String> = decode(&tree).unwrap();
        assert_eq!(map.get(&20).map(String::as_str), Some("b"));

        let bad = Value::map([("x", Value::from("a"))]);
        let err = decode::<HashMap<u32, String>>(&bad).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_date_strategies() {
        #[derive(Debug, Deserialize)]
        struct Event {
            at: Timestamp,
        }

        let expected = Utc.timestamp_opt(1_335_000_000, 0).unwrap();
        let decode_with = |strategy, node: Value| {
            let config = DecoderConfig::new().with_date_strategy(strategy);
            TreeDecoder::with_config(config)
                .decode::<Event>(&Value::map([("at", node)]))
                .map(|e| e.at.0)
        };

        assert_eq!(
            decode_with(DateDecodingStrategy::Deferred, Value::from("2012-04-21T09:20:00Z")).unwrap(),
            expected
        );
        assert_eq!(
            decode_with(DateDecodingStrategy::SecondsSince1970, Value::Real(1_335_000_000.0)).unwrap(),
            expected
        );
        assert_eq!(
            decode_with(DateDecodingStrategy::SecondsSince1970, Value::Integer(1_335_000_000)).unwrap(),
            expected
        );
        assert_eq!(
            decode_with(
                DateDecodingStrategy::MillisecondsSince1970,
                Value::Real(1_335_000_000_000.0)
            )
            .unwrap(),
            expected
        );
        assert_eq!(
            decode_with(DateDecodingStrategy::Iso8601, Value::from("2012-04-21T04:20:00-05:00")).unwrap(),
            expected
        );
        assert_eq!(
            decode_with(
                DateDecodingStrategy::Formatted("%Y-%m-%d %H:%M:%S".to_string()),
                Value::from("2012-04-21 09:20:00")
            )
            .unwrap(),
            expected
        );

        let err = decode_with(DateDecodingStrategy::Iso8601, Value::from("yesterday")).unwrap_err();
        assert!(matches!(err, Error::DataCorrupted { .. }));
        assert_eq!(err.path().to_string(), "at");

        let custom = CustomDateDecoder::new(|node, ctx| {
            let base = ctx.user_info.get::<i64>("base").copied().unwrap_or(0);
            let offset = node.as_i64().ok_or_else(|| Error::type_mismatch("integer", node.kind(), ctx.path))?;
            DateTime::<Utc>::from_timestamp(base + offset, 0)
                .ok_or_else(|| Error::data_corrupted("out of range", ctx.path))
        });
        let config = DecoderConfig::new()
            .with_date_strategy(DateDecodingStrategy::Custom(custom))
            .with_user_info("base", 1_335_000_000i64);
        let event: Event = TreeDecoder::with_config(config)
            .decode(&Value::map([("at", Value::Integer(0))]))
            .unwrap();
        assert_eq!(event.at.0, expected);
    }

    #[test]
    fn test_data_strategies() {
        #[derive(Debug, Deserialize)]
        struct Attachment {
            payload: Blob,
        }

        let decode_with = |strategy, node: Value| {
            let config = DecoderConfig::new().with_data_strategy(strategy);
            TreeDecoder::with_config(config)
                .decode::<Attachment>(&Value::map([("payload", node)]))
                .map(|a| a.payload.0)
        };

        assert_eq!(
            decode_with(DataDecodingStrategy::Raw, Value::Blob(vec![0, 1, 255])).unwrap(),
            vec![0, 1, 255]
        );
        assert_eq!(
            decode_with(DataDecodingStrategy::Base64, Value::from("AAH/")).unwrap(),
            vec![0, 1, 255]
        );
        assert_eq!(
            decode_with(
                DataDecodingStrategy::Deferred,
                Value::sequence([Value::Integer(7), Value::Integer(8)])
            )
            .unwrap(),
            vec![7, 8]
        );

        let err = decode_with(DataDecodingStrategy::Base64, Value::from("not base64!")).unwrap_err();
        assert!(matches!(err, Error::DataCorrupted { .. }));
        let err = decode_with(DataDecodingStrategy::Raw, Value::from("AAH/")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_nested_tree_from_blob() {
        let packed = serde_json::to_vec(&Value::map([("title", Value::from("y"))])).unwrap();
        let tree = Value::map([("title", Value::from("x")), ("child", Value::Blob(packed))]);

        let config = DecoderConfig::new().with_data_strategy(DataDecodingStrategy::NestedTree);
        let parent: Parent = TreeDecoder::with_config(config).decode(&tree).unwrap();
        assert_eq!(parent.child.title, "y");

        // Without the strategy the blob is a shape error.
        let err = decode::<Parent>(&tree).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert_eq!(err.path().to_string(), "child");
    }

    #[test]
    fn test_nested_tree_garbage_is_corrupted() {
        let tree = Value::map([
            ("title", Value::from("x")),
            ("child", Value::Blob(b"{not json".to_vec())),
        ]);
        let config = DecoderConfig::new().with_data_strategy(DataDecodingStrategy::NestedTree);
        let err = TreeDecoder::with_config(config).decode::<Parent>(&tree).unwrap_err();
        assert!(matches!(err, Error::DataCorrupted { .. }));
    }

    #[test]
    fn test_non_finite_placeholders() {
        let tree = Value::sequence([Value::from("inf"), Value::Real(0.5)]);
        assert!(decode::<Vec<f64>>(&tree).is_err());

        let config = DecoderConfig::new()
            .with_non_finite_floats(NonFiniteFloatStrategy::convert_to_text("inf", "-inf", "nan"));
        let floats: Vec<f32> = TreeDecoder::with_config(config).decode(&tree).unwrap();
        assert_eq!(floats, vec![f32::INFINITY, 0.5]);
    }

    #[test]
    fn test_value_passes_through() {
        let tree = Value::map([
            ("a", Value::Blob(vec![1])),
            ("b", Value::sequence([Value::Null, Value::Real(1.5)])),
        ]);
        let copy: Value = decode(&tree).unwrap();
        assert_eq!(copy, tree);
    }
}
