//! Schema introspection: record type → {field name → storage class}.
//!
//! The introspector runs a record's `Deserialize` implementation with no
//! tree behind it. The record asks for each of its fields in turn; every
//! request is answered by a probe that notes the storage class implied by
//! the requested primitive and hands back a placeholder so the record can be
//! built and thrown away.
//!
//! Only one level is walked. Nested records, sequences and maps are not
//! descended into: they are stored as a serialized blob, and their
//! placeholder comes from [`ZeroDeserializer`]. An enum is text when its
//! placeholder variant is a unit variant and a blob when it carries data. A top-level type that is not
//! a record with named fields is rejected with [`Error::Fatal`].

use crate::markers::TIMESTAMP_TOKEN;
use crate::reverse::Decoder;
use crate::zero::{ZeroDeserializer, EPOCH};
use codable_core::{CodingPath, DecoderConfig, Error, Result, StorageClass, Value};
use serde::de::{self, DeserializeOwned, DeserializeSeed, Deserializer, IntoDeserializer, Visitor};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

/// Harvests column storage classes from a record type.
///
/// ```
/// use codable_tree::SchemaIntrospector;
/// use codable_core::StorageClass;
///
/// #[derive(serde::Deserialize)]
/// struct Row { id: i64, name: String, flag: bool }
///
/// let columns = SchemaIntrospector::new().column_types::<Row>().unwrap();
/// assert_eq!(columns["flag"], StorageClass::Integer);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaIntrospector {
    config: DecoderConfig,
    placeholders: HashMap<String, Value>,
    zero_values: HashMap<String, Value>,
}

impl SchemaIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder settings used for registered placeholders and zero values.
    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `value` as the placeholder for field `field`, decoded through the
    /// regular decoder. Needed for fields whose type cannot accept a zero
    /// value (a URL, say). For an optional field, give the inner value.
    pub fn with_placeholder(mut self, field: impl Into<String>, value: Value) -> Self {
        self.placeholders.insert(field.into(), value);
        self
    }

    /// Use `value` as the zero value of record type `type_name` wherever a
    /// placeholder of that type has to be fabricated.
    pub fn with_zero_value(mut self, type_name: impl Into<String>, value: Value) -> Self {
        self.zero_values.insert(type_name.into(), value);
        self
    }

    /// Storage class of every declared field of `T`.
    pub fn column_types<T: DeserializeOwned>(&self) -> Result<HashMap<String, StorageClass>> {
        debug!(target_type = std::any::type_name::<T>(), "introspecting storage classes");
        let mut columns = HashMap::new();
        T::deserialize(TableProbe {
            introspector: self,
            columns: &mut columns,
            path: CodingPath::new(),
        })?;
        Ok(columns)
    }
}

// ============================================================================
// Table level
// ============================================================================

struct TableProbe<'i, 'c> {
    introspector: &'i SchemaIntrospector,
    columns: &'c mut HashMap<String, StorageClass>,
    path: CodingPath,
}

impl<'de, 'i, 'c> de::Deserializer<'de> for TableProbe<'i, 'c> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::fatal(
            "schema introspection needs a record type with named fields",
            &self.path,
        ))
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == TIMESTAMP_TOKEN {
            return self.deserialize_any(visitor);
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_map(FieldProbes {
            introspector: self.introspector,
            columns: self.columns,
            path: self.path,
            fields: fields.iter(),
            pending: None,
        })
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct seq tuple tuple_struct map enum
        identifier ignored_any
    }
}

struct FieldProbes<'i, 'c> {
    introspector: &'i SchemaIntrospector,
    columns: &'c mut HashMap<String, StorageClass>,
    path: CodingPath,
    fields: std::slice::Iter<'static, &'static str>,
    pending: Option<&'static str>,
}

impl<'de, 'i, 'c> de::MapAccess<'de> for FieldProbes<'i, 'c> {
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let Some(field) = self.fields.next() else {
            return Ok(None);
        };
        self.pending = Some(*field);
        seed.deserialize((*field).into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let field = self
            .pending
            .take()
            .ok_or_else(|| Error::fatal("field value requested before its name", &self.path))?;
        let path = self.path.child_key(field);
        // The probe and whatever placeholder it produces live only for this call.
        seed.deserialize(ColumnProbe {
            introspector: self.introspector,
            columns: &mut *self.columns,
            field,
            path: path.clone(),
        })
        .map_err(|e| e.or_path(&path))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.fields.len())
    }
}

// ============================================================================
// Column level
// ============================================================================

struct ColumnProbe<'i, 'c> {
    introspector: &'i SchemaIntrospector,
    columns: &'c mut HashMap<String, StorageClass>,
    field: &'static str,
    path: CodingPath,
}

/// Where the placeholder for one field comes from.
enum Source<'i> {
    Placeholder(Decoder<'i>),
    Zero(ZeroDeserializer<'i>),
}

impl<'i, 'c> ColumnProbe<'i, 'c> {
    fn record(&mut self, class: StorageClass) {
        trace!(path = %self.path, class = %class, "recording column");
        self.columns.insert(self.field.to_string(), class);
    }

    fn source(&mut self, class: StorageClass) -> Source<'i> {
        self.record(class);
        let introspector = self.introspector;
        let path = self.path.clone();
        match introspector.placeholders.get(self.field) {
            Some(placeholder) => Source::Placeholder(Decoder::new(&introspector.config, placeholder, path)),
            None => Source::Zero(ZeroDeserializer::new(
                &introspector.config,
                &introspector.zero_values,
                path,
            )),
        }
    }
}

macro_rules! probe {
    ($($method:ident($($arg:ident: $ty:ty),*) => $class:ident),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(mut self, $($arg: $ty,)* visitor: V) -> Result<V::Value> {
                match self.source(StorageClass::$class) {
                    Source::Placeholder(mut decoder) => (&mut decoder).$method($($arg,)* visitor),
                    Source::Zero(zero) => zero.$method($($arg,)* visitor),
                }
            }
        )*
    };
}

impl<'de, 'i, 'c> de::Deserializer<'de> for ColumnProbe<'i, 'c> {
    type Error = Error;

    probe! {
        deserialize_bool() => Integer,
        deserialize_i8() => Integer,
        deserialize_i16() => Integer,
        deserialize_i32() => Integer,
        deserialize_i64() => Integer,
        deserialize_i128() => Integer,
        deserialize_u8() => Integer,
        deserialize_u16() => Integer,
        deserialize_u32() => Integer,
        deserialize_u64() => Integer,
        deserialize_u128() => Integer,
        deserialize_f32() => Real,
        deserialize_f64() => Real,
        deserialize_char() => Text,
        deserialize_str() => Text,
        deserialize_string() => Text,
        deserialize_bytes() => Blob,
        deserialize_byte_buf() => Blob,
        deserialize_unit() => Null,
        deserialize_unit_struct(name: &'static str) => Null,
        deserialize_seq() => Blob,
        deserialize_tuple(len: usize) => Blob,
        deserialize_tuple_struct(name: &'static str, len: usize) => Blob,
        deserialize_map() => Blob,
        deserialize_struct(name: &'static str, fields: &'static [&'static str]) => Blob,
    }

    fn deserialize_enum<V: Visitor<'de>>(
        mut self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let carries_data = Cell::new(false);
        let visitor = VariantShape {
            inner: visitor,
            carries_data: &carries_data,
        };
        let value = match self.source(StorageClass::Text) {
            Source::Placeholder(mut decoder) => (&mut decoder).deserialize_enum(name, variants, visitor),
            Source::Zero(zero) => zero.deserialize_enum(name, variants, visitor),
        }?;
        if carries_data.get() {
            self.record(StorageClass::Blob);
        }
        Ok(value)
    }

    /// Self-describing field types take their class from a registered
    /// placeholder, and are otherwise stored as a blob.
    fn deserialize_any<V: Visitor<'de>>(mut self, visitor: V) -> Result<V::Value> {
        let introspector = self.introspector;
        if let Some(placeholder) = introspector.placeholders.get(self.field) {
            self.record(placeholder.storage_class());
            let mut decoder = Decoder::new(&introspector.config, placeholder, self.path);
            return (&mut decoder).deserialize_any(visitor);
        }
        self.record(StorageClass::Blob);
        let field = self.field;
        let path = self.path.clone();
        ZeroDeserializer::new(&introspector.config, &introspector.zero_values, self.path)
            .deserialize_any(visitor)
            .map_err(|e| {
                Error::fatal(
                    format!("cannot fabricate a placeholder for '{field}' ({e}); register one with with_placeholder"),
                    &path,
                )
            })
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        mut self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name != TIMESTAMP_TOKEN {
            return visitor.visit_newtype_struct(self);
        }
        match self.source(StorageClass::Blob) {
            Source::Placeholder(mut decoder) => (&mut decoder).deserialize_newtype_struct(name, visitor),
            Source::Zero(_) => visitor.visit_newtype_struct(EPOCH.into_deserializer()),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::fatal("identifiers cannot be stored as a column", &self.path))
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

/// Passes an enum through unchanged, noting whether the chosen variant
/// carries data.
struct VariantShape<'s, T> {
    inner: T,
    carries_data: &'s Cell<bool>,
}

impl<'de, 's, V: Visitor<'de>> Visitor<'de> for VariantShape<'s, V> {
    type Value = V::Value;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.inner.expecting(f)
    }

    fn visit_enum<A: de::EnumAccess<'de>>(self, data: A) -> std::result::Result<V::Value, A::Error> {
        self.inner.visit_enum(VariantShape {
            inner: data,
            carries_data: self.carries_data,
        })
    }
}

impl<'de, 's, A: de::EnumAccess<'de>> de::EnumAccess<'de> for VariantShape<'s, A> {
    type Error = A::Error;
    type Variant = VariantShape<'s, A::Variant>;

    fn variant_seed<S: DeserializeSeed<'de>>(
        self,
        seed: S,
    ) -> std::result::Result<(S::Value, Self::Variant), A::Error> {
        let (value, variant) = self.inner.variant_seed(seed)?;
        Ok((
            value,
            VariantShape {
                inner: variant,
                carries_data: self.carries_data,
            },
        ))
    }
}

impl<'de, 's, A: de::VariantAccess<'de>> de::VariantAccess<'de> for VariantShape<'s, A> {
    type Error = A::Error;

    fn unit_variant(self) -> std::result::Result<(), A::Error> {
        self.inner.unit_variant()
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(
        self,
        seed: T,
    ) -> std::result::Result<T::Value, A::Error> {
        self.carries_data.set(true);
        self.inner.newtype_variant_seed(seed)
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> std::result::Result<V::Value, A::Error> {
        self.carries_data.set(true);
        self.inner.tuple_variant(len, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> std::result::Result<V::Value, A::Error> {
        self.carries_data.set(true);
        self.inner.struct_variant(fields, visitor)
    }
}
