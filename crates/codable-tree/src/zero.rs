//! Zero-value construction.
//!
//! The schema introspector needs a value for every field it visits so a
//! record's `Deserialize` can run to completion, even for fields whose type
//! it does not walk (nested records, sequences, maps). [`ZeroDeserializer`]
//! builds that value from the type's own shape: zero for numbers, empty for
//! text, bytes, sequences and maps, `None` for options, the first variant
//! for enums, and every field zeroed for records. A record type can also be
//! given an explicit zero tree by name, which is then decoded instead.

use crate::markers::TIMESTAMP_TOKEN;
use crate::reverse::Decoder;
use codable_core::{CodingPath, DecoderConfig, Error, Result, Value};
use serde::de::{self, DeserializeSeed, Deserializer, IntoDeserializer, Visitor};
use std::collections::HashMap;
use tracing::trace;

pub(crate) const EPOCH: &str = "1970-01-01T00:00:00Z";

const NO_FIELDS: &[&str] = &[];

/// Deserializer that yields the zero value of whatever is asked of it.
pub struct ZeroDeserializer<'a> {
    config: &'a DecoderConfig,
    registry: &'a HashMap<String, Value>,
    path: CodingPath,
}

impl<'a> ZeroDeserializer<'a> {
    pub fn new(
        config: &'a DecoderConfig,
        registry: &'a HashMap<String, Value>,
        path: CodingPath,
    ) -> Self {
        Self {
            config,
            registry,
            path,
        }
    }

    fn child(&self, path: CodingPath) -> Self {
        Self {
            config: self.config,
            registry: self.registry,
            path,
        }
    }

    fn cannot_fabricate(&self, what: &str) -> Error {
        Error::fatal(format!("cannot fabricate a zero value for {what}"), &self.path)
    }
}

macro_rules! zero_number {
    ($($method:ident => $visit:ident: $zero:expr),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                visitor.$visit($zero)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for ZeroDeserializer<'a> {
    type Error = Error;

    /// Self-describing types get integer zero, which numeric-like types
    /// (decimals, dynamic values) accept.
    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_i64(0)
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(false)
    }

    zero_number! {
        deserialize_i8 => visit_i8: 0,
        deserialize_i16 => visit_i16: 0,
        deserialize_i32 => visit_i32: 0,
        deserialize_i64 => visit_i64: 0,
        deserialize_i128 => visit_i128: 0,
        deserialize_u8 => visit_u8: 0,
        deserialize_u16 => visit_u16: 0,
        deserialize_u32 => visit_u32: 0,
        deserialize_u64 => visit_u64: 0,
        deserialize_u128 => visit_u128: 0,
        deserialize_f32 => visit_f32: 0.0,
        deserialize_f64 => visit_f64: 0.0,
        deserialize_char => visit_char: '\0',
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_str("")
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(String::new())
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(Vec::new())
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(Vec::new())
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_none()
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == TIMESTAMP_TOKEN {
            return visitor.visit_newtype_struct(EPOCH.into_deserializer());
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(ZeroElements {
            zero: self,
            remaining: 0,
            index: 0,
        })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(ZeroElements {
            zero: self,
            remaining: len,
            index: 0,
        })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_tuple(len, visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_map(ZeroFields {
            zero: self,
            fields: NO_FIELDS.iter(),
            pending: None,
        })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        if let Some(tree) = self.registry.get(name) {
            trace!(path = %self.path, record = name, "decoding registered zero value");
            let mut decoder = Decoder::new(self.config, tree, self.path.clone());
            return de::Deserializer::deserialize_struct(&mut decoder, name, fields, visitor);
        }
        visitor.visit_map(ZeroFields {
            zero: self,
            fields: fields.iter(),
            pending: None,
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match variants.first() {
            Some(variant) => visitor.visit_enum(ZeroVariant {
                zero: self,
                variant: *variant,
            }),
            None => Err(self.cannot_fabricate(&format!("enum {name} without variants"))),
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_str("")
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}

struct ZeroElements<'a> {
    zero: ZeroDeserializer<'a>,
    remaining: usize,
    index: usize,
}

impl<'de, 'a> de::SeqAccess<'de> for ZeroElements<'a> {
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let element = self.zero.child(self.zero.path.child_index(self.index));
        self.index += 1;
        seed.deserialize(element).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

struct ZeroFields<'a> {
    zero: ZeroDeserializer<'a>,
    fields: std::slice::Iter<'static, &'static str>,
    pending: Option<&'static str>,
}

impl<'de, 'a> de::MapAccess<'de> for ZeroFields<'a> {
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
            .ok_or_else(|| Error::fatal("map value requested before its key", &self.zero.path))?;
        seed.deserialize(self.zero.child(self.zero.path.child_key(field)))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.fields.len())
    }
}

struct ZeroVariant<'a> {
    zero: ZeroDeserializer<'a>,
    variant: &'static str,
}

impl<'de, 'a> de::EnumAccess<'de> for ZeroVariant<'a> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self)> {
        let variant = seed.deserialize(self.variant.into_deserializer())?;
        Ok((variant, self))
    }
}

impl<'de, 'a> de::VariantAccess<'de> for ZeroVariant<'a> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        let inner = self.zero.child(self.zero.path.child_key(self.variant));
        seed.deserialize(inner)
    }

    fn tuple_variant<V: Visitor<'de>>(self, len: usize, visitor: V) -> Result<V::Value> {
        let inner = self.zero.child(self.zero.path.child_key(self.variant));
        de::Deserializer::deserialize_tuple(inner, len, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let inner = self.zero.child(self.zero.path.child_key(self.variant));
        de::Deserializer::deserialize_struct(inner, self.variant, fields, visitor)
    }
}
