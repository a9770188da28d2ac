//! Substitute values for record fields whose key is absent.
//!
//! Used only under [`MissingKeyStrategy::UseDefault`]. Each primitive has a
//! canonical default: `false`, zero, empty text, empty bytes, the current
//! time for timestamps, `None` for options and an empty sequence. Nested
//! records have no implicit default; they succeed only when a default tree
//! has been registered for the record's type name with
//! [`DecoderConfig::with_default`].
//!
//! [`MissingKeyStrategy::UseDefault`]: codable_core::MissingKeyStrategy::UseDefault

use crate::markers::TIMESTAMP_TOKEN;
use crate::reverse::Decoder;
use chrono::{SecondsFormat, Utc};
use codable_core::{CodingPath, DecoderConfig, Error, Result};
use serde::de::{self, value::SeqDeserializer, IntoDeserializer, Visitor};
use tracing::trace;

/// Deserializer standing in for an absent key.
pub struct DefaultDeserializer<'a> {
    config: &'a DecoderConfig,
    key: &'static str,
    /// Path of the record that lacks the key.
    path: CodingPath,
}

impl<'a> DefaultDeserializer<'a> {
    pub fn new(config: &'a DecoderConfig, key: &'static str, path: CodingPath) -> Self {
        Self { config, key, path }
    }

    fn no_default(&self) -> Error {
        Error::key_not_found(self.key, &self.path)
    }
}

macro_rules! zero_integer {
    ($($method:ident => $visit:ident),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                visitor.$visit(0)
            }
        )*
    };
}

impl<'de, 'a> de::Deserializer<'de> for DefaultDeserializer<'a> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(self.no_default())
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(false)
    }

    zero_integer! {
        deserialize_i8 => visit_i8,
        deserialize_i16 => visit_i16,
        deserialize_i32 => visit_i32,
        deserialize_i64 => visit_i64,
        deserialize_i128 => visit_i128,
        deserialize_u8 => visit_u8,
        deserialize_u16 => visit_u16,
        deserialize_u32 => visit_u32,
        deserialize_u64 => visit_u64,
        deserialize_u128 => visit_u128,
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f32(0.0)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_f64(0.0)
    }

    fn deserialize_char<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(self.no_default())
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
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
            return visitor.visit_newtype_struct(now.into_deserializer());
        }
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(SeqDeserializer::<_, Error>::new(std::iter::empty::<u8>()))
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, _visitor: V) -> Result<V::Value> {
        Err(self.no_default())
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value> {
        Err(self.no_default())
    }

    fn deserialize_map<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(self.no_default())
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        let Some(tree) = self.config.defaults.get(name) else {
            return Err(self.no_default());
        };
        trace!(path = %self.path, key = self.key, record = name, "using registered default");
        let mut decoder = Decoder::new(self.config, tree, self.path.child_key(self.key));
        de::Deserializer::deserialize_struct(&mut decoder, name, fields, visitor)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value> {
        Err(self.no_default())
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(self.no_default())
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }
}
