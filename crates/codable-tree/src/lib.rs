//! Conversion engines between serde types and [`Value`] trees.
//!
//! - [`TreeEncoder`] turns any `Serialize` value into a [`Value`] tree
//! - [`TreeDecoder`] drives a `Deserialize` implementation over a tree,
//!   coercing scalars and reporting failures with the path of the offending node
//! - [`SchemaIntrospector`] runs a record's `Deserialize` without any tree and
//!   reports the storage class of each field
//!
//! Dates and raw bytes are not distinguishable from text and sequences in
//! serde's data model. Fields that should go through the date and data
//! strategies use the [`Timestamp`] and [`Blob`] wrappers, or the
//! [`timestamp`] and [`blob`] `with` modules.
//!
//! ```
//! use codable_tree::{TreeDecoder, TreeEncoder};
//!
//! #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
//! struct Item { sku: String, qty: u16 }
//!
//! let item = Item { sku: "A-1".into(), qty: 3 };
//! let tree = TreeEncoder::new().encode(&item).unwrap();
//! let back: Item = TreeDecoder::new().decode(&tree).unwrap();
//! assert_eq!(back, item);
//! ```
//!
//! [`Value`]: codable_core::Value

pub mod defaults;
pub mod forward;
pub mod introspect;
pub mod markers;
pub mod reverse;
pub mod zero;

pub use forward::TreeEncoder;
pub use introspect::SchemaIntrospector;
pub use markers::{blob, timestamp, Blob, Timestamp};
pub use reverse::TreeDecoder;
