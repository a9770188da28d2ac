//! Storage classes harvested from record types without any data.

use dict_codable::{
    column_types, to_value, Blob, Error, SchemaIntrospector, StorageClass, Timestamp, Value,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use url::Url;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .try_init()
        .ok(); // Ignore if already initialized
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct Flagged {
    id: i64,
    name: String,
    flag: bool,
}

#[test]
fn test_introspection_is_deterministic() -> anyhow::Result<()> {
    init_logging();

    let expected = HashMap::from([
        ("id".to_string(), StorageClass::Integer),
        ("name".to_string(), StorageClass::Text),
        ("flag".to_string(), StorageClass::Integer),
    ]);
    assert_eq!(column_types::<Flagged>()?, expected);
    assert_eq!(column_types::<Flagged>()?, expected);
    Ok(())
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
enum Visibility {
    Public,
    Private,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct Author {
    name: String,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct Article {
    id: u64,
    rating: f32,
    title: String,
    body: Blob,
    published: Timestamp,
    summary: Option<String>,
    visibility: Visibility,
    author: Author,
    tags: Vec<String>,
    extra: BTreeMap<String, i32>,
    price: Decimal,
}

#[test]
fn test_article_columns() -> anyhow::Result<()> {
    init_logging();

    let columns = column_types::<Article>()?;
    let sql: BTreeMap<&str, &str> = columns
        .iter()
        .map(|(name, class)| (name.as_str(), class.sql_type()))
        .collect();

    assert_eq!(
        sql,
        BTreeMap::from([
            ("id", "INTEGER"),
            ("rating", "REAL"),
            ("title", "TEXT"),
            ("body", "BLOB"),
            ("published", "BLOB"),
            ("summary", "TEXT"),
            ("visibility", "TEXT"),
            ("author", "BLOB"),
            ("tags", "BLOB"),
            ("extra", "BLOB"),
            ("price", "BLOB"),
        ])
    );
    Ok(())
}

#[allow(dead_code)]
#[derive(Debug, Serialize, Deserialize)]
enum Shape {
    Circle(f64),
    Empty,
}

#[derive(Debug, Serialize, Deserialize)]
struct Drawing {
    id: i64,
    shape: Shape,
}

#[test]
fn test_data_enum_column_matches_encoded_value() -> anyhow::Result<()> {
    init_logging();

    let columns = column_types::<Drawing>()?;
    let tree = to_value(&Drawing {
        id: 1,
        shape: Shape::Circle(1.0),
    })?;

    let encoded = tree.get("shape").map(Value::storage_class);
    assert_eq!(encoded, Some(StorageClass::Blob));
    assert_eq!(Some(columns["shape"]), encoded);
    Ok(())
}

#[test]
fn test_placeholder_decides_self_describing_class() -> anyhow::Result<()> {
    #[allow(dead_code)]
    #[derive(Debug, Deserialize)]
    struct Priced {
        price: Decimal,
    }

    let columns = SchemaIntrospector::new()
        .with_placeholder("price", Value::Real(1.5))
        .column_types::<Priced>()?;
    assert_eq!(columns["price"], StorageClass::Real);
    Ok(())
}

#[test]
fn test_url_field_needs_placeholder() -> anyhow::Result<()> {
    #[allow(dead_code)]
    #[derive(Debug, Deserialize)]
    struct Bookmark {
        id: i32,
        target: Url,
    }

    let err = column_types::<Bookmark>().unwrap_err();
    assert!(matches!(err, Error::DataCorrupted { .. }));

    let columns = SchemaIntrospector::new()
        .with_placeholder("target", Value::from("https://example.com/"))
        .column_types::<Bookmark>()?;
    assert_eq!(columns["target"], StorageClass::Text);
    assert_eq!(columns["id"], StorageClass::Integer);
    Ok(())
}

#[test]
fn test_only_records_can_be_introspected() {
    let err = column_types::<String>().unwrap_err();
    assert!(matches!(err, Error::Fatal { .. }));

    let err = column_types::<Vec<Flagged>>().unwrap_err();
    assert!(matches!(err, Error::Fatal { .. }));
}
