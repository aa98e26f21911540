//! Document store types and Firestore value decoding
//!
//! Content blocks are handed to callers as plain JSON objects. The Firestore
//! REST API wraps every value in a type tag (`{"stringValue": "..."}`), so the
//! wire types below exist only to strip those tags.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A named bundle of display fields (titles, descriptions, image URLs).
pub type ContentBlock = Map<String, Value>;

/// A document returned by a collection listing
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Last segment of the document's resource name
    pub id: String,
    /// Decoded document fields
    pub fields: ContentBlock,
}

impl Document {
    /// The document's fields with its id folded in under `"id"`.
    ///
    /// An explicit `id` field stored in the document wins.
    pub fn into_block(self) -> ContentBlock {
        let mut block = self.fields;
        block
            .entry("id".to_string())
            .or_insert_with(|| Value::String(self.id));
        block
    }
}

/// Deserialize an i64 that might be encoded as a string.
/// Firestore encodes `integerValue` as a decimal string ("1536964279000")
/// but emulators and hand-written fixtures often use a bare number.
fn deserialize_flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct FlexibleI64Visitor;

    impl<'de> de::Visitor<'de> for FlexibleI64Visitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an i64 or a string containing an i64")
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
            i64::try_from(value).map_err(|_| de::Error::custom("integer out of range for i64"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<i64, E> {
            value.parse::<i64>().map_err(de::Error::custom)
        }
    }

    deserializer.deserialize_any(FlexibleI64Visitor)
}

/// A single Firestore typed value
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum FirestoreValue {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(#[serde(deserialize_with = "deserialize_flexible_i64")] i64),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeoPoint {
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ArrayValue {
    #[serde(default)]
    values: Vec<FirestoreValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MapValue {
    #[serde(default)]
    fields: BTreeMap<String, FirestoreValue>,
}

impl FirestoreValue {
    /// Strip the type tags, producing plain JSON.
    ///
    /// Timestamps stay RFC 3339 strings; non-finite doubles become null.
    pub(crate) fn into_json(self) -> Value {
        match self {
            FirestoreValue::NullValue(()) => Value::Null,
            FirestoreValue::BooleanValue(b) => Value::Bool(b),
            FirestoreValue::IntegerValue(i) => Value::Number(i.into()),
            FirestoreValue::DoubleValue(d) => {
                Number::from_f64(d).map(Value::Number).unwrap_or(Value::Null)
            }
            FirestoreValue::TimestampValue(s)
            | FirestoreValue::StringValue(s)
            | FirestoreValue::BytesValue(s)
            | FirestoreValue::ReferenceValue(s) => Value::String(s),
            FirestoreValue::GeoPointValue(p) => {
                let mut map = Map::new();
                map.insert("latitude".to_string(), json_f64(p.latitude));
                map.insert("longitude".to_string(), json_f64(p.longitude));
                Value::Object(map)
            }
            FirestoreValue::ArrayValue(a) => {
                Value::Array(a.values.into_iter().map(FirestoreValue::into_json).collect())
            }
            FirestoreValue::MapValue(m) => Value::Object(decode_fields(m.fields)),
        }
    }
}

fn json_f64(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

pub(crate) fn decode_fields(fields: BTreeMap<String, FirestoreValue>) -> ContentBlock {
    fields
        .into_iter()
        .map(|(name, value)| (name, value.into_json()))
        .collect()
}

/// A document resource as returned by the REST API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawDocument {
    /// Full resource name: `projects/.../documents/<collection>/<id>`
    pub name: String,
    /// Missing entirely when the document has no fields
    #[serde(default)]
    pub fields: BTreeMap<String, FirestoreValue>,
}

impl RawDocument {
    pub(crate) fn into_document(self) -> Document {
        let id = self
            .name
            .rsplit('/')
            .next()
            .unwrap_or(self.name.as_str())
            .to_string();
        Document {
            id,
            fields: decode_fields(self.fields),
        }
    }
}

/// Response from a collection listing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListDocumentsResponse {
    /// Omitted by the API when the collection is empty
    #[serde(default)]
    pub documents: Vec<RawDocument>,
    /// Token for the next page (None if no more documents)
    #[serde(default)]
    pub next_page_token: Option<String>,
}
