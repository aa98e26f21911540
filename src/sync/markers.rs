//! Change-marker feed
//!
//! The content editor appends `{section, timestamp}` documents to
//! `<page>/meta/changes` whenever it publishes an edit. This client only
//! reads them.

use serde_json::Value;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::store::{Document, DocumentStore, StoreError};

/// A published edit to one section of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMarker {
    /// Human-readable section name ("hero", "about", ...)
    pub section: String,
    /// When the edit was published (ms since epoch)
    pub timestamp_millis: i64,
}

impl ChangeMarker {
    /// Parse a marker document; `None` if it has no usable timestamp.
    ///
    /// A document without a `section` field is named after its id.
    pub fn from_document(doc: &Document) -> Option<Self> {
        let timestamp_millis = doc.fields.get("timestamp").and_then(parse_timestamp)?;
        let section = doc
            .fields
            .get("section")
            .and_then(Value::as_str)
            .unwrap_or(doc.id.as_str())
            .to_string();
        Some(Self {
            section,
            timestamp_millis,
        })
    }
}

/// Interpret a timestamp field.
///
/// Accepts an RFC 3339 string, integer epoch milliseconds, or an object with
/// `seconds`/`nanoseconds` (also `_seconds`/`_nanoseconds`).
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| s.parse::<i64>().ok()),
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            Some(seconds.saturating_mul(1000).saturating_add(nanos / 1_000_000))
        }
        _ => None,
    }
}

/// Reader for one page's change-marker collection
#[derive(Clone)]
pub struct ChangeMarkerFeed {
    store: Arc<dyn DocumentStore>,
    page: String,
    collection: String,
}

impl ChangeMarkerFeed {
    /// Feed for `<page>/meta/changes`
    pub fn new(store: Arc<dyn DocumentStore>, page: impl Into<String>) -> Self {
        let page = page.into();
        let collection = format!("{}/meta/changes", page);
        Self {
            store,
            page,
            collection,
        }
    }

    /// Page this feed belongs to
    pub fn page(&self) -> &str {
        &self.page
    }

    /// Collection path holding the markers
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// All parseable markers, in store order
    pub async fn markers(&self) -> Result<Vec<ChangeMarker>, StoreError> {
        let documents = self.store.list_documents(&self.collection).await?;

        let markers = documents
            .iter()
            .filter_map(|doc| {
                let marker = ChangeMarker::from_document(doc);
                if marker.is_none() {
                    warn!(
                        collection = %self.collection,
                        id = %doc.id,
                        "Skipping change-marker without a timestamp"
                    );
                }
                marker
            })
            .collect::<Vec<_>>();

        trace!(collection = %self.collection, count = markers.len(), "Read change-markers");
        Ok(markers)
    }

    /// The newest marker strictly after `since_millis`, if any
    pub async fn newest_since(
        &self,
        since_millis: i64,
    ) -> Result<Option<ChangeMarker>, StoreError> {
        Ok(self
            .markers()
            .await?
            .into_iter()
            .filter(|m| m.timestamp_millis > since_millis)
            .max_by_key(|m| m.timestamp_millis))
    }
}
