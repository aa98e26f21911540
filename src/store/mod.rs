//! Document store access
//!
//! The synchronizer only needs two reads from the authoritative store: one
//! document by id, and every document in a collection.

pub mod client;
pub mod errors;
pub mod types;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::Arc;

pub use client::FirestoreClient;
pub use errors::StoreError;
pub use types::{ContentBlock, Document};

/// Read-only view of a hosted document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document; a missing document is `StoreError::NotFound`.
    async fn get_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<ContentBlock, StoreError>;

    /// Fetch every document in a collection.
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError>;
}

/// Boxed future returned by the fetchers below
pub type FetchFuture = BoxFuture<'static, Result<ContentBlock, StoreError>>;

/// Build a fetch function that reads `collection/document_id`.
pub fn document_fetcher(
    store: Arc<dyn DocumentStore>,
    collection: impl Into<String>,
    document_id: impl Into<String>,
) -> impl Fn() -> FetchFuture + Send + Sync + Clone + 'static {
    let collection: Arc<str> = Arc::from(collection.into());
    let document_id: Arc<str> = Arc::from(document_id.into());
    move || {
        let store = Arc::clone(&store);
        let collection = Arc::clone(&collection);
        let document_id = Arc::clone(&document_id);
        async move { store.get_document(&collection, &document_id).await }.boxed()
    }
}

/// Build a fetch function that aggregates a whole collection.
///
/// The resulting block is `{"items": [...]}`, one object per document with
/// its id under `"id"`, in the order the store returned them.
pub fn collection_fetcher(
    store: Arc<dyn DocumentStore>,
    collection: impl Into<String>,
) -> impl Fn() -> FetchFuture + Send + Sync + Clone + 'static {
    let collection: Arc<str> = Arc::from(collection.into());
    move || {
        let store = Arc::clone(&store);
        let collection = Arc::clone(&collection);
        async move {
            let documents = store.list_documents(&collection).await?;
            let items = documents
                .into_iter()
                .map(|doc| Value::Object(doc.into_block()))
                .collect();
            let mut block = ContentBlock::new();
            block.insert("items".to_string(), Value::Array(items));
            Ok::<_, StoreError>(block)
        }
        .boxed()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory document store for tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        documents: Mutex<HashMap<String, ContentBlock>>,
        collections: Mutex<HashMap<String, Vec<Document>>>,
        failing: Mutex<Option<StoreError>>,
        pub gets: AtomicUsize,
        pub lists: AtomicUsize,
    }

    impl MemoryStore {
        pub fn put(&self, collection: &str, id: &str, block: ContentBlock) {
            self.documents
                .lock()
                .unwrap()
                .insert(format!("{}/{}", collection, id), block);
        }

        pub fn set_collection(&self, collection: &str, documents: Vec<Document>) {
            self.collections
                .lock()
                .unwrap()
                .insert(collection.to_string(), documents);
        }

        pub fn fail_with(&self, error: Option<StoreError>) {
            *self.failing.lock().unwrap() = error;
        }
    }

    #[async_trait]
    impl DocumentStore for MemoryStore {
        async fn get_document(
            &self,
            collection: &str,
            document_id: &str,
        ) -> Result<ContentBlock, StoreError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failing.lock().unwrap().clone() {
                return Err(err);
            }
            let path = format!("{}/{}", collection, document_id);
            self.documents
                .lock()
                .unwrap()
                .get(&path)
                .cloned()
                .ok_or(StoreError::NotFound(path))
        }

        async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failing.lock().unwrap().clone() {
                return Err(err);
            }
            Ok(self
                .collections
                .lock()
                .unwrap()
                .get(collection)
                .cloned()
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use serde_json::json;

    fn block(value: Value) -> ContentBlock {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_document_fetcher_reads_document() {
        let store = Arc::new(MemoryStore::default());
        store.put("home", "hero", block(json!({ "title": "X" })));

        let fetch = document_fetcher(store.clone(), "home", "hero");
        assert_eq!(fetch().await.unwrap(), block(json!({ "title": "X" })));

        let missing = document_fetcher(store, "home", "about");
        assert_eq!(
            missing().await.unwrap_err(),
            StoreError::NotFound("home/about".to_string())
        );
    }

    #[tokio::test]
    async fn test_collection_fetcher_aggregates_items() {
        let store = Arc::new(MemoryStore::default());
        store.set_collection(
            "blog",
            vec![
                Document {
                    id: "post-1".to_string(),
                    fields: block(json!({ "title": "Harvest loans" })),
                },
                Document {
                    id: "post-2".to_string(),
                    fields: block(json!({ "title": "Soil credit" })),
                },
            ],
        );

        let fetch = collection_fetcher(store, "blog");
        assert_eq!(
            fetch().await.unwrap(),
            block(json!({
                "items": [
                    { "id": "post-1", "title": "Harvest loans" },
                    { "id": "post-2", "title": "Soil credit" }
                ]
            }))
        );
    }
}
