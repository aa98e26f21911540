//! content-sync - cached, change-aware loading of remote page content
//!
//! Page components ask a [`ContentSynchronizer`] for a content block. It
//! answers from local storage while the entry is fresh, refreshes in the
//! background when the page's change-markers show an upstream edit, and falls
//! back to a static default whenever the document store cannot help.

pub mod cache;
pub mod config;
pub mod store;
pub mod sync;

pub use cache::{CacheEntry, FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use config::Settings;
pub use store::{
    collection_fetcher, document_fetcher, ContentBlock, Document, DocumentStore, FirestoreClient,
    StoreError,
};
pub use sync::{
    ChangeMarker, ChangeMarkerFeed, ContentSynchronizer, SyncEvent, SyncSettings, SyncStats,
    SyncTelemetry,
};
