//! Content Synchronizer
//!
//! Serves page content from local storage while it is fresh, and keeps it
//! eventually consistent with the document store:
//!
//! - a fresh entry is returned immediately, then a background task checks the
//!   page's change-markers and refetches if an edit was published since the
//!   entry was last checked
//! - a missing, expired or unreadable entry is refetched before returning
//! - a failed fetch returns the caller's default and writes nothing
//!
//! Loads never fail. Everything that goes wrong is reported through
//! [`SyncTelemetry`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::fallback::merge_with_defaults;
use super::markers::ChangeMarkerFeed;
use super::telemetry::{SyncEvent, SyncTelemetry, TracingTelemetry};
use crate::cache::{CacheEntry, KeyValueStorage};
use crate::store::{ContentBlock, StoreError};

/// Default time-to-live for cached content (30 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Default bound on a single remote read
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing knobs for a synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Entries at least this old are refetched before serving
    pub ttl: Duration,
    /// Remote reads taking longer than this count as failed
    pub fetch_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Counters since the synchronizer was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Loads served from a fresh entry
    pub hits: u64,
    /// Loads that had to fetch
    pub misses: u64,
    /// Successful remote fetches, foreground and background
    pub fetches: u64,
    /// Loads that returned the default value
    pub fallbacks: u64,
}

impl SyncStats {
    /// Percentage of loads served from cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            (self.hits as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// A fetch shared by every concurrent caller for the same key
type Flight = Arc<OnceCell<Result<ContentBlock, StoreError>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Inner {
    feed: ChangeMarkerFeed,
    storage: Arc<dyn KeyValueStorage>,
    telemetry: Arc<dyn SyncTelemetry>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
    /// In-flight fetches by content key
    inflight: Mutex<HashMap<String, Flight>>,
    /// Spawned change checks not yet awaited by `settle`
    background: Mutex<Vec<JoinHandle<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    fallbacks: AtomicU64,
}

/// Cache synchronizer for one page's content
///
/// Cheap to clone; clones share storage, counters and in-flight fetches.
#[derive(Clone)]
pub struct ContentSynchronizer {
    inner: Arc<Inner>,
}

/// Builder for [`ContentSynchronizer`]
pub struct SynchronizerBuilder {
    feed: ChangeMarkerFeed,
    storage: Arc<dyn KeyValueStorage>,
    telemetry: Arc<dyn SyncTelemetry>,
    clock: Arc<dyn Clock>,
    settings: SyncSettings,
}

impl SynchronizerBuilder {
    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn SyncTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> ContentSynchronizer {
        ContentSynchronizer {
            inner: Arc::new(Inner {
                feed: self.feed,
                storage: self.storage,
                telemetry: self.telemetry,
                clock: self.clock,
                settings: self.settings,
                inflight: Mutex::new(HashMap::new()),
                background: Mutex::new(Vec::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                fetches: AtomicU64::new(0),
                fallbacks: AtomicU64::new(0),
            }),
        }
    }
}

impl ContentSynchronizer {
    /// Synchronizer with default settings, tracing telemetry and the system clock
    pub fn new(feed: ChangeMarkerFeed, storage: Arc<dyn KeyValueStorage>) -> Self {
        Self::builder(feed, storage).build()
    }

    /// Start configuring a synchronizer
    ///
    /// # Arguments
    /// * `feed` - Change-markers of the page this synchronizer serves
    /// * `storage` - Local storage; may be shared with other pages' synchronizers
    pub fn builder(
        feed: ChangeMarkerFeed,
        storage: Arc<dyn KeyValueStorage>,
    ) -> SynchronizerBuilder {
        SynchronizerBuilder {
            feed,
            storage,
            telemetry: Arc::new(TracingTelemetry),
            clock: Arc::new(SystemClock),
            settings: SyncSettings::default(),
        }
    }

    /// Load the content block stored under `content_key`.
    ///
    /// # Arguments
    /// * `content_key` - Local cache slot for this block
    /// * `fetch_fn` - Reads the block from the document store
    /// * `default_value` - Returned when no fresh entry exists and the fetch
    ///   fails; also supplies fields the fetched block is missing
    ///
    /// # Returns
    /// The cached or fetched block, or `default_value`
    pub async fn load_content<F, Fut>(
        &self,
        content_key: &str,
        fetch_fn: F,
        default_value: &ContentBlock,
    ) -> ContentBlock
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ContentBlock, StoreError>> + Send + 'static,
    {
        let inner = &self.inner;
        let now = inner.clock.now_millis();

        if let Some(entry) = inner.read_entry(content_key) {
            let age_millis = entry.age_millis(now);
            if entry.is_fresh(now, inner.settings.ttl) {
                inner.hits.fetch_add(1, Ordering::Relaxed);
                inner.telemetry.record(SyncEvent::CacheHit {
                    key: content_key.to_string(),
                    age_millis,
                });
                self.spawn_change_check(content_key, entry.last_meta_check_epoch_millis, fetch_fn);
                return inner.with_defaults(content_key, &entry.data, default_value);
            }
            inner.telemetry.record(SyncEvent::Expired {
                key: content_key.to_string(),
                age_millis,
            });
        }

        inner.misses.fetch_add(1, Ordering::Relaxed);
        inner.telemetry.record(SyncEvent::CacheMiss {
            key: content_key.to_string(),
        });

        match inner.fetch_shared(content_key, &fetch_fn, i64::MIN, false).await {
            Ok(data) => inner.with_defaults(content_key, &data, default_value),
            Err(_) => {
                inner.fallbacks.fetch_add(1, Ordering::Relaxed);
                default_value.clone()
            }
        }
    }

    /// Drop the cached entry for `content_key`
    pub fn invalidate(&self, content_key: &str) {
        if let Err(e) = self.inner.storage.remove(content_key) {
            self.inner.telemetry.record(SyncEvent::StorageFailed {
                key: content_key.to_string(),
                error: e.to_string(),
            });
        }
        debug!(key = content_key, "Invalidated cached content");
    }

    /// The stored entry for `content_key`, fresh or not
    pub fn cached_entry(&self, content_key: &str) -> Option<CacheEntry> {
        self.inner.read_entry(content_key)
    }

    /// Wait for every background change check spawned so far
    pub async fn settle(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.inner.background));
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background change check panicked");
                }
            }
        }
    }

    /// Page whose change-markers this synchronizer follows
    pub fn page(&self) -> &str {
        self.inner.feed.page()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> SyncStats {
        let inner = &self.inner;
        SyncStats {
            hits: inner.hits.load(Ordering::Relaxed),
            misses: inner.misses.load(Ordering::Relaxed),
            fetches: inner.fetches.load(Ordering::Relaxed),
            fallbacks: inner.fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Log current counters
    pub fn log_metrics(&self) {
        let stats = self.stats();
        debug!(
            page = %self.page(),
            hits = stats.hits,
            misses = stats.misses,
            fetches = stats.fetches,
            fallbacks = stats.fallbacks,
            hit_rate = format!("{:.1}%", stats.hit_rate()),
            "Content sync metrics"
        );
    }

    fn spawn_change_check<F, Fut>(&self, content_key: &str, last_checked: i64, fetch_fn: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ContentBlock, StoreError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let key = content_key.to_string();
        let handle = tokio::spawn(async move {
            inner.check_for_changes(&key, last_checked, &fetch_fn).await;
        });

        let mut background = lock(&self.inner.background);
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }
}

impl Inner {
    /// Read and parse the entry; corrupt entries are removed
    fn read_entry(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                self.telemetry.record(SyncEvent::StorageFailed {
                    key: key.to_string(),
                    error: e.to_string(),
                });
                return None;
            }
        };

        match CacheEntry::decode(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.telemetry.record(SyncEvent::CacheCorrupt {
                    key: key.to_string(),
                    error: e.to_string(),
                });
                if let Err(e) = self.storage.remove(key) {
                    self.telemetry.record(SyncEvent::StorageFailed {
                        key: key.to_string(),
                        error: e.to_string(),
                    });
                }
                None
            }
        }
    }

    fn write_entry(&self, key: &str, entry: &CacheEntry) {
        let result = entry
            .encode()
            .map_err(|e| e.to_string())
            .and_then(|raw| self.storage.set(key, &raw).map_err(|e| e.to_string()));
        if let Err(error) = result {
            self.telemetry.record(SyncEvent::StorageFailed {
                key: key.to_string(),
                error,
            });
        }
    }

    fn with_defaults(
        &self,
        key: &str,
        data: &ContentBlock,
        defaults: &ContentBlock,
    ) -> ContentBlock {
        let (merged, filled) = merge_with_defaults(data, defaults);
        if !filled.is_empty() {
            self.telemetry.record(SyncEvent::MalformedContent {
                key: key.to_string(),
                fields: filled,
            });
        }
        merged
    }

    /// Fetch once per key no matter how many callers are waiting.
    ///
    /// Only the caller that runs the fetch writes the entry. Its
    /// `lastMetaCheckEpochMillis` is `now`, raised to `meta_floor` when the
    /// triggering marker is stamped later than the local clock.
    async fn fetch_shared<F, Fut>(
        &self,
        key: &str,
        fetch_fn: &F,
        meta_floor: i64,
        background: bool,
    ) -> Result<ContentBlock, StoreError>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<ContentBlock, StoreError>> + Send,
    {
        let flight: Flight = {
            let mut inflight = lock(&self.inflight);
            Arc::clone(inflight.entry(key.to_string()).or_default())
        };

        let result = flight
            .get_or_init(|| async {
                let timeout = self.settings.fetch_timeout;
                let result = match tokio::time::timeout(timeout, fetch_fn()).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Timeout),
                };

                match &result {
                    Ok(data) => {
                        let now = self.clock.now_millis();
                        let mut entry = CacheEntry::fetched(data.clone(), now);
                        entry.last_meta_check_epoch_millis = now.max(meta_floor);
                        self.write_entry(key, &entry);
                        self.fetches.fetch_add(1, Ordering::Relaxed);
                        self.telemetry.record(SyncEvent::Fetched {
                            key: key.to_string(),
                            background,
                        });
                    }
                    Err(e) => {
                        self.telemetry.record(SyncEvent::RemoteUnavailable {
                            key: key.to_string(),
                            error: e.to_string(),
                            transient: e.is_unavailable(),
                        });
                    }
                }
                result
            })
            .await
            .clone();

        {
            let mut inflight = lock(&self.inflight);
            if inflight.get(key).is_some_and(|current| Arc::ptr_eq(current, &flight)) {
                inflight.remove(key);
            }
        }

        result
    }

    /// Refetch `key` if the page published an edit after `last_checked`
    async fn check_for_changes<F, Fut>(&self, key: &str, last_checked: i64, fetch_fn: &F)
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<ContentBlock, StoreError>> + Send,
    {
        let newest = match tokio::time::timeout(
            self.settings.fetch_timeout,
            self.feed.newest_since(last_checked),
        )
        .await
        {
            Ok(Ok(newest)) => newest,
            Ok(Err(e)) => {
                self.telemetry.record(SyncEvent::MarkerCheckFailed {
                    key: key.to_string(),
                    error: e.to_string(),
                });
                return;
            }
            Err(_) => {
                self.telemetry.record(SyncEvent::MarkerCheckFailed {
                    key: key.to_string(),
                    error: StoreError::Timeout.to_string(),
                });
                return;
            }
        };

        let Some(marker) = newest else {
            return;
        };

        self.telemetry.record(SyncEvent::ChangeDetected {
            key: key.to_string(),
            section: marker.section,
            timestamp_millis: marker.timestamp_millis,
        });

        // A failed refresh leaves the current entry in place
        let _ = self
            .fetch_shared(key, fetch_fn, marker.timestamp_millis, true)
            .await;
    }
}
