//! Synchronizer telemetry
//!
//! Every notable step of a load is reported as a [`SyncEvent`]. The default
//! sink writes them to `tracing`; tests swap in [`RecordingTelemetry`].

use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Something the synchronizer did or recovered from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Served a fresh entry from local storage
    CacheHit { key: String, age_millis: i64 },
    /// No usable entry; a remote fetch follows
    CacheMiss { key: String },
    /// An entry existed but had outlived the TTL
    Expired { key: String, age_millis: i64 },
    /// A stored entry could not be parsed and was removed
    CacheCorrupt { key: String, error: String },
    /// The remote fetch succeeded and the entry was (re)written
    Fetched { key: String, background: bool },
    /// The remote fetch failed; the caller got the default value.
    /// `transient` is set when the store could not be reached or did not
    /// answer in time, as opposed to answering with an error.
    RemoteUnavailable {
        key: String,
        error: String,
        transient: bool,
    },
    /// Fetched content lacked fields that were filled from the default value
    MalformedContent { key: String, fields: Vec<String> },
    /// A change-marker newer than the last check was observed
    ChangeDetected { key: String, section: String, timestamp_millis: i64 },
    /// A background refresh could not read the change-marker feed
    MarkerCheckFailed { key: String, error: String },
    /// Local storage refused a read, write or remove
    StorageFailed { key: String, error: String },
}

/// Sink for synchronizer events
pub trait SyncTelemetry: Send + Sync {
    fn record(&self, event: SyncEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl SyncTelemetry for TracingTelemetry {
    fn record(&self, event: SyncEvent) {
        match event {
            SyncEvent::CacheHit { key, age_millis } => {
                debug!(key = %key, age_ms = age_millis, "Content cache HIT");
            }
            SyncEvent::CacheMiss { key } => {
                debug!(key = %key, "Content cache MISS");
            }
            SyncEvent::Expired { key, age_millis } => {
                debug!(key = %key, age_ms = age_millis, "Content cache entry expired");
            }
            SyncEvent::CacheCorrupt { key, error } => {
                warn!(key = %key, error = %error, "Discarding corrupt cache entry");
            }
            SyncEvent::Fetched { key, background } => {
                info!(key = %key, background = background, "Fetched content from store");
            }
            SyncEvent::RemoteUnavailable {
                key,
                error,
                transient: true,
            } => {
                warn!(key = %key, error = %error, "Content store unreachable, serving default");
            }
            SyncEvent::RemoteUnavailable { key, error, .. } => {
                info!(key = %key, error = %error, "Content fetch rejected, serving default");
            }
            SyncEvent::MalformedContent { key, fields } => {
                warn!(key = %key, fields = ?fields, "Content missing fields, using defaults");
            }
            SyncEvent::ChangeDetected {
                key,
                section,
                timestamp_millis,
            } => {
                info!(
                    key = %key,
                    section = %section,
                    ts = timestamp_millis,
                    "Upstream change detected"
                );
            }
            SyncEvent::MarkerCheckFailed { key, error } => {
                warn!(key = %key, error = %error, "Change-marker check failed");
            }
            SyncEvent::StorageFailed { key, error } => {
                warn!(key = %key, error = %error, "Local storage error");
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of recorded events matching `pred`
    pub fn count(&self, pred: impl Fn(&SyncEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl SyncTelemetry for RecordingTelemetry {
    fn record(&self, event: SyncEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
