//! Remote-content cache synchronization
//!
//! Ties the local cache to the document store: TTL-bounded serving,
//! change-marker driven background refresh, and field-level fallback to
//! static defaults.

pub mod clock;
pub mod fallback;
pub mod markers;
pub mod synchronizer;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use fallback::merge_with_defaults;
pub use markers::{ChangeMarker, ChangeMarkerFeed};
pub use synchronizer::{ContentSynchronizer, SyncSettings, SyncStats, SynchronizerBuilder};
pub use telemetry::{RecordingTelemetry, SyncEvent, SyncTelemetry, TracingTelemetry};
