//! Observer and event-sink surfaces.
//!
//! Observers get structured lifecycle notifications; the event sink is a
//! write-only breadcrumb trail for humans, not required for correctness.

use crate::request::SavePageRequest;

/// Terminal outcome reported with `on_completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePageResult {
    Success,
    LoadingFailure,
    LoadingCanceled,
    Expired,
    RetryCountExceeded,
    Removed,
}

/// Registerable listener for request lifecycle events.
pub trait CoordinatorObserver: Send + Sync {
    fn on_added(&self, request: &SavePageRequest);
    fn on_changed(&self, request: &SavePageRequest);
    fn on_completed(&self, request: &SavePageRequest, result: SavePageResult);
}

/// Human-readable processing breadcrumbs (add/update/drop).
pub trait EventSink: Send + Sync {
    fn record(&self, event: &str);
}

/// Default sink: forward breadcrumbs to `tracing` at info level.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &str) {
        tracing::info!(target: "opq_events", "{event}");
    }
}
