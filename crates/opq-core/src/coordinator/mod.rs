//! Request coordinator: the top-level orchestrator.
//!
//! Owns the policy and queue, drives the processing windows, applies time
//! budgets and the per-page watchdog, and exposes the scheduling control
//! surface to the embedding process. All public entry points are meant to be
//! driven from one logical control flow; internal state lives behind a mutex
//! that is never held across an await.

mod processing;

pub use processing::StopReason;

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::sync::{oneshot, watch};

use crate::conditions::DeviceConditions;
use crate::events::{CoordinatorObserver, EventSink, SavePageResult, TracingEventSink};
use crate::offliner::OfflinerFactory;
use crate::policy::{OfflinerPolicy, ProcessingWindow};
use crate::queue::{RequestQueue, StoreError, UpdateResult};
use crate::request::{ClientId, RequestId, RequestState, SavePageRequest};
use crate::sched::Scheduler;

/// Whether the new request enters the normal dispatch path or is held for an
/// external subsystem that will complete it out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAvailability {
    EnabledForOffliner,
    DisabledForOffliner,
}

/// Inputs to [`RequestCoordinator::save_page_later`].
#[derive(Debug, Clone)]
pub struct SavePageLaterParams {
    pub url: String,
    pub client_id: ClientId,
    pub user_requested: bool,
    pub availability: RequestAvailability,
    /// Optional unix-seconds timestamp before which the request is held.
    pub activation_time: Option<i64>,
}

impl SavePageLaterParams {
    pub fn new(url: impl Into<String>, client_id: ClientId, user_requested: bool) -> Self {
        Self {
            url: url.into(),
            client_id,
            user_requested,
            availability: RequestAvailability::EnabledForOffliner,
            activation_time: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SavePageError {
    #[error("url not supported for saving")]
    UrlNotSupported,
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Shared {
    busy: bool,
    /// The request currently dispatched to the offliner, if any.
    active: Option<SavePageRequest>,
    disabled: HashSet<RequestId>,
    observers: Vec<Arc<dyn CoordinatorObserver>>,
    /// Latest device snapshot from the platform observer; pessimistic until
    /// one arrives.
    conditions: DeviceConditions,
}

/// Cheaply clonable handle; all clones share one coordinator.
#[derive(Clone)]
pub struct RequestCoordinator {
    policy: Arc<OfflinerPolicy>,
    queue: RequestQueue,
    factory: Arc<dyn OfflinerFactory>,
    scheduler: Arc<dyn Scheduler>,
    events: Arc<dyn EventSink>,
    shared: Arc<Mutex<Shared>>,
    stop_tx: Arc<watch::Sender<Option<StopReason>>>,
    next_id: Arc<AtomicI64>,
}

/// Current time as unix seconds.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl RequestCoordinator {
    /// Build a coordinator over the given queue and collaborators, reverting
    /// any request stranded `Offlining` by a previous process.
    pub async fn new(
        policy: OfflinerPolicy,
        queue: RequestQueue,
        factory: Arc<dyn OfflinerFactory>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        if let Err(e) = queue.reconcile().await {
            tracing::warn!("queue reconcile failed: {e}");
        }
        let (stop_tx, _) = watch::channel(None);
        Self {
            policy: Arc::new(policy),
            queue,
            factory,
            scheduler,
            events: Arc::new(TracingEventSink),
            shared: Arc::new(Mutex::new(Shared {
                busy: false,
                active: None,
                disabled: HashSet::new(),
                observers: Vec::new(),
                conditions: DeviceConditions::default(),
            })),
            stop_tx: Arc::new(stop_tx),
            // Millisecond seed keeps ids distinct across process restarts.
            next_id: Arc::new(AtomicI64::new(unix_timestamp_millis())),
        }
    }

    /// Replace the default tracing-backed event sink.
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn add_observer(&self, observer: Arc<dyn CoordinatorObserver>) {
        self.shared.lock().unwrap().observers.push(observer);
    }

    pub fn policy(&self) -> &OfflinerPolicy {
        &self.policy
    }

    /// Enqueue a page for background saving. Returns the assigned request id.
    pub async fn save_page_later(
        &self,
        params: SavePageLaterParams,
    ) -> Result<RequestId, SavePageError> {
        if !url_accepted(&params.url) {
            return Err(SavePageError::UrlNotSupported);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request = SavePageRequest::new(
            id,
            params.url,
            params.client_id,
            unix_timestamp(),
            params.user_requested,
        );
        request.activation_time = params.activation_time;

        let request = self.queue.add_request(request).await?;
        self.events
            .record(&format!("added request {} for {}", id, request.url));
        self.notify_added(&request);
        self.scheduler
            .schedule(&self.policy.trigger_conditions(params.user_requested));

        match params.availability {
            RequestAvailability::DisabledForOffliner => {
                // An external subsystem owns this request until it calls
                // enable_for_offliner or mark_request_completed. The attempt
                // budget starts ticking now.
                self.shared.lock().unwrap().disabled.insert(id);
                if let Err(e) = self.queue.mark_attempt_started(id).await {
                    tracing::warn!("mark disabled request {id} started failed: {e}");
                }
            }
            RequestAvailability::EnabledForOffliner => {
                if params.user_requested {
                    self.start_immediate_if_connected();
                }
            }
        }

        Ok(id)
    }

    /// All persisted requests, order unspecified.
    pub async fn get_all_requests(&self) -> Result<Vec<SavePageRequest>, StoreError> {
        self.queue.get_requests().await
    }

    /// Remove the given requests, canceling the active one first if targeted.
    /// Observers get `on_completed(Removed)` for each removed body.
    pub async fn remove_requests(&self, ids: &[RequestId]) -> UpdateResult {
        self.stop_if_active_targeted(ids, StopReason::Removed);
        let result = self.queue.remove_requests(ids).await;
        for request in &result.updated {
            self.events.record(&format!("removed request {}", request.id));
            self.notify_completed(request, SavePageResult::Removed);
        }
        result
    }

    /// Pause the given requests; a paused request is never picked until
    /// resumed.
    pub async fn pause_requests(&self, ids: &[RequestId]) -> UpdateResult {
        self.stop_if_active_targeted(ids, StopReason::Paused);
        let result = self
            .queue
            .change_requests_state(ids, RequestState::Paused)
            .await;
        for request in &result.updated {
            self.notify_changed(request);
        }
        result
    }

    /// Resume previously paused requests and ask the scheduler for a wake-up.
    pub async fn resume_requests(&self, ids: &[RequestId]) -> UpdateResult {
        let result = self
            .queue
            .change_requests_state(ids, RequestState::Available)
            .await;
        for request in &result.updated {
            self.notify_changed(request);
        }
        if !result.updated.is_empty() {
            let user_requested = result.updated.iter().any(|r| r.user_requested);
            self.scheduler
                .schedule(&self.policy.trigger_conditions(user_requested));
        }
        result
    }

    /// The external subsystem that held this request is done with it without
    /// completing it: hand it back to the normal dispatch path.
    pub async fn enable_for_offliner(&self, id: RequestId) {
        self.shared.lock().unwrap().disabled.remove(&id);
        match self.queue.mark_attempt_aborted(id).await {
            Ok(request) => self.notify_changed(&request),
            Err(e) => tracing::warn!("enable_for_offliner({id}) failed: {e}"),
        }
    }

    /// The external subsystem completed this request out of band.
    pub async fn mark_request_completed(&self, id: RequestId) {
        self.shared.lock().unwrap().disabled.remove(&id);
        let result = self.queue.remove_requests(&[id]).await;
        for request in &result.updated {
            self.events
                .record(&format!("request {} completed externally", request.id));
            self.notify_completed(request, SavePageResult::Success);
        }
    }

    /// Platform observer hook: cache the snapshot and re-evaluate the
    /// immediate fast path when connectivity appears.
    pub fn on_connectivity_changed(&self, conditions: DeviceConditions) {
        self.shared.lock().unwrap().conditions = conditions;
        if conditions.connection.is_connected() {
            // Receiver intentionally dropped; the window runs unobserved.
            let _ = self.start_immediate_processing(conditions);
        }
    }

    fn start_immediate_if_connected(&self) {
        let conditions = self.shared.lock().unwrap().conditions;
        if conditions.connection.is_connected() {
            let _ = self.start_immediate_processing(conditions);
        }
    }

    /// Window entry points. `None` means the coordinator is already busy and
    /// no window was started; otherwise the receiver resolves exactly once
    /// when the window ends, with `true` when work remains and another window
    /// should be scheduled.
    pub fn start_scheduled_processing(
        &self,
        conditions: DeviceConditions,
    ) -> Option<oneshot::Receiver<bool>> {
        self.start_processing(ProcessingWindow::Scheduled, conditions)
    }

    pub fn start_immediate_processing(
        &self,
        conditions: DeviceConditions,
    ) -> Option<oneshot::Receiver<bool>> {
        self.start_processing(ProcessingWindow::Immediate, conditions)
    }

    fn start_processing(
        &self,
        window: ProcessingWindow,
        conditions: DeviceConditions,
    ) -> Option<oneshot::Receiver<bool>> {
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.busy {
                return None;
            }
            shared.busy = true;
            shared.conditions = conditions;
        }
        self.stop_tx.send_replace(None);

        let (done_tx, done_rx) = oneshot::channel();
        let this = self.clone();
        tokio::spawn(async move {
            this.process_window(window, done_tx).await;
        });
        Some(done_rx)
    }

    /// Request the current window to end. With an active dispatch, the
    /// offliner is canceled; `Timeout` consumes a completed attempt while any
    /// other reason aborts the attempt without touching the retry budget.
    pub fn stop_processing(&self, reason: StopReason) {
        self.stop_tx.send_replace(Some(reason));
    }

    /// Whether a processing window is currently running.
    pub fn is_busy(&self) -> bool {
        self.shared.lock().unwrap().busy
    }

    fn stop_if_active_targeted(&self, ids: &[RequestId], reason: StopReason) {
        let targeted = {
            let shared = self.shared.lock().unwrap();
            shared
                .active
                .as_ref()
                .is_some_and(|active| ids.contains(&active.id))
        };
        if targeted {
            self.stop_processing(reason);
        }
    }

    fn observers(&self) -> Vec<Arc<dyn CoordinatorObserver>> {
        self.shared.lock().unwrap().observers.clone()
    }

    fn notify_added(&self, request: &SavePageRequest) {
        for observer in self.observers() {
            observer.on_added(request);
        }
    }

    fn notify_changed(&self, request: &SavePageRequest) {
        for observer in self.observers() {
            observer.on_changed(request);
        }
    }

    fn notify_completed(&self, request: &SavePageRequest, result: SavePageResult) {
        for observer in self.observers() {
            observer.on_completed(request, result);
        }
    }
}

/// Only http(s) URLs with a host are accepted for saving.
fn url_accepted(raw: &str) -> bool {
    match url::Url::parse(raw) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}
