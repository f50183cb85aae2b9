//! Stub offliner, factory, scheduler, and observer.
//!
//! The offliner either completes each dispatch from a scripted status list
//! or parks the completion sender so the test can cancel or complete it
//! later.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use opq_core::conditions::TriggerConditions;
use opq_core::events::{CoordinatorObserver, SavePageResult};
use opq_core::offliner::{CompletionSender, Offliner, OfflinerFactory, OfflinerStatus};
use opq_core::policy::OfflinerPolicy;
use opq_core::request::{RequestId, SavePageRequest};
use opq_core::sched::Scheduler;

#[derive(Default)]
pub struct StubOffliner {
    scripted: Mutex<VecDeque<OfflinerStatus>>,
    pending: Mutex<Option<(SavePageRequest, CompletionSender)>>,
    pub calls: AtomicUsize,
    pub cancels: AtomicUsize,
    /// When set, `cancel` does not answer; the test resolves the race itself.
    cancel_silent: AtomicBool,
    dispatched: Notify,
}

impl StubOffliner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue statuses to report, one per dispatch. Dispatches beyond the
    /// script are parked until `cancel` or `complete_pending`.
    pub fn script(&self, statuses: &[OfflinerStatus]) {
        self.scripted.lock().unwrap().extend(statuses.iter().copied());
    }

    pub fn set_cancel_silent(&self, silent: bool) {
        self.cancel_silent.store(silent, Ordering::Relaxed);
    }

    /// Resolve a parked dispatch with `status`. Returns false if none parked.
    pub fn complete_pending(&self, status: OfflinerStatus) -> bool {
        match self.pending.lock().unwrap().take() {
            Some((request, sender)) => {
                let _ = sender.send((request, status));
                true
            }
            None => false,
        }
    }

    /// Wait until the coordinator has handed us a request.
    pub async fn wait_for_dispatch(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.dispatched.notified())
            .await
            .expect("offliner was never dispatched");
    }
}

impl Offliner for StubOffliner {
    fn load_and_save(&self, request: &SavePageRequest, completion: CompletionSender) -> bool {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.scripted.lock().unwrap().pop_front() {
            Some(status) => {
                let _ = completion.send((request.clone(), status));
            }
            None => {
                *self.pending.lock().unwrap() = Some((request.clone(), completion));
            }
        }
        self.dispatched.notify_one();
        true
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
        if self.cancel_silent.load(Ordering::Relaxed) {
            return;
        }
        if let Some((request, sender)) = self.pending.lock().unwrap().take() {
            let _ = sender.send((request, OfflinerStatus::LoadingCanceled));
        }
    }
}

pub struct StubFactory {
    offliner: Option<Arc<StubOffliner>>,
}

impl StubFactory {
    pub fn with(offliner: Arc<StubOffliner>) -> Arc<Self> {
        Arc::new(Self {
            offliner: Some(offliner),
        })
    }

    /// A factory with no offliner to hand out (dispatch-failure path).
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self { offliner: None })
    }
}

impl OfflinerFactory for StubFactory {
    fn offliner(&self, _policy: &OfflinerPolicy) -> Option<Arc<dyn Offliner>> {
        self.offliner
            .as_ref()
            .map(|o| Arc::clone(o) as Arc<dyn Offliner>)
    }
}

#[derive(Default)]
pub struct StubScheduler {
    pub schedules: Mutex<Vec<TriggerConditions>>,
    pub backups: AtomicUsize,
    pub unschedules: AtomicUsize,
}

impl StubScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Scheduler for StubScheduler {
    fn schedule(&self, conditions: &TriggerConditions) {
        self.schedules.lock().unwrap().push(*conditions);
    }

    fn backup_schedule(&self, _conditions: &TriggerConditions, _delay: Duration) {
        self.backups.fetch_add(1, Ordering::Relaxed);
    }

    fn unschedule(&self) {
        self.unschedules.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub added: Mutex<Vec<RequestId>>,
    pub changed: Mutex<Vec<(RequestId, String)>>,
    pub completed: Mutex<Vec<(RequestId, SavePageResult)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn completions(&self) -> Vec<(RequestId, SavePageResult)> {
        self.completed.lock().unwrap().clone()
    }
}

impl CoordinatorObserver for RecordingObserver {
    fn on_added(&self, request: &SavePageRequest) {
        self.added.lock().unwrap().push(request.id);
    }

    fn on_changed(&self, request: &SavePageRequest) {
        self.changed
            .lock()
            .unwrap()
            .push((request.id, request.state.as_str().to_string()));
    }

    fn on_completed(&self, request: &SavePageRequest, result: SavePageResult) {
        self.completed.lock().unwrap().push((request.id, result));
    }
}
