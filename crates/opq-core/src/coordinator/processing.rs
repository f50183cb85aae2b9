//! The processing-window loop: pick, dispatch, watch, classify.

use std::time::Instant;

use tokio::sync::{oneshot, watch};

use super::RequestCoordinator;
use crate::events::SavePageResult;
use crate::offliner::OfflinerStatus;
use crate::picker::RequestPicker;
use crate::policy::ProcessingWindow;
use crate::queue::StoreError;
use crate::request::SavePageRequest;

/// Why the current window was asked to stop. `Timeout` consumes a completed
/// attempt; every other reason aborts the attempt without touching the retry
/// budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    CoordinatorCanceled,
    Timeout,
    Removed,
    Paused,
}

enum DispatchOutcome {
    /// Try the next request within the same window.
    Continue,
    /// End the window and return control to the caller.
    Stop,
}

impl RequestCoordinator {
    pub(super) async fn process_window(
        self,
        window: ProcessingWindow,
        done: oneshot::Sender<bool>,
    ) {
        let started_at = Instant::now();
        let budget = self.policy.window_budget(window);
        let mut stop_rx = self.stop_tx.subscribe();
        // Pessimistic default: every early exit leaves work behind.
        let mut work_remains = true;

        loop {
            if stop_rx.borrow_and_update().is_some() {
                break;
            }
            let conditions = self.shared.lock().unwrap().conditions;
            if !conditions.connection.is_connected() {
                // An already-running offliner would be left alone here; we
                // only stop dispatching new work. Immediate windows rely on
                // on_connectivity_changed to fire again once back online.
                tracing::debug!(?window, "no connectivity; ending window");
                break;
            }
            if started_at.elapsed() >= budget {
                tracing::debug!(?window, "window budget exhausted");
                break;
            }

            let disabled = self.shared.lock().unwrap().disabled.clone();
            let picker = RequestPicker::new(&self.policy, &self.queue);
            let pick = match picker
                .choose_next(&conditions, &disabled, super::unix_timestamp())
                .await
            {
                Ok(pick) => pick,
                Err(e) => {
                    tracing::warn!("pick pass failed: {e}");
                    break;
                }
            };

            for request in &pick.expired {
                self.events
                    .record(&format!("request {} expired", request.id));
                self.notify_completed(request, SavePageResult::Expired);
            }

            let Some(request) = pick.picked else {
                self.scheduler.unschedule();
                if !disabled.is_empty() {
                    // Disabled requests may be handed back at any moment;
                    // arm a short-delay backup wake-up.
                    self.scheduler.backup_schedule(
                        &self.policy.trigger_conditions(true),
                        self.policy.backup_wakeup_delay,
                    );
                } else if pick.background_work_remaining {
                    self.scheduler
                        .schedule(&self.policy.trigger_conditions(false));
                }
                work_remains = pick.background_work_remaining || !disabled.is_empty();
                break;
            };

            match self.dispatch(request, window, &mut stop_rx).await {
                DispatchOutcome::Continue => continue,
                DispatchOutcome::Stop => break,
            }
        }

        {
            let mut shared = self.shared.lock().unwrap();
            shared.busy = false;
            shared.active = None;
        }
        let _ = done.send(work_remains);
    }

    /// Run one picked request through the offliner, enforcing the single-page
    /// watchdog and honoring stop requests.
    async fn dispatch(
        &self,
        request: SavePageRequest,
        window: ProcessingWindow,
        stop_rx: &mut watch::Receiver<Option<StopReason>>,
    ) -> DispatchOutcome {
        if stop_rx.borrow().is_some() {
            return DispatchOutcome::Stop;
        }

        let Some(offliner) = self.factory.offliner(&self.policy) else {
            tracing::warn!("no offliner available; ending window");
            return DispatchOutcome::Stop;
        };

        let request = match self.queue.mark_attempt_started(request.id).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("mark attempt started for {} failed: {e}", request.id);
                return DispatchOutcome::Stop;
            }
        };
        self.notify_changed(&request);

        // Register the active request before handing off so a stop arriving
        // right after dispatch can see it.
        self.shared.lock().unwrap().active = Some(request.clone());
        let (completion_tx, mut completion_rx) = oneshot::channel();
        if !offliner.load_and_save(&request, completion_tx) {
            tracing::warn!("offliner rejected request {}", request.id);
            self.shared.lock().unwrap().active = None;
            self.abort_attempt(&request).await;
            return DispatchOutcome::Stop;
        }

        let watchdog = tokio::time::sleep(self.policy.page_time_limit(window));
        tokio::pin!(watchdog);

        // Once canceled we still wait for the offliner's answer: cancellation
        // may lose the race to a genuine save.
        let mut stop_reason: Option<StopReason> = None;
        let completion = loop {
            tokio::select! {
                res = &mut completion_rx => break res.ok(),
                _ = &mut watchdog, if stop_reason.is_none() => {
                    tracing::info!("request {} hit the single-page time limit", request.id);
                    stop_reason = Some(StopReason::Timeout);
                    offliner.cancel();
                }
                changed = stop_rx.changed(), if stop_reason.is_none() => {
                    if changed.is_err() {
                        stop_reason = Some(StopReason::CoordinatorCanceled);
                        offliner.cancel();
                    } else if let Some(reason) = *stop_rx.borrow_and_update() {
                        stop_reason = Some(reason);
                        offliner.cancel();
                    }
                }
            }
        };
        self.shared.lock().unwrap().active = None;

        let Some((_, status)) = completion else {
            // The offliner dropped the channel without reporting; treat like
            // a failed dispatch.
            tracing::warn!("offliner dropped completion for request {}", request.id);
            self.abort_attempt(&request).await;
            return DispatchOutcome::Stop;
        };
        tracing::debug!(request = request.id, ?status, ?stop_reason, "offliner done");

        // A save that finished despite cancellation is still a save.
        if status == OfflinerStatus::Saved {
            self.remove_and_notify(&request, SavePageResult::Success).await;
            self.events
                .record(&format!("request {} saved", request.id));
            return match stop_reason {
                Some(_) => DispatchOutcome::Stop,
                None => DispatchOutcome::Continue,
            };
        }

        if let Some(reason) = stop_reason {
            match reason {
                // The watchdog consumed real processing time; charge it.
                StopReason::Timeout => self.complete_attempt(&request).await,
                _ => self.abort_attempt(&request).await,
            }
            return DispatchOutcome::Stop;
        }

        match status {
            OfflinerStatus::SaveFailed => {
                self.complete_attempt(&request).await;
                DispatchOutcome::Continue
            }
            OfflinerStatus::ForegroundCanceled | OfflinerStatus::LoadingCanceled => {
                self.abort_attempt(&request).await;
                DispatchOutcome::Stop
            }
            OfflinerStatus::LoadingFailedNoRetry => {
                self.remove_and_notify(&request, SavePageResult::LoadingFailure)
                    .await;
                DispatchOutcome::Continue
            }
            OfflinerStatus::LoadingFailed => {
                // Unclassified failure: charge the attempt but don't cascade
                // into another pick within this window.
                self.complete_attempt(&request).await;
                DispatchOutcome::Stop
            }
            OfflinerStatus::Saved => unreachable!("handled above"),
        }
    }

    /// Charge a completed attempt; remove the request once the retry budget
    /// is exhausted.
    async fn complete_attempt(&self, request: &SavePageRequest) {
        match self.queue.mark_attempt_completed(request.id).await {
            Ok(updated) => {
                if updated.completed_attempt_count >= self.policy.max_completed_tries {
                    self.remove_and_notify(&updated, SavePageResult::RetryCountExceeded)
                        .await;
                } else {
                    self.notify_changed(&updated);
                }
            }
            Err(StoreError::NotFound(_)) => {}
            Err(e) => tracing::warn!("mark attempt completed for {} failed: {e}", request.id),
        }
    }

    /// Revert the attempt without consuming retry budget.
    async fn abort_attempt(&self, request: &SavePageRequest) {
        match self.queue.mark_attempt_aborted(request.id).await {
            Ok(updated) => self.notify_changed(&updated),
            // Already removed (e.g. remove_requests canceled us); nothing to
            // revert.
            Err(StoreError::NotFound(_)) => {}
            Err(e) => tracing::warn!("mark attempt aborted for {} failed: {e}", request.id),
        }
    }

    async fn remove_and_notify(&self, request: &SavePageRequest, result: SavePageResult) {
        let removal = self.queue.remove_requests(&[request.id]).await;
        for removed in &removal.updated {
            self.notify_completed(removed, result);
        }
    }
}
