//! Candidate selection: given everything persisted and the current device
//! conditions, pick the single best request to dispatch next.
//!
//! The picker borrows the policy and queue for one pass. Expired requests
//! are removed as part of the same pass and handed back so the coordinator
//! can notify observers.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::conditions::DeviceConditions;
use crate::policy::{OfflinerPolicy, OrderPreference};
use crate::queue::{RequestQueue, StoreError};
use crate::request::{RequestId, RequestState, SavePageRequest};

/// Outcome of one pick pass.
#[derive(Debug, Default)]
pub struct PickResult {
    /// The best eligible request, if any.
    pub picked: Option<SavePageRequest>,
    /// When nothing was picked: whether non-user-requested work remains, so
    /// the coordinator can still schedule a lower-priority wake-up.
    /// Disabled requests are excluded from this signal.
    pub background_work_remaining: bool,
    /// Requests dropped this pass because their age crossed the expiration
    /// threshold. Already removed from the queue.
    pub expired: Vec<SavePageRequest>,
    pub total_valid: usize,
    pub available_count: usize,
}

pub struct RequestPicker<'a> {
    policy: &'a OfflinerPolicy,
    queue: &'a RequestQueue,
}

impl<'a> RequestPicker<'a> {
    pub fn new(policy: &'a OfflinerPolicy, queue: &'a RequestQueue) -> Self {
        Self { policy, queue }
    }

    /// One full selection pass at time `now` (unix seconds).
    pub async fn choose_next(
        &self,
        conditions: &DeviceConditions,
        disabled: &HashSet<RequestId>,
        now: i64,
    ) -> Result<PickResult, StoreError> {
        let all = self.queue.get_requests().await?;
        let expiration_secs = self.policy.request_expiration.as_secs() as i64;
        let (expired, valid): (Vec<_>, Vec<_>) = all
            .into_iter()
            .partition(|r| r.age_secs(now) >= expiration_secs);

        let total_valid = valid.len();
        let available_count = valid
            .iter()
            .filter(|r| r.state == RequestState::Available)
            .count();

        let mut picked: Option<&SavePageRequest> = None;
        let mut background_work_remaining = false;
        for request in &valid {
            if disabled.contains(&request.id) {
                continue;
            }
            if !request.user_requested {
                background_work_remaining = true;
            }
            if !self.conditions_satisfied(request, conditions, now) {
                continue;
            }
            picked = Some(match picked {
                None => request,
                Some(best) if picks_over(request, best, self.policy) => request,
                Some(best) => best,
            });
        }
        let picked = picked.cloned();

        if !expired.is_empty() {
            let ids: Vec<RequestId> = expired.iter().map(|r| r.id).collect();
            // Removal failures leave the rows for the next pass.
            self.queue.remove_requests(&ids).await;
        }

        tracing::debug!(
            total_valid,
            available = available_count,
            expired = expired.len(),
            picked = ?picked.as_ref().map(|r| r.id),
            "pick pass"
        );

        Ok(PickResult {
            picked,
            background_work_remaining,
            expired,
            total_valid,
            available_count,
        })
    }

    /// Whether `request` may run under `conditions` right now.
    fn conditions_satisfied(
        &self,
        request: &SavePageRequest,
        conditions: &DeviceConditions,
        now: i64,
    ) -> bool {
        let user = request.user_requested;
        if self.policy.power_required(user) && !conditions.power_connected {
            return false;
        }
        if self.policy.unmetered_required(user) && !conditions.connection.is_unmetered() {
            return false;
        }
        if conditions.battery_percentage < self.policy.minimum_battery(user) {
            return false;
        }
        if request.started_attempt_count >= self.policy.max_started_tries {
            return false;
        }
        if request.completed_attempt_count >= self.policy.max_completed_tries {
            return false;
        }
        if request.state != RequestState::Available {
            return false;
        }
        if request.awaiting_activation(now) {
            return false;
        }
        true
    }
}

/// Strict "left beats right" comparator. User intent dominates
/// unconditionally; among same-intent requests the policy chooses the
/// primary key and the direction of each sub-comparison.
fn picks_over(left: &SavePageRequest, right: &SavePageRequest, policy: &OfflinerPolicy) -> bool {
    if left.user_requested != right.user_requested {
        return left.user_requested;
    }
    let ordering = match policy.order {
        OrderPreference::RetryCountFirst => {
            retry_count_order(left, right, policy).then(recency_order(left, right, policy))
        }
        OrderPreference::RecencyFirst => {
            recency_order(left, right, policy).then(retry_count_order(left, right, policy))
        }
    };
    ordering == Ordering::Less
}

/// `Less` means left is the better candidate.
fn retry_count_order(
    left: &SavePageRequest,
    right: &SavePageRequest,
    policy: &OfflinerPolicy,
) -> Ordering {
    let ordering = left
        .completed_attempt_count
        .cmp(&right.completed_attempt_count);
    if policy.prefer_untried_requests {
        ordering
    } else {
        ordering.reverse()
    }
}

fn recency_order(
    left: &SavePageRequest,
    right: &SavePageRequest,
    policy: &OfflinerPolicy,
) -> Ordering {
    let ordering = left.creation_time.cmp(&right.creation_time);
    if policy.prefer_earlier_requests {
        ordering
    } else {
        ordering.reverse()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::conditions::ConnectionType;
    use crate::queue::MemoryStore;
    use crate::request::ClientId;

    const NOW: i64 = 1_700_000_000;

    fn request(id: i64, user_requested: bool, creation_time: i64) -> SavePageRequest {
        SavePageRequest::new(
            id,
            format!("https://example.com/{id}"),
            ClientId::new("async_loading", id.to_string()),
            creation_time,
            user_requested,
        )
    }

    fn wifi() -> DeviceConditions {
        DeviceConditions::new(true, 100, ConnectionType::Wifi)
    }

    async fn queue_with(requests: Vec<SavePageRequest>) -> RequestQueue {
        let queue = RequestQueue::new(Arc::new(MemoryStore::new()));
        for r in requests {
            queue.add_request(r).await.unwrap();
        }
        queue
    }

    #[test]
    fn user_requested_beats_background_under_every_flag_combination() {
        let mut user = request(1, true, NOW - 1000);
        user.completed_attempt_count = 2;
        let background = request(2, false, NOW - 10);

        for order in [OrderPreference::RetryCountFirst, OrderPreference::RecencyFirst] {
            for prefer_untried in [true, false] {
                for prefer_earlier in [true, false] {
                    let policy = OfflinerPolicy {
                        order,
                        prefer_untried_requests: prefer_untried,
                        prefer_earlier_requests: prefer_earlier,
                        ..OfflinerPolicy::default()
                    };
                    assert!(picks_over(&user, &background, &policy));
                    assert!(!picks_over(&background, &user, &policy));
                }
            }
        }
    }

    #[test]
    fn recency_first_prefers_earlier_request() {
        let a = request(1, false, NOW - 100);
        let b = request(2, false, NOW - 90);
        let policy = OfflinerPolicy {
            order: OrderPreference::RecencyFirst,
            prefer_earlier_requests: true,
            ..OfflinerPolicy::default()
        };
        assert!(picks_over(&a, &b, &policy));

        let newest_first = OfflinerPolicy {
            prefer_earlier_requests: false,
            ..policy
        };
        assert!(picks_over(&b, &a, &newest_first));
    }

    #[test]
    fn retry_count_first_prefers_untried_then_falls_back_to_recency() {
        let mut tried = request(1, false, NOW - 100);
        tried.completed_attempt_count = 1;
        let fresh = request(2, false, NOW - 10);
        let policy = OfflinerPolicy {
            order: OrderPreference::RetryCountFirst,
            ..OfflinerPolicy::default()
        };
        assert!(picks_over(&fresh, &tried, &policy));

        // Equal attempt counts: the secondary recency key decides.
        let a = request(3, false, NOW - 500);
        let b = request(4, false, NOW - 5);
        assert!(picks_over(&a, &b, &policy));
    }

    #[tokio::test]
    async fn picks_earlier_background_request() {
        let queue = queue_with(vec![
            request(1, false, NOW - 20),
            request(2, false, NOW - 10),
        ])
        .await;
        let policy = OfflinerPolicy {
            order: OrderPreference::RecencyFirst,
            prefer_earlier_requests: true,
            ..OfflinerPolicy::default()
        };
        let picker = RequestPicker::new(&policy, &queue);
        let result = picker
            .choose_next(&wifi(), &HashSet::new(), NOW)
            .await
            .unwrap();
        assert_eq!(result.picked.unwrap().id, 1);
        assert_eq!(result.total_valid, 2);
        assert_eq!(result.available_count, 2);
    }

    #[tokio::test]
    async fn started_attempt_budget_blocks_picking_for_any_conditions() {
        let policy = OfflinerPolicy::default();
        let mut r = request(1, true, NOW - 10);
        r.started_attempt_count = policy.max_started_tries;
        let queue = queue_with(vec![r]).await;
        let picker = RequestPicker::new(&policy, &queue);

        for conditions in [
            wifi(),
            DeviceConditions::new(true, 100, ConnectionType::Ethernet),
            DeviceConditions::new(false, 10, ConnectionType::Cellular4g),
        ] {
            let result = picker
                .choose_next(&conditions, &HashSet::new(), NOW)
                .await
                .unwrap();
            assert!(result.picked.is_none());
        }
    }

    #[tokio::test]
    async fn completed_attempt_budget_blocks_picking() {
        let policy = OfflinerPolicy::default();
        let mut r = request(1, true, NOW - 10);
        r.completed_attempt_count = policy.max_completed_tries;
        let queue = queue_with(vec![r]).await;
        let picker = RequestPicker::new(&policy, &queue);
        let result = picker
            .choose_next(&wifi(), &HashSet::new(), NOW)
            .await
            .unwrap();
        assert!(result.picked.is_none());
    }

    #[tokio::test]
    async fn low_battery_skips_background_work_but_reports_it_remaining() {
        let policy = OfflinerPolicy::default();
        let queue = queue_with(vec![request(1, false, NOW - 10)]).await;
        let picker = RequestPicker::new(&policy, &queue);
        let conditions = DeviceConditions::new(
            false,
            policy.minimum_battery_for_background - 1,
            ConnectionType::Wifi,
        );
        let result = picker
            .choose_next(&conditions, &HashSet::new(), NOW)
            .await
            .unwrap();
        assert!(result.picked.is_none());
        assert!(result.background_work_remaining);
    }

    #[tokio::test]
    async fn metered_network_blocks_background_but_not_user_requested() {
        let policy = OfflinerPolicy::default();
        let queue = queue_with(vec![
            request(1, false, NOW - 20),
            request(2, true, NOW - 10),
        ])
        .await;
        let picker = RequestPicker::new(&policy, &queue);
        let cellular = DeviceConditions::new(true, 100, ConnectionType::Cellular4g);
        let result = picker
            .choose_next(&cellular, &HashSet::new(), NOW)
            .await
            .unwrap();
        assert_eq!(result.picked.unwrap().id, 2);
    }

    #[tokio::test]
    async fn expired_requests_are_removed_and_reported() {
        let policy = OfflinerPolicy {
            request_expiration: Duration::from_secs(100),
            ..OfflinerPolicy::default()
        };
        let queue = queue_with(vec![
            request(1, true, NOW - 200),
            request(2, true, NOW - 10),
        ])
        .await;
        let picker = RequestPicker::new(&policy, &queue);
        let result = picker
            .choose_next(&wifi(), &HashSet::new(), NOW)
            .await
            .unwrap();
        assert_eq!(result.picked.as_ref().unwrap().id, 2);
        assert_eq!(result.expired.len(), 1);
        assert_eq!(result.expired[0].id, 1);
        assert_eq!(result.total_valid, 1);

        let remaining = queue.get_requests().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, 2);
    }

    #[tokio::test]
    async fn disabled_ids_are_skipped_and_not_counted_as_remaining() {
        let policy = OfflinerPolicy::default();
        let queue = queue_with(vec![request(1, false, NOW - 10)]).await;
        let picker = RequestPicker::new(&policy, &queue);
        let disabled: HashSet<RequestId> = [1].into_iter().collect();
        let result = picker.choose_next(&wifi(), &disabled, NOW).await.unwrap();
        assert!(result.picked.is_none());
        assert!(!result.background_work_remaining);
    }

    #[tokio::test]
    async fn paused_and_future_activation_requests_are_ineligible() {
        let policy = OfflinerPolicy::default();
        let mut paused = request(1, true, NOW - 20);
        paused.state = RequestState::Paused;
        let mut pending = request(2, true, NOW - 20);
        pending.activation_time = Some(NOW + 100);
        let queue = queue_with(vec![paused, pending]).await;
        let picker = RequestPicker::new(&policy, &queue);
        let result = picker
            .choose_next(&wifi(), &HashSet::new(), NOW)
            .await
            .unwrap();
        assert!(result.picked.is_none());
        assert_eq!(result.available_count, 1);
    }
}
