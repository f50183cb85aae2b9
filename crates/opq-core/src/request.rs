//! The persistent unit of work: a page the user (or a feature) asked us to
//! save for offline reading once conditions allow.

use serde::{Deserialize, Serialize};

/// Request identifier. Assigned by the coordinator at creation, never reused.
pub type RequestId = i64;

/// Identifies the feature that created a request: a namespace plus an opaque
/// id meaningful only to that feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientId {
    pub name_space: String,
    pub id: String,
}

impl ClientId {
    pub fn new(name_space: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name_space: name_space.into(),
            id: id.into(),
        }
    }
}

/// Lifecycle state of a request, stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Eligible for picking.
    Available,
    /// Currently dispatched to the offliner (at most one at a time).
    Offlining,
    /// Explicitly held; never picked until resumed.
    Paused,
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Available => "available",
            RequestState::Offlining => "offlining",
            RequestState::Paused => "paused",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "available" => RequestState::Available,
            "offlining" => RequestState::Offlining,
            "paused" => RequestState::Paused,
            _ => RequestState::Available,
        }
    }
}

/// A queued save-page-later request.
///
/// Invariant: `completed_attempt_count <= started_attempt_count`. The markers
/// in [`crate::queue::RequestQueue`] are the only writers of the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePageRequest {
    pub id: RequestId,
    pub url: String,
    pub client_id: ClientId,
    /// Unix seconds at enqueue.
    pub creation_time: i64,
    /// If set, the request is not eligible before this time (unix seconds).
    pub activation_time: Option<i64>,
    /// User-initiated requests get priority and looser gating than
    /// predictive/background ones.
    pub user_requested: bool,
    pub started_attempt_count: u32,
    pub completed_attempt_count: u32,
    pub state: RequestState,
}

impl SavePageRequest {
    pub fn new(
        id: RequestId,
        url: impl Into<String>,
        client_id: ClientId,
        creation_time: i64,
        user_requested: bool,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            client_id,
            creation_time,
            activation_time: None,
            user_requested,
            started_attempt_count: 0,
            completed_attempt_count: 0,
            state: RequestState::Available,
        }
    }

    /// Age of the request at `now` (unix seconds). Zero for requests with a
    /// creation time in the future (clock skew).
    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.creation_time).max(0)
    }

    /// Whether the request has an activation time that has not arrived yet.
    pub fn awaiting_activation(&self, now: i64) -> bool {
        matches!(self.activation_time, Some(t) if t > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_state_roundtrip() {
        for state in [
            RequestState::Available,
            RequestState::Offlining,
            RequestState::Paused,
        ] {
            assert_eq!(RequestState::from_str(state.as_str()), state);
        }
        // Unknown strings degrade to Available rather than poisoning a row.
        assert_eq!(RequestState::from_str("bogus"), RequestState::Available);
    }

    #[test]
    fn age_clamps_future_creation_times() {
        let req = SavePageRequest::new(1, "https://example.com", ClientId::new("ns", "1"), 100, true);
        assert_eq!(req.age_secs(160), 60);
        assert_eq!(req.age_secs(40), 0);
    }

    #[test]
    fn activation_time_gates_eligibility() {
        let mut req =
            SavePageRequest::new(2, "https://example.com", ClientId::new("ns", "2"), 100, false);
        assert!(!req.awaiting_activation(100));
        req.activation_time = Some(500);
        assert!(req.awaiting_activation(499));
        assert!(!req.awaiting_activation(500));
    }
}
