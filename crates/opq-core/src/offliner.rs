//! Offliner port: the external collaborator that actually loads and saves a
//! page. This crate never fetches or renders anything itself.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::policy::OfflinerPolicy;
use crate::request::SavePageRequest;

/// Terminal status reported by the offliner for one dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflinerStatus {
    /// The page was loaded and saved.
    Saved,
    /// The page loaded but saving failed; retryable.
    SaveFailed,
    /// Canceled because the page came to the foreground.
    ForegroundCanceled,
    /// The load was canceled (including by the coordinator).
    LoadingCanceled,
    /// The load failed; the coordinator does not cascade into another pick.
    LoadingFailed,
    /// The load failed in a way that will never succeed; no retry.
    LoadingFailedNoRetry,
}

/// Channel on which the offliner reports its terminal status. The offliner
/// must send exactly once, including after `cancel` (a cancel that loses the
/// race to a genuine save reports `Saved`).
pub type CompletionSender = oneshot::Sender<(SavePageRequest, OfflinerStatus)>;

pub trait Offliner: Send + Sync {
    /// Start loading and saving `request`. Returns false if the dispatch
    /// failed synchronously (nothing was started and `completion` may be
    /// dropped). On true, `completion` resolves exactly once.
    fn load_and_save(&self, request: &SavePageRequest, completion: CompletionSender) -> bool;

    /// Best-effort cancellation of the in-flight load. The outcome arrives
    /// on the completion channel already handed to `load_and_save`.
    fn cancel(&self);
}

/// Supplies the offliner instance for a processing window. May lazily
/// construct and cache; returning `None` means no offliner is available and
/// the coordinator aborts the attempt.
pub trait OfflinerFactory: Send + Sync {
    fn offliner(&self, policy: &OfflinerPolicy) -> Option<Arc<dyn Offliner>>;
}
