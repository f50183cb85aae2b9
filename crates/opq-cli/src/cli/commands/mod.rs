//! One module per subcommand, plus the no-op collaborators the CLI wires in
//! (the CLI manages the queue; it never runs an offliner).

mod add;
mod pause;
mod remove;
mod resume;
mod status;

pub use add::run_add;
pub use pause::run_pause;
pub use remove::run_remove;
pub use resume::run_resume;
pub use status::run_status;

use std::sync::Arc;
use std::time::Duration;

use opq_core::conditions::TriggerConditions;
use opq_core::offliner::{Offliner, OfflinerFactory};
use opq_core::policy::OfflinerPolicy;
use opq_core::sched::Scheduler;

/// The CLI never dispatches work, so the factory hands out nothing.
pub struct NoOfflinerHere;

impl OfflinerFactory for NoOfflinerHere {
    fn offliner(&self, _policy: &OfflinerPolicy) -> Option<Arc<dyn Offliner>> {
        None
    }
}

/// Wake-up requests go nowhere; the embedding service owns scheduling.
pub struct NoScheduler;

impl Scheduler for NoScheduler {
    fn schedule(&self, _conditions: &TriggerConditions) {}
    fn backup_schedule(&self, _conditions: &TriggerConditions, _delay: Duration) {}
    fn unschedule(&self) {}
}
