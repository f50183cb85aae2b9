//! `opq resume <id>` – make a paused request eligible again.

use anyhow::Result;

use opq_core::coordinator::RequestCoordinator;
use opq_core::queue::ItemActionStatus;

pub async fn run_resume(coordinator: &RequestCoordinator, id: i64) -> Result<()> {
    let result = coordinator.resume_requests(&[id]).await;
    match result.statuses.first() {
        Some((_, ItemActionStatus::Success)) => println!("Resumed request {id}"),
        Some((_, ItemActionStatus::NotFound)) => println!("Request {id} not found"),
        _ => anyhow::bail!("store failure resuming request {id}"),
    }
    Ok(())
}
