//! `opq pause <id>` – hold a request so it is never picked.

use anyhow::Result;

use opq_core::coordinator::RequestCoordinator;
use opq_core::queue::ItemActionStatus;

pub async fn run_pause(coordinator: &RequestCoordinator, id: i64) -> Result<()> {
    let result = coordinator.pause_requests(&[id]).await;
    match result.statuses.first() {
        Some((_, ItemActionStatus::Success)) => println!("Paused request {id}"),
        Some((_, ItemActionStatus::NotFound)) => println!("Request {id} not found"),
        _ => anyhow::bail!("store failure pausing request {id}"),
    }
    Ok(())
}
