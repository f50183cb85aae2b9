//! `opq remove <id>` – drop a request from the queue.

use anyhow::Result;

use opq_core::coordinator::RequestCoordinator;
use opq_core::queue::ItemActionStatus;

pub async fn run_remove(coordinator: &RequestCoordinator, id: i64) -> Result<()> {
    let result = coordinator.remove_requests(&[id]).await;
    match result.statuses.first() {
        Some((_, ItemActionStatus::Success)) => println!("Removed request {id}"),
        Some((_, ItemActionStatus::NotFound)) => println!("Request {id} not found"),
        _ => anyhow::bail!("store failure removing request {id}"),
    }
    Ok(())
}
