//! `opq add <url>` – queue a page for background saving.

use anyhow::Result;

use opq_core::coordinator::{RequestCoordinator, SavePageLaterParams};
use opq_core::request::ClientId;

pub async fn run_add(
    coordinator: &RequestCoordinator,
    url: &str,
    namespace: &str,
    user_requested: bool,
) -> Result<()> {
    let client_id = ClientId::new(namespace, format!("cli-{}", std::process::id()));
    let params = SavePageLaterParams::new(url, client_id, user_requested);
    let id = coordinator.save_page_later(params).await?;
    println!("Added request {id} for URL: {url}");
    Ok(())
}
