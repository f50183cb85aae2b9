//! `opq status` – list queued requests.

use anyhow::Result;

use opq_core::coordinator::RequestCoordinator;

pub async fn run_status(coordinator: &RequestCoordinator, json: bool) -> Result<()> {
    let mut requests = coordinator.get_all_requests().await?;
    requests.sort_by_key(|r| r.id);

    if json {
        println!("{}", serde_json::to_string_pretty(&requests)?);
        return Ok(());
    }

    if requests.is_empty() {
        println!("No queued requests.");
        return Ok(());
    }

    println!(
        "{:>20} {:>10} {:>8} {:>10} {}",
        "ID", "STATE", "TRIES", "REQUESTED", "URL"
    );
    for r in requests {
        println!(
            "{:>20} {:>10} {:>5}/{:<2} {:>10} {}",
            r.id,
            r.state.as_str(),
            r.started_attempt_count,
            r.completed_attempt_count,
            if r.user_requested { "user" } else { "auto" },
            r.url
        );
    }
    Ok(())
}
