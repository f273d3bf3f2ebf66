use anyhow::Result;

use ticketbox::CloseOutcome;

use super::{user_facing, App};

pub async fn run(app: &App, channel: &str) -> Result<CloseOutcome> {
    let outcome = app
        .service
        .close(channel, &app.who.user)
        .await
        .map_err(user_facing)?;

    match &outcome {
        CloseOutcome::AlreadyClosed { ticket_id, .. } => {
            println!("Ticket #{} was already closed", ticket_id);
            return Ok(outcome);
        }
        CloseOutcome::Closed {
            ticket_id,
            transcript,
        } => {
            println!(
                "Closed ticket #{} ({} byte transcript)",
                ticket_id,
                transcript.len()
            );
        }
    }

    let grace = app.config.grace_delay();
    if grace.as_secs() > 0 {
        println!("Deleting channel {} in {}s (Ctrl-C to leave it to `ticketbox sweep`)", channel, grace.as_secs());
    }
    tokio::select! {
        _ = app.service.scheduler().wait_idle() => {
            println!("Deleted channel {}", channel);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Deletion stays scheduled; run `ticketbox sweep` to finish it");
        }
    }

    Ok(outcome)
}
