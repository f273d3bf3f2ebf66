use anyhow::Result;

use super::{user_facing, App};

pub async fn run(app: &App, id: i64) -> Result<()> {
    let ticket = app.catalog.select(id).await.map_err(user_facing)?;

    println!("Ticket #{} {}", ticket.id, ticket.status.glyph());
    println!("Status: {}", ticket.status);
    println!("Scope: {}", ticket.server_id);
    println!("Opened by: {} ({})", ticket.opener_label, ticket.opener_id);
    println!("Reason: {}", ticket.reason);
    if let Some(channel) = &ticket.channel_id {
        println!("Channel: {}", channel);
    }
    println!("Created: {}", ticket.created_at.format("%Y-%m-%d %H:%M:%S"));

    if let Some(closed) = ticket.closed_at {
        println!("Closed: {}", closed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(by) = &ticket.closed_by {
        println!("Closed by: {}", by);
    }
    if let Some(transcript) = &ticket.transcript {
        println!(
            "Transcript: {} bytes, {} lines (ticketbox export {})",
            transcript.len(),
            transcript.lines().count(),
            ticket.id
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::setup_app;

    #[tokio::test]
    async fn test_show_existing() {
        let (app, _dir) = setup_app("alice");
        let id = app.db.create_ticket("local", "alice", "alice", "x").unwrap();
        assert!(run(&app, id).await.is_ok());
    }

    #[tokio::test]
    async fn test_show_missing() {
        let (app, _dir) = setup_app("alice");
        let err = run(&app, 42).await.unwrap_err();
        assert!(err.to_string().contains("ticket #42"));
    }
}
