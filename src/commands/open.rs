use anyhow::{bail, Result};

use ticketbox::OpenRequest;

use super::{user_facing, App};

pub async fn run(app: &App, reason: &str) -> Result<i64> {
    let reason = reason.trim();
    if reason.is_empty() {
        bail!("A reason is required to open a ticket");
    }

    let opened = app
        .service
        .open(OpenRequest {
            scope: &app.who.scope,
            requester_id: &app.who.user,
            requester_label: &app.who.label,
            reason,
        })
        .await
        .map_err(user_facing)?;

    println!("Opened ticket #{} in channel {}", opened.ticket_id, opened.channel.id);
    println!("Post with: ticketbox say {} \"...\"", opened.channel.id);
    Ok(opened.ticket_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::setup_app;
    use ticketbox::models::TicketStatus;

    #[tokio::test]
    async fn test_open_creates_open_ticket() {
        let (app, _dir) = setup_app("alice");
        let id = run(&app, "  printer on fire ").await.unwrap();

        let ticket = app.db.get_ticket(id).unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.reason, "printer on fire");
        assert_eq!(ticket.server_id, "local");
        assert!(ticket.channel_id.is_some());
    }

    #[tokio::test]
    async fn test_open_requires_reason() {
        let (app, _dir) = setup_app("alice");
        let result = run(&app, "   ").await;
        assert!(result.is_err());
        assert!(app.db.list_tickets("local", 0, 10).unwrap().0.is_empty());
    }
}
