use anyhow::Result;
use std::time::Duration;

use super::{user_facing, App};

/// Finish overdue channel deletions and report tickets stuck in `pending`.
/// With `wait`, deletions still inside their grace window are waited out.
pub async fn run(app: &App, wait: bool, stale_minutes: u64) -> Result<()> {
    let scheduler = app.service.scheduler();
    if wait {
        let armed = scheduler.reconcile().await?;
        scheduler.wait_idle().await;
        println!("Processed {} scheduled deletion(s)", armed);
    } else {
        let done = scheduler.run_due().await?;
        let remaining = app.db.get_scheduled_deletions()?.len();
        println!("Deleted {} channel(s), {} still scheduled", done, remaining);
    }

    let stale = app
        .service
        .stale_pending(&app.who.scope, Duration::from_secs(stale_minutes * 60))
        .await
        .map_err(user_facing)?;
    if stale.is_empty() {
        println!("No stale pending tickets.");
    } else {
        println!("Pending for over {} minutes:", stale_minutes);
        for ticket in stale {
            println!(
                "  #{} {} ({}) since {}",
                ticket.id,
                ticket.opener_label,
                ticket.reason,
                ticket.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::setup_app;
    use chrono::Utc;
    use ticketbox::platform::{Acl, ChannelHandle, ChannelPlatform, ParentScope};

    #[tokio::test]
    async fn test_sweep_runs_overdue_deletions() {
        let (app, _dir) = setup_app("admin");
        let parent = ParentScope {
            server_id: "local".to_string(),
            category: None,
        };
        let acl = Acl {
            deny_default: true,
            allow: Vec::new(),
        };
        let chan = app.platform.create_channel("left", &parent, &acl).await.unwrap();
        app.db
            .add_scheduled_deletion(&chan.id, Utc::now() - chrono::Duration::minutes(1))
            .unwrap();
        app.db
            .add_scheduled_deletion("later", Utc::now() + chrono::Duration::hours(1))
            .unwrap();

        run(&app, false, 60).await.unwrap();
        assert!(!app.platform.channel_exists(&ChannelHandle::new(chan.id.clone())).unwrap());
        assert_eq!(app.db.get_scheduled_deletions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_wait_drains_everything() {
        let (app, _dir) = setup_app("admin");
        app.db
            .add_scheduled_deletion("123", Utc::now() - chrono::Duration::minutes(1))
            .unwrap();

        run(&app, true, 0).await.unwrap();
        assert!(app.db.get_scheduled_deletions().unwrap().is_empty());
    }
}
