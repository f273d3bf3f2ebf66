use anyhow::Result;

use super::{user_facing, App};

pub async fn set(app: &App, role: &str) -> Result<()> {
    app.service
        .set_staff_role(&app.who.scope, &app.who.user, Some(role))
        .await
        .map_err(user_facing)?;
    println!("Ticket staff role for {} is now {}", app.who.scope, role);
    Ok(())
}

pub async fn clear(app: &App) -> Result<()> {
    app.service
        .set_staff_role(&app.who.scope, &app.who.user, None)
        .await
        .map_err(user_facing)?;
    println!("Cleared the ticket staff role for {}", app.who.scope);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{as_user, setup_app};

    #[tokio::test]
    async fn test_admin_sets_and_clears() {
        let (app, _dir) = setup_app("admin");
        set(&app, "helpers").await.unwrap();
        assert_eq!(app.db.get_staff_role("local").unwrap().as_deref(), Some("helpers"));
        clear(&app).await.unwrap();
        assert!(app.db.get_staff_role("local").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_admin_refused() {
        let (_app, dir) = setup_app("admin");
        let alice = as_user(&dir, "alice");
        assert!(set(&alice, "helpers").await.is_err());
        assert!(alice.db.get_staff_role("local").unwrap().is_none());
    }
}
