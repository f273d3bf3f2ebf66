use anyhow::Result;

use ticketbox::catalog::PageView;

use super::{user_facing, App};

pub async fn run(app: &App, page: usize) -> Result<()> {
    let view = app
        .catalog
        .list_page(&app.who.scope, page)
        .await
        .map_err(user_facing)?;
    print!("{}", render_page(&view, app.catalog.last_page(view.total)));
    Ok(())
}

/// Page body plus a footer naming the page and the available moves.
pub fn render_page(view: &PageView, last_page: usize) -> String {
    if view.total == 0 {
        return "No tickets found.\n".to_string();
    }

    let mut out = String::new();
    if view.items.is_empty() {
        out.push_str("No tickets on this page.\n");
    }
    for item in &view.items {
        out.push_str(&item.label);
        out.push('\n');
    }

    let mut moves = Vec::new();
    if view.has_prev {
        moves.push("p: previous");
    }
    if view.has_next {
        moves.push("n: next");
    }
    out.push_str(&format!(
        "-- page {} of {}, {} tickets",
        view.page + 1,
        last_page + 1,
        view.total
    ));
    if !moves.is_empty() {
        out.push_str(&format!(" ({})", moves.join(", ")));
    }
    out.push('\n');
    out
}
