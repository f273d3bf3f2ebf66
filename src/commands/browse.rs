use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

use ticketbox::export::write_artifacts;

use super::list::render_page;
use super::{user_facing, App};

/// How an interactive browse ended.
#[derive(Debug, PartialEq, Eq)]
pub enum BrowseEnd {
    Exported(Vec<PathBuf>),
    Quit,
    TimedOut,
}

enum Choice {
    Next,
    Prev,
    Quit,
    Ticket(i64),
    Unknown,
}

fn parse_choice(line: &str) -> Choice {
    match line.trim() {
        "n" | "next" => Choice::Next,
        "p" | "prev" => Choice::Prev,
        "q" | "quit" | "" => Choice::Quit,
        other => other
            .trim_start_matches('#')
            .parse()
            .map(Choice::Ticket)
            .unwrap_or(Choice::Unknown),
    }
}

/// Page through the catalog and export the chosen ticket into `out_dir`.
/// Each prompt waits at most the configured selection timeout; an expired
/// or abandoned browse changes nothing.
pub async fn run<R, W>(app: &App, input: R, out: &mut W, out_dir: &Path) -> Result<BrowseEnd>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let timeout = app.config.selection_timeout();
    let mut lines = input.lines();
    let mut page = 0usize;

    loop {
        let view = app
            .catalog
            .list_page(&app.who.scope, page)
            .await
            .map_err(user_facing)?;
        let last = app.catalog.last_page(view.total);
        write!(out, "{}", render_page(&view, last))?;
        write!(out, "Ticket id to export, n/p to page, q to quit: ")?;
        out.flush()?;

        let line = match tokio::time::timeout(timeout, lines.next_line()).await {
            Err(_) => {
                writeln!(out, "\nSelection timed out after {}s.", timeout.as_secs())?;
                info!(scope = %app.who.scope, "catalog selection timed out");
                return Ok(BrowseEnd::TimedOut);
            }
            Ok(line) => line.context("Failed to read selection")?,
        };
        // End of input counts as quitting.
        let Some(line) = line else {
            return Ok(BrowseEnd::Quit);
        };

        match parse_choice(&line) {
            Choice::Quit => return Ok(BrowseEnd::Quit),
            Choice::Next if view.has_next => page += 1,
            Choice::Prev if view.has_prev => page = (page - 1).min(last),
            Choice::Next | Choice::Prev => writeln!(out, "No more pages that way.")?,
            Choice::Unknown => writeln!(out, "Unrecognized choice: {}", line.trim())?,
            Choice::Ticket(id) => match app
                .catalog
                .export_selected(id, &app.who.user, app.config.export_byte_limit)
                .await
            {
                Ok(artifacts) => {
                    let paths = write_artifacts(out_dir, &artifacts)?;
                    for path in &paths {
                        writeln!(out, "Wrote {}", path.display())?;
                    }
                    return Ok(BrowseEnd::Exported(paths));
                }
                Err(e) => writeln!(out, "{}", e.user_message())?,
            },
        }
    }
}
