use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

use ticketbox::export::write_artifacts;

use super::{user_facing, App};

pub async fn run(
    app: &App,
    id: i64,
    out_dir: &Path,
    byte_limit: Option<usize>,
) -> Result<Vec<PathBuf>> {
    let limit = byte_limit.unwrap_or(app.config.export_byte_limit);
    if limit == 0 {
        bail!("--byte-limit must be positive");
    }

    let artifacts = app
        .catalog
        .export_selected(id, &app.who.user, limit)
        .await
        .map_err(user_facing)?;
    let paths = write_artifacts(out_dir, &artifacts)?;

    for (path, artifact) in paths.iter().zip(&artifacts) {
        println!("Wrote {} ({} bytes)", path.display(), artifact.len());
    }
    println!("Exported ticket #{} as {} file(s)", id, paths.len());
    Ok(paths)
}
