use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use ticketbox::config::DEFAULT_CONFIG_JSON;
use ticketbox::db::Database;
use ticketbox::platform::local::LocalPlatform;

use super::{CONFIG_FILE, DB_FILE, DIR_NAME, PLATFORM_FILE};

pub fn run(path: &Path, force: bool) -> Result<()> {
    let ticketbox_dir = path.join(DIR_NAME);
    let config_path = ticketbox_dir.join(CONFIG_FILE);

    if ticketbox_dir.exists() && config_path.exists() && !force {
        println!("Already initialized at {}", path.display());
        println!("Use --force to reset config.json to the defaults.");
        return Ok(());
    }

    if !ticketbox_dir.exists() {
        fs::create_dir_all(&ticketbox_dir).context("Failed to create .ticketbox directory")?;
        println!("Created {}", ticketbox_dir.display());
    }

    // Opening creates the schema.
    Database::open(&ticketbox_dir.join(DB_FILE))?;
    LocalPlatform::open(&ticketbox_dir.join(PLATFORM_FILE), "ticketbox")?;

    let existed = config_path.exists();
    fs::write(&config_path, DEFAULT_CONFIG_JSON)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    if existed {
        println!("Reset {} to the defaults", config_path.display());
    } else {
        println!("Wrote {}", config_path.display());
    }

    Ok(())
}
