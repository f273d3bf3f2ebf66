pub mod browse;
pub mod close;
pub mod export;
pub mod init;
pub mod list;
pub mod open;
pub mod role;
pub mod say;
pub mod show;
pub mod sweep;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use ticketbox::catalog::CatalogBrowser;
use ticketbox::config::Config;
use ticketbox::db::Database;
use ticketbox::platform::local::LocalPlatform;
use ticketbox::privilege::{AdminList, PrivilegeCheck};
use ticketbox::{TicketError, TicketService};

pub const DIR_NAME: &str = ".ticketbox";
pub const DB_FILE: &str = "tickets.db";
pub const PLATFORM_FILE: &str = "channels.db";
pub const CONFIG_FILE: &str = "config.json";

/// Who is running the command, and where.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: String,
    pub label: String,
    pub scope: String,
}

pub struct App {
    pub config: Config,
    pub db: Arc<Database>,
    pub platform: Arc<LocalPlatform>,
    pub service: TicketService,
    pub catalog: CatalogBrowser,
    pub who: Identity,
}

impl App {
    pub fn open(dir: &Path, who: Identity) -> Result<Self> {
        let config = Config::load(&dir.join(CONFIG_FILE))?;
        let db = Arc::new(Database::open(&dir.join(DB_FILE)).context("Failed to open database")?);
        let platform = Arc::new(LocalPlatform::open(
            &dir.join(PLATFORM_FILE),
            &config.system_actor,
        )?);
        let privileges: Arc<dyn PrivilegeCheck> = Arc::new(AdminList::new(config.admin_ids.clone()));
        let service = TicketService::new(db.clone(), platform.clone(), privileges.clone(), config.clone());
        let catalog = CatalogBrowser::new(db.clone(), privileges, config.page_size);

        Ok(Self {
            config,
            db,
            platform,
            service,
            catalog,
            who,
        })
    }
}

/// Lead with the plain-language message; keep the technical cause attached.
pub fn user_facing(err: TicketError) -> anyhow::Error {
    let message = err.user_message();
    anyhow::Error::new(err).context(message)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    pub fn who(user: &str) -> Identity {
        Identity {
            user: user.to_string(),
            label: user.to_string(),
            scope: "local".to_string(),
        }
    }

    /// Initialized `.ticketbox` in a tempdir, with `admin` as administrator.
    pub fn setup_app(user: &str) -> (App, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        super::init::run(dir.path(), false).unwrap();
        let ticketbox_dir = dir.path().join(DIR_NAME);
        let config = Config {
            admin_ids: vec!["admin".to_string()],
            grace_delay_secs: 0,
            ..Config::default()
        };
        std::fs::write(
            ticketbox_dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(&config).unwrap(),
        )
        .unwrap();
        let app = App::open(&ticketbox_dir, who(user)).unwrap();
        (app, dir)
    }

    /// A second handle on the same workspace acting as `user`.
    pub fn as_user(dir: &TempDir, user: &str) -> App {
        App::open(&dir.path().join(DIR_NAME), who(user)).unwrap()
    }
}
