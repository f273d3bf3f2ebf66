mod commands;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;

use commands::{App, Identity, DIR_NAME};

#[derive(Parser)]
#[command(name = "ticketbox")]
#[command(about = "Support tickets in private channels, with markdown transcripts")]
#[command(version)]
struct Cli {
    /// Identity to act as
    #[arg(long = "as", env = "TICKETBOX_USER", default_value = "local-user", global = true)]
    user: String,

    /// Display name shown in channels and transcripts (defaults to the identity)
    #[arg(long, env = "TICKETBOX_LABEL", global = true)]
    label: Option<String>,

    /// Server scope the tickets belong to
    #[arg(long, env = "TICKETBOX_SCOPE", default_value = "local", global = true)]
    scope: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize ticketbox in the current directory
    Init {
        /// Overwrite config.json with the defaults
        #[arg(long)]
        force: bool,
    },

    /// Open a ticket and its private channel
    Open {
        /// Why the ticket is being opened
        reason: String,
    },

    /// Post a message in a ticket channel
    Say {
        /// Channel id
        channel: String,
        /// Message text
        text: String,
        /// Attachment URL (repeatable)
        #[arg(long = "attach")]
        attachments: Vec<String>,
    },

    /// Close the ticket bound to a channel and capture its transcript
    Close {
        /// Channel id
        channel: String,
    },

    /// List tickets, newest first
    List {
        /// Page number, starting at 0
        #[arg(short, long, default_value_t = 0)]
        page: usize,
    },

    /// Show ticket details
    Show {
        /// Ticket ID
        id: i64,
    },

    /// Write a closed ticket's transcript as size-bounded markdown files
    Export {
        /// Ticket ID
        id: i64,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Maximum bytes per file (defaults to export_byte_limit)
        #[arg(long)]
        byte_limit: Option<usize>,
    },

    /// Page through tickets and pick one to export
    Browse {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Manage the ticket staff role for the scope
    Role {
        #[command(subcommand)]
        action: RoleCommands,
    },

    /// Finish due channel deletions and report stale pending tickets
    Sweep {
        /// Also wait out deletions still in their grace window
        #[arg(long)]
        wait: bool,
        /// Age in minutes after which a pending ticket is reported
        #[arg(long, default_value_t = 60)]
        stale_minutes: u64,
    },
}

#[derive(Subcommand)]
enum RoleCommands {
    /// Grant a role access to every new ticket channel
    Set {
        /// Role id
        role: String,
    },
    /// Remove the staff role
    Clear,
}

fn find_ticketbox_dir() -> Result<PathBuf> {
    let mut current = env::current_dir()?;

    loop {
        let candidate = current.join(DIR_NAME);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a ticketbox directory (or any parent). Run 'ticketbox init' first.");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ticketbox::logging::init(cli.log_json);

    if let Commands::Init { force } = cli.command {
        let cwd = env::current_dir()?;
        return commands::init::run(&cwd, force);
    }

    let who = Identity {
        label: cli.label.unwrap_or_else(|| cli.user.clone()),
        user: cli.user,
        scope: cli.scope,
    };
    let app = App::open(&find_ticketbox_dir()?, who)?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Open { reason } => commands::open::run(&app, &reason).await.map(|_| ()),
        Commands::Say {
            channel,
            text,
            attachments,
        } => commands::say::run(&app, &channel, &text, &attachments).map(|_| ()),
        Commands::Close { channel } => commands::close::run(&app, &channel).await.map(|_| ()),
        Commands::List { page } => commands::list::run(&app, page).await,
        Commands::Show { id } => commands::show::run(&app, id).await,
        Commands::Export {
            id,
            out,
            byte_limit,
        } => commands::export::run(&app, id, &out, byte_limit)
            .await
            .map(|_| ()),
        Commands::Browse { out } => {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            commands::browse::run(&app, stdin, &mut stdout, &out)
                .await
                .map(|_| ())
        }
        Commands::Role { action } => match action {
            RoleCommands::Set { role } => commands::role::set(&app, &role).await,
            RoleCommands::Clear => commands::role::clear(&app).await,
        },
        Commands::Sweep {
            wait,
            stale_minutes,
        } => commands::sweep::run(&app, wait, stale_minutes).await,
    }
}
