use thiserror::Error;

use crate::models::TicketStatus;
use crate::platform::PlatformError;

pub type Result<T, E = TicketError> = std::result::Result<T, E>;

/// Failures of the chunk splitter. None of them are retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("byte limit must be positive")]
    ZeroLimit,
    #[error("character {ch:?} needs {width} bytes but the limit is {limit}")]
    CharTooWide { ch: char, width: usize, limit: usize },
    #[error("part header needs {header} bytes but the limit is {limit}")]
    HeaderTooWide { header: usize, limit: usize },
}

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("could not create the ticket channel: {0}")]
    Provision(#[source] PlatformError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{user} may not {action}")]
    Unauthorized { user: String, action: String },
    #[error("ticket #{ticket_id} is {status}, expected {expected}")]
    InvalidState {
        ticket_id: i64,
        status: TicketStatus,
        expected: TicketStatus,
    },
    #[error("store failure: {0:#}")]
    Store(#[source] anyhow::Error),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error("platform failure: {0}")]
    Platform(#[from] PlatformError),
}

impl TicketError {
    pub fn not_found(what: impl Into<String>) -> Self {
        TicketError::NotFound(what.into())
    }

    /// Short text meant for the person who triggered the operation.
    pub fn user_message(&self) -> String {
        match self {
            TicketError::Provision(_) => {
                "The ticket channel could not be created. Please try again later.".to_string()
            }
            TicketError::NotFound(what) => format!("No {} matches this request.", what),
            TicketError::Unauthorized { action, .. } => {
                format!("You are not allowed to {}.", action)
            }
            TicketError::InvalidState { ticket_id, status, .. } => {
                format!("Ticket #{} is {}, so this cannot be done yet.", ticket_id, status)
            }
            TicketError::Store(_) => {
                "The ticket database is unavailable right now. Nothing was changed.".to_string()
            }
            TicketError::Split(_) => {
                "The transcript could not be cut into uploadable parts.".to_string()
            }
            TicketError::Platform(_) => {
                "The chat platform rejected the request. Nothing was changed.".to_string()
            }
        }
    }
}

impl From<anyhow::Error> for TicketError {
    fn from(err: anyhow::Error) -> Self {
        TicketError::Store(err)
    }
}
