//! Support tickets backed by private channels, with transcripts captured on
//! close and split into size-bounded markdown files on export.

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod platform;
pub mod privilege;
pub mod provisioner;
pub mod scheduler;
pub mod splitter;
pub mod store;
pub mod transcript;

pub use error::{Result, SplitError, TicketError};
pub use lifecycle::{CloseOutcome, OpenRequest, OpenedTicket, TicketService};
