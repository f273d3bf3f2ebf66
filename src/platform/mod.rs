//! The chat platform that hosts ticket channels.
//!
//! The lifecycle only talks to [`ChannelPlatform`]; [`local::LocalPlatform`]
//! backs the CLI with SQLite and [`memory::MemoryPlatform`] is an in-process
//! fake for tests.

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub id: String,
}

impl ChannelHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Where a new channel is created: the owning server and an optional category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentScope {
    pub server_id: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AclSubject {
    User(String),
    Role(String),
}

/// Access list for a ticket channel. Everyone not listed in `allow` is
/// denied when `deny_default` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub deny_default: bool,
    pub allow: Vec<AclSubject>,
}

impl Acl {
    pub fn allows(&self, subject: &AclSubject) -> bool {
        !self.deny_default || self.allow.contains(subject)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: String,
    /// Attach a "close ticket" control to the message.
    pub close_control: bool,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            close_control: false,
        }
    }

    pub fn with_close_control(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            close_control: true,
        }
    }
}

/// One message read back from a channel's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    pub author_id: String,
    pub author_label: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<String>,
    /// Number of rich-content blocks (embeds) on the message.
    pub rich_blocks: usize,
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform rejected the request: {0}")]
    Rejected(String),
    /// Creation failed after the platform had already allocated a resource.
    #[error("channel {} was created but could not be finished: {reason}", .handle.id)]
    PartiallyCreated { handle: ChannelHandle, reason: String },
    #[error("unknown channel {0}")]
    UnknownChannel(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait ChannelPlatform: Send + Sync {
    async fn create_channel(
        &self,
        name: &str,
        parent: &ParentScope,
        acl: &Acl,
    ) -> Result<ChannelHandle, PlatformError>;

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError>;

    /// Up to `limit` messages posted before the message `before`, newest
    /// first in posting order. Timestamps need not follow that order.
    async fn fetch_history_batch(
        &self,
        channel: &ChannelHandle,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError>;

    async fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), PlatformError>;
}
