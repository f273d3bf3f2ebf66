use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ScheduledDeletion, Ticket, TicketStatus, TicketSummary};

/// Durable record of tickets. Safe for concurrent use by several lifecycle
/// operations; it is the single source of truth for ticket state.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn insert_pending(
        &self,
        scope: &str,
        opener_id: &str,
        opener_label: &str,
        reason: &str,
    ) -> Result<i64>;

    /// Back-fill the channel and flip `pending -> open`. False if the ticket
    /// was not pending.
    async fn mark_open(&self, id: i64, channel_id: &str) -> Result<bool>;

    async fn get_by_channel(&self, channel_id: &str) -> Result<Option<Ticket>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Ticket>>;

    /// Atomically close the ticket if its status is still `expected`.
    /// Exactly one concurrent caller observes `true`.
    async fn cas_close(
        &self,
        id: i64,
        expected: TicketStatus,
        closed_by: &str,
        transcript: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Page of tickets for `scope`, newest first, plus the scope's total.
    async fn list_by_scope(
        &self,
        scope: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<TicketSummary>, usize)>;

    async fn list_stale_pending(
        &self,
        scope: &str,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Ticket>>;

    async fn staff_role(&self, scope: &str) -> Result<Option<String>>;

    async fn set_staff_role(&self, scope: &str, role_id: Option<&str>) -> Result<()>;

    async fn insert_scheduled_deletion(&self, channel_id: &str, due_at: DateTime<Utc>)
        -> Result<i64>;

    async fn complete_scheduled_deletion(&self, id: i64) -> Result<bool>;

    async fn list_scheduled_deletions(&self) -> Result<Vec<ScheduledDeletion>>;
}
