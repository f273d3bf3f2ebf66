//! Paginated listing of a scope's tickets and re-export of a chosen one.

use std::sync::Arc;

use crate::error::{Result, TicketError};
use tracing::warn;

use crate::export::{export_transcript, Artifact, ExportSource};
use crate::models::{Ticket, TicketStatus, TicketSummary};
use crate::privilege::PrivilegeCheck;
use crate::store::TicketStore;

const REASON_WIDTH: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: i64,
    pub status: TicketStatus,
    pub label: String,
}

impl From<TicketSummary> for CatalogItem {
    fn from(summary: TicketSummary) -> Self {
        let label = format!(
            "{} #{} {}: {}",
            summary.status.glyph(),
            summary.id,
            summary.opener_label,
            truncate(&summary.reason, REASON_WIDTH)
        );
        Self {
            id: summary.id,
            status: summary.status,
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub page: usize,
    pub items: Vec<CatalogItem>,
    pub has_prev: bool,
    pub has_next: bool,
    pub total: usize,
}

pub struct CatalogBrowser {
    store: Arc<dyn TicketStore>,
    privileges: Arc<dyn PrivilegeCheck>,
    page_size: usize,
}

impl CatalogBrowser {
    pub fn new(store: Arc<dyn TicketStore>, privileges: Arc<dyn PrivilegeCheck>, page_size: usize) -> Self {
        Self {
            store,
            privileges,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Newest first. Boundaries are reported, not clamped: a page past the
    /// end comes back empty with `has_next == false`.
    pub async fn list_page(&self, scope: &str, page: usize) -> Result<PageView> {
        let offset = page.saturating_mul(self.page_size);
        let (summaries, total) = self
            .store
            .list_by_scope(scope, offset, self.page_size)
            .await?;
        Ok(PageView {
            page,
            items: summaries.into_iter().map(CatalogItem::from).collect(),
            has_prev: page > 0,
            has_next: offset.saturating_add(self.page_size) < total,
            total,
        })
    }

    /// Index of the last populated page, for callers that clamp.
    pub fn last_page(&self, total: usize) -> usize {
        total.saturating_sub(1) / self.page_size
    }

    pub async fn select(&self, ticket_id: i64) -> Result<Ticket> {
        self.store
            .get_by_id(ticket_id)
            .await?
            .ok_or_else(|| TicketError::not_found(format!("ticket #{}", ticket_id)))
    }

    /// Split the stored transcript at `byte_limit`, at request time.
    /// Transcripts hold other people's messages, so only identities that are
    /// privileged in the ticket's scope may export them.
    pub async fn export_selected(&self, ticket_id: i64, actor_id: &str, byte_limit: usize) -> Result<Vec<Artifact>> {
        let ticket = self.select(ticket_id).await?;
        if !self.privileges.is_privileged(&ticket.server_id, actor_id) {
            warn!(ticket_id, actor = actor_id, "export refused");
            return Err(TicketError::Unauthorized {
                user: actor_id.to_string(),
                action: format!("export the transcript of ticket #{}", ticket_id),
            });
        }
        let transcript = match (ticket.status, ticket.transcript.as_deref()) {
            (TicketStatus::Closed, Some(transcript)) => transcript,
            (status, _) => {
                return Err(TicketError::InvalidState {
                    ticket_id,
                    status,
                    expected: TicketStatus::Closed,
                })
            }
        };
        Ok(export_transcript(&ExportSource::of(&ticket), transcript, byte_limit)?)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::privilege::AdminList;
    use chrono::Utc;
    use tempfile::tempdir;

    fn setup(count: usize) -> (Arc<Database>, CatalogBrowser, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("test.db")).unwrap());
        for i in 0..count {
            db.create_ticket("srv", "u1", "alice", &format!("reason {}", i))
                .unwrap();
        }
        let browser = CatalogBrowser::new(db.clone(), Arc::new(AdminList::new(["admin"])), 25);
        (db, browser, dir)
    }

    #[tokio::test]
    async fn test_first_page_is_newest() {
        let (_db, browser, _dir) = setup(30);
        let view = browser.list_page("srv", 0).await.unwrap();
        assert_eq!(view.items.len(), 25);
        assert_eq!(view.items[0].id, 30);
        assert!(!view.has_prev);
        assert!(view.has_next);
        assert_eq!(view.total, 30);
    }

    #[tokio::test]
    async fn test_last_and_past_end_pages() {
        let (_db, browser, _dir) = setup(30);
        let view = browser.list_page("srv", 1).await.unwrap();
        assert_eq!(view.items.len(), 5);
        assert!(view.has_prev);
        assert!(!view.has_next);

        let view = browser.list_page("srv", 7).await.unwrap();
        assert!(view.items.is_empty());
        assert!(!view.has_next);
        assert_eq!(browser.last_page(view.total), 1);
    }

    #[tokio::test]
    async fn test_exact_page_boundary() {
        let (_db, browser, _dir) = setup(25);
        let view = browser.list_page("srv", 0).await.unwrap();
        assert_eq!(view.items.len(), 25);
        assert!(!view.has_next);
        assert_eq!(browser.last_page(0), 0);
        assert_eq!(browser.last_page(25), 0);
        assert_eq!(browser.last_page(26), 1);
    }

    #[tokio::test]
    async fn test_other_scopes_are_invisible() {
        let (db, browser, _dir) = setup(2);
        db.create_ticket("other", "u9", "zed", "elsewhere").unwrap();
        let view = browser.list_page("srv", 0).await.unwrap();
        assert_eq!(view.total, 2);
    }

    #[test]
    fn test_item_label() {
        let item = CatalogItem::from(TicketSummary {
            id: 12,
            status: TicketStatus::Pending,
            opener_label: "bob".to_string(),
            reason: "x".repeat(60),
            created_at: Utc::now(),
        });
        assert!(item.label.starts_with("⏳ #12 bob: xxx"));
        assert!(item.label.ends_with("..."));
        assert_eq!(item.label.chars().filter(|c| *c == 'x').count(), 37);
    }

    #[tokio::test]
    async fn test_select_missing_is_not_found() {
        let (_db, browser, _dir) = setup(0);
        let err = browser.select(99).await.unwrap_err();
        assert!(matches!(err, TicketError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_export_requires_closed_ticket() {
        let (db, browser, _dir) = setup(1);
        let err = browser.export_selected(1, "admin", 1000).await.unwrap_err();
        assert!(matches!(err, TicketError::InvalidState { .. }));

        db.open_ticket(1, "chan-1").unwrap();
        db.close_ticket(1, TicketStatus::Open, "mod", "# Ticket #1 transcript\n", Utc::now())
            .unwrap();
        let artifacts = browser.export_selected(1, "admin", 1000).await.unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].filename, "transcript-ticket-1-part-01.md");
    }

    #[tokio::test]
    async fn test_export_by_unprivileged_identity_is_refused() {
        let (db, browser, _dir) = setup(1);
        db.open_ticket(1, "chan-1").unwrap();
        db.close_ticket(1, TicketStatus::Open, "u1", "# Ticket #1 transcript\n", Utc::now())
            .unwrap();

        // Neither a stranger nor the ticket's own opener may export.
        for actor in ["mallory", "u1"] {
            let err = browser.export_selected(1, actor, 1000).await.unwrap_err();
            assert!(matches!(err, TicketError::Unauthorized { ref user, .. } if user == actor));
        }
    }

    #[tokio::test]
    async fn test_export_headers_carry_ticket_origin() {
        let (db, browser, _dir) = setup(1);
        db.open_ticket(1, "chan-1").unwrap();
        db.close_ticket(1, TicketStatus::Open, "mod", "# Ticket #1 transcript\n", Utc::now())
            .unwrap();
        let artifacts = browser.export_selected(1, "admin", 1000).await.unwrap();
        let text = String::from_utf8(artifacts[0].bytes.clone()).unwrap();
        assert!(text.starts_with("> Ticket #1 transcript, part 1 of 1 (server srv, channel chan-1)\n\n"));
    }

    #[tokio::test]
    async fn test_export_budget_applies_at_request_time() {
        let (db, browser, _dir) = setup(1);
        let transcript: String = (0..100).map(|i| format!("line {:03}\n", i)).collect();
        db.open_ticket(1, "chan-1").unwrap();
        db.close_ticket(1, TicketStatus::Open, "mod", &transcript, Utc::now())
            .unwrap();

        let wide = browser.export_selected(1, "admin", 10_000).await.unwrap();
        let narrow = browser.export_selected(1, "admin", 200).await.unwrap();
        assert_eq!(wide.len(), 1);
        assert!(narrow.len() > 1);
        assert!(narrow.iter().all(|a| a.len() <= 200));
    }
}
