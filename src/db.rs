use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::models::{ScheduledDeletion, Ticket, TicketStatus, TicketSummary};
use crate::store::TicketStore;

const SCHEMA_VERSION: i32 = 1;

const TICKET_COLUMNS: &str = "id, server_id, channel_id, opener_id, opener_label, reason, status, created_at, closed_at, closed_by, transcript";

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS tickets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    server_id TEXT NOT NULL,
                    channel_id TEXT,
                    opener_id TEXT NOT NULL,
                    opener_label TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL,
                    closed_at TEXT,
                    closed_by TEXT,
                    transcript TEXT,
                    CHECK ((status = 'closed') = (transcript IS NOT NULL)),
                    CHECK ((status = 'closed') = (closed_at IS NOT NULL AND closed_by IS NOT NULL))
                );

                -- Per-server settings
                CREATE TABLE IF NOT EXISTS server_config (
                    server_id TEXT PRIMARY KEY,
                    staff_role_id TEXT
                );

                -- Channel teardown requests that survive restarts
                CREATE TABLE IF NOT EXISTS scheduled_deletions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    channel_id TEXT NOT NULL,
                    due_at TEXT NOT NULL
                );

                -- At most one live ticket per channel
                CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_live_channel
                    ON tickets(channel_id) WHERE status != 'closed' AND channel_id IS NOT NULL;
                CREATE INDEX IF NOT EXISTS idx_tickets_server ON tickets(server_id, id);
                CREATE INDEX IF NOT EXISTS idx_tickets_channel ON tickets(channel_id);
                "#,
            )?;

            conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
        }

        Ok(())
    }

    pub fn create_ticket(
        &self,
        server_id: &str,
        opener_id: &str,
        opener_label: &str,
        reason: &str,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO tickets (server_id, opener_id, opener_label, reason, status, created_at) VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            params![server_id, opener_id, opener_label, reason, format_datetime(Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn open_ticket(&self, id: i64, channel_id: &str) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE tickets SET channel_id = ?1, status = 'open' WHERE id = ?2 AND status = 'pending'",
            params![channel_id, id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_ticket(&self, id: i64) -> Result<Option<Ticket>> {
        let conn = self.conn();
        let sql = format!("SELECT {} FROM tickets WHERE id = ?1", TICKET_COLUMNS);
        let ticket = conn.query_row(&sql, [id], ticket_from_row).optional()?;
        Ok(ticket)
    }

    pub fn get_ticket_by_channel(&self, channel_id: &str) -> Result<Option<Ticket>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM tickets WHERE channel_id = ?1 ORDER BY id DESC LIMIT 1",
            TICKET_COLUMNS
        );
        let ticket = conn
            .query_row(&sql, [channel_id], ticket_from_row)
            .optional()?;
        Ok(ticket)
    }

    /// Single-statement compare-and-set: status, close metadata and
    /// transcript are written together or not at all.
    pub fn close_ticket(
        &self,
        id: i64,
        expected: TicketStatus,
        closed_by: &str,
        transcript: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows = self.conn().execute(
            "UPDATE tickets SET status = 'closed', closed_at = ?1, closed_by = ?2, transcript = ?3 WHERE id = ?4 AND status = ?5",
            params![format_datetime(closed_at), closed_by, transcript, id, expected.as_str()],
        )?;
        Ok(rows > 0)
    }

    pub fn list_tickets(
        &self,
        server_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<TicketSummary>, usize)> {
        let conn = self.conn();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tickets WHERE server_id = ?1",
            [server_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, status, opener_label, reason, created_at FROM tickets WHERE server_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let summaries = stmt
            .query_map(params![server_id, limit as i64, offset as i64], |row| {
                Ok(TicketSummary {
                    id: row.get(0)?,
                    status: parse_status(row.get::<_, String>(1)?)?,
                    opener_label: row.get(2)?,
                    reason: row.get(3)?,
                    created_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((summaries, total as usize))
    }

    pub fn list_pending_before(
        &self,
        server_id: &str,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {} FROM tickets WHERE server_id = ?1 AND status = 'pending' AND created_at < ?2 ORDER BY id",
            TICKET_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let tickets = stmt
            .query_map(
                params![server_id, format_datetime(created_before)],
                ticket_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tickets)
    }

    // Server config
    pub fn get_staff_role(&self, server_id: &str) -> Result<Option<String>> {
        let role = self
            .conn()
            .query_row(
                "SELECT staff_role_id FROM server_config WHERE server_id = ?1",
                [server_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(role.flatten())
    }

    pub fn update_staff_role(&self, server_id: &str, role_id: Option<&str>) -> Result<()> {
        self.conn().execute(
            "INSERT INTO server_config (server_id, staff_role_id) VALUES (?1, ?2)
             ON CONFLICT(server_id) DO UPDATE SET staff_role_id = excluded.staff_role_id",
            params![server_id, role_id],
        )?;
        Ok(())
    }

    // Scheduled deletions
    pub fn add_scheduled_deletion(&self, channel_id: &str, due_at: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scheduled_deletions (channel_id, due_at) VALUES (?1, ?2)",
            params![channel_id, format_datetime(due_at)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn remove_scheduled_deletion(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM scheduled_deletions WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    pub fn get_scheduled_deletions(&self) -> Result<Vec<ScheduledDeletion>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, channel_id, due_at FROM scheduled_deletions ORDER BY due_at, id")?;
        let deletions = stmt
            .query_map([], |row| {
                Ok(ScheduledDeletion {
                    id: row.get(0)?,
                    channel_id: row.get(1)?,
                    due_at: parse_datetime(row.get::<_, String>(2)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(deletions)
    }
}

#[async_trait]
impl TicketStore for Database {
    async fn insert_pending(
        &self,
        scope: &str,
        opener_id: &str,
        opener_label: &str,
        reason: &str,
    ) -> Result<i64> {
        self.create_ticket(scope, opener_id, opener_label, reason)
            .context("Failed to insert pending ticket")
    }

    async fn mark_open(&self, id: i64, channel_id: &str) -> Result<bool> {
        self.open_ticket(id, channel_id)
            .with_context(|| format!("Failed to open ticket #{}", id))
    }

    async fn get_by_channel(&self, channel_id: &str) -> Result<Option<Ticket>> {
        self.get_ticket_by_channel(channel_id)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Ticket>> {
        self.get_ticket(id)
    }

    async fn cas_close(
        &self,
        id: i64,
        expected: TicketStatus,
        closed_by: &str,
        transcript: &str,
        closed_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.close_ticket(id, expected, closed_by, transcript, closed_at)
            .with_context(|| format!("Failed to close ticket #{}", id))
    }

    async fn list_by_scope(
        &self,
        scope: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<TicketSummary>, usize)> {
        self.list_tickets(scope, offset, limit)
    }

    async fn list_stale_pending(
        &self,
        scope: &str,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<Ticket>> {
        self.list_pending_before(scope, created_before)
    }

    async fn staff_role(&self, scope: &str) -> Result<Option<String>> {
        self.get_staff_role(scope)
    }

    async fn set_staff_role(&self, scope: &str, role_id: Option<&str>) -> Result<()> {
        self.update_staff_role(scope, role_id)
    }

    async fn insert_scheduled_deletion(
        &self,
        channel_id: &str,
        due_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.add_scheduled_deletion(channel_id, due_at)
    }

    async fn complete_scheduled_deletion(&self, id: i64) -> Result<bool> {
        self.remove_scheduled_deletion(id)
    }

    async fn list_scheduled_deletions(&self) -> Result<Vec<ScheduledDeletion>> {
        self.get_scheduled_deletions()
    }
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: row.get(0)?,
        server_id: row.get(1)?,
        channel_id: row.get(2)?,
        opener_id: row.get(3)?,
        opener_label: row.get(4)?,
        reason: row.get(5)?,
        status: parse_status(row.get::<_, String>(6)?)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
        closed_at: row.get::<_, Option<String>>(8)?.map(parse_datetime),
        closed_by: row.get(9)?,
        transcript: row.get(10)?,
    })
}

fn parse_status(s: String) -> rusqlite::Result<TicketStatus> {
    s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

/// Fixed-width UTC timestamps so that text comparison in SQL orders correctly.
pub(crate) fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    #[test]
    fn test_create_ticket_is_pending() {
        let (db, _dir) = setup_test_db();
        let id = db.create_ticket("srv", "u1", "alice", "help").unwrap();
        let ticket = db.get_ticket(id).unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Pending);
        assert!(ticket.channel_id.is_none());
        assert!(ticket.transcript.is_none());
        assert!(ticket.closed_at.is_none());
    }

    #[test]
    fn test_open_then_lookup_by_channel() {
        let (db, _dir) = setup_test_db();
        let id = db.create_ticket("srv", "u1", "alice", "help").unwrap();
        assert!(db.open_ticket(id, "c1").unwrap());
        assert!(!db.open_ticket(id, "c2").unwrap());

        let ticket = db.get_ticket_by_channel("c1").unwrap().unwrap();
        assert_eq!(ticket.id, id);
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(db.get_ticket_by_channel("c2").unwrap().is_none());
    }

    #[test]
    fn test_two_live_tickets_cannot_share_channel() {
        let (db, _dir) = setup_test_db();
        let a = db.create_ticket("srv", "u1", "alice", "a").unwrap();
        let b = db.create_ticket("srv", "u2", "bob", "b").unwrap();
        db.open_ticket(a, "c1").unwrap();
        assert!(db.open_ticket(b, "c1").is_err());
    }

    #[test]
    fn test_close_is_compare_and_set() {
        let (db, _dir) = setup_test_db();
        let id = db.create_ticket("srv", "u1", "alice", "help").unwrap();
        db.open_ticket(id, "c1").unwrap();

        let now = Utc::now();
        assert!(db.close_ticket(id, TicketStatus::Open, "u1", "first", now).unwrap());
        assert!(!db.close_ticket(id, TicketStatus::Open, "u2", "second", now).unwrap());

        let ticket = db.get_ticket(id).unwrap().unwrap();
        assert_eq!(ticket.status, TicketStatus::Closed);
        assert_eq!(ticket.transcript.as_deref(), Some("first"));
        assert_eq!(ticket.closed_by.as_deref(), Some("u1"));
        assert!(ticket.closed_at.is_some());
    }

    #[test]
    fn test_close_pending_ticket_is_refused() {
        let (db, _dir) = setup_test_db();
        let id = db.create_ticket("srv", "u1", "alice", "help").unwrap();
        assert!(!db.close_ticket(id, TicketStatus::Open, "u1", "t", Utc::now()).unwrap());
        assert_eq!(db.get_ticket(id).unwrap().unwrap().status, TicketStatus::Pending);
    }

    #[test]
    fn test_list_tickets_newest_first_with_total() {
        let (db, _dir) = setup_test_db();
        for i in 0..5 {
            db.create_ticket("srv", "u1", "alice", &format!("r{}", i)).unwrap();
        }
        db.create_ticket("other", "u1", "alice", "elsewhere").unwrap();

        let (page, total) = db.list_tickets("srv", 0, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert!(page[0].id > page[1].id);
        assert_eq!(page[0].reason, "r4");

        let (page, _) = db.list_tickets("srv", 4, 2).unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn test_list_pending_before() {
        let (db, _dir) = setup_test_db();
        let stale = db.create_ticket("srv", "u1", "alice", "stuck").unwrap();
        let opened = db.create_ticket("srv", "u1", "alice", "fine").unwrap();
        db.open_ticket(opened, "c1").unwrap();

        let later = Utc::now() + ChronoDuration::minutes(1);
        let pending = db.list_pending_before("srv", later).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, stale);

        let earlier = Utc::now() - ChronoDuration::minutes(1);
        assert!(db.list_pending_before("srv", earlier).unwrap().is_empty());
    }

    #[test]
    fn test_staff_role_set_and_clear() {
        let (db, _dir) = setup_test_db();
        assert!(db.get_staff_role("srv").unwrap().is_none());
        db.update_staff_role("srv", Some("role-9")).unwrap();
        assert_eq!(db.get_staff_role("srv").unwrap().as_deref(), Some("role-9"));
        db.update_staff_role("srv", None).unwrap();
        assert!(db.get_staff_role("srv").unwrap().is_none());
    }

    #[test]
    fn test_scheduled_deletions_roundtrip() {
        let (db, _dir) = setup_test_db();
        let due = Utc::now();
        let id = db.add_scheduled_deletion("c1", due).unwrap();
        let all = db.get_scheduled_deletions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].channel_id, "c1");
        assert_eq!(all[0].due_at.timestamp_micros(), due.timestamp_micros());

        assert!(db.remove_scheduled_deletion(id).unwrap());
        assert!(!db.remove_scheduled_deletion(id).unwrap());
        assert!(db.get_scheduled_deletions().unwrap().is_empty());
    }

    #[test]
    fn test_reopen_database_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tickets.db");
        let id = {
            let db = Database::open(&path).unwrap();
            db.create_ticket("srv", "u1", "alice", "persist").unwrap()
        };
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_ticket(id).unwrap().unwrap().reason, "persist");
    }
}
