//! Loopback platform stored next to the ticket database.
//!
//! Lets the CLI run the whole cycle on one machine: channels, their access
//! lists and messages live in SQLite tables separate from the ticket store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use super::{
    Acl, AclSubject, ChannelHandle, ChannelPlatform, HistoryMessage, OutgoingMessage, ParentScope,
    PlatformError,
};
use crate::db::{format_datetime, parse_datetime};

pub struct LocalPlatform {
    conn: Mutex<Connection>,
    system_actor: String,
}

impl LocalPlatform {
    pub fn open(path: &Path, system_actor: &str) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open platform database")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS platform_channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                server_id TEXT NOT NULL,
                category TEXT,
                acl TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS platform_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id INTEGER NOT NULL,
                author_id TEXT NOT NULL,
                author_label TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]',
                rich_blocks INTEGER NOT NULL DEFAULT 0,
                close_control INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (channel_id) REFERENCES platform_channels(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_platform_messages_channel
                ON platform_messages(channel_id, id);
            "#,
        )?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(Self {
            conn: Mutex::new(conn),
            system_actor: system_actor.to_string(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn channel_acl(&self, conn: &Connection, channel: &ChannelHandle) -> Result<Option<Acl>, PlatformError> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT acl FROM platform_channels WHERE id = ?1",
                [parse_channel_id(channel)?],
                |row| row.get(0),
            )
            .optional()
            .map_err(anyhow::Error::from)?;
        raw.map(|json| serde_json::from_str(&json).map_err(|e| PlatformError::Backend(e.into())))
            .transpose()
    }

    /// Post a message as a user. Users outside the channel's access list are
    /// refused unless `privileged` is set.
    pub fn post(
        &self,
        channel: &ChannelHandle,
        author_id: &str,
        author_label: &str,
        content: &str,
        attachments: &[String],
        privileged: bool,
    ) -> Result<String, PlatformError> {
        let conn = self.conn();
        let acl = self
            .channel_acl(&conn, channel)?
            .ok_or_else(|| PlatformError::UnknownChannel(channel.id.clone()))?;
        if !privileged && !acl.allows(&AclSubject::User(author_id.to_string())) {
            return Err(PlatformError::Rejected(format!(
                "{} cannot post in channel {}",
                author_id, channel.id
            )));
        }

        let attachments = serde_json::to_string(attachments).map_err(anyhow::Error::from)?;
        conn.execute(
            "INSERT INTO platform_messages (channel_id, author_id, author_label, content, created_at, attachments) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                parse_channel_id(channel)?,
                author_id,
                author_label,
                content,
                format_datetime(Utc::now()),
                attachments
            ],
        )
        .map_err(anyhow::Error::from)?;
        Ok(conn.last_insert_rowid().to_string())
    }

    pub fn channel_exists(&self, channel: &ChannelHandle) -> Result<bool, PlatformError> {
        let conn = self.conn();
        Ok(self.channel_acl(&conn, channel)?.is_some())
    }
}

fn parse_channel_id(channel: &ChannelHandle) -> Result<i64, PlatformError> {
    channel
        .id
        .parse()
        .map_err(|_| PlatformError::UnknownChannel(channel.id.clone()))
}

#[async_trait]
impl ChannelPlatform for LocalPlatform {
    async fn create_channel(
        &self,
        name: &str,
        parent: &ParentScope,
        acl: &Acl,
    ) -> Result<ChannelHandle, PlatformError> {
        let acl_json = serde_json::to_string(acl).map_err(anyhow::Error::from)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO platform_channels (name, server_id, category, acl) VALUES (?1, ?2, ?3, ?4)",
            params![name, parent.server_id, parent.category, acl_json],
        )
        .map_err(|e| PlatformError::Rejected(e.to_string()))?;
        let handle = ChannelHandle::new(conn.last_insert_rowid().to_string());
        debug!(channel_id = %handle.id, name, "created local channel");
        Ok(handle)
    }

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let conn = self.conn();
        if self.channel_acl(&conn, channel)?.is_none() {
            return Err(PlatformError::UnknownChannel(channel.id.clone()));
        }
        conn.execute(
            "INSERT INTO platform_messages (channel_id, author_id, author_label, content, created_at, close_control) VALUES (?1, ?2, ?2, ?3, ?4, ?5)",
            params![
                parse_channel_id(channel)?,
                self.system_actor,
                message.content,
                format_datetime(Utc::now()),
                message.close_control
            ],
        )
        .map_err(anyhow::Error::from)?;
        Ok(())
    }

    async fn fetch_history_batch(
        &self,
        channel: &ChannelHandle,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        let conn = self.conn();
        if self.channel_acl(&conn, channel)?.is_none() {
            return Err(PlatformError::UnknownChannel(channel.id.clone()));
        }
        let before: Option<i64> = before.and_then(|cursor| cursor.parse().ok());

        let mut stmt = conn
            .prepare(
                "SELECT id, author_id, author_label, content, created_at, attachments, rich_blocks
                 FROM platform_messages
                 WHERE channel_id = ?1 AND (?2 IS NULL OR id < ?2)
                 ORDER BY id DESC LIMIT ?3",
            )
            .map_err(anyhow::Error::from)?;
        let rows = stmt
            .query_map(
                params![parse_channel_id(channel)?, before, limit as i64],
                |row| {
                    let attachments: String = row.get(5)?;
                    let attachments = serde_json::from_str(&attachments).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                    })?;
                    Ok(HistoryMessage {
                        id: row.get::<_, i64>(0)?.to_string(),
                        author_id: row.get(1)?,
                        author_label: row.get(2)?,
                        content: row.get(3)?,
                        created_at: parse_datetime(row.get::<_, String>(4)?),
                        attachments,
                        rich_blocks: row.get::<_, i64>(6)? as usize,
                    })
                },
            )
            .map_err(anyhow::Error::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(anyhow::Error::from)?;
        Ok(rows)
    }

    async fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), PlatformError> {
        let rows = self
            .conn()
            .execute(
                "DELETE FROM platform_channels WHERE id = ?1",
                [parse_channel_id(channel)?],
            )
            .map_err(anyhow::Error::from)?;
        if rows == 0 {
            return Err(PlatformError::UnknownChannel(channel.id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup_platform() -> (LocalPlatform, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tickets.db");
        let platform = LocalPlatform::open(&path, "ticketbox").unwrap();
        (platform, dir)
    }

    fn private_acl(user: &str) -> Acl {
        Acl {
            deny_default: true,
            allow: vec![AclSubject::User(user.to_string())],
        }
    }

    fn parent() -> ParentScope {
        ParentScope {
            server_id: "local".to_string(),
            category: Some("support".to_string()),
        }
    }

    #[tokio::test]
    async fn test_post_and_fetch_history() {
        let (platform, _dir) = setup_platform();
        let chan = platform
            .create_channel("ticket-a", &parent(), &private_acl("u1"))
            .await
            .unwrap();

        platform
            .send_message(&chan, &OutgoingMessage::with_close_control("welcome"))
            .await
            .unwrap();
        platform
            .post(&chan, "u1", "alice", "hello", &["https://x/y.png".to_string()], false)
            .unwrap();

        let batch = platform.fetch_history_batch(&chan, None, 100).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].content, "hello");
        assert_eq!(batch[0].attachments, vec!["https://x/y.png".to_string()]);
        assert_eq!(batch[1].author_id, "ticketbox");

        let older = platform
            .fetch_history_batch(&chan, Some(&batch[0].id), 100)
            .await
            .unwrap();
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].content, "welcome");
    }

    #[tokio::test]
    async fn test_corrupt_attachments_fail_the_fetch() {
        let (platform, _dir) = setup_platform();
        let chan = platform
            .create_channel("ticket-a", &parent(), &private_acl("u1"))
            .await
            .unwrap();
        platform
            .post(&chan, "u1", "alice", "see file", &["https://x/y.png".to_string()], false)
            .unwrap();
        platform
            .conn()
            .execute("UPDATE platform_messages SET attachments = 'not json'", [])
            .unwrap();

        let result = platform.fetch_history_batch(&chan, None, 10).await;
        assert!(matches!(result, Err(PlatformError::Backend(_))));
    }

    #[tokio::test]
    async fn test_post_respects_acl() {
        let (platform, _dir) = setup_platform();
        let chan = platform
            .create_channel("ticket-a", &parent(), &private_acl("u1"))
            .await
            .unwrap();

        let err = platform
            .post(&chan, "intruder", "eve", "hi", &[], false)
            .unwrap_err();
        assert!(matches!(err, PlatformError::Rejected(_)));
        assert!(platform.post(&chan, "admin", "root", "hi", &[], true).is_ok());
    }

    #[tokio::test]
    async fn test_delete_removes_channel_and_messages() {
        let (platform, _dir) = setup_platform();
        let chan = platform
            .create_channel("ticket-a", &parent(), &private_acl("u1"))
            .await
            .unwrap();
        platform.post(&chan, "u1", "alice", "hello", &[], false).unwrap();

        platform.delete_channel(&chan).await.unwrap();
        assert!(!platform.channel_exists(&chan).unwrap());
        assert!(matches!(
            platform.fetch_history_batch(&chan, None, 10).await,
            Err(PlatformError::UnknownChannel(_))
        ));
        assert!(platform.delete_channel(&chan).await.is_err());
    }
}
