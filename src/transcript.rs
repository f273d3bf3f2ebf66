//! Full-history capture of a ticket channel rendered as markdown.
//!
//! The assembler produces one unbounded document. Sizing it for upload is
//! the splitter's job.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::config::MAX_HISTORY_BATCH;
use crate::platform::{ChannelHandle, ChannelPlatform, HistoryMessage, PlatformError};

/// Ticket facts printed in the transcript header.
#[derive(Debug, Clone)]
pub struct TranscriptMeta {
    pub ticket_id: i64,
    pub server_id: String,
    pub channel_id: String,
    pub opener_label: String,
    pub reason: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub closed_by: String,
}

pub struct TranscriptAssembler {
    platform: Arc<dyn ChannelPlatform>,
    batch_size: usize,
}

impl TranscriptAssembler {
    pub fn new(platform: Arc<dyn ChannelPlatform>, batch_size: usize) -> Self {
        Self {
            platform,
            batch_size: batch_size.clamp(1, MAX_HISTORY_BATCH),
        }
    }

    /// Every message in the channel, oldest first. Nothing is kept if the
    /// returned future is dropped before it completes.
    pub async fn fetch_all(&self, channel: &ChannelHandle) -> Result<Vec<HistoryMessage>, PlatformError> {
        let mut all: Vec<HistoryMessage> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut before: Option<String> = None;

        loop {
            let batch = self
                .platform
                .fetch_history_batch(channel, before.as_deref(), self.batch_size)
                .await?;
            let fetched = batch.len();
            // The cursor follows platform order, not timestamps: the last
            // entry of a page is the oldest one the platform listed.
            let cursor = batch.last().map(|m| m.id.clone());

            let mut fresh = 0;
            for message in batch {
                if seen.insert(message.id.clone()) {
                    all.push(message);
                    fresh += 1;
                }
            }
            debug!(channel_id = %channel.id, fetched, fresh, total = all.len(), "history batch");

            match cursor {
                Some(id) if fetched >= self.batch_size && fresh > 0 => before = Some(id),
                _ => break,
            }
        }

        // Platforms page newest first; reversing keeps ties in posting order.
        all.reverse();
        all.sort_by_key(|m| m.created_at);
        Ok(all)
    }

    pub async fn assemble(
        &self,
        channel: &ChannelHandle,
        meta: &TranscriptMeta,
    ) -> Result<String, PlatformError> {
        let messages = self.fetch_all(channel).await?;
        Ok(render(meta, &messages))
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn render(meta: &TranscriptMeta, messages: &[HistoryMessage]) -> String {
    let mut md = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(md, "# Ticket #{} transcript\n", meta.ticket_id);
    let _ = writeln!(md, "- **Ticket:** #{}", meta.ticket_id);
    let _ = writeln!(md, "- **Server:** {}", escape_markdown(&meta.server_id));
    let _ = writeln!(md, "- **Channel:** {}", escape_markdown(&meta.channel_id));
    let _ = writeln!(md, "- **Opened by:** {}", escape_markdown(&meta.opener_label));
    let _ = writeln!(md, "- **Reason:** {}", escape_markdown(&meta.reason));
    let _ = writeln!(md, "- **Opened:** {}", iso(meta.opened_at));
    let _ = writeln!(md, "- **Closed:** {}", iso(meta.closed_at));
    let _ = writeln!(md, "- **Closed by:** {}", escape_markdown(&meta.closed_by));
    let _ = writeln!(md, "- **Messages:** {}", messages.len());
    md.push_str("\n---\n\n");

    for message in messages {
        let _ = writeln!(
            md,
            "[{}] {}: {}",
            iso(message.created_at),
            escape_markdown(&message.author_label),
            escape_markdown(&message.content)
        );
        for url in &message.attachments {
            let _ = writeln!(md, "  - attachment: {}", escape_markdown(url));
        }
        match message.rich_blocks {
            0 => {}
            1 => md.push_str("  - 1 rich content block\n"),
            n => {
                let _ = writeln!(md, "  - {} rich content blocks", n);
            }
        }
    }

    md
}

/// Neutralise markdown emphasis, code and table markers with a backslash and
/// turn angle brackets into entities. Embedded newlines become `<br>` so each
/// message stays on one line.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '*' | '_' | '~' | '`' | '|' => {
                out.push('\\');
                out.push(ch);
            }
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("<br>"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}
