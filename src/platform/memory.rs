//! In-memory platform fake for exercising the lifecycle without a backend.
//!
//! Channels, messages and deletions are kept in a `Mutex`-guarded map. The
//! fake counts history requests and can be told to fail the next channel
//! creation, optionally leaving a half-created channel behind.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{
    Acl, ChannelHandle, ChannelPlatform, HistoryMessage, OutgoingMessage, ParentScope,
    PlatformError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateFailure {
    /// Reject outright, nothing allocated.
    Reject,
    /// Allocate the channel, then fail.
    Partial,
}

#[derive(Debug, Clone)]
pub struct MemoryChannel {
    pub name: String,
    pub parent: ParentScope,
    pub acl: Acl,
    pub sent: Vec<OutgoingMessage>,
    history: Vec<HistoryMessage>,
}

#[derive(Default)]
struct State {
    next_channel: u64,
    next_message: u64,
    channels: HashMap<String, MemoryChannel>,
    deleted: Vec<String>,
    fail_create: Option<CreateFailure>,
    history_calls: usize,
}

#[derive(Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not wedge the other assertions.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_next_create(&self, failure: CreateFailure) {
        self.lock().fail_create = Some(failure);
    }

    /// Append a message authored by `author` at `created_at`. Returns its id.
    pub fn post_at(
        &self,
        channel: &ChannelHandle,
        author: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Option<String> {
        let mut state = self.lock();
        state.next_message += 1;
        let id = state.next_message.to_string();
        let chan = state.channels.get_mut(&channel.id)?;
        chan.history.push(HistoryMessage {
            id: id.clone(),
            author_id: author.to_string(),
            author_label: author.to_string(),
            content: content.to_string(),
            created_at,
            attachments: Vec::new(),
            rich_blocks: 0,
        });
        Some(id)
    }

    /// Seed `count` messages one second apart, starting at `start`.
    pub fn seed(&self, channel: &ChannelHandle, author: &str, count: usize, start: DateTime<Utc>) {
        for i in 0..count {
            let at = start + Duration::seconds(i as i64);
            self.post_at(channel, author, &format!("message {}", i), at);
        }
    }

    pub fn push_history(&self, channel: &ChannelHandle, message: HistoryMessage) {
        if let Some(chan) = self.lock().channels.get_mut(&channel.id) {
            chan.history.push(message);
        }
    }

    pub fn channel(&self, id: &str) -> Option<MemoryChannel> {
        self.lock().channels.get(id).cloned()
    }

    pub fn channel_count(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn history_calls(&self) -> usize {
        self.lock().history_calls
    }

    pub fn deleted_channels(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }
}

#[async_trait]
impl ChannelPlatform for MemoryPlatform {
    async fn create_channel(
        &self,
        name: &str,
        parent: &ParentScope,
        acl: &Acl,
    ) -> Result<ChannelHandle, PlatformError> {
        let mut state = self.lock();
        let failure = state.fail_create.take();
        if failure == Some(CreateFailure::Reject) {
            return Err(PlatformError::Rejected("channel quota reached".to_string()));
        }

        state.next_channel += 1;
        let handle = ChannelHandle::new(format!("chan-{}", state.next_channel));
        state.channels.insert(
            handle.id.clone(),
            MemoryChannel {
                name: name.to_string(),
                parent: parent.clone(),
                acl: acl.clone(),
                sent: Vec::new(),
                history: Vec::new(),
            },
        );

        if failure == Some(CreateFailure::Partial) {
            return Err(PlatformError::PartiallyCreated {
                handle,
                reason: "missing permission to edit overwrites".to_string(),
            });
        }
        Ok(handle)
    }

    async fn send_message(
        &self,
        channel: &ChannelHandle,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        let chan = state
            .channels
            .get_mut(&channel.id)
            .ok_or_else(|| PlatformError::UnknownChannel(channel.id.clone()))?;
        chan.sent.push(message.clone());
        Ok(())
    }

    async fn fetch_history_batch(
        &self,
        channel: &ChannelHandle,
        before: Option<&str>,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        // Give concurrent callers a chance to interleave, like a real network hop.
        tokio::task::yield_now().await;

        let mut state = self.lock();
        state.history_calls += 1;
        let chan = state
            .channels
            .get(&channel.id)
            .ok_or_else(|| PlatformError::UnknownChannel(channel.id.clone()))?;

        let end = match before {
            Some(cursor) => chan
                .history
                .iter()
                .position(|m| m.id == cursor)
                .unwrap_or(chan.history.len()),
            None => chan.history.len(),
        };
        let start = end.saturating_sub(limit);
        Ok(chan.history[start..end].iter().rev().cloned().collect())
    }

    async fn delete_channel(&self, channel: &ChannelHandle) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if state.channels.remove(&channel.id).is_none() {
            return Err(PlatformError::UnknownChannel(channel.id.clone()));
        }
        state.deleted.push(channel.id.clone());
        Ok(())
    }
}
