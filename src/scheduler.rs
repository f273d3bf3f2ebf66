//! Delayed channel teardown backed by persisted records.
//!
//! Each request is written to the store before its timer is armed, so a
//! restart inside the grace window only delays the deletion: [`reconcile`]
//! re-arms whatever is still on record. The record id doubles as the
//! cancellation token.
//!
//! [`reconcile`]: DeletionScheduler::reconcile

use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::ScheduledDeletion;
use crate::platform::{ChannelHandle, ChannelPlatform, PlatformError};
use crate::store::TicketStore;

pub struct DeletionScheduler {
    store: Arc<dyn TicketStore>,
    platform: Arc<dyn ChannelPlatform>,
    timers: Mutex<HashMap<i64, JoinHandle<()>>>,
}

impl DeletionScheduler {
    pub fn new(store: Arc<dyn TicketStore>, platform: Arc<dyn ChannelPlatform>) -> Arc<Self> {
        Arc::new(Self {
            store,
            platform,
            timers: Mutex::new(HashMap::new()),
        })
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<i64, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist a deletion of `channel` due after `delay` and arm its timer.
    pub async fn schedule(self: &Arc<Self>, channel: &ChannelHandle, delay: Duration) -> Result<i64> {
        let due_at = Utc::now() + chrono::Duration::from_std(delay)?;
        let id = self.store.insert_scheduled_deletion(&channel.id, due_at).await?;
        self.arm(ScheduledDeletion {
            id,
            channel_id: channel.id.clone(),
            due_at,
        });
        info!(deletion_id = id, channel_id = %channel.id, ?delay, "scheduled channel deletion");
        Ok(id)
    }

    fn arm(self: &Arc<Self>, record: ScheduledDeletion) {
        let delay = (record.due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let id = record.id;
        let this = Arc::clone(self);
        // Held across spawn and insert: on a multi-threaded runtime the task
        // may finish before `insert`, and its `remove` must not run first.
        let mut timers = self.timers();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.execute(&record).await;
            this.timers().remove(&record.id);
        });
        if let Some(previous) = timers.insert(id, handle) {
            previous.abort();
        }
    }

    async fn execute(&self, record: &ScheduledDeletion) -> bool {
        let channel = ChannelHandle::new(record.channel_id.clone());
        match self.platform.delete_channel(&channel).await {
            Ok(()) | Err(PlatformError::UnknownChannel(_)) => {}
            Err(e) => {
                warn!(deletion_id = record.id, channel_id = %record.channel_id, error = %e, "channel deletion failed, will retry on next reconcile");
                return false;
            }
        }
        if let Err(e) = self.store.complete_scheduled_deletion(record.id).await {
            warn!(deletion_id = record.id, error = %e, "could not clear deletion record");
            return false;
        }
        info!(deletion_id = record.id, channel_id = %record.channel_id, "deleted ticket channel");
        true
    }

    /// Abort the timer and drop the record. False if nothing was armed.
    pub async fn cancel(&self, id: i64) -> Result<bool> {
        let armed = self.timers().remove(&id);
        let Some(handle) = armed else {
            return Ok(false);
        };
        handle.abort();
        self.store.complete_scheduled_deletion(id).await?;
        Ok(true)
    }

    /// Arm a timer for every persisted record not already armed. Overdue
    /// records fire immediately. Returns how many were armed.
    pub async fn reconcile(self: &Arc<Self>) -> Result<usize> {
        let records = self.store.list_scheduled_deletions().await?;
        let mut armed = 0;
        for record in records {
            if self.timers().contains_key(&record.id) {
                continue;
            }
            self.arm(record);
            armed += 1;
        }
        if armed > 0 {
            info!(armed, "re-armed scheduled channel deletions");
        }
        Ok(armed)
    }

    /// Run every record that is already due, without waiting on timers.
    pub async fn run_due(&self) -> Result<usize> {
        let now = Utc::now();
        let mut done = 0;
        for record in self.store.list_scheduled_deletions().await? {
            if record.due_at > now {
                continue;
            }
            if let Some(handle) = self.timers().remove(&record.id) {
                handle.abort();
            }
            if self.execute(&record).await {
                done += 1;
            }
        }
        Ok(done)
    }

    pub fn armed(&self) -> usize {
        self.timers().len()
    }

    /// Wait for every armed timer to fire.
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = self.timers().drain().map(|(_, h)| h).collect();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }
}
