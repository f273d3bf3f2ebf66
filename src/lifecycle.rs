//! Open and close transitions of a ticket.
//!
//! `pending --(channel provisioned)--> open --(close, CAS on status)--> closed`
//!
//! A ticket whose channel could not be provisioned stays `pending`; it is
//! never retried here.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, TicketError};
use crate::models::{Ticket, TicketStatus};
use crate::platform::{ChannelHandle, ChannelPlatform, OutgoingMessage, ParentScope, PlatformError};
use crate::privilege::PrivilegeCheck;
use crate::provisioner::SessionProvisioner;
use crate::scheduler::DeletionScheduler;
use crate::store::TicketStore;
use crate::transcript::{render, TranscriptAssembler, TranscriptMeta};

const HISTORY_UNAVAILABLE: &str = "_History unavailable: the channel no longer exists._\n";

#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    pub scope: &'a str,
    pub requester_id: &'a str,
    pub requester_label: &'a str,
    pub reason: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedTicket {
    pub ticket_id: i64,
    pub channel: ChannelHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This call performed the transition.
    Closed { ticket_id: i64, transcript: String },
    /// Someone closed it first; carries the stored transcript.
    AlreadyClosed { ticket_id: i64, transcript: String },
}

impl CloseOutcome {
    pub fn ticket_id(&self) -> i64 {
        match self {
            CloseOutcome::Closed { ticket_id, .. } | CloseOutcome::AlreadyClosed { ticket_id, .. } => {
                *ticket_id
            }
        }
    }

    pub fn transcript(&self) -> &str {
        match self {
            CloseOutcome::Closed { transcript, .. }
            | CloseOutcome::AlreadyClosed { transcript, .. } => transcript,
        }
    }
}

pub struct TicketService {
    store: Arc<dyn TicketStore>,
    platform: Arc<dyn ChannelPlatform>,
    provisioner: SessionProvisioner,
    assembler: TranscriptAssembler,
    scheduler: Arc<DeletionScheduler>,
    privileges: Arc<dyn PrivilegeCheck>,
    config: Config,
}

impl TicketService {
    pub fn new(
        store: Arc<dyn TicketStore>,
        platform: Arc<dyn ChannelPlatform>,
        privileges: Arc<dyn PrivilegeCheck>,
        config: Config,
    ) -> Self {
        Self {
            provisioner: SessionProvisioner::new(platform.clone(), config.system_actor.clone()),
            assembler: TranscriptAssembler::new(platform.clone(), config.history_batch()),
            scheduler: DeletionScheduler::new(store.clone(), platform.clone()),
            store,
            platform,
            privileges,
            config,
        }
    }

    pub fn scheduler(&self) -> &Arc<DeletionScheduler> {
        &self.scheduler
    }

    pub fn is_privileged(&self, scope: &str, user_id: &str) -> bool {
        self.privileges.is_privileged(scope, user_id)
    }

    /// Record a pending ticket, provision its private channel, then flip it
    /// to open and post the opening message.
    pub async fn open(&self, request: OpenRequest<'_>) -> Result<OpenedTicket> {
        let ticket_id = self
            .store
            .insert_pending(
                request.scope,
                request.requester_id,
                request.requester_label,
                request.reason,
            )
            .await?;
        info!(ticket_id, scope = request.scope, requester = request.requester_id, "ticket pending");

        let mut roles = self.config.privileged_roles.clone();
        if let Some(staff) = self.store.staff_role(request.scope).await? {
            roles.push(staff);
        }
        let acl = self.provisioner.ticket_acl(request.requester_id, &roles);
        let parent = ParentScope {
            server_id: request.scope.to_string(),
            category: self.config.parent_scope.clone(),
        };

        let channel = match self
            .provisioner
            .create(request.requester_label, request.requester_id, &parent, &acl)
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                warn!(ticket_id, error = %e, "provisioning failed, ticket stays pending");
                return Err(TicketError::Provision(e));
            }
        };

        let backfill = match self.store.mark_open(ticket_id, &channel.id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(TicketError::Store(anyhow::anyhow!(
                "ticket #{} left the pending state during provisioning",
                ticket_id
            ))),
            Err(e) => Err(TicketError::Store(e)),
        };
        if let Err(e) = backfill {
            if let Err(cleanup) = self.platform.delete_channel(&channel).await {
                warn!(ticket_id, channel_id = %channel.id, error = %cleanup, "could not remove orphaned channel");
            }
            return Err(e);
        }
        info!(ticket_id, channel_id = %channel.id, "ticket open");

        let welcome = OutgoingMessage::with_close_control(format!(
            "Ticket #{} opened by {}.\nReason: {}\nStaff will be with you shortly. Use the close control when you are done.",
            ticket_id, request.requester_label, request.reason
        ));
        if let Err(e) = self.platform.send_message(&channel, &welcome).await {
            warn!(ticket_id, channel_id = %channel.id, error = %e, "could not post opening message");
        }

        Ok(OpenedTicket { ticket_id, channel })
    }

    /// Capture the channel history, store it with the closed status in one
    /// compare-and-set, then schedule the channel's removal.
    pub async fn close(&self, channel_id: &str, closer_id: &str) -> Result<CloseOutcome> {
        let ticket = self
            .store
            .get_by_channel(channel_id)
            .await?
            .ok_or_else(|| TicketError::not_found(format!("ticket for channel {}", channel_id)))?;

        match ticket.status {
            TicketStatus::Closed => return Ok(already_closed(ticket)),
            TicketStatus::Pending => {
                return Err(TicketError::InvalidState {
                    ticket_id: ticket.id,
                    status: ticket.status,
                    expected: TicketStatus::Open,
                })
            }
            TicketStatus::Open => {}
        }

        if closer_id != ticket.opener_id && !self.is_privileged(&ticket.server_id, closer_id) {
            warn!(ticket_id = ticket.id, closer = closer_id, "close refused");
            return Err(TicketError::Unauthorized {
                user: closer_id.to_string(),
                action: format!("close ticket #{}", ticket.id),
            });
        }

        let channel = ChannelHandle::new(channel_id);
        let closed_at = Utc::now();
        let meta = TranscriptMeta {
            ticket_id: ticket.id,
            server_id: ticket.server_id.clone(),
            channel_id: channel_id.to_string(),
            opener_label: ticket.opener_label.clone(),
            reason: ticket.reason.clone(),
            opened_at: ticket.created_at,
            closed_at,
            closed_by: closer_id.to_string(),
        };
        // A channel removed out from under its ticket must not leave the
        // ticket stuck open; it closes with a header-only transcript.
        let (transcript, channel_gone) = match self.assembler.assemble(&channel, &meta).await {
            Ok(transcript) => (transcript, false),
            Err(PlatformError::UnknownChannel(_)) => {
                warn!(ticket_id = ticket.id, channel_id, "ticket channel is gone, closing without history");
                let mut transcript = render(&meta, &[]);
                transcript.push_str(HISTORY_UNAVAILABLE);
                (transcript, true)
            }
            Err(e) => return Err(e.into()),
        };

        let won = self
            .store
            .cas_close(ticket.id, TicketStatus::Open, closer_id, &transcript, closed_at)
            .await?;
        if !won {
            let current = self
                .store
                .get_by_id(ticket.id)
                .await?
                .ok_or_else(|| TicketError::not_found(format!("ticket #{}", ticket.id)))?;
            if current.status != TicketStatus::Closed {
                return Err(TicketError::InvalidState {
                    ticket_id: current.id,
                    status: current.status,
                    expected: TicketStatus::Open,
                });
            }
            info!(ticket_id = current.id, "lost close race");
            return Ok(already_closed(current));
        }
        info!(ticket_id = ticket.id, closer = closer_id, bytes = transcript.len(), "ticket closed");
        if channel_gone {
            return Ok(CloseOutcome::Closed {
                ticket_id: ticket.id,
                transcript,
            });
        }

        let grace = self.config.grace_delay();
        let notice = OutgoingMessage::text(format!(
            "Ticket #{} closed by {}. This channel will be deleted in {} seconds.",
            ticket.id,
            closer_id,
            grace.as_secs()
        ));
        if let Err(e) = self.platform.send_message(&channel, &notice).await {
            warn!(ticket_id = ticket.id, error = %e, "could not post close confirmation");
        }
        if let Err(e) = self.scheduler.schedule(&channel, grace).await {
            warn!(ticket_id = ticket.id, channel_id, error = %e, "could not schedule channel deletion");
        }

        Ok(CloseOutcome::Closed {
            ticket_id: ticket.id,
            transcript,
        })
    }

    /// Set or clear the scope's staff role. Privileged callers only.
    pub async fn set_staff_role(&self, scope: &str, actor_id: &str, role_id: Option<&str>) -> Result<()> {
        if !self.is_privileged(scope, actor_id) {
            return Err(TicketError::Unauthorized {
                user: actor_id.to_string(),
                action: "change the ticket staff role".to_string(),
            });
        }
        self.store.set_staff_role(scope, role_id).await?;
        info!(scope, role = role_id, "ticket staff role updated");
        Ok(())
    }

    /// Pending tickets older than `max_age`; candidates for manual follow-up.
    pub async fn stale_pending(&self, scope: &str, max_age: Duration) -> Result<Vec<Ticket>> {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).map_err(anyhow::Error::from)?;
        Ok(self.store.list_stale_pending(scope, cutoff).await?)
    }
}

fn already_closed(ticket: Ticket) -> CloseOutcome {
    CloseOutcome::AlreadyClosed {
        ticket_id: ticket.id,
        transcript: ticket.transcript.unwrap_or_default(),
    }
}
