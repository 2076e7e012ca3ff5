//! Ticket lifecycle state machine.
//!
//! Drives the open → closed transitions over the durable ledger: at most one
//! open ticket per requester, monotonically increasing ticket numbers, and
//! the close-time side effects (transcript capture, feedback solicitation,
//! grace-delayed channel teardown). Every precondition check and mutation
//! runs inside a single accessor transaction, so concurrent operations never
//! race the duplicate-open check or the counter. Side effects run detached;
//! their failures are logged and never abort or reopen a closed ticket.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use desk_core::current_unix_timestamp_ms;
use desk_feedback::FeedbackCollector;
use desk_store::{StoreAccessor, Ticket, TicketLedger, TicketStatus};
use desk_transcript::TranscriptCapturer;
use desk_transport::{ChannelTransport, ChannelVisibility};
use thiserror::Error;
use tracing::{info, warn};

mod lifecycle_config;

pub use lifecycle_config::{
    resolve_close_grace_ms, LifecycleConfig, CLOSE_GRACE_MS_ENV, DEFAULT_CLOSE_GRACE_MS,
};

/// Enumerates supported `TicketError` values. Rejections carry short
/// user-facing reasons; internal failures stay generic.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("you already have an open ticket; close it before opening a new one")]
    AlreadyOpen,
    #[error("no open ticket found for this channel")]
    NotFound,
    #[error("failed to create the ticket channel")]
    ChannelCreation(#[source] anyhow::Error),
    #[error("failed to persist ticket state")]
    Persistence(#[source] anyhow::Error),
}

/// Core ticket state machine. All state it owns is injected at construction;
/// a fresh instance over a fresh accessor starts from a clean slate.
pub struct TicketLifecycle {
    accessor: Arc<StoreAccessor>,
    transport: Arc<dyn ChannelTransport>,
    transcripts: Arc<TranscriptCapturer>,
    feedback: Arc<FeedbackCollector>,
    config: LifecycleConfig,
}

impl TicketLifecycle {
    pub fn new(
        accessor: Arc<StoreAccessor>,
        transport: Arc<dyn ChannelTransport>,
        transcripts: Arc<TranscriptCapturer>,
        feedback: Arc<FeedbackCollector>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            accessor,
            transport,
            transcripts,
            feedback,
            config,
        }
    }

    /// Opens a ticket for `requester_id`, creating its channel and recording
    /// it durably.
    ///
    /// The whole operation holds one accessor transaction, so two concurrent
    /// opens for the same requester cannot both pass the duplicate-open scan
    /// and two opens for different requesters cannot be assigned the same
    /// number. The counter reservation is committed before channel creation:
    /// a failed creation leaves a durable gap in the numbering, never a
    /// collision, and no ticket record.
    pub async fn open_ticket(
        &self,
        requester_id: &str,
        requester_label: &str,
        category: &str,
        summary: &str,
    ) -> Result<Ticket, TicketError> {
        let mut txn = self.accessor.begin().await;
        if txn.ledger().open_ticket_for(requester_id).is_some() {
            return Err(TicketError::AlreadyOpen);
        }

        let number = txn.ledger().counter + 1;
        txn.ledger_mut().counter = number;
        txn.commit().map_err(TicketError::Persistence)?;

        let visibility = ChannelVisibility {
            requester_id: requester_id.to_string(),
            staff_role_id: self.config.staff_role_id.clone(),
        };
        let channel_ref = self
            .transport
            .create_channel(&format!("ticket-{number}"), &visibility)
            .await
            .map_err(TicketError::ChannelCreation)?;

        let ticket = Ticket {
            number,
            requester_id: requester_id.to_string(),
            requester_label: requester_label.to_string(),
            channel_ref: channel_ref.clone(),
            category: category.to_string(),
            summary: summary.to_string(),
            status: TicketStatus::Open,
            created_at_ms: current_unix_timestamp_ms(),
            closed_at_ms: None,
            extra: BTreeMap::new(),
        };
        txn.ledger_mut().append_ticket(ticket.clone());
        txn.commit().map_err(TicketError::Persistence)?;
        drop(txn);

        let welcome = format!(
            "Ticket #{number} opened for {requester_label}. Staff will be with you shortly.\nService: {summary}"
        );
        if let Err(error) = self.transport.send_message(&channel_ref, &welcome).await {
            warn!(
                ticket_number = number,
                channel_ref = %channel_ref,
                error = %format!("{error:#}"),
                "failed to send ticket welcome message"
            );
        }

        info!(
            ticket_number = number,
            requester_id = %requester_id,
            category = %category,
            "opened ticket"
        );
        Ok(ticket)
    }

    /// Closes the open ticket bound to `channel_ref` and detaches the
    /// archival side effects.
    ///
    /// Idempotent in effect: a second close for the same channel finds no
    /// open match and rejects with `NotFound`. The status flip is the source
    /// of truth; transcript, feedback, and channel deletion run after it and
    /// cannot undo it.
    pub async fn close_ticket(
        &self,
        channel_ref: &str,
        closer_id: &str,
        closer_label: &str,
    ) -> Result<Ticket, TicketError> {
        let mut txn = self.accessor.begin().await;
        let closed = {
            let Some(ticket) = txn.ledger_mut().find_open_by_channel_mut(channel_ref) else {
                return Err(TicketError::NotFound);
            };
            ticket.status = TicketStatus::Closed;
            ticket.closed_at_ms = Some(current_unix_timestamp_ms());
            ticket.clone()
        };
        txn.commit().map_err(TicketError::Persistence)?;
        drop(txn);

        info!(
            ticket_number = closed.number,
            channel_ref = %channel_ref,
            closer_id = %closer_id,
            "closed ticket"
        );
        self.spawn_close_side_effects(closed.clone(), closer_label.to_string());
        Ok(closed)
    }

    /// Administrative bulk reset: empties the ticket mapping and zeroes the
    /// counter. Irreversible; the capability check belongs to the caller.
    pub async fn reset_all(&self) -> Result<(), TicketError> {
        let mut txn = self.accessor.begin().await;
        *txn.ledger_mut() = TicketLedger::default();
        txn.commit().map_err(TicketError::Persistence)?;
        info!("reset all ticket state");
        Ok(())
    }

    /// Read-only lookup of the open ticket bound to a channel, reflecting
    /// the latest durable state.
    pub async fn find_open_by_channel(&self, channel_ref: &str) -> Option<Ticket> {
        self.accessor
            .snapshot()
            .await
            .find_open_by_channel(channel_ref)
            .cloned()
    }

    /// Runs the close-time side effects in one detached task. Order matters:
    /// the transcript must be captured before the channel is deleted. Every
    /// failure here is logged locally and never reaches the close caller.
    fn spawn_close_side_effects(&self, ticket: Ticket, closer_label: String) {
        let transport = Arc::clone(&self.transport);
        let transcripts = Arc::clone(&self.transcripts);
        let feedback = Arc::clone(&self.feedback);
        let archive_channel = self.config.archive_channel.clone();
        let grace = Duration::from_millis(self.config.close_grace_ms);

        tokio::spawn(async move {
            let notice = format!("Ticket #{} closed by {closer_label}.", ticket.number);
            if let Err(error) = transport.send_message(&ticket.channel_ref, &notice).await {
                warn!(
                    ticket_number = ticket.number,
                    error = %format!("{error:#}"),
                    "failed to send closure notice"
                );
            }

            match transcripts.capture(&ticket).await {
                Ok(document) => {
                    if let Some(archive) = archive_channel {
                        let post = format!(
                            "Transcript for ticket #{} (closed by {closer_label})\n\n{}",
                            ticket.number, document.content
                        );
                        if let Err(error) = transport.send_message(&archive, &post).await {
                            warn!(
                                ticket_number = ticket.number,
                                archive_channel = %archive,
                                error = %format!("{error:#}"),
                                "failed to post transcript to archive channel"
                            );
                        }
                    }
                }
                Err(error) => {
                    warn!(
                        ticket_number = ticket.number,
                        channel_ref = %ticket.channel_ref,
                        error = %format!("{error:#}"),
                        "transcript capture failed; closing without archive"
                    );
                    let apology = format!(
                        "Could not capture a transcript for ticket #{}; the ticket is closed without one.",
                        ticket.number
                    );
                    let _ = transport.send_message(&ticket.channel_ref, &apology).await;
                }
            }

            feedback
                .request_feedback(&ticket.requester_id, &ticket.summary, &closer_label)
                .await;

            tokio::time::sleep(grace).await;
            if let Err(error) = transport.delete_channel(&ticket.channel_ref).await {
                warn!(
                    ticket_number = ticket.number,
                    channel_ref = %ticket.channel_ref,
                    error = %format!("{error:#}"),
                    "failed to delete ticket channel"
                );
            }
        });
    }
}
