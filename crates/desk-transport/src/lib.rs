//! Chat-platform transport contract consumed by the ticket lifecycle.
//!
//! The lifecycle manager, transcript capturer, and feedback collector only
//! talk to the platform through [`ChannelTransport`]; concrete gateway
//! implementations live with the embedding application. This crate defines
//! the trait seam plus the message and pagination types that cross it, and
//! enforces hygiene checks so downstream code only consumes well-formed
//! history entries.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Visibility rules applied to a newly created ticket channel: the requester
/// and the staff role see it, nobody else does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelVisibility {
    pub requester_id: String,
    pub staff_role_id: String,
}

/// Public struct `MessageAttachment` carried across the transport seam.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageAttachment {
    pub attachment_id: String,
    pub url: String,
    #[serde(default)]
    pub file_name: String,
}

/// Public struct `ChannelMessage` carried across the transport seam.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelMessage {
    pub message_id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_display: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<MessageAttachment>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// One page of channel history, oldest message first. A `next_page_token`
/// of `None` marks the final page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<ChannelMessage>,
    pub next_page_token: Option<String>,
}

/// Trait contract for the chat platform consumed by the ticket system.
///
/// Implementations are expected to be cheap to clone behind an `Arc` and
/// safe to call from concurrently running tasks.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Creates a communication channel scoped by `visibility` and returns an
    /// opaque channel reference.
    async fn create_channel(&self, name: &str, visibility: &ChannelVisibility) -> Result<String>;

    /// Tears down a channel. The caller treats failures as non-fatal.
    async fn delete_channel(&self, channel_ref: &str) -> Result<()>;

    /// Posts a message into a channel.
    async fn send_message(&self, channel_ref: &str, content: &str) -> Result<()>;

    /// Fetches one page of channel history, oldest first. Pass the token from
    /// the previous page to continue; `None` starts from the beginning.
    async fn fetch_history(
        &self,
        channel_ref: &str,
        page_token: Option<&str>,
    ) -> Result<HistoryPage>;

    /// Sends a private message to a user. Returns `Ok(false)` when the user
    /// cannot be reached (e.g. direct messages disabled) without treating
    /// that as a transport error.
    async fn send_direct(&self, user_id: &str, content: &str) -> Result<bool>;
}

/// Validates a history message before downstream code consumes it.
pub fn validate_channel_message(message: &ChannelMessage) -> Result<()> {
    if message.message_id.trim().is_empty() {
        bail!("history message has empty message_id");
    }
    if message.author_id.trim().is_empty() {
        bail!(
            "history message '{}' has empty author_id",
            message.message_id
        );
    }
    if message.timestamp_ms == 0 {
        bail!(
            "history message '{}' has zero timestamp_ms",
            message.message_id
        );
    }
    for attachment in &message.attachments {
        if attachment.attachment_id.trim().is_empty() {
            bail!(
                "history message '{}' has attachment with empty attachment_id",
                message.message_id
            );
        }
        if attachment.url.trim().is_empty() {
            bail!(
                "history message '{}' has attachment '{}' with empty url",
                message.message_id,
                attachment.attachment_id
            );
        }
    }
    Ok(())
}
