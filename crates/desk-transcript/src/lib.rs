//! Transcript capture for closed tickets.
//!
//! Drains the full ordered message history of a ticket channel through the
//! transport's pagination, renders one archival Markdown document with the
//! ticket metadata and the message log, and persists it atomically under the
//! transcript directory. Retrieval is capped at a fixed message ceiling to
//! bound memory and latency; attachments are preserved as external links,
//! never re-uploaded.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::DateTime;
use desk_core::{current_unix_timestamp_ms, write_text_atomic};
use desk_store::Ticket;
use desk_transport::{validate_channel_message, ChannelMessage, ChannelTransport};

pub const DEFAULT_TRANSCRIPT_MAX_MESSAGES: usize = 5_000;
pub const TRANSCRIPT_MAX_MESSAGES_ENV: &str = "DESK_TRANSCRIPT_MAX_MESSAGES";

/// Resolves the retrieval ceiling from the environment, keeping the default
/// when the override is absent or unusable.
pub fn resolve_transcript_max_messages() -> usize {
    let Ok(raw) = env::var(TRANSCRIPT_MAX_MESSAGES_ENV) else {
        return DEFAULT_TRANSCRIPT_MAX_MESSAGES;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_TRANSCRIPT_MAX_MESSAGES;
    }
    match trimmed.parse::<usize>() {
        Ok(value) if value > 0 => value,
        _ => {
            tracing::warn!(
                raw = %raw,
                default = DEFAULT_TRANSCRIPT_MAX_MESSAGES,
                "ignoring unusable transcript max-messages override"
            );
            DEFAULT_TRANSCRIPT_MAX_MESSAGES
        }
    }
}

/// Rendered archival document plus where it was persisted.
#[derive(Debug, Clone)]
pub struct TranscriptDocument {
    pub file_name: String,
    pub path: PathBuf,
    pub content: String,
    pub message_count: usize,
    pub truncated: bool,
}

/// Captures channel history into archival Markdown documents.
pub struct TranscriptCapturer {
    transport: Arc<dyn ChannelTransport>,
    output_dir: PathBuf,
    max_messages: usize,
}

impl TranscriptCapturer {
    pub fn new(transport: Arc<dyn ChannelTransport>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            transport,
            output_dir: output_dir.as_ref().to_path_buf(),
            max_messages: resolve_transcript_max_messages(),
        }
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }

    /// Retrieves the channel history for `ticket` and persists the rendered
    /// document. Failures propagate to the caller; the close path logs them
    /// and proceeds, since closure is already durable by the time capture
    /// runs.
    pub async fn capture(&self, ticket: &Ticket) -> Result<TranscriptDocument> {
        let (messages, truncated) = self.drain_history(&ticket.channel_ref).await?;
        let content = render_transcript(ticket, &messages, truncated, self.max_messages);

        let file_name = format!(
            "transcript-ticket-{}-{}.md",
            ticket.number,
            current_unix_timestamp_ms()
        );
        let path = self.output_dir.join(&file_name);
        write_text_atomic(&path, &content)
            .with_context(|| format!("failed to persist transcript {}", path.display()))?;

        Ok(TranscriptDocument {
            file_name,
            path,
            content,
            message_count: messages.len(),
            truncated,
        })
    }

    async fn drain_history(&self, channel_ref: &str) -> Result<(Vec<ChannelMessage>, bool)> {
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;
        let mut truncated = false;

        loop {
            let page = self
                .transport
                .fetch_history(channel_ref, page_token.as_deref())
                .await
                .with_context(|| format!("failed to fetch history for channel {channel_ref}"))?;
            if page.messages.is_empty() {
                break;
            }

            for message in page.messages {
                if messages.len() >= self.max_messages {
                    truncated = true;
                    break;
                }
                if let Err(error) = validate_channel_message(&message) {
                    tracing::warn!(
                        channel_ref = %channel_ref,
                        error = %format!("{error:#}"),
                        "skipping malformed history message"
                    );
                    continue;
                }
                messages.push(message);
            }

            if truncated {
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok((messages, truncated))
    }
}

fn render_transcript(
    ticket: &Ticket,
    messages: &[ChannelMessage],
    truncated: bool,
    max_messages: usize,
) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# Ticket #{} transcript", ticket.number));
    lines.push(String::new());
    lines.push(format!(
        "- Requester: {} (`{}`)",
        ticket.requester_label, ticket.requester_id
    ));
    lines.push(format!("- Category: {}", ticket.category));
    lines.push(format!("- Summary: {}", ticket.summary));
    lines.push(format!("- Created: {}", format_utc_ms(ticket.created_at_ms)));
    if let Some(closed_at_ms) = ticket.closed_at_ms {
        lines.push(format!("- Closed: {}", format_utc_ms(closed_at_ms)));
    }
    if truncated {
        lines.push(format!(
            "- Messages: {} (capped at {max_messages})",
            messages.len()
        ));
    } else {
        lines.push(format!("- Messages: {}", messages.len()));
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(String::new());

    for message in messages {
        let author = if message.author_display.trim().is_empty() {
            message.author_id.clone()
        } else {
            message.author_display.clone()
        };
        lines.push(format!(
            "**{author}** (`{}`) — {}",
            message.author_id,
            format_utc_ms(message.timestamp_ms)
        ));
        if !message.text.trim().is_empty() {
            lines.push(message.text.trim().to_string());
        }
        for attachment in &message.attachments {
            let label = if attachment.file_name.trim().is_empty() {
                attachment.attachment_id.as_str()
            } else {
                attachment.file_name.as_str()
            };
            lines.push(format!("[attachment: {label}]({})", attachment.url));
        }
        lines.push(String::new());
    }

    let mut content = lines.join("\n");
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content
}

fn format_utc_ms(timestamp_ms: u64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|moment| moment.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("unix-ms {timestamp_ms}"))
}
