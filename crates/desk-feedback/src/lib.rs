//! Post-closure feedback collection.
//!
//! After a ticket closes, the requester receives a private five-level rating
//! prompt. The selected rating is held in an ephemeral in-memory session until
//! an optional comment arrives, then exactly one feedback record is published
//! through the [`FeedbackSink`]. Sessions idle past the bounded window are
//! abandoned silently; nothing here is persisted, and pending sessions are
//! lost on restart by design.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use desk_core::{current_unix_timestamp_ms, is_expired_unix_ms};
use desk_transport::ChannelTransport;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

mod feedback_prompt;

pub use feedback_prompt::{rating_prompt, rating_stars};

pub const DEFAULT_FEEDBACK_IDLE_MS: u64 = 15 * 60 * 1_000;
pub const FEEDBACK_IDLE_MS_ENV: &str = "DESK_FEEDBACK_IDLE_MS";
pub const MAX_COMMENT_CHARS: usize = 1_000;
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

const FALLBACK_SUMMARY: &str = "Support";

/// Resolves the session idle window from the environment, keeping the
/// default when the override is absent or unusable.
pub fn resolve_feedback_idle_ms() -> u64 {
    let Ok(raw) = env::var(FEEDBACK_IDLE_MS_ENV) else {
        return DEFAULT_FEEDBACK_IDLE_MS;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_FEEDBACK_IDLE_MS;
    }
    match trimmed.parse::<u64>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(
                raw = %raw,
                default = DEFAULT_FEEDBACK_IDLE_MS,
                "ignoring unusable feedback idle-window override"
            );
            DEFAULT_FEEDBACK_IDLE_MS
        }
    }
}

/// One published feedback record: rating plus optional free-text comment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackRecord {
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub requester_id: String,
    pub summary: String,
    pub timestamp_ms: u64,
}

/// Destination for published feedback records (e.g. a review channel).
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn publish(&self, record: &FeedbackRecord) -> Result<()>;
}

/// Enumerates supported `FeedbackError` values.
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("no pending rating to attach a comment to")]
    NoPendingRating,
    #[error("rating must be between {MIN_RATING} and {MAX_RATING}, got {0}")]
    RatingOutOfRange(u8),
    #[error("failed to publish feedback record")]
    Publish(#[source] anyhow::Error),
}

#[derive(Debug, Clone)]
struct FeedbackSession {
    summary: String,
    rating: Option<u8>,
    expires_at_ms: u64,
}

/// Collects post-closure ratings and comments from requesters.
///
/// Session state is owned by the instance and injected collaborators do the
/// talking; a fresh collector in a test starts with a clean slate.
pub struct FeedbackCollector {
    transport: Arc<dyn ChannelTransport>,
    sink: Arc<dyn FeedbackSink>,
    sessions: Mutex<HashMap<String, FeedbackSession>>,
    idle_window_ms: u64,
}

impl FeedbackCollector {
    pub fn new(transport: Arc<dyn ChannelTransport>, sink: Arc<dyn FeedbackSink>) -> Self {
        Self {
            transport,
            sink,
            sessions: Mutex::new(HashMap::new()),
            idle_window_ms: resolve_feedback_idle_ms(),
        }
    }

    pub fn with_idle_window_ms(mut self, idle_window_ms: u64) -> Self {
        self.idle_window_ms = idle_window_ms;
        self
    }

    /// Sends the requester a private rating prompt. Delivery failure (closed
    /// DMs, transport error) is logged and reported as `false`; ticket
    /// closure never fails because feedback could not be solicited.
    pub async fn request_feedback(
        &self,
        requester_id: &str,
        summary: &str,
        handled_by: &str,
    ) -> bool {
        let prompt = rating_prompt(summary, handled_by);
        match self.transport.send_direct(requester_id, &prompt).await {
            Ok(true) => {
                let now_ms = current_unix_timestamp_ms();
                let mut sessions = self.sessions.lock().await;
                prune_expired(&mut sessions, now_ms);
                sessions.insert(
                    requester_id.to_string(),
                    FeedbackSession {
                        summary: summary.to_string(),
                        rating: None,
                        expires_at_ms: now_ms.saturating_add(self.idle_window_ms),
                    },
                );
                true
            }
            Ok(false) => {
                tracing::warn!(
                    requester_id = %requester_id,
                    "requester unreachable for feedback prompt"
                );
                false
            }
            Err(error) => {
                tracing::warn!(
                    requester_id = %requester_id,
                    error = %format!("{error:#}"),
                    "failed to deliver feedback prompt"
                );
                false
            }
        }
    }

    /// Stores a pending rating for the requester, awaiting an optional
    /// comment.
    pub async fn submit_rating(&self, requester_id: &str, rating: u8) -> Result<(), FeedbackError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(FeedbackError::RatingOutOfRange(rating));
        }

        let now_ms = current_unix_timestamp_ms();
        let mut sessions = self.sessions.lock().await;
        prune_expired(&mut sessions, now_ms);
        let session = sessions
            .entry(requester_id.to_string())
            .or_insert_with(|| FeedbackSession {
                summary: FALLBACK_SUMMARY.to_string(),
                rating: None,
                expires_at_ms: 0,
            });
        session.rating = Some(rating);
        session.expires_at_ms = now_ms.saturating_add(self.idle_window_ms);
        Ok(())
    }

    /// Publishes the pending rating together with an optional comment,
    /// consuming the session. The session is cleared before publication so a
    /// double submission cannot double-publish; a second call rejects with
    /// `NoPendingRating`.
    pub async fn submit_comment(
        &self,
        requester_id: &str,
        comment: Option<&str>,
    ) -> Result<FeedbackRecord, FeedbackError> {
        let now_ms = current_unix_timestamp_ms();
        let session = {
            let mut sessions = self.sessions.lock().await;
            prune_expired(&mut sessions, now_ms);
            // Only a rated session is consumed; a stray comment must not
            // destroy a prompt that is still waiting for its rating.
            match sessions.get(requester_id) {
                Some(session) if session.rating.is_some() => sessions.remove(requester_id),
                _ => None,
            }
        };

        let Some(FeedbackSession {
            summary,
            rating: Some(rating),
            ..
        }) = session
        else {
            return Err(FeedbackError::NoPendingRating);
        };

        let record = FeedbackRecord {
            rating,
            comment: normalize_comment(comment),
            requester_id: requester_id.to_string(),
            summary,
            timestamp_ms: now_ms,
        };

        if let Err(error) = self.sink.publish(&record).await {
            tracing::warn!(
                requester_id = %requester_id,
                rating = record.rating,
                error = %format!("{error:#}"),
                "failed to publish feedback record"
            );
            return Err(FeedbackError::Publish(error));
        }
        Ok(record)
    }

    /// Number of live (unexpired) sessions; exposed for diagnostics.
    pub async fn pending_sessions(&self) -> usize {
        let now_ms = current_unix_timestamp_ms();
        let mut sessions = self.sessions.lock().await;
        prune_expired(&mut sessions, now_ms);
        sessions.len()
    }
}

fn prune_expired(sessions: &mut HashMap<String, FeedbackSession>, now_ms: u64) {
    sessions.retain(|_, session| !is_expired_unix_ms(Some(session.expires_at_ms), now_ms));
}

fn normalize_comment(comment: Option<&str>) -> Option<String> {
    let trimmed = comment.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return None;
    }
    let capped = trimmed
        .char_indices()
        .nth(MAX_COMMENT_CHARS)
        .map(|(index, _)| &trimmed[..index])
        .unwrap_or(trimmed);
    Some(capped.to_string())
}
