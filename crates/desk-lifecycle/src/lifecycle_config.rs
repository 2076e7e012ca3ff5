//! Lifecycle configuration with environment overrides.
use std::env;

use serde::Serialize;

pub const DEFAULT_CLOSE_GRACE_MS: u64 = 3_000;
pub const CLOSE_GRACE_MS_ENV: &str = "DESK_CLOSE_GRACE_MS";

/// Resolves the channel-deletion grace delay from the environment, keeping
/// the default when the override is absent or unusable.
pub fn resolve_close_grace_ms() -> u64 {
    let Ok(raw) = env::var(CLOSE_GRACE_MS_ENV) else {
        return DEFAULT_CLOSE_GRACE_MS;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_CLOSE_GRACE_MS;
    }
    match trimmed.parse::<u64>() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(
                raw = %raw,
                default = DEFAULT_CLOSE_GRACE_MS,
                "ignoring unusable close-grace override"
            );
            DEFAULT_CLOSE_GRACE_MS
        }
    }
}

/// Static knobs for the lifecycle manager, injected at construction.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleConfig {
    /// Staff role granted visibility on every ticket channel.
    pub staff_role_id: String,
    /// Destination channel for archived transcripts; `None` keeps transcripts
    /// on disk only.
    pub archive_channel: Option<String>,
    /// Delay between ticket closure and channel deletion so final messages
    /// can still be delivered.
    pub close_grace_ms: u64,
}

impl LifecycleConfig {
    pub fn new(staff_role_id: impl Into<String>) -> Self {
        Self {
            staff_role_id: staff_role_id.into(),
            archive_channel: None,
            close_grace_ms: resolve_close_grace_ms(),
        }
    }

    pub fn with_archive_channel(mut self, channel_ref: impl Into<String>) -> Self {
        self.archive_channel = Some(channel_ref.into());
        self
    }

    pub fn with_close_grace_ms(mut self, close_grace_ms: u64) -> Self {
        self.close_grace_ms = close_grace_ms;
        self
    }
}
