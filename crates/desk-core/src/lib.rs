//! Foundational low-level utilities shared across desk crates.
//!
//! Provides the atomic file-write helper used by ledger and transcript
//! persistence, plus unix-time utilities for timestamps and session expiry.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms, is_expired_unix_ms};
