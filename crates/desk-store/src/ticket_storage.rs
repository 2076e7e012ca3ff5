//! Ticket ledger persistence helpers over a single JSON document.
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use desk_core::write_text_atomic;

use crate::TicketLedger;

pub const TICKET_LEDGER_SCHEMA_VERSION: u32 = 1;

/// Reads the ledger document. A missing or empty backing file yields the
/// initialized empty ledger with a zero counter.
pub fn read_ledger(path: &Path) -> Result<TicketLedger> {
    if !path.exists() {
        return Ok(TicketLedger::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read ticket ledger {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(TicketLedger::default());
    }

    let ledger: TicketLedger = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse ticket ledger {}", path.display()))?;
    if ledger.schema_version > TICKET_LEDGER_SCHEMA_VERSION {
        bail!(
            "unsupported ticket ledger schema version {} in {} (supported up to {})",
            ledger.schema_version,
            path.display(),
            TICKET_LEDGER_SCHEMA_VERSION
        );
    }
    Ok(ledger)
}

/// Reads the ledger, falling back to the empty document when the backing
/// data is corrupt or unreadable so lifecycle operations always have a
/// usable store. The failure is logged, not propagated.
pub fn load_ledger_or_default(path: &Path) -> TicketLedger {
    match read_ledger(path) {
        Ok(ledger) => ledger,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %format!("{error:#}"),
                "falling back to empty ticket ledger after read failure"
            );
            TicketLedger::default()
        }
    }
}

/// Persists the ledger as pretty JSON through a temp file + rename; a failed
/// write leaves the previously durable document intact.
pub fn write_ledger_atomic(path: &Path, ledger: &TicketLedger) -> Result<()> {
    let serialized =
        serde_json::to_string_pretty(ledger).context("failed to encode ticket ledger")?;
    write_text_atomic(path, &format!("{serialized}\n"))
}
