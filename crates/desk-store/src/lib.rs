//! Durable ticket ledger and the write-serializing accessor around it.
//!
//! The ledger is a single JSON document mapping requester ids to their
//! tickets plus the global ticket counter. All reads and mutations funnel
//! through [`StoreAccessor`], whose FIFO mutex is the one synchronization
//! point in the system: mutations apply in the order their operations were
//! issued and a concurrent read observes either the pre- or post-state of
//! each queued write, never a torn document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod store_accessor;
mod ticket_storage;

pub use store_accessor::{StoreAccessor, StoreTransaction};
pub use ticket_storage::{
    load_ledger_or_default, read_ledger, write_ledger_atomic, TICKET_LEDGER_SCHEMA_VERSION,
};

fn ticket_ledger_schema_version() -> u32 {
    TICKET_LEDGER_SCHEMA_VERSION
}

/// Enumerates supported `TicketStatus` values. Open → Closed is the only
/// legal transition; Closed is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closed,
}

/// One support request record, created once and mutated exactly once (by
/// the close transition).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub number: u64,
    pub requester_id: String,
    pub requester_label: String,
    pub channel_ref: String,
    pub category: String,
    pub summary: String,
    pub status: TicketStatus,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at_ms: Option<u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }
}

/// Top-level persisted document: tickets per requester (insertion order =
/// creation order) plus the last assigned ticket number. Unknown fields on
/// the document and on individual tickets survive read-modify-write cycles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketLedger {
    #[serde(default = "ticket_ledger_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub tickets: BTreeMap<String, Vec<Ticket>>,
    #[serde(default)]
    pub counter: u64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for TicketLedger {
    fn default() -> Self {
        Self {
            schema_version: TICKET_LEDGER_SCHEMA_VERSION,
            tickets: BTreeMap::new(),
            counter: 0,
            extra: BTreeMap::new(),
        }
    }
}

impl TicketLedger {
    /// Linear scan of the requester's ticket list for an open entry. Lists
    /// are small; the scan is the defined duplicate-open check.
    pub fn open_ticket_for(&self, requester_id: &str) -> Option<&Ticket> {
        self.tickets
            .get(requester_id)
            .and_then(|list| list.iter().find(|ticket| ticket.is_open()))
    }

    pub fn find_open_by_channel(&self, channel_ref: &str) -> Option<&Ticket> {
        self.tickets.values().flatten().find(|ticket| {
            ticket.is_open() && ticket.channel_ref == channel_ref
        })
    }

    pub fn find_open_by_channel_mut(&mut self, channel_ref: &str) -> Option<&mut Ticket> {
        self.tickets.values_mut().flatten().find(|ticket| {
            ticket.is_open() && ticket.channel_ref == channel_ref
        })
    }

    pub fn append_ticket(&mut self, ticket: Ticket) {
        self.tickets
            .entry(ticket.requester_id.clone())
            .or_default()
            .push(ticket);
    }

    pub fn ticket_count(&self) -> usize {
        self.tickets.values().map(Vec::len).sum()
    }
}
