//! Write-serializing accessor guaranteeing ordered, non-overlapping
//! persistence operations against a single ledger document.
use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::sync::{Mutex, MutexGuard};

use crate::{load_ledger_or_default, write_ledger_atomic, TicketLedger};

/// Owns the last successfully durable ledger state behind a FIFO mutex.
///
/// The mutex is the single logical queue of the store: callers may issue
/// reads and transactions concurrently, but they are applied strictly in
/// acquisition order. The in-memory ledger only ever reflects documents
/// that reached disk.
#[derive(Debug)]
pub struct StoreAccessor {
    path: PathBuf,
    durable: Mutex<TicketLedger>,
}

impl StoreAccessor {
    /// Opens the accessor over `path`, initializing from the backing file.
    /// Corrupt or missing data degrades to the empty ledger.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ledger = load_ledger_or_default(&path);
        Self {
            path,
            durable: Mutex::new(ledger),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a copy of the latest durable ledger state.
    pub async fn snapshot(&self) -> TicketLedger {
        self.durable.lock().await.clone()
    }

    /// Begins a serialized transaction. The returned transaction holds the
    /// queue position until dropped; mutations become durable only through
    /// [`StoreTransaction::commit`].
    pub async fn begin(&self) -> StoreTransaction<'_> {
        let durable = self.durable.lock().await;
        let working = durable.clone();
        StoreTransaction {
            path: &self.path,
            durable,
            working,
        }
    }
}

/// A working copy of the ledger plus the held queue position.
///
/// `commit` may be called multiple times within one transaction (the open
/// operation persists its counter reservation before the ticket record).
/// Dropping the transaction without committing discards any uncommitted
/// mutations; a failed commit leaves both the file and the in-memory
/// durable state at their previous values.
#[derive(Debug)]
pub struct StoreTransaction<'a> {
    path: &'a Path,
    durable: MutexGuard<'a, TicketLedger>,
    working: TicketLedger,
}

impl StoreTransaction<'_> {
    pub fn ledger(&self) -> &TicketLedger {
        &self.working
    }

    pub fn ledger_mut(&mut self) -> &mut TicketLedger {
        &mut self.working
    }

    /// Persists the working copy atomically and publishes it as the new
    /// durable state.
    pub fn commit(&mut self) -> Result<()> {
        if let Err(error) = write_ledger_atomic(self.path, &self.working) {
            tracing::warn!(
                path = %self.path.display(),
                error = %format!("{error:#}"),
                "ticket ledger write failed; keeping last durable state"
            );
            return Err(error);
        }
        *self.durable = self.working.clone();
        Ok(())
    }
}
