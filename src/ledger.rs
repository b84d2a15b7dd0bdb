//! Append-only status ledger: the persisted entry shape, the storage seam, and
//! the CSV-backed store used by the CLI.

pub mod csv_store;
pub mod entry;

pub use csv_store::CsvLedgerStore;
pub use entry::{LedgerEntry, LEDGER_HEADER, STATUS_ERROR, STATUS_SUCCESS};

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;

/// Durable, append-only record of per-item outcomes keyed by identifier.
///
/// Every operation must tolerate a store created by an earlier run.
pub trait LedgerStore: Send + Sync {
    /// Creates the store with its fixed header if it does not exist yet.
    fn ensure(&self) -> Result<()>;

    /// Identifiers already recorded. A missing or empty store yields an empty set.
    fn load_existing_ids(&self) -> Result<HashSet<String>>;

    /// Appends `entries` and persists them durably.
    fn append(&self, entries: &[LedgerEntry]) -> Result<()>;

    fn location(&self) -> &Path;
}
