//! Work selection against a snapshot of already-recorded identifiers.

use crate::source::SourceRow;
use crate::work::item::WorkItem;
use std::collections::{HashMap, HashSet};

/// Identifiers already present in the ledger when the run started.
///
/// The index is a read-only snapshot: nothing recorded during the run is added
/// back, so in-flight workers never observe each other's results.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    ids: HashSet<String>,
}

impl DedupIndex {
    pub fn new(ids: HashSet<String>) -> Self {
        Self { ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<String> for DedupIndex {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Items chosen for dispatch plus the bookkeeping the caller reports on.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    /// Selected items in source order.
    pub items: Vec<WorkItem>,
    /// Rows skipped because their identifier is already recorded.
    pub skipped_recorded: usize,
    /// Rows skipped because neither locator is usable.
    pub skipped_without_locator: usize,
    /// Source row indexes of selected items that have no identifier.
    pub missing_id_rows: Vec<usize>,
    /// Identifiers that occur more than once among the selected items.
    pub duplicate_ids: Vec<String>,
}

/// Filters `rows` down to the items this run must fetch.
///
/// A row is kept when it has at least one locator and its identifier is either
/// absent or not present in `index`. In-run identifier collisions are reported
/// through [`Selection::duplicate_ids`] and left for the caller to act on.
pub fn select(rows: Vec<SourceRow>, index: &DedupIndex) -> Selection {
    let mut selection = Selection::default();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let row_index = row.row_index;
        let item = WorkItem::new(row.position, row.id, row.primary, row.fallback);
        if !item.has_locator() {
            selection.skipped_without_locator += 1;
            tracing::debug!(row = row_index, "skipping row without a usable locator");
            continue;
        }

        if let Some(id) = item.id() {
            if index.contains(id) {
                selection.skipped_recorded += 1;
                tracing::debug!(id, row = row_index, "[DUPLICATE] skipping recorded id");
                continue;
            }
            let count = seen.entry(id.to_owned()).or_insert(0);
            *count += 1;
            if *count == 2 {
                selection.duplicate_ids.push(id.to_owned());
            }
        } else {
            selection.missing_id_rows.push(row_index);
        }

        selection.items.push(item);
    }

    selection
}
