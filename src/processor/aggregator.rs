//! Collects one ledger entry per completed item, owned by the draining task.

use crate::ledger::LedgerEntry;
use crate::work::{FetchOutcome, LocatorLabel, WorkItem};

#[derive(Debug, Default)]
pub struct ResultAggregator {
    entries: Vec<LedgerEntry>,
    succeeded: usize,
    failed: usize,
    fallback_used: usize,
}

impl ResultAggregator {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn record(&mut self, item: &WorkItem, outcome: &FetchOutcome) -> &LedgerEntry {
        if outcome.is_success() {
            self.succeeded += 1;
            if LocatorLabel::derive(outcome.locator_used(), item.primary())
                == Some(LocatorLabel::Fallback)
            {
                self.fallback_used += 1;
            }
        } else {
            self.failed += 1;
        }
        self.entries.push(LedgerEntry::from_outcome(item, outcome));
        &self.entries[self.entries.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn fallback_used(&self) -> usize {
        self.fallback_used
    }

    pub fn into_batch(self) -> Vec<LedgerEntry> {
        self.entries
    }
}

/// Projects completed outcomes onto ledger rows, in the order given.
pub fn aggregate<'a, I>(outcomes: I) -> Vec<LedgerEntry>
where
    I: IntoIterator<Item = (&'a WorkItem, &'a FetchOutcome)>,
{
    let mut aggregator = ResultAggregator::default();
    for (item, outcome) in outcomes {
        aggregator.record(item, outcome);
    }
    aggregator.into_batch()
}
