//! Work model: items selected for fetching, their outcomes, and the rules that
//! decide which source rows are dispatched in a run.

pub mod item;
pub mod outcome;
pub mod selector;

pub use item::{parse_locator, LocatorLabel, WorkItem};
pub use outcome::{
    FetchOutcome, REASON_BOTH_FAILED, REASON_NO_LOCATOR, REASON_SINGLE_FAILED,
    REASON_WORKER_FAULT,
};
pub use selector::{select, DedupIndex, Selection};
