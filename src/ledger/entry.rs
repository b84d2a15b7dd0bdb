use crate::work::{FetchOutcome, LocatorLabel, WorkItem};
use serde::{Deserialize, Serialize};

pub const LEDGER_HEADER: [&str; 6] = ["Id", "URL", "URL Used", "Status", "Reason", "Error"];
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// One persisted ledger row. Field order matches [`LEDGER_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "URL Used")]
    pub url_used: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Reason")]
    pub reason: String,
    #[serde(rename = "Error")]
    pub error: String,
}

impl LedgerEntry {
    /// Projects an outcome onto a ledger row, labelling the locator used
    /// against the item's original primary locator.
    pub fn from_outcome(item: &WorkItem, outcome: &FetchOutcome) -> Self {
        let label = LocatorLabel::derive(outcome.locator_used(), item.primary())
            .map(|label| label.as_str())
            .unwrap_or("");

        Self {
            id: outcome.id().unwrap_or_default().to_owned(),
            url: outcome
                .locator_used()
                .map(|url| url.as_str().to_owned())
                .unwrap_or_default(),
            url_used: label.to_owned(),
            status: if outcome.is_success() {
                STATUS_SUCCESS
            } else {
                STATUS_ERROR
            }
            .to_owned(),
            reason: outcome.reason().unwrap_or_default().to_owned(),
            error: outcome.error_detail().unwrap_or_default().to_owned(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}
