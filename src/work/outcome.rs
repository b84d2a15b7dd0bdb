use url::Url;

pub const REASON_BOTH_FAILED: &str = "both locators failed";
pub const REASON_SINGLE_FAILED: &str = "only one locator available and it failed";
pub const REASON_NO_LOCATOR: &str = "no locator available";
pub const REASON_WORKER_FAULT: &str = "worker fault";

/// Result of attempting to fetch one item's resource.
///
/// Built only through [`FetchOutcome::succeeded`] and [`FetchOutcome::failed`], so a
/// successful outcome always names the locator it used and never carries a reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    id: Option<String>,
    locator_used: Option<Url>,
    success: bool,
    reason: Option<String>,
    error_detail: Option<String>,
}

impl FetchOutcome {
    pub fn succeeded(id: Option<String>, locator: Url) -> Self {
        Self {
            id,
            locator_used: Some(locator),
            success: true,
            reason: None,
            error_detail: None,
        }
    }

    pub fn failed(
        id: Option<String>,
        reason: impl Into<String>,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            id,
            locator_used: None,
            success: false,
            reason: Some(reason.into()),
            error_detail,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn locator_used(&self) -> Option<&Url> {
        self.locator_used.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }
}
