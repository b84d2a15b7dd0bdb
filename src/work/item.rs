use std::fmt;
use url::Url;

const MISSING_ID_PLACEHOLDER: &str = "<none>";

/// Which of an item's locators produced (or was used for) a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorLabel {
    Primary,
    Fallback,
}

impl LocatorLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorLabel::Primary => "Primary",
            LocatorLabel::Fallback => "Fallback",
        }
    }

    /// Labels `used` relative to the item's original primary locator.
    ///
    /// Equal to the primary means `Primary`, any other locator means `Fallback`,
    /// and no locator at all yields `None`.
    pub fn derive(used: Option<&Url>, primary: Option<&Url>) -> Option<Self> {
        let used = used?;
        if primary == Some(used) {
            Some(LocatorLabel::Primary)
        } else {
            Some(LocatorLabel::Fallback)
        }
    }
}

impl fmt::Display for LocatorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single unit of work selected from the row source.
///
/// `sequence` is the 1-based position of the row in the source. It only feeds
/// the destination file name and carries no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    sequence: usize,
    id: Option<String>,
    primary: Option<Url>,
    fallback: Option<Url>,
}

impl WorkItem {
    pub fn new(
        sequence: usize,
        id: Option<String>,
        primary: Option<Url>,
        fallback: Option<Url>,
    ) -> Self {
        Self {
            sequence,
            id,
            primary,
            fallback,
        }
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Identifier for log lines; items without an id render as `<none>`.
    pub fn display_id(&self) -> &str {
        self.id.as_deref().unwrap_or(MISSING_ID_PLACEHOLDER)
    }

    pub fn primary(&self) -> Option<&Url> {
        self.primary.as_ref()
    }

    pub fn fallback(&self) -> Option<&Url> {
        self.fallback.as_ref()
    }

    pub fn has_locator(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    /// Available locators in attempt order: primary first, then fallback.
    pub fn locators(&self) -> impl Iterator<Item = (LocatorLabel, &Url)> + '_ {
        self.primary
            .iter()
            .map(|url| (LocatorLabel::Primary, url))
            .chain(self.fallback.iter().map(|url| (LocatorLabel::Fallback, url)))
    }
}

/// Parses a raw cell value into a locator. Blank or unparsable values are absent.
pub fn parse_locator(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Url::parse(trimmed).ok()
}

/// Shortens a locator for log lines.
pub(crate) fn short_locator(url: &Url) -> String {
    const MAX_CHARS: usize = 120;
    let full = url.as_str();
    if full.chars().count() <= MAX_CHARS {
        return full.to_owned();
    }
    let head: String = full.chars().take(MAX_CHARS - 3).collect();
    format!("{head}...")
}
