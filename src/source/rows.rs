use anyhow::Result;
use url::Url;

pub const DEFAULT_ID_COLUMN: &str = "BRnum";
pub const DEFAULT_PRIMARY_COLUMN: &str = "Pdf_URL";
pub const DEFAULT_FALLBACK_COLUMN: &str = "Report Html Address";

/// One input row as read from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// 1-based ordinal among the rows yielded by the source.
    pub position: usize,
    /// 1-based line of the row in the underlying file (the header is line 1).
    pub row_index: usize,
    pub id: Option<String>,
    pub primary: Option<Url>,
    pub fallback: Option<Url>,
    pub anomalies: Vec<RowAnomaly>,
}

/// Non-fatal problems noticed while reading a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAnomaly {
    UnparsablePrimary(String),
    UnparsableFallback(String),
}

impl std::fmt::Display for RowAnomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowAnomaly::UnparsablePrimary(raw) => write!(f, "unparsable primary locator {raw:?}"),
            RowAnomaly::UnparsableFallback(raw) => {
                write!(f, "unparsable fallback locator {raw:?}")
            }
        }
    }
}

/// Header names the source matches, case-insensitively, to find its columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub id: String,
    pub primary: String,
    pub fallback: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            id: DEFAULT_ID_COLUMN.to_owned(),
            primary: DEFAULT_PRIMARY_COLUMN.to_owned(),
            fallback: DEFAULT_FALLBACK_COLUMN.to_owned(),
        }
    }
}

/// Yields the ordered rows for a run.
///
/// Malformed cells must come back as absent values; only failures to read the
/// source as a whole are errors.
pub trait RowSource: Send + Sync {
    fn read_rows(&self) -> Result<Vec<SourceRow>>;
}

impl RowSource for Vec<SourceRow> {
    fn read_rows(&self) -> Result<Vec<SourceRow>> {
        Ok(self.clone())
    }
}
