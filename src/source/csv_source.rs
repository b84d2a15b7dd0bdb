use super::rows::{ColumnNames, RowAnomaly, RowSource, SourceRow};
use crate::work::parse_locator;
use anyhow::{Context, Result};
use csv::{ByteRecord, ReaderBuilder, Trim};
use std::path::{Path, PathBuf};

/// Reads work rows from a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvRowSource {
    path: PathBuf,
    columns: ColumnNames,
}

#[derive(Debug, Clone, Copy)]
struct ColumnLayout {
    id: Option<usize>,
    primary: usize,
    fallback: Option<usize>,
}

impl CsvRowSource {
    pub fn new(path: impl Into<PathBuf>, columns: ColumnNames) -> Self {
        Self {
            path: path.into(),
            columns,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn layout(&self, headers: &ByteRecord) -> Option<ColumnLayout> {
        let find = |name: &str| {
            headers.iter().position(|cell| {
                String::from_utf8_lossy(cell)
                    .trim()
                    .trim_start_matches('\u{feff}')
                    .eq_ignore_ascii_case(name.trim())
            })
        };

        let primary = find(&self.columns.primary)?;
        Some(ColumnLayout {
            id: find(&self.columns.id),
            primary,
            fallback: find(&self.columns.fallback),
        })
    }
}

impl RowSource for CsvRowSource {
    fn read_rows(&self) -> Result<Vec<SourceRow>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_path(&self.path)
            .with_context(|| format!("failed to open row source {}", self.path.display()))?;

        let headers = reader
            .byte_headers()
            .with_context(|| format!("failed to read header of {}", self.path.display()))?
            .clone();

        let Some(layout) = self.layout(&headers) else {
            tracing::warn!(
                path = %self.path.display(),
                column = %self.columns.primary,
                "row source has no primary locator column; no rows to process"
            );
            return Ok(Vec::new());
        };
        if layout.id.is_none() {
            tracing::warn!(
                path = %self.path.display(),
                column = %self.columns.id,
                "row source has no identifier column; results cannot be deduplicated"
            );
        }

        let mut rows = Vec::new();
        for (offset, record) in reader.byte_records().enumerate() {
            let record = record
                .with_context(|| format!("failed to read row source {}", self.path.display()))?;
            if record.iter().all(|cell| cell.iter().all(u8::is_ascii_whitespace)) {
                continue;
            }

            let row_index = record
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or(offset + 2);
            rows.push(build_row(rows.len() + 1, row_index, &record, layout));
        }

        tracing::debug!(path = %self.path.display(), rows = rows.len(), "row source read");
        Ok(rows)
    }
}

fn build_row(
    position: usize,
    row_index: usize,
    record: &ByteRecord,
    layout: ColumnLayout,
) -> SourceRow {
    let cell = |idx: Option<usize>| -> String {
        idx.and_then(|idx| record.get(idx))
            .map(|raw| String::from_utf8_lossy(raw).trim().to_owned())
            .unwrap_or_default()
    };

    let id = Some(cell(layout.id)).filter(|value| !value.is_empty());
    let primary_raw = cell(Some(layout.primary));
    let fallback_raw = cell(layout.fallback);

    let mut anomalies = Vec::new();
    let primary = parse_locator(&primary_raw);
    if primary.is_none() && !primary_raw.is_empty() {
        anomalies.push(RowAnomaly::UnparsablePrimary(primary_raw));
    }
    let fallback = parse_locator(&fallback_raw);
    if fallback.is_none() && !fallback_raw.is_empty() {
        anomalies.push(RowAnomaly::UnparsableFallback(fallback_raw));
    }

    SourceRow {
        position,
        row_index,
        id,
        primary,
        fallback,
        anomalies,
    }
}
