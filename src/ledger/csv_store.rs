//! CSV-backed ledger. Rows are only ever appended; the header is written once
//! when the file is first created and never rewritten.

use super::entry::{LedgerEntry, LEDGER_HEADER};
use super::LedgerStore;
use anyhow::{anyhow, bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CsvLedgerStore {
    path: PathBuf,
}

impl CsvLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Whether the last byte of the ledger terminates a line. An empty file counts.
    fn ends_with_newline(&self) -> Result<bool> {
        let mut file = File::open(&self.path)
            .with_context(|| format!("failed to open ledger {}", self.path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("failed to stat ledger {}", self.path.display()))?
            .len();
        if len == 0 {
            return Ok(true);
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))
            .and_then(|_| file.read_exact(&mut last))
            .with_context(|| format!("failed to read ledger tail {}", self.path.display()))?;
        Ok(last[0] == b'\n')
    }

    fn open_for_append(&self) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open ledger {}", self.path.display()))
    }
}

impl LedgerStore for CsvLedgerStore {
    fn ensure(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create ledger directory {}", parent.display())
            })?;
        }

        let mut file = self.open_for_append()?;
        let len = file
            .metadata()
            .with_context(|| format!("failed to stat ledger {}", self.path.display()))?
            .len();
        if len > 0 {
            return Ok(());
        }

        file.write_all(&encode_rows(Some(&LEDGER_HEADER[..]), &[])?)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("failed to write ledger header to {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), "created ledger");
        Ok(())
    }

    fn load_existing_ids(&self) -> Result<HashSet<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to open ledger {}", self.path.display()))
            }
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(file);
        let mut records = reader.records();

        let Some(header) = records.next() else {
            tracing::warn!(
                path = %self.path.display(),
                "ledger is empty; treating as no recorded ids"
            );
            return Ok(HashSet::new());
        };
        let header =
            header.with_context(|| format!("failed to read ledger {}", self.path.display()))?;
        let first = header
            .get(0)
            .map(|cell| cell.trim().trim_start_matches('\u{feff}'))
            .unwrap_or_default();
        if !first.eq_ignore_ascii_case(LEDGER_HEADER[0]) {
            bail!(
                "ledger {} has unexpected header {first:?}; expected {:?} as the first column",
                self.path.display(),
                LEDGER_HEADER[0]
            );
        }

        let mut ids = HashSet::new();
        for record in records {
            let record =
                record.with_context(|| format!("failed to read ledger {}", self.path.display()))?;
            if let Some(id) = record.get(0).map(str::trim).filter(|id| !id.is_empty()) {
                ids.insert(id.to_owned());
            }
        }

        tracing::debug!(path = %self.path.display(), ids = ids.len(), "loaded ledger ids");
        Ok(ids)
    }

    fn append(&self, entries: &[LedgerEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.ensure()?;

        let mut bytes = encode_rows(None, entries)?;
        if !self.ends_with_newline()? {
            bytes.insert(0, b'\n');
        }
        let mut file = self.open_for_append()?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .with_context(|| format!("failed to append to ledger {}", self.path.display()))?;

        tracing::debug!(
            path = %self.path.display(),
            rows = entries.len(),
            bytes = bytes.len(),
            "ledger rows persisted"
        );
        Ok(())
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Serializes the whole batch up front so it reaches the file in one write.
fn encode_rows(header: Option<&[&str]>, entries: &[LedgerEntry]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if let Some(header) = header {
        writer.write_record(header)?;
    }
    for entry in entries {
        writer
            .serialize(entry)
            .with_context(|| format!("failed to encode ledger row for id {:?}", entry.id))?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow!("failed to encode ledger rows: {}", err.error()))
}
