//! Atomic destination writes. Bytes land in a sibling `.part` file that is
//! renamed over the destination only once the transfer completed; an
//! uncommitted file is removed when dropped.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

const PARTIAL_SUFFIX: &str = ".part";

#[derive(Debug)]
pub struct PartialFile {
    file: Option<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

impl PartialFile {
    pub async fn create(destination: &Path) -> io::Result<Self> {
        let temp_path = partial_path(destination);
        let file = File::create(&temp_path).await?;
        Ok(Self {
            file: Some(file),
            temp_path,
            final_path: destination.to_path_buf(),
            written: 0,
        })
    }

    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self.file.as_mut().ok_or_else(closed)?;
        file.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Flushes, syncs and publishes the file at its final path.
    pub async fn commit(mut self) -> io::Result<u64> {
        let mut file = self.file.take().ok_or_else(closed)?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&self.temp_path, &self.final_path).await?;

        // Best-effort: persist the rename itself.
        if let Some(parent) = self.final_path.parent() {
            if let Ok(dir) = File::open(parent).await {
                let _ = dir.sync_all().await;
            }
        }

        // Nothing left to clean up.
        self.temp_path = PathBuf::new();
        Ok(self.written)
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.temp_path.as_os_str().is_empty() {
            return;
        }
        self.file.take();
        if let Err(err) = std::fs::remove_file(&self.temp_path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.temp_path.display(),
                    error = %err,
                    "failed to remove partial download"
                );
            }
        }
    }
}

pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name: OsString = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

fn closed() -> io::Error {
    io::Error::other("partial file already closed")
}
