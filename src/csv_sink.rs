use csv::{ReaderBuilder, Writer};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::transform::{self, Row};

/// Append-only CSV export.
///
/// The header is fixed when the file is created. Later appends align rows to
/// whatever header the file already has; changing the column set needs a
/// full rewrite of the file, which this sink never does.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    ensure_directories: bool,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, ensure_directories: bool) -> Self {
        Self {
            path: path.into(),
            ensure_directories,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, rows: &[Row]) -> Result<()> {
        info!("Appending {} rows to CSV file: {}", rows.len(), self.path.display());

        if rows.is_empty() {
            debug!("No rows to append, skipping");
            return Ok(());
        }

        if self.ensure_directories {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| SyncError::sink(&self.path, e))?;
                debug!("Ensured directory: {:?}", parent);
            }
        }

        let existing = self.read_header()?;
        let needs_header = existing.is_none();
        let headers = existing.unwrap_or_else(transform::default_headers);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SyncError::sink(&self.path, e))?;

        let mut writer = Writer::from_writer(file);

        if needs_header {
            info!("Writing CSV header to new file");
            writer
                .write_record(&headers)
                .map_err(|e| SyncError::sink(&self.path, e))?;
        }

        for row in rows {
            let (cells, dropped) = transform::align(row, &headers);
            if !dropped.is_empty() {
                warn!("Dropping columns unknown to the existing header: {:?}", dropped);
            }
            writer
                .write_record(&cells)
                .map_err(|e| SyncError::sink(&self.path, e))?;
        }

        writer.flush().map_err(|e| SyncError::sink(&self.path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| SyncError::sink(&self.path, e.error()))?;
        file.sync_all().map_err(|e| SyncError::sink(&self.path, e))?;

        info!("Successfully appended {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }

    /// Header of the existing file, or `None` when there is no file yet or it
    /// is empty.
    pub fn read_header(&self) -> Result<Option<Vec<String>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&self.path)
            .map_err(|e| SyncError::sink(&self.path, e))?;
        let headers = reader
            .headers()
            .map_err(|e| SyncError::sink(&self.path, e))?;
        if headers.is_empty() {
            return Ok(None);
        }
        Ok(Some(headers.iter().map(str::to_string).collect()))
    }
}

/// Number of data rows in an existing export, not counting the header.
pub fn row_count(csv_path: &Path) -> Result<usize> {
    if !csv_path.exists() {
        return Ok(0);
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(csv_path)
        .map_err(|e| SyncError::sink(csv_path, e))?;
    let mut count = 0;
    for record in reader.records() {
        record.map_err(|e| SyncError::sink(csv_path, e))?;
        count += 1;
    }
    Ok(count)
}
