// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Call Detail Record journal (§4.7): an append-only, rotating CSV log
//! of session lifecycle events.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, error};

use crate::ie::Imsi;

/// Flush the open file to disk once every this many rows.
const FLUSH_EVERY_ROWS: usize = 50;

struct Inner {
    base_name: PathBuf,
    extension: String,
    max_rows: usize,
    file: Option<File>,
    row_count: usize,
    rotation_counter: u64,
}

/// Append-only CDR journal, safe to share across threads behind a
/// single mutex: CDR writes are not on the hot datapath, they happen
/// once per session create/update/delete.
pub struct CdrJournal {
    inner: Mutex<Inner>,
}

impl CdrJournal {
    /// Opens (creating) the first journal file derived from `path`.
    /// `max_rows` is the row-count threshold that triggers rotation to
    /// a new, timestamp-suffixed file.
    pub fn open(path: impl AsRef<Path>, max_rows: usize) -> Result<Self> {
        let path = path.as_ref();
        let (base_name, extension) = split_extension(path);

        let mut inner = Inner {
            base_name,
            extension,
            max_rows,
            file: None,
            row_count: 0,
            rotation_counter: 0,
        };
        inner.rotate().context("failed to create initial CDR journal file")?;

        Ok(Self { inner: Mutex::new(inner) })
    }

    /// Appends one CDR row: `"timestamp","imsi","action"\r\n`. Rotates
    /// the file first if the row threshold was reached, or the file
    /// isn't open. Failure to write a CDR row is logged, never fatal
    /// to the caller: sessions are managed whether or not a journal
    /// backs them (§4.7).
    pub fn write(&self, imsi: &Imsi, action: &str) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        if inner.row_count >= inner.max_rows || inner.file.is_none() {
            inner.row_count = 0;
            if let Err(e) = inner.rotate() {
                error!(error = %e, "failed to rotate CDR journal");
                return;
            }
        }

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let row = format!("\"{timestamp}\",\"{imsi}\",\"{action}\"\r\n");

        let Some(file) = inner.file.as_mut() else {
            return;
        };

        if let Err(e) = file.write_all(row.as_bytes()) {
            error!(error = %e, "failed to write CDR row");
            return;
        }

        let ctr = inner.row_count;
        if ctr % FLUSH_EVERY_ROWS == 0 && ctr != 0
            && let Err(e) = file.flush()
        {
            error!(error = %e, "failed to flush CDR journal");
        }
        inner.row_count += 1;
    }

    pub fn is_open(&self) -> bool {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.file.is_some()
    }
}

impl Inner {
    fn rotate(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }

        let timestamp = Local::now().format("%Y-%m-%d_%H:%M:%S");
        let mut filename = self.base_name.clone().into_os_string();
        filename.push(format!("_{timestamp}_{}", self.rotation_counter));
        filename.push(&self.extension);
        self.rotation_counter += 1;

        match File::create(&filename) {
            Ok(file) => {
                debug!(path = ?filename, "created CDR journal file");
                self.file = Some(file);
                Ok(())
            },
            Err(e) => {
                self.file = None;
                Err(e).context(format!("failed to create {}", filename.to_string_lossy()))
            },
        }
    }
}

/// Splits `path` into everything before the last `.` and the
/// extension (with leading dot), so rotation can insert a timestamp
/// between them. A path with no `.` gets `.csv` appended.
fn split_extension(path: &Path) -> (PathBuf, String) {
    let raw = path.as_os_str().to_string_lossy();
    match raw.rfind('.') {
        Some(idx) => (PathBuf::from(&raw[..idx]), raw[idx..].to_string()),
        None => (PathBuf::from(raw.as_ref()), ".csv".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn writes_expected_csv_row() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cdr.csv");
        let journal = CdrJournal::open(&path, 1000).expect("open");

        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        journal.write(&imsi, "created");

        let mut entries: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);
        let contents = fs::read_to_string(entries.remove(0).path()).expect("read file");
        assert!(contents.ends_with("\",\"001010000000001\",\"created\"\r\n"));
    }

    #[test]
    fn rotates_after_max_rows() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cdr.csv");
        let journal = CdrJournal::open(&path, 2).expect("open");

        let imsi = Imsi::from_str_digits("001010000000001").expect("imsi");
        journal.write(&imsi, "created");
        journal.write(&imsi, "updated");
        journal.write(&imsi, "updated");

        let entries: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn is_open_reports_true_after_successful_open() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cdr.csv");
        let journal = CdrJournal::open(&path, 1000).expect("open");
        assert!(journal.is_open());
    }
}
