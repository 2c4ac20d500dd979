//! CSV export of filtered views.

mod csv;

pub use csv::*;

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Export errors.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Could not write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export checksum mismatch for {0}")]
    Checksum(String),
}

pub type ExportResult<T> = Result<T, ExportError>;

pub const CSV_MIME_TYPE: &str = "text/csv";

/// A generated file handed to the host for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFile {
    pub filename: String,
    pub mime_type: String,
    pub content: String,
    /// Hex SHA-256 of `content`
    pub sha256: String,
}

impl ExportFile {
    pub fn csv(filename: String, content: String) -> Self {
        Self {
            sha256: checksum(&content),
            filename,
            mime_type: CSV_MIME_TYPE.to_string(),
            content,
        }
    }

    /// Recompute the checksum against the content.
    pub fn verify(&self) -> ExportResult<()> {
        if checksum(&self.content) == self.sha256 {
            Ok(())
        } else {
            Err(ExportError::Checksum(self.filename.clone()))
        }
    }

    /// Write the file into `dir` under its own name.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> ExportResult<PathBuf> {
        self.verify()?;
        let path = dir.as_ref().join(&self.filename);
        std::fs::write(&path, &self.content)?;
        Ok(path)
    }
}

/// `<stem>-YYYY-MM-DD.csv` using the local date of `now`.
pub fn dated_filename<Tz: TimeZone>(stem: &str, now: &DateTime<Tz>) -> String {
    format!("{}-{}.csv", stem, now.date_naive().format("%Y-%m-%d"))
}

fn checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
