//! Append-only ledger of completed reviews.
//!
//! One line per completed review: `name,institution,subject,submission_id`.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::submission::SubmissionId;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to append to ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A finished review, as written to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    /// Reviewer's full name.
    pub name: String,
    /// Reviewer's institution.
    pub institution: String,
    pub subject: String,
    pub submission_id: SubmissionId,
}

impl fmt::Display for CompletionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            escape(&self.name),
            escape(&self.institution),
            escape(&self.subject),
            self.submission_id.0
        )
    }
}

/// Quote a field that would otherwise break the line format.
fn escape(field: &str) -> String {
    let field = field.replace(['\n', '\r'], " ");
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

/// The ledger file on disk.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Append one line per record. The file must already exist.
    pub fn append(&self, records: &[CompletionRecord]) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }
        let io_error = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(io_error)?;
        let mut lines = String::new();
        for record in records {
            lines.push_str(&record.to_string());
            lines.push('\n');
        }
        file.write_all(lines.as_bytes()).map_err(io_error)?;
        file.flush().map_err(io_error)?;

        info!(
            "Appended {} record(s) to ledger {}",
            records.len(),
            self.path.display()
        );
        Ok(())
    }
}
