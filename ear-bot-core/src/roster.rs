//! Reviewer roster.
//!
//! The roster is a tab-separated text file with a fixed header:
//!
//! ```text
//! Handle	FullName	Institution	Busy	CallingScore	TotalReviews	LastReview
//! alice	Alice Example	CNAG	N	2	5	2024-01-31
//! ```
//!
//! Rows keep their original text until they are mutated, so saving a roster
//! rewrites only the rows that changed. Mutations go through the lifecycle
//! operations ([`Roster::mark_busy`], [`Roster::complete_review`]) which are
//! built on [`Roster::mutate_by_handle`].

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info};

use crate::handle::Handle;

/// Column names, in file order.
pub const ROSTER_COLUMNS: [&str; 7] = [
    "Handle",
    "FullName",
    "Institution",
    "Busy",
    "CallingScore",
    "TotalReviews",
    "LastReview",
];

const SEPARATOR: char = '\t';
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("failed to access roster {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("roster header must be {expected:?}, found {found:?}")]
    MalformedHeader { expected: String, found: String },

    #[error("roster line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    /// A lifecycle mutation named a reviewer the roster does not contain.
    #[error("reviewer {handle} is not in the roster")]
    NotFound { handle: Handle },
}

/// One reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerRecord {
    pub handle: Handle,
    pub full_name: String,
    pub institution: String,
    /// Busy reviewers are never selected.
    pub busy: bool,
    /// Lower scores are invited first.
    pub calling_score: i64,
    pub total_reviews: u32,
    pub last_review: Option<NaiveDate>,
}

impl ReviewerRecord {
    /// True when the reviewer belongs to `institution` (case-insensitive).
    pub fn is_from(&self, institution: &str) -> bool {
        self.institution
            .trim()
            .eq_ignore_ascii_case(institution.trim())
    }

    fn render(&self) -> String {
        [
            self.handle.to_string(),
            self.full_name.clone(),
            self.institution.clone(),
            if self.busy { "Y" } else { "N" }.to_string(),
            self.calling_score.to_string(),
            self.total_reviews.to_string(),
            self.last_review
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
        ]
        .join(&SEPARATOR.to_string())
    }

    fn parse(line_number: usize, line: &str) -> Result<Self, RosterError> {
        let malformed = |reason: String| RosterError::MalformedRow {
            line: line_number,
            reason,
        };

        let fields: Vec<&str> = line.split(SEPARATOR).collect();
        if fields.len() != ROSTER_COLUMNS.len() {
            return Err(malformed(format!(
                "expected {} columns, found {}",
                ROSTER_COLUMNS.len(),
                fields.len()
            )));
        }

        let handle = Handle::new(fields[0]);
        if handle.is_empty() {
            return Err(malformed("empty handle".to_string()));
        }

        let busy = match fields[3].trim() {
            "Y" | "y" => true,
            "N" | "n" => false,
            other => return Err(malformed(format!("busy flag must be Y or N, found {:?}", other))),
        };

        let calling_score = fields[4]
            .trim()
            .parse::<i64>()
            .map_err(|e| malformed(format!("calling score {:?}: {}", fields[4], e)))?;

        let total_reviews = fields[5]
            .trim()
            .parse::<u32>()
            .map_err(|e| malformed(format!("total reviews {:?}: {}", fields[5], e)))?;

        let last_review = match fields[6].trim() {
            "" => None,
            date => Some(
                NaiveDate::parse_from_str(date, DATE_FORMAT)
                    .map_err(|e| malformed(format!("last review {:?}: {}", date, e)))?,
            ),
        };

        Ok(Self {
            handle,
            full_name: fields[1].to_string(),
            institution: fields[2].to_string(),
            busy,
            calling_score,
            total_reviews,
            last_review,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Reviewer {
        record: ReviewerRecord,
        /// Original text; cleared once the record is mutated.
        raw: Option<String>,
    },
    Blank(String),
}

/// The whole roster table, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    header: String,
    lines: Vec<Line>,
    trailing_newline: bool,
}

impl Roster {
    /// Build a roster from records, with a canonical header.
    pub fn from_records(records: impl IntoIterator<Item = ReviewerRecord>) -> Self {
        Self {
            header: ROSTER_COLUMNS.join(&SEPARATOR.to_string()),
            lines: records
                .into_iter()
                .map(|record| Line::Reviewer { record, raw: None })
                .collect(),
            trailing_newline: true,
        }
    }

    pub fn parse(text: &str) -> Result<Self, RosterError> {
        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);
        let mut raw_lines = body.split('\n');

        let header = raw_lines.next().unwrap_or_default().to_string();
        let columns: Vec<&str> = header
            .trim_end_matches('\r')
            .split(SEPARATOR)
            .map(str::trim)
            .collect();
        let header_matches = columns.len() == ROSTER_COLUMNS.len()
            && columns
                .iter()
                .zip(ROSTER_COLUMNS)
                .all(|(found, expected)| found.eq_ignore_ascii_case(expected));
        if !header_matches {
            return Err(RosterError::MalformedHeader {
                expected: ROSTER_COLUMNS.join("\\t"),
                found: header,
            });
        }

        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        for (index, raw) in raw_lines.enumerate() {
            let content = raw.trim_end_matches('\r');
            if content.trim().is_empty() {
                lines.push(Line::Blank(raw.to_string()));
                continue;
            }
            let line_number = index + 2;
            let record = ReviewerRecord::parse(line_number, content)?;
            if !seen.insert(record.handle.clone()) {
                return Err(RosterError::MalformedRow {
                    line: line_number,
                    reason: format!("duplicate handle {}", record.handle),
                });
            }
            lines.push(Line::Reviewer {
                record,
                raw: Some(raw.to_string()),
            });
        }

        Ok(Self {
            header,
            lines,
            trailing_newline,
        })
    }

    pub fn render(&self) -> String {
        let mut out = self.header.clone();
        for line in &self.lines {
            out.push('\n');
            match line {
                Line::Reviewer { raw: Some(raw), .. } => out.push_str(raw),
                Line::Reviewer { record, raw: None } => out.push_str(&record.render()),
                Line::Blank(raw) => out.push_str(raw),
            }
        }
        if self.trailing_newline {
            out.push('\n');
        }
        out
    }

    pub fn records(&self) -> impl Iterator<Item = &ReviewerRecord> {
        self.lines.iter().filter_map(|line| match line {
            Line::Reviewer { record, .. } => Some(record),
            Line::Blank(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.records().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, handle: &Handle) -> Option<&ReviewerRecord> {
        self.records().find(|record| &record.handle == handle)
    }

    /// True once any row has been changed since parsing.
    pub fn is_dirty(&self) -> bool {
        self.lines
            .iter()
            .any(|line| matches!(line, Line::Reviewer { raw: None, .. }))
    }

    /// Apply `f` to the reviewer with `handle`.
    ///
    /// A missing handle means the code and the roster disagree about who the
    /// reviewers are; callers treat [`RosterError::NotFound`] as fatal.
    pub fn mutate_by_handle<F>(&mut self, handle: &Handle, f: F) -> Result<(), RosterError>
    where
        F: FnOnce(&mut ReviewerRecord),
    {
        let (record, raw) = self
            .lines
            .iter_mut()
            .find_map(|line| match line {
                Line::Reviewer { record, raw } if &record.handle == handle => Some((record, raw)),
                _ => None,
            })
            .ok_or_else(|| RosterError::NotFound {
                handle: handle.clone(),
            })?;

        let before = record.clone();
        f(&mut *record);
        if *record != before {
            *raw = None;
        }
        Ok(())
    }

    /// Lifecycle: the reviewer accepted an invitation.
    pub fn mark_busy(&mut self, handle: &Handle) -> Result<(), RosterError> {
        self.mutate_by_handle(handle, |record| record.busy = true)
    }

    /// Lifecycle: the reviewer finished a review.
    ///
    /// Frees the reviewer, bumps their total, stamps the review date and
    /// lowers their calling score. Every other reviewer from the
    /// submission's `institution` who was not in `invited` gets their calling
    /// score raised by one.
    pub fn complete_review(
        &mut self,
        reviewer: &Handle,
        institution: &str,
        invited: &[Handle],
        date: NaiveDate,
    ) -> Result<(), RosterError> {
        self.mutate_by_handle(reviewer, |record| {
            record.busy = false;
            record.total_reviews += 1;
            record.last_review = Some(date);
            record.calling_score -= 1;
        })?;

        let bumped: Vec<Handle> = self
            .records()
            .filter(|record| {
                record.is_from(institution)
                    && &record.handle != reviewer
                    && !invited.contains(&record.handle)
            })
            .map(|record| record.handle.clone())
            .collect();
        for handle in &bumped {
            self.mutate_by_handle(handle, |record| record.calling_score += 1)?;
        }
        debug!(
            "Raised calling score of {} reviewer(s) from {}",
            bumped.len(),
            institution
        );
        Ok(())
    }
}

/// The roster file on disk.
#[derive(Debug, Clone)]
pub struct RosterFile {
    path: PathBuf,
}

impl RosterFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<Roster, RosterError> {
        let text = fs::read_to_string(&self.path).map_err(|source| RosterError::Io {
            path: self.path.clone(),
            source,
        })?;
        let roster = Roster::parse(&text)?;
        info!(
            "Loaded {} reviewer(s) from {}",
            roster.len(),
            self.path.display()
        );
        Ok(roster)
    }

    /// Overwrite the file with `roster`.
    ///
    /// Writes to a sibling temporary file first and renames it over the
    /// roster, so a crash leaves either the old or the new table.
    pub fn save(&self, roster: &Roster) -> Result<(), RosterError> {
        let io_error = |source| RosterError::Io {
            path: self.path.clone(),
            source,
        };
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, roster.render()).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)?;
        info!("Saved roster to {}", self.path.display());
        Ok(())
    }

    /// Load, apply `f`, and save, as one unit. Nothing is written if `f`
    /// fails.
    pub fn mutate<F, T>(&self, f: F) -> Result<T, RosterError>
    where
        F: FnOnce(&mut Roster) -> Result<T, RosterError>,
    {
        let mut roster = self.load()?;
        let result = f(&mut roster)?;
        self.save(&roster)?;
        Ok(result)
    }
}
