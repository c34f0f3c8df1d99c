//! Submissions awaiting review and the metadata carried in their description.

use std::fmt;

use thiserror::Error;

use crate::handle::Handle;
use crate::history::TimelineComment;

/// Description key holding the submitting institution.
pub const INSTITUTION_KEY: &str = "Institution";

/// Description key holding the reviewed subject (the species).
pub const SUBJECT_KEY: &str = "Species";

/// Newtype for a submission (pull request) number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(pub u64);

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for SubmissionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Everything the bot knows about one submission at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: SubmissionId,
    pub author: Handle,
    pub description: String,
    pub labels: Vec<String>,
    /// Reviewers formally requested on the platform.
    pub requested_reviewers: Vec<Handle>,
    /// Number of formal reviews already submitted.
    pub formal_reviews: usize,
    /// First assignee, who acts as the supervising contact.
    pub supervisor: Option<Handle>,
    pub merged: bool,
    /// Comment thread, oldest first.
    pub timeline: Vec<TimelineComment>,
}

impl Submission {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Comment thread, newest first.
    pub fn newest_first(&self) -> Vec<TimelineComment> {
        self.timeline.iter().rev().cloned().collect()
    }
}

/// Institution and subject of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionMetadata {
    pub institution: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("the description has no `{key}:` line")]
    MissingField { key: &'static str },
}

/// Read `Institution:` and `Species:` lines from a description.
///
/// Keys are matched case-insensitively at the start of a line, optionally
/// behind markdown list or emphasis characters. The first non-empty value
/// wins.
pub fn parse_metadata(description: &str) -> Result<SubmissionMetadata, MetadataError> {
    let institution = field(description, INSTITUTION_KEY).ok_or(MetadataError::MissingField {
        key: INSTITUTION_KEY,
    })?;
    let subject =
        field(description, SUBJECT_KEY).ok_or(MetadataError::MissingField { key: SUBJECT_KEY })?;
    Ok(SubmissionMetadata {
        institution,
        subject,
    })
}

fn field(description: &str, key: &str) -> Option<String> {
    description.lines().find_map(|line| {
        let line = line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '*' | '_'));
        let (name, value) = line.split_once(':')?;
        let name = name.trim_end_matches(['*', '_']).trim();
        if !name.eq_ignore_ascii_case(key) {
            return None;
        }
        let value = value.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_'));
        (!value.is_empty()).then(|| value.to_string())
    })
}
