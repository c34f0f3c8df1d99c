//! Candidate selection.
//!
//! A reviewer is eligible for a submission when they are not busy and do not
//! belong to the submitting institution. Eligible reviewers who were already
//! invited on the submission are excluded, unless that would leave nobody:
//! then the exclusion list is ignored so the submission can always make
//! progress once anyone is eligible.

use std::collections::HashSet;

use crate::handle::Handle;
use crate::roster::{ReviewerRecord, Roster};

/// Ranked candidates for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Best candidate first.
    pub candidates: Vec<ReviewerRecord>,
    /// True when every eligible reviewer was excluded and the exclusion list
    /// was dropped.
    pub wrapped_around: bool,
}

impl Selection {
    pub fn first(&self) -> Option<&ReviewerRecord> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Rank roster entries for a submission from `institution`.
///
/// Candidates are ordered by ascending calling score, ties broken by handle.
/// `busy` adds reviewers to treat as busy on top of the roster's own flag.
pub fn select(
    roster: &Roster,
    institution: &str,
    excluded: &[Handle],
    busy: &HashSet<Handle>,
) -> Selection {
    let mut eligible: Vec<&ReviewerRecord> = roster
        .records()
        .filter(|record| !record.busy && !busy.contains(&record.handle))
        .filter(|record| !record.is_from(institution))
        .collect();
    eligible.sort_by(|a, b| {
        a.calling_score
            .cmp(&b.calling_score)
            .then_with(|| a.handle.cmp(&b.handle))
    });

    let remaining: Vec<&ReviewerRecord> = eligible
        .iter()
        .copied()
        .filter(|record| !excluded.contains(&record.handle))
        .collect();

    let wrapped_around = remaining.is_empty() && !eligible.is_empty();
    let chosen = if wrapped_around { eligible } else { remaining };

    Selection {
        candidates: chosen.into_iter().cloned().collect(),
        wrapped_around,
    }
}
