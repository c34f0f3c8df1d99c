//! Rebuilding a submission's decision bundle from its thread.

use chrono::{DateTime, Utc};

use ear_bot_core::history::invitation_deadline;
use ear_bot_core::{parse_history, Handle, History, HistoryError, Submission};

use super::event::phase_from_events;
use super::state::{Decision, Reconstruction, ReviewPhase, SkipReason};

/// Checks that exclude a submission before its thread is even parsed.
pub fn skip_reason(submission: &Submission, governance_label: &str) -> Option<SkipReason> {
    if submission.requested_reviewers.len() > 1 {
        Some(SkipReason::ReviewersAlreadyRequested)
    } else if !submission.has_label(governance_label) {
        Some(SkipReason::MissingGovernanceLabel)
    } else if submission.formal_reviews >= 1 {
        Some(SkipReason::AlreadyReviewed)
    } else {
        None
    }
}

/// Derive the decision bundle from an already parsed history.
pub fn decide(history: &History, merged: bool, now: DateTime<Utc>) -> Decision {
    let current = history.current_invitation();
    let phase = if merged {
        ReviewPhase::Completed
    } else {
        phase_from_events(&history.events, now)
    };

    Decision {
        phase,
        invited_reviewer: current.map(|(reviewer, _)| reviewer.clone()),
        deadline: current.map(|(_, at)| invitation_deadline(at)),
        previously_invited: history.previously_invited(),
        followed_up: history.followed_up(),
        acceptance_confirmed: history.confirmed_acceptance(),
    }
}

/// Why finalizing `reviewer` looks wrong, if it does.
///
/// Completion is driven by an external merge event, so a mismatch is only
/// reported, never enforced.
pub fn completion_mismatch(
    history: &History,
    reviewer: &Handle,
    now: DateTime<Utc>,
) -> Option<String> {
    let Some((invitee, _)) = history.current_invitation() else {
        return Some(format!("{} was never invited", reviewer.mention()));
    };
    if invitee != reviewer {
        return Some(format!(
            "{} is not the invited reviewer ({} is)",
            reviewer.mention(),
            invitee.mention()
        ));
    }
    match phase_from_events(&history.events, now) {
        ReviewPhase::Accepted => None,
        phase => Some(format!(
            "{} never accepted the invitation (phase: {})",
            reviewer.mention(),
            phase
        )),
    }
}

/// Skip checks, then history parsing, then phase derivation.
pub fn reconstruct(
    submission: &Submission,
    governance_label: &str,
    now: DateTime<Utc>,
) -> Result<Reconstruction, HistoryError> {
    if let Some(reason) = skip_reason(submission, governance_label) {
        return Ok(Reconstruction::Skip(reason));
    }
    let history = parse_history(&submission.newest_first())?;
    Ok(Reconstruction::Actionable(decide(
        &history,
        submission.merged,
        now,
    )))
}
