//! Review phase of a submission.
//!
//! The phase is derived fresh on every invocation by replaying the comment
//! thread and is never stored anywhere.

use std::fmt;

use chrono::{DateTime, Utc};

use ear_bot_core::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewPhase {
    /// Nobody has been invited yet.
    AwaitingInvite,
    /// The current invitee has not answered and the deadline has not passed.
    Invited,
    Accepted,
    Declined,
    /// The deadline passed without a decisive answer.
    TimedOut,
    /// The submission was merged.
    Completed,
}

impl fmt::Display for ReviewPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReviewPhase::AwaitingInvite => "awaiting invite",
            ReviewPhase::Invited => "invited",
            ReviewPhase::Accepted => "accepted",
            ReviewPhase::Declined => "declined",
            ReviewPhase::TimedOut => "timed out",
            ReviewPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Why a submission is left out of a run entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// More than one reviewer is already formally requested.
    ReviewersAlreadyRequested,
    /// The governance label is absent.
    MissingGovernanceLabel,
    /// A formal review was already submitted.
    AlreadyReviewed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::ReviewersAlreadyRequested => "more than one reviewer already requested",
            SkipReason::MissingGovernanceLabel => "governance label absent",
            SkipReason::AlreadyReviewed => "formal review already recorded",
        };
        f.write_str(reason)
    }
}

/// Everything the controller needs to act on one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub phase: ReviewPhase,
    /// Reviewer named by the current invitation.
    pub invited_reviewer: Option<Handle>,
    pub deadline: Option<DateTime<Utc>>,
    /// Everyone ever invited on the submission, oldest first.
    pub previously_invited: Vec<Handle>,
    /// The bot already acknowledged the outcome of the current invitation.
    pub followed_up: bool,
    /// The bot already confirmed that the invitee accepted.
    pub acceptance_confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconstruction {
    Actionable(Decision),
    Skip(SkipReason),
}
