//! Pure transition functions.
//!
//! Given a submission's decision bundle and the roster, decide which effects
//! advance it. Nothing here performs I/O.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};

use ear_bot_core::history::invitation_deadline;
use ear_bot_core::{
    select, CompletionRecord, Handle, Roster, RosterError, SubmissionId, SubmissionMetadata,
};

use super::effect::{CommentContent, Effect, LogLevel};
use super::state::{Decision, ReviewPhase};

/// Result of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// Phase after the effects are applied.
    pub phase: ReviewPhase,
    /// Effects to execute, in order.
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: ReviewPhase, effects: Vec<Effect>) -> Self {
        Self { phase, effects }
    }

    pub fn no_change(phase: ReviewPhase) -> Self {
        Self {
            phase,
            effects: vec![],
        }
    }

    /// True when the transition posts an invitation.
    pub fn invites(&self) -> bool {
        self.effects.iter().any(|effect| {
            matches!(
                effect,
                Effect::PostComment {
                    content: CommentContent::Invite { .. },
                    ..
                }
            )
        })
    }
}

/// Inputs for advancing one submission.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceInput<'a> {
    pub submission: SubmissionId,
    /// Supervising contact named in the acceptance confirmation.
    pub supervisor: Option<&'a Handle>,
    pub metadata: &'a SubmissionMetadata,
    pub decision: &'a Decision,
    /// Invitations remembered outside the thread (invite cache).
    pub cached_invites: &'a [Handle],
    pub roster: &'a Roster,
    /// Reviewers to treat as busy on top of the roster flag.
    pub busy: &'a HashSet<Handle>,
    pub in_progress_label: &'a str,
    pub now: DateTime<Utc>,
}

/// Decide what to do with a submission in its current phase.
///
/// Fails when an accepting reviewer is not in the roster; no effect is
/// planned in that case.
pub fn advance(input: &AdvanceInput<'_>) -> Result<TransitionResult, RosterError> {
    let decision = input.decision;
    match decision.phase {
        ReviewPhase::AwaitingInvite => Ok(invite_step(input, exclusions(input, None), vec![])),

        ReviewPhase::Invited | ReviewPhase::Completed => {
            Ok(TransitionResult::no_change(decision.phase))
        }

        ReviewPhase::Accepted => {
            let Some(reviewer) = &decision.invited_reviewer else {
                return Ok(TransitionResult::no_change(decision.phase));
            };
            if decision.acceptance_confirmed {
                return Ok(TransitionResult::no_change(decision.phase));
            }
            handle_acceptance(input, reviewer)
        }

        ReviewPhase::Declined | ReviewPhase::TimedOut => {
            let Some(reviewer) = &decision.invited_reviewer else {
                return Ok(TransitionResult::no_change(decision.phase));
            };
            let mut effects = Vec::new();
            if !decision.followed_up {
                let content = if decision.phase == ReviewPhase::Declined {
                    CommentContent::DeclineAcknowledged {
                        reviewer: reviewer.clone(),
                    }
                } else {
                    CommentContent::TimeoutNotice {
                        reviewer: reviewer.clone(),
                    }
                };
                effects.push(Effect::PostComment {
                    submission: input.submission,
                    content,
                });
            }
            Ok(invite_step(
                input,
                exclusions(input, Some(reviewer)),
                effects,
            ))
        }
    }
}

fn handle_acceptance(
    input: &AdvanceInput<'_>,
    reviewer: &Handle,
) -> Result<TransitionResult, RosterError> {
    if input.roster.get(reviewer).is_none() {
        return Err(RosterError::NotFound {
            handle: reviewer.clone(),
        });
    }

    let effects = vec![
        Effect::RequestReview {
            submission: input.submission,
            reviewer: reviewer.clone(),
        },
        Effect::MarkBusy {
            reviewer: reviewer.clone(),
        },
        Effect::AddLabel {
            submission: input.submission,
            label: input.in_progress_label.to_string(),
        },
        Effect::PostComment {
            submission: input.submission,
            content: CommentContent::Accepted {
                reviewer: reviewer.clone(),
                supervisor: input.supervisor.cloned(),
            },
        },
    ];
    Ok(TransitionResult::new(ReviewPhase::Accepted, effects))
}

/// Everyone already invited, plus `also`.
fn exclusions(input: &AdvanceInput<'_>, also: Option<&Handle>) -> Vec<Handle> {
    let mut excluded = input.decision.previously_invited.clone();
    for handle in input.cached_invites.iter().chain(also) {
        if !excluded.contains(handle) {
            excluded.push(handle.clone());
        }
    }
    excluded
}

/// One invitation attempt. Appends to `effects`.
fn invite_step(
    input: &AdvanceInput<'_>,
    excluded: Vec<Handle>,
    mut effects: Vec<Effect>,
) -> TransitionResult {
    let selection = select(
        input.roster,
        &input.metadata.institution,
        &excluded,
        input.busy,
    );

    let Some(candidate) = selection.first() else {
        effects.push(Effect::log(
            LogLevel::Info,
            format!(
                "No eligible reviewer for {} ({}); will retry on the next run",
                input.submission, input.metadata.institution
            ),
        ));
        return TransitionResult::new(input.decision.phase, effects);
    };

    if selection.wrapped_around {
        effects.push(Effect::log(
            LogLevel::Info,
            format!(
                "Every eligible reviewer was already invited on {}; starting over",
                input.submission
            ),
        ));
    }
    effects.push(Effect::PostComment {
        submission: input.submission,
        content: CommentContent::Invite {
            reviewer: candidate.handle.clone(),
            deadline: invitation_deadline(input.now),
        },
    });
    effects.push(Effect::RecordInvite {
        submission: input.submission,
        reviewer: candidate.handle.clone(),
        at: input.now,
    });
    TransitionResult::new(ReviewPhase::Invited, effects)
}

/// Initial triage: hand the submission to a supervisor.
pub fn plan_supervisor(
    submission: SubmissionId,
    supervisor: &Handle,
    governance_label: &str,
) -> Vec<Effect> {
    vec![
        Effect::Assign {
            submission,
            assignee: supervisor.clone(),
        },
        Effect::AddLabel {
            submission,
            label: governance_label.to_string(),
        },
        Effect::RequestReview {
            submission,
            reviewer: supervisor.clone(),
        },
        Effect::PostComment {
            submission,
            content: CommentContent::SupervisorAssigned {
                supervisor: supervisor.clone(),
            },
        },
    ]
}

/// Inputs for finalizing a merged submission.
#[derive(Debug, Clone, Copy)]
pub struct CompletionInput<'a> {
    pub submission: SubmissionId,
    pub reviewer: &'a Handle,
    pub metadata: &'a SubmissionMetadata,
    /// Everyone invited on the submission.
    pub invited: &'a [Handle],
    pub roster: &'a Roster,
    pub in_progress_label: &'a str,
    pub date: NaiveDate,
}

/// Accepted -> Completed.
///
/// Fails when the reviewer is not in the roster.
pub fn complete(input: &CompletionInput<'_>) -> Result<TransitionResult, RosterError> {
    let record = input
        .roster
        .get(input.reviewer)
        .ok_or_else(|| RosterError::NotFound {
            handle: input.reviewer.clone(),
        })?;

    let effects = vec![
        Effect::CompleteReview {
            reviewer: input.reviewer.clone(),
            institution: input.metadata.institution.clone(),
            invited: input.invited.to_vec(),
            date: input.date,
        },
        Effect::AppendLedger {
            record: CompletionRecord {
                name: record.full_name.clone(),
                institution: record.institution.clone(),
                subject: input.metadata.subject.clone(),
                submission_id: input.submission,
            },
        },
        Effect::RemoveLabel {
            submission: input.submission,
            label: input.in_progress_label.to_string(),
        },
    ];
    Ok(TransitionResult::new(ReviewPhase::Completed, effects))
}

/// A per-submission parse problem: tell the humans and move on.
pub fn diagnose(submission: SubmissionId, message: impl Into<String>) -> Vec<Effect> {
    let message = message.into();
    vec![
        Effect::log(
            LogLevel::Warn,
            format!("Skipping {}: {}", submission, message),
        ),
        Effect::PostComment {
            submission,
            content: CommentContent::Diagnostic { message },
        },
    ]
}
