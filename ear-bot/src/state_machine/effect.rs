//! Effects (side effects as data).
//!
//! Transitions produce effects; the interpreter executes them against the
//! platform and the in-memory roster, ledger and cache. Keeping them as data
//! lets the transition logic be tested without any platform at all.

use chrono::{DateTime, NaiveDate, Utc};

use ear_bot_core::{CompletionRecord, Handle, SubmissionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    // =========================================================================
    // Platform Effects
    // =========================================================================
    PostComment {
        submission: SubmissionId,
        content: CommentContent,
    },

    AddLabel {
        submission: SubmissionId,
        label: String,
    },

    RemoveLabel {
        submission: SubmissionId,
        label: String,
    },

    /// Formal review request on the platform.
    RequestReview {
        submission: SubmissionId,
        reviewer: Handle,
    },

    Assign {
        submission: SubmissionId,
        assignee: Handle,
    },

    // =========================================================================
    // Roster / Ledger / Cache Effects
    // =========================================================================
    /// Flag the reviewer as busy in the roster.
    MarkBusy { reviewer: Handle },

    /// Apply the completion bookkeeping to the roster.
    CompleteReview {
        reviewer: Handle,
        /// Institution of the reviewed submission.
        institution: String,
        /// Everyone invited on the submission.
        invited: Vec<Handle>,
        date: NaiveDate,
    },

    /// Queue a ledger line, written when the run finishes.
    AppendLedger { record: CompletionRecord },

    /// Remember an invitation in the invite cache.
    RecordInvite {
        submission: SubmissionId,
        reviewer: Handle,
        at: DateTime<Utc>,
    },

    // =========================================================================
    // Logging Effects
    // =========================================================================
    Log { level: LogLevel, message: String },
}

impl Effect {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Effect::Log {
            level,
            message: message.into(),
        }
    }

    /// True for effects that reach the collaboration platform.
    pub fn is_platform(&self) -> bool {
        matches!(
            self,
            Effect::PostComment { .. }
                | Effect::AddLabel { .. }
                | Effect::RemoveLabel { .. }
                | Effect::RequestReview { .. }
                | Effect::Assign { .. }
        )
    }
}

/// Comment bodies the bot knows how to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentContent {
    /// Invitation to review, with its reply deadline.
    Invite {
        reviewer: Handle,
        deadline: DateTime<Utc>,
    },

    /// Acknowledges a decline.
    DeclineAcknowledged { reviewer: Handle },

    /// Announces that an invitation expired.
    TimeoutNotice { reviewer: Handle },

    /// Confirms an acceptance and names the supervising contact.
    Accepted {
        reviewer: Handle,
        supervisor: Option<Handle>,
    },

    SupervisorAssigned { supervisor: Handle },

    /// Explains why automation stalled on this submission.
    Diagnostic { message: String },
}

/// Log level for logging effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
