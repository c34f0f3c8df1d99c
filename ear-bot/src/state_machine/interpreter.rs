//! Effect interpreter.
//!
//! The boundary between the pure transitions and the outside world. Platform
//! effects go to the [`Platform`]; roster, ledger and cache effects only touch
//! the in-memory [`RunState`], which the controller writes out once the whole
//! invocation succeeded.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use ear_bot_core::history::{
    format_deadline, ACCEPTED_MARKER, DECLINE_ACK_MARKER, INVITE_MARKER, TIMEOUT_MARKER,
};
use ear_bot_core::{CompletionRecord, Roster, RosterError};

use super::effect::{CommentContent, Effect, LogLevel};
use crate::cache::InviteCache;
use crate::get_bot_version;
use crate::platform::Platform;

/// Context needed by the interpreter to execute effects.
pub struct InterpreterContext<'a> {
    pub platform: &'a dyn Platform,
    /// Log platform effects instead of executing them.
    pub dry_run: bool,
}

/// Everything an invocation changes locally before the final write.
#[derive(Debug)]
pub struct RunState {
    pub roster: Roster,
    /// Ledger lines to append.
    pub ledger: Vec<CompletionRecord>,
    pub cache: InviteCache,
}

impl RunState {
    pub fn new(roster: Roster, cache: InviteCache) -> Self {
        Self {
            roster,
            ledger: Vec::new(),
            cache,
        }
    }
}

#[derive(Debug, Error)]
pub enum EffectError {
    #[error("platform call failed: {0:#}")]
    Platform(anyhow::Error),

    #[error(transparent)]
    Roster(#[from] RosterError),
}

/// Execute effects in order, stopping at the first failure.
///
/// Returns the number of effects executed.
pub async fn execute_effects(
    ctx: &InterpreterContext<'_>,
    state: &mut RunState,
    effects: Vec<Effect>,
) -> Result<usize, EffectError> {
    let mut executed = 0;
    for effect in effects {
        if let Err(err) = execute_effect(ctx, state, effect).await {
            error!("Effect execution failed: {}", err);
            return Err(err);
        }
        executed += 1;
    }
    Ok(executed)
}

async fn execute_effect(
    ctx: &InterpreterContext<'_>,
    state: &mut RunState,
    effect: Effect,
) -> Result<(), EffectError> {
    if ctx.dry_run && effect.is_platform() {
        info!("[dry-run] {:?}", effect);
        return Ok(());
    }

    match effect {
        Effect::PostComment {
            submission,
            content,
        } => ctx
            .platform
            .post_comment(submission, &format_comment_content(&content))
            .await
            .map_err(EffectError::Platform),

        Effect::AddLabel { submission, label } => ctx
            .platform
            .add_label(submission, &label)
            .await
            .map_err(EffectError::Platform),

        Effect::RemoveLabel { submission, label } => ctx
            .platform
            .remove_label(submission, &label)
            .await
            .map_err(EffectError::Platform),

        Effect::RequestReview {
            submission,
            reviewer,
        } => ctx
            .platform
            .request_review(submission, &reviewer)
            .await
            .map_err(EffectError::Platform),

        Effect::Assign {
            submission,
            assignee,
        } => ctx
            .platform
            .assign(submission, &assignee)
            .await
            .map_err(EffectError::Platform),

        Effect::MarkBusy { reviewer } => {
            state.roster.mark_busy(&reviewer)?;
            info!("Marked {} as busy", reviewer);
            Ok(())
        }

        Effect::CompleteReview {
            reviewer,
            institution,
            invited,
            date,
        } => {
            state
                .roster
                .complete_review(&reviewer, &institution, &invited, date)?;
            info!("Recorded completed review by {}", reviewer);
            Ok(())
        }

        Effect::AppendLedger { record } => {
            debug!("Queued ledger line: {}", record);
            state.ledger.push(record);
            Ok(())
        }

        Effect::RecordInvite {
            submission,
            reviewer,
            at,
        } => {
            state.cache.record_invite(submission, &reviewer, at);
            Ok(())
        }

        Effect::Log { level, message } => {
            match level {
                LogLevel::Debug => debug!("{}", message),
                LogLevel::Info => info!("{}", message),
                LogLevel::Warn => warn!("{}", message),
                LogLevel::Error => error!("{}", message),
            }
            Ok(())
        }
    }
}

/// Separates a comment's message from the version footer.
const FOOTER_SEPARATOR: &str = "\n\n---\n_ear-bot v";

/// Render a comment as posted, footer included.
pub fn format_comment_content(content: &CommentContent) -> String {
    format!(
        "{}{}{}_",
        format_comment_body(content),
        FOOTER_SEPARATOR,
        get_bot_version()
    )
}

/// A posted comment without its version footer.
pub fn strip_footer(body: &str) -> &str {
    body.rfind(FOOTER_SEPARATOR)
        .map_or(body, |index| &body[..index])
}

/// Render the message part of a comment.
///
/// Invitations carry the invitation marker, the deadline and exactly one
/// mention, in that order; the history parser depends on this shape.
pub fn format_comment_body(content: &CommentContent) -> String {
    match content {
        CommentContent::Invite { reviewer, deadline } => format!(
            "👋 **Review invitation**\n\n\
            We would like you to review this assembly. \
            {} {}.\n\n\
            Invited reviewer: {}",
            INVITE_MARKER,
            format_deadline(*deadline),
            reviewer.mention()
        ),

        CommentContent::DeclineAcknowledged { reviewer } => format!(
            "🙏 {}, {}. We will look for another reviewer.",
            DECLINE_ACK_MARKER,
            reviewer.mention()
        ),

        CommentContent::TimeoutNotice { reviewer } => format!(
            "⏰ We {} from {}, so we will look for another reviewer.",
            TIMEOUT_MARKER,
            reviewer.mention()
        ),

        CommentContent::Accepted {
            reviewer,
            supervisor,
        } => {
            let contact = match supervisor {
                Some(supervisor) => format!(
                    "Your supervisor for this review is {}; please reach out to them with any questions.",
                    supervisor.mention()
                ),
                None => "A supervisor will be in touch with you shortly.".to_string(),
            };
            format!(
                "✅ {}, {}! A formal review request has been sent to you.\n\n{}",
                ACCEPTED_MARKER,
                reviewer.mention(),
                contact
            )
        }

        CommentContent::SupervisorAssigned { supervisor } => format!(
            "📋 {} has been assigned to supervise this submission.",
            supervisor.mention()
        ),

        CommentContent::Diagnostic { message } => format!(
            "⚠️ **Reviewer assignment paused**\n\n{}\n\n\
            Automation will retry on its next run once this is fixed.",
            message
        ),
    }
}
