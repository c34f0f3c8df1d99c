//! One invocation of the bot.
//!
//! The controller loads the roster once, walks the submissions the mode
//! asks for, executes the planned effects and, only if every platform call
//! succeeded, writes the roster, ledger and invite cache back.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use ear_bot_core::{
    parse_history, parse_metadata, pick_supervisor, Handle, Ledger, LedgerError, ReviewEvent,
    RosterError, RosterFile, Submission, SubmissionId, SubmissionMetadata,
};

use crate::cache::InviteCache;
use crate::config::Config;
use crate::platform::Platform;
use crate::state_machine::interpreter::{
    execute_effects, format_comment_body, strip_footer, EffectError, InterpreterContext, RunState,
};
use crate::state_machine::{
    advance, complete, completion_mismatch, decide, diagnose, plan_supervisor, reconstruct,
    skip_reason, AdvanceInput, CommentContent, CompletionInput, Effect, LogLevel, Reconstruction,
    ReviewPhase,
};

/// What an invocation was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Scan every open submission and advance it.
    Search,
    /// React to one human reply.
    Comment {
        submission: SubmissionId,
        author: Handle,
        body: String,
    },
    /// Initial triage of a new submission.
    Supervisor {
        submission: SubmissionId,
        submitter: Handle,
    },
    /// Finalize a merged submission.
    Merged {
        submission: SubmissionId,
        reviewer: Handle,
    },
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Search => "search",
            Mode::Comment { .. } => "comment",
            Mode::Supervisor { .. } => "supervisor",
            Mode::Merged { .. } => "merged",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Fatal invocation errors. Nothing is written when one is returned.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("configuration error: {0}")]
    Config(String),

    /// A reviewer the bot acted on is missing from the roster.
    #[error("roster integrity error: {0}")]
    RosterIntegrity(#[source] RosterError),

    #[error("collaboration platform error: {0:#}")]
    ExternalService(anyhow::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<EffectError> for InvocationError {
    fn from(err: EffectError) -> Self {
        match err {
            EffectError::Platform(err) => InvocationError::ExternalService(err),
            EffectError::Roster(err) => InvocationError::RosterIntegrity(err),
        }
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Submissions fetched.
    pub examined: usize,
    pub skipped: usize,
    pub invitations: usize,
    pub diagnostics: usize,
    pub effects: usize,
}

pub struct Controller {
    platform: Arc<dyn Platform>,
    config: Config,
    dry_run: bool,
}

impl Controller {
    pub fn new(platform: Arc<dyn Platform>, config: Config) -> Self {
        Self {
            platform,
            config,
            dry_run: false,
        }
    }

    /// Log platform effects instead of executing them and write nothing.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self, mode: Mode, now: DateTime<Utc>) -> Result<RunSummary, InvocationError> {
        self.validate(&mode)?;
        info!("Starting {} run", mode.name());

        let roster_file = RosterFile::new(&self.config.roster_path);
        let ledger = Ledger::new(&self.config.ledger_path);
        let roster = roster_file.load().map_err(StorageError::from)?;
        let cache = match &self.config.invite_cache_path {
            Some(path) => InviteCache::load(path),
            None => InviteCache::disabled(),
        };

        let mut state = RunState::new(roster, cache);
        let ctx = InterpreterContext {
            platform: self.platform.as_ref(),
            dry_run: self.dry_run,
        };
        let mut summary = RunSummary::default();

        match mode {
            Mode::Search => self.search(&ctx, &mut state, &mut summary, now).await?,
            Mode::Comment {
                submission,
                author,
                body,
            } => {
                self.comment(&ctx, &mut state, &mut summary, submission, &author, &body, now)
                    .await?
            }
            Mode::Supervisor {
                submission,
                submitter,
            } => {
                self.supervisor(&ctx, &mut state, &mut summary, submission, &submitter)
                    .await?
            }
            Mode::Merged {
                submission,
                reviewer,
            } => {
                self.merged(&ctx, &mut state, &mut summary, submission, &reviewer, now)
                    .await?
            }
        }

        self.commit(&roster_file, &ledger, &state)?;
        info!(
            "Run finished: {} examined, {} skipped, {} invitation(s), {} diagnostic(s), {} effect(s)",
            summary.examined,
            summary.skipped,
            summary.invitations,
            summary.diagnostics,
            summary.effects
        );
        Ok(summary)
    }

    fn validate(&self, mode: &Mode) -> Result<(), InvocationError> {
        if !self.config.roster_path.is_file() {
            return Err(InvocationError::Config(format!(
                "roster file {} does not exist",
                self.config.roster_path.display()
            )));
        }
        if !self.config.ledger_path.is_file() {
            return Err(InvocationError::Config(format!(
                "ledger file {} does not exist",
                self.config.ledger_path.display()
            )));
        }
        match mode {
            Mode::Supervisor { .. } if self.config.supervisors.is_empty() => Err(
                InvocationError::Config("SUPERVISORS must name at least one handle".to_string()),
            ),
            Mode::Comment { author, .. } if author.is_empty() => Err(InvocationError::Config(
                "comment author must not be empty".to_string(),
            )),
            Mode::Supervisor { submitter: who, .. } | Mode::Merged { reviewer: who, .. }
                if who.is_empty() =>
            {
                Err(InvocationError::Config(format!(
                    "{} run needs a non-empty handle",
                    mode.name()
                )))
            }
            _ => Ok(()),
        }
    }

    async fn fetch(&self, id: SubmissionId) -> Result<Submission, InvocationError> {
        self.platform
            .submission(id)
            .await
            .map_err(InvocationError::ExternalService)
    }

    async fn execute(
        &self,
        ctx: &InterpreterContext<'_>,
        state: &mut RunState,
        summary: &mut RunSummary,
        effects: Vec<Effect>,
    ) -> Result<(), InvocationError> {
        summary.effects += execute_effects(ctx, state, effects).await?;
        Ok(())
    }

    /// Post a diagnostic unless the same one is already on the thread.
    async fn report(
        &self,
        ctx: &InterpreterContext<'_>,
        state: &mut RunState,
        summary: &mut RunSummary,
        submission: &Submission,
        message: String,
    ) -> Result<(), InvocationError> {
        summary.diagnostics += 1;
        let body = format_comment_body(&CommentContent::Diagnostic {
            message: message.clone(),
        });
        let already_posted = submission.timeline.iter().any(|comment| {
            comment.from_controller && strip_footer(&comment.body).trim() == body.trim()
        });

        let effects = if already_posted {
            vec![Effect::log(
                LogLevel::Warn,
                format!("Skipping {} (already reported): {}", submission.id, message),
            )]
        } else {
            diagnose(submission.id, message)
        };
        self.execute(ctx, state, summary, effects).await
    }

    async fn metadata(
        &self,
        ctx: &InterpreterContext<'_>,
        state: &mut RunState,
        summary: &mut RunSummary,
        submission: &Submission,
    ) -> Result<Option<SubmissionMetadata>, InvocationError> {
        match parse_metadata(&submission.description) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(err) => {
                self.report(ctx, state, summary, submission, err.to_string())
                    .await?;
                Ok(None)
            }
        }
    }

    async fn search(
        &self,
        ctx: &InterpreterContext<'_>,
        state: &mut RunState,
        summary: &mut RunSummary,
        now: DateTime<Utc>,
    ) -> Result<(), InvocationError> {
        let ids = self
            .platform
            .open_submissions()
            .await
            .map_err(InvocationError::ExternalService)?;
        info!("Found {} open submission(s)", ids.len());
        state.cache.retain_open(&ids);

        // Reviewers invited or accepted earlier in this run
        let mut busy: HashSet<Handle> = HashSet::new();

        for id in ids {
            let submission = self.fetch(id).await?;
            summary.examined += 1;

            let decision = match reconstruct(&submission, &self.config.governance_label, now) {
                Ok(Reconstruction::Actionable(decision)) => decision,
                Ok(Reconstruction::Skip(reason)) => {
                    debug!("Skipping {}: {}", id, reason);
                    summary.skipped += 1;
                    continue;
                }
                Err(err) => {
                    self.report(ctx, state, summary, &submission, err.to_string())
                        .await?;
                    continue;
                }
            };
            debug!("{} is {}", id, decision.phase);

            if decision.phase == ReviewPhase::Invited {
                continue;
            }
            let Some(metadata) = self.metadata(ctx, state, summary, &submission).await? else {
                continue;
            };

            let cached = state.cache.invited(id).to_vec();
            let result = advance(&AdvanceInput {
                submission: id,
                supervisor: submission.supervisor.as_ref(),
                metadata: &metadata,
                decision: &decision,
                cached_invites: &cached,
                roster: &state.roster,
                busy: &busy,
                in_progress_label: &self.config.in_progress_label,
                now,
            })
            .map_err(InvocationError::RosterIntegrity)?;

            if result.invites() {
                summary.invitations += 1;
            }
            for effect in &result.effects {
                match effect {
                    Effect::RecordInvite { reviewer, .. } | Effect::MarkBusy { reviewer } => {
                        busy.insert(reviewer.clone());
                    }
                    _ => {}
                }
            }
            self.execute(ctx, state, summary, result.effects).await?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn comment(
        &self,
        ctx: &InterpreterContext<'_>,
        state: &mut RunState,
        summary: &mut RunSummary,
        id: SubmissionId,
        author: &Handle,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<(), InvocationError> {
        let submission = self.fetch(id).await?;
        summary.examined += 1;

        if let Some(reason) = skip_reason(&submission, &self.config.governance_label) {
            info!("Ignoring comment on {}: {}", id, reason);
            summary.skipped += 1;
            return Ok(());
        }

        let mut history = match parse_history(&submission.newest_first()) {
            Ok(history) => history,
            Err(err) => {
                return self
                    .report(ctx, state, summary, &submission, err.to_string())
                    .await;
            }
        };
        if !history.has_reply(author, body) {
            history.push(ReviewEvent::response(author.clone(), body, now));
        }

        let decision = decide(&history, submission.merged, now);
        if !matches!(decision.phase, ReviewPhase::Accepted | ReviewPhase::Declined) {
            info!(
                "Comment by {} leaves {} {}",
                author.mention(),
                id,
                decision.phase
            );
            return Ok(());
        }

        let Some(metadata) = self.metadata(ctx, state, summary, &submission).await? else {
            return Ok(());
        };
        let cached = state.cache.invited(id).to_vec();
        let busy = HashSet::new();
        let result = advance(&AdvanceInput {
            submission: id,
            supervisor: submission.supervisor.as_ref(),
            metadata: &metadata,
            decision: &decision,
            cached_invites: &cached,
            roster: &state.roster,
            busy: &busy,
            in_progress_label: &self.config.in_progress_label,
            now,
        })
        .map_err(InvocationError::RosterIntegrity)?;
        if result.invites() {
            summary.invitations += 1;
        }
        self.execute(ctx, state, summary, result.effects).await
    }

    async fn supervisor(
        &self,
        ctx: &InterpreterContext<'_>,
        state: &mut RunState,
        summary: &mut RunSummary,
        id: SubmissionId,
        submitter: &Handle,
    ) -> Result<(), InvocationError> {
        let picked = pick_supervisor(&self.config.supervisors, submitter, &mut rand::rng());
        let Some(supervisor) = picked else {
            warn!(
                "No supervisor other than {} is available for {}",
                submitter.mention(),
                id
            );
            return Ok(());
        };
        info!("Assigning supervisor {} to {}", supervisor.mention(), id);
        let effects = plan_supervisor(id, &supervisor, &self.config.governance_label);
        self.execute(ctx, state, summary, effects).await
    }

    async fn merged(
        &self,
        ctx: &InterpreterContext<'_>,
        state: &mut RunState,
        summary: &mut RunSummary,
        id: SubmissionId,
        reviewer: &Handle,
        now: DateTime<Utc>,
    ) -> Result<(), InvocationError> {
        let submission = self.fetch(id).await?;
        summary.examined += 1;
        if !submission.merged {
            warn!("{} is not merged; finalizing it anyway", id);
        }

        let Some(metadata) = self.metadata(ctx, state, summary, &submission).await? else {
            return Ok(());
        };
        let history = match parse_history(&submission.newest_first()) {
            Ok(history) => history,
            Err(err) => {
                return self
                    .report(ctx, state, summary, &submission, err.to_string())
                    .await;
            }
        };

        if let Some(problem) = completion_mismatch(&history, reviewer, now) {
            warn!("Finalizing {} anyway: {}", id, problem);
        }

        let mut invited = history.previously_invited();
        for handle in state.cache.invited(id) {
            if !invited.contains(handle) {
                invited.push(handle.clone());
            }
        }

        let result = complete(&CompletionInput {
            submission: id,
            reviewer,
            metadata: &metadata,
            invited: &invited,
            roster: &state.roster,
            in_progress_label: &self.config.in_progress_label,
            date: now.date_naive(),
        })
        .map_err(InvocationError::RosterIntegrity)?;
        self.execute(ctx, state, summary, result.effects).await
    }

    /// Write everything back. Runs only after every effect succeeded.
    fn commit(
        &self,
        roster_file: &RosterFile,
        ledger: &Ledger,
        state: &RunState,
    ) -> Result<(), InvocationError> {
        if self.dry_run {
            info!("[dry-run] Leaving roster, ledger and invite cache untouched");
            return Ok(());
        }
        if state.roster.is_dirty() {
            roster_file
                .save(&state.roster)
                .map_err(StorageError::from)?;
        }
        ledger.append(&state.ledger).map_err(StorageError::from)?;
        if let Err(err) = state.cache.save() {
            warn!("Failed to save invite cache: {:#}", err);
        }
        Ok(())
    }
}
