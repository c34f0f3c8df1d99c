//! In-memory [`Platform`] for tests and local dry runs.
//!
//! Every call is recorded, and writes are applied to the stored submissions
//! so that a second invocation sees what the first one posted.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ear_bot_core::{Handle, Submission, SubmissionId, TimelineComment};

use crate::platform::Platform;

/// A write made against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    PostComment {
        submission: SubmissionId,
        body: String,
    },
    AddLabel {
        submission: SubmissionId,
        label: String,
    },
    RemoveLabel {
        submission: SubmissionId,
        label: String,
    },
    RequestReview {
        submission: SubmissionId,
        reviewer: Handle,
    },
    Assign {
        submission: SubmissionId,
        assignee: Handle,
    },
}

#[derive(Debug)]
struct FakeState {
    submissions: BTreeMap<SubmissionId, Submission>,
    calls: Vec<PlatformCall>,
    now: DateTime<Utc>,
    fail_writes: bool,
}

#[derive(Debug)]
pub struct FakePlatform {
    bot_login: Handle,
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            bot_login: Handle::from("ear-bot"),
            state: Mutex::new(FakeState {
                submissions: BTreeMap::new(),
                calls: Vec::new(),
                now,
                fail_writes: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, submission: Submission) {
        self.lock().submissions.insert(submission.id, submission);
    }

    /// Clock used to timestamp comments posted from now on.
    pub fn set_now(&self, now: DateTime<Utc>) {
        self.lock().now = now;
    }

    /// Add a human comment at the current fake time.
    pub fn add_comment(&self, id: SubmissionId, author: &str, body: &str) {
        let mut state = self.lock();
        let now = state.now;
        if let Some(submission) = state.submissions.get_mut(&id) {
            submission.timeline.push(TimelineComment {
                author: Handle::from(author),
                body: body.to_string(),
                created_at: now,
                from_controller: false,
            });
        }
    }

    pub fn merge(&self, id: SubmissionId) {
        if let Some(submission) = self.lock().submissions.get_mut(&id) {
            submission.merged = true;
        }
    }

    /// Make every write fail from now on.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    /// Drain the recorded calls.
    pub fn take_calls(&self) -> Vec<PlatformCall> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn get(&self, id: SubmissionId) -> Option<Submission> {
        self.lock().submissions.get(&id).cloned()
    }

    /// Bodies of the comments the bot posted, in order.
    pub fn posted_comments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::PostComment { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }

    fn write<F>(&self, id: SubmissionId, call: PlatformCall, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Submission, DateTime<Utc>),
    {
        let mut state = self.lock();
        if state.fail_writes {
            return Err(anyhow!("fake platform rejected {:?}", call));
        }
        let now = state.now;
        let submission = state
            .submissions
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no submission {}", id))?;
        apply(submission, now);
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn open_submissions(&self) -> Result<Vec<SubmissionId>> {
        Ok(self
            .lock()
            .submissions
            .values()
            .filter(|submission| !submission.merged)
            .map(|submission| submission.id)
            .collect())
    }

    async fn submission(&self, id: SubmissionId) -> Result<Submission> {
        self.get(id).ok_or_else(|| anyhow!("no submission {}", id))
    }

    async fn post_comment(&self, id: SubmissionId, body: &str) -> Result<()> {
        let author = self.bot_login.clone();
        let call = PlatformCall::PostComment {
            submission: id,
            body: body.to_string(),
        };
        self.write(id, call, |submission, now| {
            submission.timeline.push(TimelineComment {
                author,
                body: body.to_string(),
                created_at: now,
                from_controller: true,
            });
        })
    }

    async fn add_label(&self, id: SubmissionId, label: &str) -> Result<()> {
        let call = PlatformCall::AddLabel {
            submission: id,
            label: label.to_string(),
        };
        self.write(id, call, |submission, _| {
            if !submission.has_label(label) {
                submission.labels.push(label.to_string());
            }
        })
    }

    async fn remove_label(&self, id: SubmissionId, label: &str) -> Result<()> {
        let call = PlatformCall::RemoveLabel {
            submission: id,
            label: label.to_string(),
        };
        self.write(id, call, |submission, _| {
            submission.labels.retain(|l| !l.eq_ignore_ascii_case(label));
        })
    }

    async fn request_review(&self, id: SubmissionId, reviewer: &Handle) -> Result<()> {
        let call = PlatformCall::RequestReview {
            submission: id,
            reviewer: reviewer.clone(),
        };
        self.write(id, call, |submission, _| {
            if !submission.requested_reviewers.contains(reviewer) {
                submission.requested_reviewers.push(reviewer.clone());
            }
        })
    }

    async fn assign(&self, id: SubmissionId, assignee: &Handle) -> Result<()> {
        let call = PlatformCall::Assign {
            submission: id,
            assignee: assignee.clone(),
        };
        self.write(id, call, |submission, _| {
            submission.supervisor.get_or_insert_with(|| assignee.clone());
        })
    }
}
