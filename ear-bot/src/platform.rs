//! The collaboration platform seam.
//!
//! Everything the controller needs from the hosting service goes through
//! [`Platform`], so invocations can run against GitHub or an in-memory fake.

use anyhow::Result;
use async_trait::async_trait;

use ear_bot_core::{Handle, Submission, SubmissionId};

#[async_trait]
pub trait Platform: Send + Sync {
    /// Ids of every open submission.
    async fn open_submissions(&self) -> Result<Vec<SubmissionId>>;

    /// Full view of one submission, comment timeline included.
    async fn submission(&self, id: SubmissionId) -> Result<Submission>;

    async fn post_comment(&self, id: SubmissionId, body: &str) -> Result<()>;

    async fn add_label(&self, id: SubmissionId, label: &str) -> Result<()>;

    /// Removing a label that is not present succeeds.
    async fn remove_label(&self, id: SubmissionId, label: &str) -> Result<()>;

    /// Formally request a review from `reviewer`.
    async fn request_review(&self, id: SubmissionId, reviewer: &Handle) -> Result<()>;

    async fn assign(&self, id: SubmissionId, assignee: &Handle) -> Result<()>;
}
