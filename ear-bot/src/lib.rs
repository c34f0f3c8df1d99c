//! Reviewer assignment bot for assembly review pull requests.
//!
//! Each invocation loads the reviewer roster, rebuilds the review phase of
//! every relevant submission from its comment thread, executes the resulting
//! effects against the collaboration platform and finally writes the roster,
//! ledger and invite cache back in one step.

pub mod cache;
pub mod config;
pub mod controller;
pub mod fake;
pub mod github;
pub mod http_log;
pub mod platform;
pub mod state_machine;

pub use cache::InviteCache;
pub use config::Config;
pub use controller::{Controller, InvocationError, Mode, RunSummary};
pub use github::GitHubClient;
pub use platform::Platform;

/// Version string stamped into the footer of every comment the bot posts.
pub fn get_bot_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
