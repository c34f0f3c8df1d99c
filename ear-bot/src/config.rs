use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;

use ear_bot_core::Handle;

pub const DEFAULT_ROSTER_PATH: &str = "reviewers.tsv";
pub const DEFAULT_LEDGER_PATH: &str = "completed_reviews.csv";
pub const DEFAULT_GOVERNANCE_LABEL: &str = "ERGA-BGE";
pub const DEFAULT_IN_PROGRESS_LABEL: &str = "under review";

#[derive(Clone, Debug)]
pub struct Config {
    pub github_token: String,
    pub repo_owner: String,
    pub repo_name: String,
    pub roster_path: PathBuf,
    pub ledger_path: PathBuf,
    /// Invite cache file. Caching is disabled when unset.
    pub invite_cache_path: Option<PathBuf>,
    /// Candidates for initial triage. Only needed by `supervisor` runs.
    pub supervisors: Vec<Handle>,
    /// Label a submission must carry to be considered at all.
    pub governance_label: String,
    /// Label applied once a reviewer accepted.
    pub in_progress_label: String,
    /// Login the bot posts as. When unset, any account of type `Bot` counts
    /// as the bot.
    pub bot_login: Option<Handle>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let github_token = parse_optional(lookup("GITHUB_TOKEN"))
            .context("GITHUB_TOKEN environment variable is required")?;

        let repository = parse_optional(lookup("GITHUB_REPOSITORY"))
            .context("GITHUB_REPOSITORY environment variable is required")?;
        let (repo_owner, repo_name) = parse_repository(&repository)
            .context("GITHUB_REPOSITORY must have the form owner/name")?;

        let roster_path = parse_optional(lookup("ROSTER_PATH"))
            .unwrap_or_else(|| DEFAULT_ROSTER_PATH.to_string())
            .into();
        let ledger_path = parse_optional(lookup("LEDGER_PATH"))
            .unwrap_or_else(|| DEFAULT_LEDGER_PATH.to_string())
            .into();
        let invite_cache_path = parse_optional(lookup("INVITE_CACHE_PATH")).map(PathBuf::from);

        let supervisors = parse_supervisors(lookup("SUPERVISORS").as_deref());

        let governance_label = parse_optional(lookup("GOVERNANCE_LABEL"))
            .unwrap_or_else(|| DEFAULT_GOVERNANCE_LABEL.to_string());
        let in_progress_label = parse_optional(lookup("IN_PROGRESS_LABEL"))
            .unwrap_or_else(|| DEFAULT_IN_PROGRESS_LABEL.to_string());

        let bot_login = parse_optional(lookup("BOT_LOGIN")).map(Handle::new);

        Ok(Config {
            github_token,
            repo_owner,
            repo_name,
            roster_path,
            ledger_path,
            invite_cache_path,
            supervisors,
            governance_label,
            in_progress_label,
            bot_login,
        })
    }
}

/// Returns None if the value is missing, empty, or contains only whitespace.
pub fn parse_optional(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Split `owner/name`.
pub fn parse_repository(value: &str) -> Result<(String, String)> {
    let (owner, name) = value
        .trim()
        .split_once('/')
        .ok_or_else(|| anyhow!("missing '/' in repository {:?}", value))?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return Err(anyhow!("invalid repository {:?}", value));
    }
    Ok((owner.to_string(), name.to_string()))
}

/// Comma-separated handles; blanks are dropped.
pub fn parse_supervisors(value: Option<&str>) -> Vec<Handle> {
    value
        .unwrap_or_default()
        .split(',')
        .map(Handle::new)
        .filter(|handle| !handle.is_empty())
        .collect()
}
