//! Invite cache.
//!
//! A JSON file remembering who was invited on each open submission. It only
//! ever widens the exclusion list used for selection; the comment timeline
//! stays authoritative for the review phase. A missing or corrupt file is
//! treated as empty.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ear_bot_core::{Handle, SubmissionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Time of the most recent invitation.
    pub date: DateTime<Utc>,
    pub requested_reviewers: Vec<Handle>,
}

#[derive(Debug, Clone, Default)]
pub struct InviteCache {
    path: Option<PathBuf>,
    entries: BTreeMap<u64, CacheEntry>,
    dirty: bool,
}

impl InviteCache {
    /// A cache that is never read from or written to disk.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Load the cache at `path`, falling back to an empty cache on any error.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "Ignoring invite cache {}: {:#}",
                    path.display(),
                    err
                );
                BTreeMap::new()
            }
        };
        Self {
            path: Some(path),
            entries,
            dirty: false,
        }
    }

    pub fn invited(&self, id: SubmissionId) -> &[Handle] {
        self.entries
            .get(&id.0)
            .map(|entry| entry.requested_reviewers.as_slice())
            .unwrap_or_default()
    }

    pub fn entry(&self, id: SubmissionId) -> Option<&CacheEntry> {
        self.entries.get(&id.0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remember that `reviewer` was invited on `id` at `at`.
    pub fn record_invite(&mut self, id: SubmissionId, reviewer: &Handle, at: DateTime<Utc>) {
        let entry = self.entries.entry(id.0).or_insert_with(|| CacheEntry {
            date: at,
            requested_reviewers: Vec::new(),
        });
        entry.date = at;
        if !entry.requested_reviewers.contains(reviewer) {
            entry.requested_reviewers.push(reviewer.clone());
        }
        self.dirty = true;
    }

    /// Drop entries for submissions that are no longer open.
    pub fn retain_open(&mut self, open: &[SubmissionId]) {
        let open: HashSet<u64> = open.iter().map(|id| id.0).collect();
        let before = self.entries.len();
        self.entries.retain(|id, _| open.contains(id));
        if self.entries.len() != before {
            info!(
                "Pruned {} closed submission(s) from invite cache",
                before - self.entries.len()
            );
            self.dirty = true;
        }
    }

    /// Write the cache back if it changed. A disabled cache is never written.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize invite cache")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write invite cache {}", path.display()))?;
        info!("Saved invite cache with {} entries", self.entries.len());
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<u64, CacheEntry>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let text = fs::read_to_string(path).context("Failed to read invite cache")?;
    if text.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&text).context("Failed to parse invite cache")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = InviteCache::load(dir.path().join("cache.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{not json").unwrap();
        let cache = InviteCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = InviteCache::load(&path);
        cache.record_invite(SubmissionId(4), &Handle::from("alice"), at(1));
        cache.record_invite(SubmissionId(4), &Handle::from("bob"), at(3));
        cache.record_invite(SubmissionId(4), &Handle::from("Alice"), at(5));
        cache.save().unwrap();

        let reloaded = InviteCache::load(&path);
        assert_eq!(
            reloaded.invited(SubmissionId(4)),
            &[Handle::from("alice"), Handle::from("bob")]
        );
        assert_eq!(reloaded.entry(SubmissionId(4)).unwrap().date, at(5));
        assert!(reloaded.invited(SubmissionId(5)).is_empty());
    }

    #[test]
    fn test_reads_artifact_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(
            &path,
            r#"{"12": {"date": "2024-03-01T12:00:00Z", "requested_reviewers": ["alice"]}}"#,
        )
        .unwrap();
        let cache = InviteCache::load(&path);
        assert_eq!(cache.invited(SubmissionId(12)), &[Handle::from("alice")]);
    }

    #[test]
    fn test_retain_open_prunes() {
        let mut cache = InviteCache::disabled();
        cache.record_invite(SubmissionId(1), &Handle::from("a"), at(1));
        cache.record_invite(SubmissionId(2), &Handle::from("b"), at(1));
        cache.retain_open(&[SubmissionId(2), SubmissionId(3)]);
        assert_eq!(cache.len(), 1);
        assert!(cache.invited(SubmissionId(1)).is_empty());
    }

    #[test]
    fn test_unchanged_cache_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        InviteCache::load(&path).save().unwrap();
        assert!(!path.exists());
    }
}
