//! End-to-end invocations against the in-memory platform.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use ear_bot::fake::{FakePlatform, PlatformCall};
use ear_bot::{Config, Controller, InvocationError, Mode};
use ear_bot_core::history::{
    ACCEPTED_MARKER, DECLINE_ACK_MARKER, INVITE_MARKER, TIMEOUT_MARKER,
};
use ear_bot_core::{Handle, Submission, SubmissionId, TimelineComment};

const HEADER: &str = "Handle\tFullName\tInstitution\tBusy\tCallingScore\tTotalReviews\tLastReview";
const ALICE: &str = "alice\tAlice Example\tSanger\tN\t0\t2\t2023-11-02";
const BOB: &str = "bob\tBob Example\tEMBL\tN\t1\t0\t";
const CAROL: &str = "carol\tCarol Example\tCNAG\tN\t0\t1\t";
const DAVE: &str = "dave\tDave Example\tCNAG\tN\t3\t0\t";

struct Env {
    dir: TempDir,
    platform: Arc<FakePlatform>,
    config: Config,
}

impl Env {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("reviewers.tsv"),
            format!("{}\n{}\n{}\n{}\n{}\n", HEADER, ALICE, BOB, CAROL, DAVE),
        )
        .unwrap();
        fs::write(dir.path().join("completed_reviews.csv"), "").unwrap();
        let config = config(dir.path());
        Self {
            dir,
            platform: Arc::new(FakePlatform::new(t0())),
            config,
        }
    }

    fn controller(&self) -> Controller {
        Controller::new(self.platform.clone(), self.config.clone())
    }

    async fn run(&self, mode: Mode, now: DateTime<Utc>) -> ear_bot::RunSummary {
        self.platform.set_now(now);
        self.controller().run(mode, now).await.unwrap()
    }

    fn roster(&self) -> String {
        fs::read_to_string(&self.config.roster_path).unwrap()
    }

    fn ledger(&self) -> String {
        fs::read_to_string(&self.config.ledger_path).unwrap()
    }

    fn posted(&self) -> Vec<String> {
        self.platform
            .take_calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::PostComment { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }
}

fn config(dir: &Path) -> Config {
    Config {
        github_token: "unused".to_string(),
        repo_owner: "ERGA-consortium".to_string(),
        repo_name: "EARs".to_string(),
        roster_path: dir.join("reviewers.tsv"),
        ledger_path: dir.join("completed_reviews.csv"),
        invite_cache_path: None,
        supervisors: vec![],
        governance_label: "ERGA-BGE".to_string(),
        in_progress_label: "under review".to_string(),
        bot_login: None,
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn submission(id: u64) -> Submission {
    Submission {
        id: SubmissionId(id),
        author: Handle::from("submitter"),
        description: "## Assembly\n\nInstitution: CNAG\nSpecies: Lynx pardinus\n".to_string(),
        labels: vec!["ERGA-BGE".to_string()],
        requested_reviewers: vec![],
        formal_reviews: 0,
        supervisor: Some(Handle::from("sup")),
        merged: false,
        timeline: vec![],
    }
}

fn invited_in(body: &str) -> bool {
    body.contains(INVITE_MARKER)
}

#[tokio::test]
async fn search_invites_best_candidate_and_is_idempotent() {
    let env = Env::new();
    env.platform.insert(submission(1));

    let summary = env.run(Mode::Search, t0()).await;
    assert_eq!(summary.invitations, 1);
    let posted = env.posted();
    assert_eq!(posted.len(), 1);
    assert!(invited_in(&posted[0]));
    assert!(posted[0].contains("@alice"));

    // Nothing changed on the thread: no new effects
    let summary = env.run(Mode::Search, t0() + Duration::days(3)).await;
    assert_eq!(summary.invitations, 0);
    assert!(env.platform.calls().is_empty());

    // Roster untouched by invitations
    assert_eq!(
        env.roster(),
        format!("{}\n{}\n{}\n{}\n{}\n", HEADER, ALICE, BOB, CAROL, DAVE)
    );
}

#[tokio::test]
async fn search_spreads_invitations_across_submissions() {
    let env = Env::new();
    env.platform.insert(submission(1));
    env.platform.insert(submission(2));

    env.run(Mode::Search, t0()).await;
    let posted = env.posted();
    assert_eq!(posted.len(), 2);
    assert!(posted[0].contains("@alice"));
    assert!(posted[1].contains("@bob"));
}

#[tokio::test]
async fn decline_acknowledges_then_invites_next_candidate() {
    let env = Env::new();
    env.platform.insert(submission(1));
    env.run(Mode::Search, t0()).await;
    env.posted();

    let reply_at = t0() + Duration::hours(5);
    env.platform.set_now(reply_at);
    env.platform
        .add_comment(SubmissionId(1), "alice", "No, sorry, I have no time");
    env.run(
        Mode::Comment {
            submission: SubmissionId(1),
            author: Handle::from("alice"),
            body: "No, sorry, I have no time".to_string(),
        },
        reply_at,
    )
    .await;

    let posted = env.posted();
    assert_eq!(posted.len(), 2);
    assert!(posted[0].contains(DECLINE_ACK_MARKER));
    assert!(posted[0].contains("@alice"));
    assert!(invited_in(&posted[1]));
    assert!(posted[1].contains("@bob"));

    // A later scan sees bob's invitation as current and does nothing
    env.run(Mode::Search, reply_at + Duration::hours(1)).await;
    assert!(env.platform.calls().is_empty());
}

#[tokio::test]
async fn comment_from_someone_else_is_ignored() {
    let env = Env::new();
    env.platform.insert(submission(1));
    env.run(Mode::Search, t0()).await;
    env.posted();

    let at = t0() + Duration::hours(1);
    env.platform.set_now(at);
    env.platform.add_comment(SubmissionId(1), "bob", "yes, I can do it");
    env.run(
        Mode::Comment {
            submission: SubmissionId(1),
            author: Handle::from("bob"),
            body: "yes, I can do it".to_string(),
        },
        at,
    )
    .await;
    assert!(env.platform.calls().is_empty());
}

#[tokio::test]
async fn timeouts_reinvite_and_eventually_wrap_around() {
    let env = Env::new();
    env.platform.insert(submission(1));
    env.run(Mode::Search, t0()).await;
    env.posted();

    // Exactly at the deadline the invitation is still open
    env.run(Mode::Search, t0() + Duration::days(7)).await;
    assert!(env.platform.calls().is_empty());

    let first_timeout = t0() + Duration::days(7) + Duration::seconds(1);
    env.run(Mode::Search, first_timeout).await;
    let posted = env.posted();
    assert_eq!(posted.len(), 2);
    assert!(posted[0].contains(TIMEOUT_MARKER));
    assert!(posted[0].contains("@alice"));
    assert!(posted[1].contains("@bob"));

    // Both eligible reviewers have now been tried; the pool starts over
    let second_timeout = first_timeout + Duration::days(8);
    env.run(Mode::Search, second_timeout).await;
    let posted = env.posted();
    assert_eq!(posted.len(), 2);
    assert!(posted[0].contains("@bob"));
    assert!(invited_in(&posted[1]));
    assert!(posted[1].contains("@alice"));
}

#[tokio::test]
async fn accept_then_merge_updates_roster_and_ledger() {
    let env = Env::new();
    env.platform.insert(submission(1));
    env.run(Mode::Search, t0()).await;
    env.platform.take_calls();

    let reply_at = t0() + Duration::days(1);
    env.platform.set_now(reply_at);
    env.platform.add_comment(SubmissionId(1), "alice", "Yes!");
    env.run(
        Mode::Comment {
            submission: SubmissionId(1),
            author: Handle::from("alice"),
            body: "Yes!".to_string(),
        },
        reply_at,
    )
    .await;

    let calls = env.platform.take_calls();
    assert_eq!(
        calls[0],
        PlatformCall::RequestReview {
            submission: SubmissionId(1),
            reviewer: Handle::from("alice"),
        }
    );
    assert_eq!(
        calls[1],
        PlatformCall::AddLabel {
            submission: SubmissionId(1),
            label: "under review".to_string(),
        }
    );
    match &calls[2] {
        PlatformCall::PostComment { body, .. } => {
            assert!(body.contains(ACCEPTED_MARKER));
            assert!(body.contains("@sup"));
        }
        other => panic!("unexpected call {:?}", other),
    }
    assert!(env
        .roster()
        .contains("alice\tAlice Example\tSanger\tY\t0\t2\t2023-11-02\n"));

    // A second scan does not confirm again
    env.run(Mode::Search, reply_at + Duration::hours(1)).await;
    assert!(env.platform.calls().is_empty());

    env.platform.merge(SubmissionId(1));
    let merged_at = Utc.with_ymd_and_hms(2024, 3, 20, 15, 0, 0).unwrap();
    env.run(
        Mode::Merged {
            submission: SubmissionId(1),
            reviewer: Handle::from("alice"),
        },
        merged_at,
    )
    .await;

    assert_eq!(
        env.platform.take_calls(),
        vec![PlatformCall::RemoveLabel {
            submission: SubmissionId(1),
            label: "under review".to_string(),
        }]
    );
    assert_eq!(env.ledger(), "Alice Example,Sanger,Lynx pardinus,1\n");
    assert_eq!(
        env.roster(),
        format!(
            "{}\n{}\n{}\n{}\n{}\n",
            HEADER,
            "alice\tAlice Example\tSanger\tN\t-1\t3\t2024-03-20",
            BOB,
            "carol\tCarol Example\tCNAG\tN\t1\t1\t",
            "dave\tDave Example\tCNAG\tN\t4\t0\t",
        )
    );
}

#[tokio::test]
async fn late_acceptance_after_timeout_notice_is_confirmed() {
    let env = Env::new();
    env.platform.insert(submission(1));
    env.run(Mode::Search, t0()).await;
    env.posted();

    // Everyone eligible is busy when the invitation expires
    let everyone_busy = format!(
        "{}\n{}\n{}\n{}\n{}\n",
        HEADER,
        ALICE.replace("\tN\t", "\tY\t"),
        BOB.replace("\tN\t", "\tY\t"),
        CAROL,
        DAVE
    );
    fs::write(&env.config.roster_path, &everyone_busy).unwrap();
    let timeout = t0() + Duration::days(8);
    let summary = env.run(Mode::Search, timeout).await;
    assert_eq!(summary.invitations, 0);
    let posted = env.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains(TIMEOUT_MARKER));

    // Alice frees up and answers the expired invitation
    fs::write(
        &env.config.roster_path,
        format!("{}\n{}\n{}\n{}\n{}\n", HEADER, ALICE, BOB, CAROL, DAVE),
    )
    .unwrap();
    let reply_at = timeout + Duration::hours(2);
    env.platform.set_now(reply_at);
    env.platform.add_comment(SubmissionId(1), "alice", "Yes, happy to");
    env.run(
        Mode::Comment {
            submission: SubmissionId(1),
            author: Handle::from("alice"),
            body: "Yes, happy to".to_string(),
        },
        reply_at,
    )
    .await;

    let calls = env.platform.take_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(
        calls[0],
        PlatformCall::RequestReview {
            submission: SubmissionId(1),
            reviewer: Handle::from("alice"),
        }
    );
    match &calls[2] {
        PlatformCall::PostComment { body, .. } => assert!(body.contains(ACCEPTED_MARKER)),
        other => panic!("unexpected call {:?}", other),
    }
    assert!(env
        .roster()
        .contains("alice\tAlice Example\tSanger\tY\t0\t2\t2023-11-02\n"));

    // The confirmation is on the thread now, so a scan stays quiet
    env.run(Mode::Search, reply_at + Duration::hours(1)).await;
    assert!(env.platform.calls().is_empty());
}

#[tokio::test]
async fn broken_invitation_is_reported_without_stopping_the_batch() {
    let env = Env::new();
    let mut broken = submission(1);
    broken.timeline.push(TimelineComment {
        author: Handle::from("ear-bot"),
        body: format!("{} 2024-02-20 10:00:00 UTC", INVITE_MARKER),
        created_at: t0() - Duration::days(2),
        from_controller: true,
    });
    env.platform.insert(broken);
    env.platform.insert(submission(2));

    let summary = env.run(Mode::Search, t0()).await;
    assert_eq!(summary.diagnostics, 1);
    assert_eq!(summary.invitations, 1);

    let calls = env.platform.take_calls();
    assert!(matches!(
        &calls[0],
        PlatformCall::PostComment { submission, body }
            if *submission == SubmissionId(1) && body.contains("does not mention a reviewer")
    ));
    assert!(matches!(
        &calls[1],
        PlatformCall::PostComment { submission, body }
            if *submission == SubmissionId(2) && body.contains("@alice")
    ));
}

#[tokio::test]
async fn skipped_submissions_produce_no_effects() {
    let env = Env::new();
    let mut unlabeled = submission(1);
    unlabeled.labels.clear();
    let mut reviewed = submission(2);
    reviewed.formal_reviews = 1;
    let mut crowded = submission(3);
    crowded.requested_reviewers = vec![Handle::from("x"), Handle::from("y")];
    env.platform.insert(unlabeled);
    env.platform.insert(reviewed);
    env.platform.insert(crowded);

    let summary = env.run(Mode::Search, t0()).await;
    assert_eq!(summary.examined, 3);
    assert_eq!(summary.skipped, 3);
    assert!(env.platform.calls().is_empty());
}

#[tokio::test]
async fn invite_cache_widens_exclusions_and_is_saved() {
    let mut env = Env::new();
    let cache_path = env.dir.path().join("invites.json");
    fs::write(
        &cache_path,
        r#"{"1": {"date": "2024-02-01T00:00:00Z", "requested_reviewers": ["alice"]},
            "99": {"date": "2024-01-01T00:00:00Z", "requested_reviewers": ["bob"]}}"#,
    )
    .unwrap();
    env.config.invite_cache_path = Some(cache_path.clone());
    env.platform.insert(submission(1));

    env.run(Mode::Search, t0()).await;
    let posted = env.posted();
    assert!(posted[0].contains("@bob"));

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&cache_path).unwrap()).unwrap();
    assert!(saved.get("99").is_none());
    assert_eq!(
        saved["1"]["requested_reviewers"],
        serde_json::json!(["alice", "bob"])
    );
}

#[tokio::test]
async fn supervisor_mode_assigns_someone_other_than_the_submitter() {
    let mut env = Env::new();
    env.config.supervisors = vec![Handle::from("submitter"), Handle::from("sup")];
    env.platform.insert(submission(4));

    env.run(
        Mode::Supervisor {
            submission: SubmissionId(4),
            submitter: Handle::from("submitter"),
        },
        t0(),
    )
    .await;

    let calls = env.platform.take_calls();
    assert_eq!(
        calls[..3],
        [
            PlatformCall::Assign {
                submission: SubmissionId(4),
                assignee: Handle::from("sup"),
            },
            PlatformCall::AddLabel {
                submission: SubmissionId(4),
                label: "ERGA-BGE".to_string(),
            },
            PlatformCall::RequestReview {
                submission: SubmissionId(4),
                reviewer: Handle::from("sup"),
            },
        ]
    );
    assert!(matches!(&calls[3], PlatformCall::PostComment { body, .. } if body.contains("@sup")));
    // Triage never touches scores
    assert_eq!(
        env.roster(),
        format!("{}\n{}\n{}\n{}\n{}\n", HEADER, ALICE, BOB, CAROL, DAVE)
    );
}

#[tokio::test]
async fn missing_ledger_is_fatal_before_any_effect() {
    let env = Env::new();
    fs::remove_file(&env.config.ledger_path).unwrap();
    env.platform.insert(submission(1));

    let err = env.controller().run(Mode::Search, t0()).await.unwrap_err();
    assert!(matches!(err, InvocationError::Config(_)));
    assert!(env.platform.calls().is_empty());
}
