use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use ear_bot_core::{Handle, Submission, SubmissionId, TimelineComment};

use crate::config::Config;
use crate::http_log::LoggingMiddleware;
use crate::platform::Platform;

const GITHUB_API_URL: &str = "https://api.github.com";

/// Max page size for list endpoints.
const PER_PAGE: usize = 100;

/// GitHub REST implementation of [`Platform`] for one repository.
#[derive(Clone)]
pub struct GitHubClient {
    client: ClientWithMiddleware,
    token: String,
    repo_owner: String,
    repo_name: String,
    bot_login: Option<Handle>,
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest<'a> {
    labels: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct RequestReviewersRequest<'a> {
    reviewers: [&'a str; 1],
}

#[derive(Debug, Serialize)]
struct AddAssigneesRequest<'a> {
    assignees: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
pub struct UserResponse {
    pub login: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelResponse {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestSummary {
    number: u64,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestResponse {
    pub number: u64,
    pub user: UserResponse,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<LabelResponse>,
    #[serde(default)]
    pub requested_reviewers: Vec<UserResponse>,
    #[serde(default)]
    pub assignees: Vec<UserResponse>,
    #[serde(default)]
    pub merged: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReviewResponse {
    pub state: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentResponse {
    pub body: Option<String>,
    pub user: UserResponse,
    pub created_at: DateTime<Utc>,
}

fn create_github_client() -> Result<ClientWithMiddleware> {
    let base_client = reqwest::Client::builder()
        .user_agent(concat!("ear-bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    Ok(ClientBuilder::new(base_client)
        .with(LoggingMiddleware)
        .build())
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: create_github_client()?,
            token: config.github_token.clone(),
            repo_owner: config.repo_owner.clone(),
            repo_name: config.repo_name.clone(),
            bot_login: config.bot_login.clone(),
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            GITHUB_API_URL, self.repo_owner, self.repo_name, path
        )
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let response = self
            .authorized(self.client.get(self.repo_url(path)))
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;
        let response = check_status(response, what).await?;
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    /// Fetch every page of a list endpoint.
    async fn get_paginated<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut page = 1;
        let separator = if path.contains('?') { '&' } else { '?' };

        loop {
            let page_path = format!("{}{}page={}&per_page={}", path, separator, page, PER_PAGE);
            let items: Vec<T> = self.get_json(&page_path, what).await?;
            let items_count = items.len();
            all_items.extend(items);

            // Fewer items than per_page means this was the last page
            if items_count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all_items)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B, what: &str) -> Result<()> {
        let response = self
            .authorized(self.client.post(self.repo_url(path)))
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(body)?)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", what))?;
        check_status(response, what).await?;
        Ok(())
    }

    pub async fn get_comments(&self, id: SubmissionId) -> Result<Vec<CommentResponse>> {
        let comments: Vec<CommentResponse> = self
            .get_paginated(&format!("issues/{}/comments", id.0), "comments")
            .await?;
        info!("Found {} total comments on {}", comments.len(), id);
        Ok(comments)
    }
}

#[async_trait]
impl Platform for GitHubClient {
    async fn open_submissions(&self) -> Result<Vec<SubmissionId>> {
        info!(
            "Listing open pull requests in {}/{}",
            self.repo_owner, self.repo_name
        );
        let pulls: Vec<PullRequestSummary> = self
            .get_paginated("pulls?state=open", "open pull requests")
            .await?;
        Ok(pulls.into_iter().map(|pr| SubmissionId(pr.number)).collect())
    }

    async fn submission(&self, id: SubmissionId) -> Result<Submission> {
        let pr: PullRequestResponse = self
            .get_json(&format!("pulls/{}", id.0), "pull request")
            .await?;
        let reviews: Vec<ReviewResponse> = self
            .get_paginated(&format!("pulls/{}/reviews", id.0), "reviews")
            .await?;
        let comments = self.get_comments(id).await?;
        Ok(into_submission(pr, &reviews, comments, self.bot_login.as_ref()))
    }

    async fn post_comment(&self, id: SubmissionId, body: &str) -> Result<()> {
        info!("Posting comment to {}", id);
        self.post_json(
            &format!("issues/{}/comments", id.0),
            &CreateCommentRequest { body },
            "comment",
        )
        .await
    }

    async fn add_label(&self, id: SubmissionId, label: &str) -> Result<()> {
        info!("Adding label {:?} to {}", label, id);
        self.post_json(
            &format!("issues/{}/labels", id.0),
            &AddLabelsRequest { labels: [label] },
            "add label",
        )
        .await
    }

    async fn remove_label(&self, id: SubmissionId, label: &str) -> Result<()> {
        info!("Removing label {:?} from {}", label, id);
        let url = self.repo_url(&format!("issues/{}/labels/{}", id.0, label));
        let response = self
            .authorized(self.client.delete(&url))
            .send()
            .await
            .context("Failed to send remove label request")?;
        if response.status() == StatusCode::NOT_FOUND {
            info!("Label {:?} was not present on {}", label, id);
            return Ok(());
        }
        check_status(response, "remove label").await?;
        Ok(())
    }

    async fn request_review(&self, id: SubmissionId, reviewer: &Handle) -> Result<()> {
        info!("Requesting review from {} on {}", reviewer.mention(), id);
        self.post_json(
            &format!("pulls/{}/requested_reviewers", id.0),
            &RequestReviewersRequest {
                reviewers: [reviewer.as_str()],
            },
            "request review",
        )
        .await
    }

    async fn assign(&self, id: SubmissionId, assignee: &Handle) -> Result<()> {
        info!("Assigning {} to {}", assignee.mention(), id);
        self.post_json(
            &format!("issues/{}/assignees", id.0),
            &AddAssigneesRequest {
                assignees: [assignee.as_str()],
            },
            "assign",
        )
        .await
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();
    error!("GitHub API error ({}): {} - {}", what, status, error_text);
    Err(anyhow!(
        "GitHub API error ({}): {} - {}",
        what,
        status,
        error_text
    ))
}

/// True when `user` is the account the bot posts as.
pub fn is_controller(user: &UserResponse, bot_login: Option<&Handle>) -> bool {
    match bot_login {
        Some(login) => Handle::new(user.login.as_str()) == *login,
        None => user.kind == "Bot",
    }
}

/// Assemble a [`Submission`] from raw API responses.
pub fn into_submission(
    pr: PullRequestResponse,
    reviews: &[ReviewResponse],
    comments: Vec<CommentResponse>,
    bot_login: Option<&Handle>,
) -> Submission {
    let timeline = comments
        .into_iter()
        .map(|comment| TimelineComment {
            from_controller: is_controller(&comment.user, bot_login),
            author: Handle::new(comment.user.login),
            body: comment.body.unwrap_or_default(),
            created_at: comment.created_at,
        })
        .collect();

    Submission {
        id: SubmissionId(pr.number),
        author: Handle::new(pr.user.login),
        description: pr.body.unwrap_or_default(),
        labels: pr.labels.into_iter().map(|label| label.name).collect(),
        requested_reviewers: pr
            .requested_reviewers
            .into_iter()
            .map(|user| Handle::new(user.login))
            .collect(),
        formal_reviews: reviews
            .iter()
            .filter(|review| review.state != "PENDING")
            .count(),
        supervisor: pr
            .assignees
            .into_iter()
            .next()
            .map(|user| Handle::new(user.login)),
        merged: pr.merged,
        timeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(login: &str, kind: &str) -> UserResponse {
        UserResponse {
            login: login.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn test_is_controller_by_type() {
        assert!(is_controller(&user("github-actions[bot]", "Bot"), None));
        assert!(!is_controller(&user("alice", "User"), None));
    }

    #[test]
    fn test_is_controller_by_login() {
        let login = Handle::from("ear-bot");
        assert!(is_controller(&user("EAR-bot", "User"), Some(&login)));
        assert!(!is_controller(&user("github-actions[bot]", "Bot"), Some(&login)));
    }

    #[test]
    fn test_pull_request_deserializes() {
        let json = r#"{
            "number": 12,
            "user": {"login": "submitter", "type": "User"},
            "body": null,
            "labels": [{"name": "ERGA-BGE"}],
            "requested_reviewers": [{"login": "rev"}],
            "assignees": [],
            "merged": false,
            "title": "ignored"
        }"#;
        let pr: PullRequestResponse = serde_json::from_str(json).unwrap();
        assert_eq!(pr.number, 12);
        assert_eq!(pr.requested_reviewers[0].login, "rev");
        assert!(pr.body.is_none());
    }

    #[test]
    fn test_into_submission() {
        let pr = PullRequestResponse {
            number: 7,
            user: user("submitter", "User"),
            body: Some("Institution: CNAG".to_string()),
            labels: vec![LabelResponse {
                name: "ERGA-BGE".to_string(),
            }],
            requested_reviewers: vec![],
            assignees: vec![user("sup", "User"), user("other", "User")],
            merged: false,
        };
        let reviews = vec![
            ReviewResponse {
                state: "PENDING".to_string(),
            },
            ReviewResponse {
                state: "APPROVED".to_string(),
            },
        ];
        let comments: Vec<CommentResponse> = serde_json::from_str(
            r#"[
                {"body": "invite", "user": {"login": "github-actions[bot]", "type": "Bot"}, "created_at": "2024-03-01T10:00:00Z"},
                {"body": "Yes", "user": {"login": "rev", "type": "User"}, "created_at": "2024-03-02T10:00:00Z"}
            ]"#,
        )
        .unwrap();

        let submission = into_submission(pr, &reviews, comments, None);
        assert_eq!(submission.id, SubmissionId(7));
        assert_eq!(submission.formal_reviews, 1);
        assert_eq!(submission.supervisor, Some(Handle::from("sup")));
        assert!(submission.has_label("erga-bge"));
        assert_eq!(submission.timeline.len(), 2);
        assert!(submission.timeline[0].from_controller);
        assert!(!submission.timeline[1].from_controller);
        assert_eq!(submission.timeline[1].author, Handle::from("rev"));
    }
}
