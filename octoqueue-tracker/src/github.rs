//! GitHub REST API implementation of [`IssueTracker`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::error::TrackerError;
use crate::tracker::IssueTracker;
use crate::types::{
    Issue, IssueNumber, IssueQuery, IssueState, Label, LabelEvent, LabelEventKind, NewIssue,
};

const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
/// GitHub's maximum page size.
const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: IssueState,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    created_at: DateTime<Utc>,
    /// Present when the "issue" is actually a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<GitHubIssue> for Issue {
    fn from(raw: GitHubIssue) -> Self {
        Self {
            number: raw.number,
            title: raw.title,
            body: raw.body,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            state: raw.state,
            created_at: raw.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
    #[serde(default)]
    color: String,
}

#[derive(Debug, Deserialize)]
struct GitHubEvent {
    event: String,
    #[serde(default)]
    label: Option<GitHubLabel>,
    created_at: DateTime<Utc>,
}

/// Issue tracker backed by one GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubTracker {
    client: Client,
    api_url: Url,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl GitHubTracker {
    /// Tracker for `owner/name` on github.com.
    pub fn new(repository: &str, token: Option<String>) -> Result<Self, TrackerError> {
        Self::with_api_url(repository, token, DEFAULT_API_URL)
    }

    /// Tracker for `owner/name` against a specific API root (GitHub Enterprise, test servers).
    pub fn with_api_url(
        repository: &str,
        token: Option<String>,
        api_url: &str,
    ) -> Result<Self, TrackerError> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| {
                TrackerError::Parse(format!("repository must be owner/name: {repository}"))
            })?;
        let api_url = Url::parse(api_url)
            .map_err(|e| TrackerError::Parse(format!("invalid API url {api_url}: {e}")))?;
        let client = Client::builder()
            .user_agent(concat!("octoqueue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TrackerError::Network(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            owner: owner.to_string(),
            repo: repo.to_string(),
            token,
        })
    }

    /// Build `{api}/repos/{owner}/{repo}/{segments...}` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TrackerError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| TrackerError::Parse(format!("API url cannot be a base: {}", self.api_url)))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, TrackerError> {
        let response = builder.send().await.map_err(|e| {
            warn!("GitHub request failed: {}", e);
            TrackerError::Network(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let path = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(%path, "GitHub API returned 404");
            return Err(TrackerError::NotFound(path));
        }
        warn!("GitHub API returned error: {} - {}", status, body);
        Err(TrackerError::Api {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, TrackerError> {
        let response = self.send(builder).await?;
        response.json().await.map_err(|e| {
            warn!("Failed to parse GitHub response: {}", e);
            TrackerError::Parse(e.to_string())
        })
    }

    /// GET every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        params: &[(&str, String)],
    ) -> Result<Vec<T>, TrackerError> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let mut url = self.endpoint(segments)?;
            {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in params {
                    pairs.append_pair(key, value);
                }
                pairs.append_pair("per_page", &PER_PAGE.to_string());
                pairs.append_pair("page", &page.to_string());
            }

            let batch: Vec<T> = self.send_json(self.request(Method::GET, url)).await?;
            let len = batch.len();
            items.extend(batch);
            if len < PER_PAGE {
                return Ok(items);
            }
            page += 1;
        }
    }
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn create_issue(&self, issue: NewIssue) -> Result<Issue, TrackerError> {
        let url = self.endpoint(&["issues"])?;
        let raw: GitHubIssue = self
            .send_json(self.request(Method::POST, url).json(&json!({
                "title": issue.title,
                "body": issue.body,
                "labels": issue.labels,
            })))
            .await?;
        Ok(raw.into())
    }

    async fn list_issues(&self, query: &IssueQuery) -> Result<Vec<Issue>, TrackerError> {
        let mut params = vec![
            ("state", query.state.as_str().to_string()),
            ("sort", "created".to_string()),
            ("direction", "asc".to_string()),
        ];
        if !query.labels.is_empty() {
            params.push(("labels", query.labels.join(",")));
        }

        let raw: Vec<GitHubIssue> = self.get_all(&["issues"], &params).await?;
        Ok(raw
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .map(Issue::from)
            .collect())
    }

    async fn get_issue(&self, number: IssueNumber) -> Result<Issue, TrackerError> {
        let number = number.to_string();
        let url = self.endpoint(&["issues", &number])?;
        let raw: GitHubIssue = self.send_json(self.request(Method::GET, url)).await?;
        Ok(raw.into())
    }

    async fn add_labels(&self, number: IssueNumber, labels: &[String]) -> Result<(), TrackerError> {
        let number = number.to_string();
        let url = self.endpoint(&["issues", &number, "labels"])?;
        self.send(self.request(Method::POST, url).json(&json!({ "labels": labels })))
            .await?;
        Ok(())
    }

    async fn remove_label(&self, number: IssueNumber, label: &str) -> Result<(), TrackerError> {
        let number = number.to_string();
        let url = self.endpoint(&["issues", &number, "labels", label])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn set_state(&self, number: IssueNumber, state: IssueState) -> Result<(), TrackerError> {
        let number = number.to_string();
        let url = self.endpoint(&["issues", &number])?;
        self.send(self.request(Method::PATCH, url).json(&json!({ "state": state })))
            .await?;
        Ok(())
    }

    async fn create_comment(&self, number: IssueNumber, body: &str) -> Result<(), TrackerError> {
        let number = number.to_string();
        let url = self.endpoint(&["issues", &number, "comments"])?;
        self.send(self.request(Method::POST, url).json(&json!({ "body": body })))
            .await?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<Label>, TrackerError> {
        let raw: Vec<GitHubLabel> = self.get_all(&["labels"], &[]).await?;
        Ok(raw
            .into_iter()
            .map(|l| Label::new(l.name, l.color))
            .collect())
    }

    async fn create_label(&self, label: &Label) -> Result<(), TrackerError> {
        let url = self.endpoint(&["labels"])?;
        self.send(self.request(Method::POST, url).json(&json!({
            "name": label.name,
            "color": label.color,
        })))
        .await?;
        Ok(())
    }

    async fn list_label_events(
        &self,
        number: IssueNumber,
    ) -> Result<Vec<LabelEvent>, TrackerError> {
        let number = number.to_string();
        let raw: Vec<GitHubEvent> = self.get_all(&["issues", &number, "events"], &[]).await?;
        Ok(raw
            .into_iter()
            .filter_map(|e| {
                let kind = match e.event.as_str() {
                    "labeled" => LabelEventKind::Labeled,
                    "unlabeled" => LabelEventKind::Unlabeled,
                    _ => return None,
                };
                Some(LabelEvent {
                    kind,
                    label: e.label?.name,
                    created_at: e.created_at,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StateFilter;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn issue_json(number: u64, labels: &[&str]) -> serde_json::Value {
        json!({
            "number": number,
            "title": format!("Job {number}"),
            "body": "```json\n{}\n```",
            "state": "open",
            "labels": labels.iter().map(|l| json!({ "name": l, "color": "0dbf66" })).collect::<Vec<_>>(),
            "created_at": "2024-05-01T10:00:00Z",
        })
    }

    async fn tracker(server: &MockServer) -> GitHubTracker {
        GitHubTracker::with_api_url("owner/jobs", Some("t0ken".into()), &server.uri())
            .expect("tracker")
    }

    #[test]
    fn rejects_malformed_repository() {
        assert!(GitHubTracker::new("no-slash", None).is_err());
        assert!(GitHubTracker::new("a/b/c", None).is_err());
        assert!(GitHubTracker::new("/b", None).is_err());
    }

    #[test]
    fn label_segments_are_percent_encoded() {
        let tracker = GitHubTracker::new("owner/jobs", None).unwrap();
        let url = tracker
            .endpoint(&["issues", "7", "labels", "needs review"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/owner/jobs/issues/7/labels/needs%20review"
        );
    }

    #[tokio::test]
    async fn list_issues_sends_filters_and_skips_pull_requests() {
        let server = MockServer::start().await;
        let mut pr = issue_json(3, &["pending"]);
        pr["pull_request"] = json!({ "url": "https://example/pulls/3" });

        Mock::given(method("GET"))
            .and(path("/repos/owner/jobs/issues"))
            .and(query_param("labels", "pending"))
            .and(query_param("state", "open"))
            .and(query_param("sort", "created"))
            .and(query_param("direction", "asc"))
            .and(header("authorization", "Bearer t0ken"))
            .and(header("x-github-api-version", API_VERSION))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([issue_json(1, &["pending"]), pr, issue_json(2, &["pending"])])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let issues = tracker(&server)
            .await
            .list_issues(&IssueQuery::new(StateFilter::Open).with_label("pending"))
            .await
            .expect("list");
        let numbers: Vec<_> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert!(issues[0].has_label("pending"));
    }

    #[tokio::test]
    async fn list_issues_follows_pages_until_a_short_one() {
        let server = MockServer::start().await;
        let first: Vec<_> = (1..=100).map(|n| issue_json(n, &["pending"])).collect();
        let second: Vec<_> = (101..=103).map(|n| issue_json(n, &["pending"])).collect();

        Mock::given(method("GET"))
            .and(path("/repos/owner/jobs/issues"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(first))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/jobs/issues"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(second))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/jobs/issues"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let issues = tracker(&server)
            .await
            .list_issues(&IssueQuery::new(StateFilter::Open).with_label("pending"))
            .await
            .expect("list");
        assert_eq!(issues.len(), 103);
        let numbers: Vec<_> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, (1..=103).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn create_issue_posts_title_body_and_labels() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/owner/jobs/issues"))
            .and(body_json(json!({
                "title": "Job 1",
                "body": "```json\n{}\n```",
                "labels": ["pending", "mastodon"],
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(issue_json(1, &["pending", "mastodon"])))
            .expect(1)
            .mount(&server)
            .await;

        let issue = tracker(&server)
            .await
            .create_issue(NewIssue {
                title: "Job 1".into(),
                body: "```json\n{}\n```".into(),
                labels: vec!["pending".into(), "mastodon".into()],
            })
            .await
            .expect("create");
        assert_eq!(issue.number, 1);
        assert_eq!(issue.labels, vec!["pending", "mastodon"]);
    }

    #[tokio::test]
    async fn not_found_is_its_own_error_class() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/owner/jobs/issues/5/labels/processing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Label does not exist" })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/repos/owner/jobs/issues/5"))
            .respond_with(ResponseTemplate::new(403).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let tracker = tracker(&server).await;
        let err = tracker.remove_label(5, "processing").await.unwrap_err();
        assert!(err.is_not_found());

        let err = tracker.set_state(5, IssueState::Closed).await.unwrap_err();
        match err {
            TrackerError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "rate limited");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn label_events_keep_only_label_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/owner/jobs/issues/9/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "event": "labeled", "label": { "name": "pending", "color": "0dbf66" }, "created_at": "2024-05-01T10:00:00Z" },
                { "event": "commented", "created_at": "2024-05-01T10:01:00Z" },
                { "event": "unlabeled", "label": { "name": "pending", "color": "0dbf66" }, "created_at": "2024-05-01T10:02:00Z" },
                { "event": "labeled", "label": { "name": "processing", "color": "0052cc" }, "created_at": "2024-05-01T10:02:01Z" },
            ])))
            .mount(&server)
            .await;

        let events = tracker(&server).await.list_label_events(9).await.expect("events");
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].kind, LabelEventKind::Unlabeled);
        assert_eq!(events[2].label, "processing");
    }

    #[tokio::test]
    async fn set_state_and_comment_send_json_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/owner/jobs/issues/4"))
            .and(body_json(json!({ "state": "closed" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(issue_json(4, &[])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/owner/jobs/issues/4/comments"))
            .and(body_json(json!({ "body": "done" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let tracker = tracker(&server).await;
        tracker.set_state(4, IssueState::Closed).await.expect("close");
        tracker.create_comment(4, "done").await.expect("comment");
    }
}
