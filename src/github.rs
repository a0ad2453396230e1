use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use octocrab::models::IssueState as OctoIssueState;
use octocrab::Octocrab;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{DashError, Result};
use crate::forge::Forge;
use crate::mutation::{ItemKind, ItemRef, Mutation};
use crate::types::{
    subject_web_url, Issue, IssueState, Notification, NotificationQuery, Page, PageInfo, PrState,
    PullRequest, SubjectType, ThreadActivity,
};

const API: &str = "https://api.github.com";
/// The search API stops answering past this many results.
const SEARCH_CAP: usize = 1000;

pub struct GitHub {
    client: Octocrab,
    http: reqwest::Client,
    token: String,
}

impl std::fmt::Debug for GitHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHub").finish_non_exhaustive()
    }
}

impl From<octocrab::Error> for DashError {
    fn from(err: octocrab::Error) -> Self {
        DashError::Api(err.to_string())
    }
}

impl GitHub {
    pub fn new(token: String) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token.clone())
            .build()
            .map_err(|e| DashError::Auth(e.to_string()))?;

        Ok(Self {
            client,
            http: reqwest::Client::new(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", API, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "gitdash")
    }

    /// Send a REST call whose response body only matters on failure.
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<()> {
        let mut request = self.request(method, path);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DashError::Api(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(DashError::Api(format!("{}: {}", status, api_message(&text))));
        }
        Ok(())
    }

    /// One page of `/search/issues`, with the continuation and the reported total.
    async fn search(
        &self,
        query: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<(Vec<Value>, PageInfo, usize)> {
        let page = parse_page_cursor(cursor)?;
        let per_page = limit.clamp(1, 100);
        debug!(query, page, per_page, "searching issues and pull requests");

        let params = json!({
            "q": query,
            "per_page": per_page,
            "page": page,
        });
        let response: Value = self.client.get("/search/issues", Some(&params)).await?;

        let total = response
            .get("total_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let items = response
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let seen = (page as usize - 1) * per_page as usize + items.len();
        let has_next = !items.is_empty() && seen < total.min(SEARCH_CAP);
        let page_info = PageInfo {
            end_cursor: Some((page + 1).to_string()),
            has_next_page: has_next,
        };
        Ok((items, page_info, total))
    }

    async fn get_json(&self, path: &str) -> Result<(Value, bool)> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(|e| DashError::Api(e.to_string()))?;

        let status = response.status();
        let has_next = response
            .headers()
            .get("link")
            .and_then(|l| l.to_str().ok())
            .is_some_and(has_next_link);
        let text = response
            .text()
            .await
            .map_err(|e| DashError::Api(e.to_string()))?;

        if !status.is_success() {
            return Err(DashError::Api(format!("{}: {}", status, api_message(&text))));
        }
        Ok((serde_json::from_str(&text)?, has_next))
    }

    async fn execute_item(&self, item: &ItemRef, mutation: &Mutation) -> Result<()> {
        let (owner, name) = item.owner_name();
        let issue_path = format!("/repos/{}/{}/issues/{}", owner, name, item.number);
        let pull_path = format!("/repos/{}/{}/pulls/{}", owner, name, item.number);

        match mutation {
            Mutation::Close(_) | Mutation::Reopen(_) => {
                let closing = matches!(mutation, Mutation::Close(_));
                match item.kind {
                    ItemKind::Pr => {
                        let state = if closing {
                            octocrab::params::pulls::State::Closed
                        } else {
                            octocrab::params::pulls::State::Open
                        };
                        self.client
                            .pulls(owner, name)
                            .update(item.number)
                            .state(state)
                            .send()
                            .await?;
                    }
                    ItemKind::Issue => {
                        let state = if closing {
                            OctoIssueState::Closed
                        } else {
                            OctoIssueState::Open
                        };
                        self.client
                            .issues(owner, name)
                            .update(item.number)
                            .state(state)
                            .send()
                            .await?;
                    }
                }
                Ok(())
            }
            Mutation::Ready { node_id, .. } => self.mark_ready(node_id).await,
            Mutation::Merge(_) => {
                self.send(
                    Method::PUT,
                    &format!("{}/merge", pull_path),
                    Some(json!({ "merge_method": "merge" })),
                )
                .await
            }
            Mutation::UpdateBranch(_) => {
                self.send(Method::PUT, &format!("{}/update-branch", pull_path), Some(json!({})))
                    .await
            }
            Mutation::Approve { body, .. } => {
                self.send(
                    Method::POST,
                    &format!("{}/reviews", pull_path),
                    Some(json!({ "event": "APPROVE", "body": body })),
                )
                .await
            }
            Mutation::Comment { body, .. } => {
                self.client
                    .issues(owner, name)
                    .create_comment(item.number, body)
                    .await?;
                Ok(())
            }
            Mutation::SetLabels { labels, .. } => {
                self.send(
                    Method::PUT,
                    &format!("{}/labels", issue_path),
                    Some(json!({ "labels": labels })),
                )
                .await
            }
            Mutation::Assign { users, .. } => {
                self.send(
                    Method::POST,
                    &format!("{}/assignees", issue_path),
                    Some(json!({ "assignees": users })),
                )
                .await
            }
            Mutation::Unassign { users, .. } => {
                self.send(
                    Method::DELETE,
                    &format!("{}/assignees", issue_path),
                    Some(json!({ "assignees": users })),
                )
                .await
            }
            other => Err(DashError::Unsupported(format!(
                "{:?} is not a remote action",
                other
            ))),
        }
    }

    async fn mark_ready(&self, node_id: &str) -> Result<()> {
        let payload = json!({
            "query": "mutation($id: ID!) { markPullRequestReadyForReview(input: {pullRequestId: $id}) { clientMutationId } }",
            "variables": { "id": node_id },
        });
        let response: Value = self.client.graphql(&payload).await?;
        if let Some(errors) = response.get("errors").and_then(Value::as_array) {
            let message = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DashError::Api(message));
        }
        Ok(())
    }
}

#[async_trait]
impl Forge for GitHub {
    fn name(&self) -> &str {
        "GitHub"
    }

    async fn current_user(&self) -> Result<String> {
        let user = self.client.current().user().await?;
        Ok(user.login)
    }

    async fn search_prs(
        &self,
        query: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<PullRequest>> {
        let (items, page_info, total) = self.search(query, limit, cursor).await?;
        Ok(Page {
            rows: items.iter().filter_map(parse_pr).collect(),
            total_count: total.min(SEARCH_CAP),
            page_info,
        })
    }

    async fn search_issues(
        &self,
        query: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Issue>> {
        let (items, page_info, total) = self.search(query, limit, cursor).await?;
        Ok(Page {
            rows: items
                .iter()
                .filter(|i| i.get("pull_request").is_none())
                .filter_map(parse_issue)
                .collect(),
            total_count: total.min(SEARCH_CAP),
            page_info,
        })
    }

    async fn list_notifications(
        &self,
        query: &NotificationQuery,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Notification>> {
        let page = parse_page_cursor(cursor)?;
        let path = notifications_path(query, limit.clamp(1, 50), page);
        let (response, has_next) = self.get_json(&path).await?;

        let rows: Vec<Notification> = response
            .as_array()
            .map(|threads| threads.iter().filter_map(parse_notification).collect())
            .unwrap_or_default();

        Ok(Page {
            total_count: rows.len(),
            rows,
            page_info: PageInfo {
                end_cursor: Some((page + 1).to_string()),
                has_next_page: has_next,
            },
        })
    }

    async fn get_notification(&self, id: &str) -> Result<Notification> {
        let path = format!("/notifications/threads/{}", urlencoding::encode(id));
        let (response, _) = self.get_json(&path).await?;
        parse_notification(&response)
            .ok_or_else(|| DashError::Api(format!("malformed notification {}", id)))
    }

    async fn thread_activity(&self, thread: &Notification) -> Result<ThreadActivity> {
        let (owner, name) = thread
            .repo
            .split_once('/')
            .ok_or_else(|| DashError::Api(format!("invalid repository {}", thread.repo)))?;
        let base = format!(
            "/repos/{}/{}",
            urlencoding::encode(owner),
            urlencoding::encode(name)
        );
        let number = thread.subject_number();
        let since = since_param(thread.last_read_at);
        let read = thread.last_read_at;

        let subject_path = match thread.subject_type {
            SubjectType::PullRequest => format!("{}/pulls/{}", base, number),
            SubjectType::Issue => format!("{}/issues/{}", base, number),
            other => {
                return Err(DashError::Unsupported(format!(
                    "{:?} threads carry no activity",
                    other
                )))
            }
        };
        debug!(id = %thread.id, path = %subject_path, "fetching thread activity");
        let (subject, _) = self.get_json(&subject_path).await?;

        let comments_path = format!("{}/issues/{}/comments?per_page=100{}", base, number, since);
        let (comments, _) = self.get_json(&comments_path).await?;
        let mut new_comments = count_since(&comments, "updated_at", read);

        if thread.subject_type == SubjectType::PullRequest {
            let review_comments_path =
                format!("{}/pulls/{}/comments?per_page=100{}", base, number, since);
            let (review_comments, _) = self.get_json(&review_comments_path).await?;
            let (reviews, _) = self
                .get_json(&format!("{}/pulls/{}/reviews?per_page=100", base, number))
                .await?;
            new_comments += count_since(&review_comments, "updated_at", read)
                + count_since(&reviews, "submitted_at", read);
        }

        let commenter = match thread
            .latest_comment_url
            .as_deref()
            .and_then(|url| url.strip_prefix(API))
        {
            Some(path) => match self.get_json(path).await {
                Ok((comment, _)) => comment.get("user").and_then(|u| str_field(u, "login")),
                Err(err) => {
                    debug!(id = %thread.id, %err, "could not fetch latest comment");
                    None
                }
            },
            None => None,
        };

        Ok(activity_from(&subject, new_comments, commenter))
    }

    async fn list_labels(&self, repo: &str) -> Result<Vec<String>> {
        let (owner, name) = repo.split_once('/').unwrap_or(("", repo));
        let url = format!("/repos/{}/{}/labels?per_page=100", owner, name);
        let response: Value = self.client.get(&url, None::<&()>).await?;

        Ok(response
            .as_array()
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|l| l.get("name")?.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn execute(&self, mutation: &Mutation) -> Result<()> {
        debug!(task_id = %mutation.task_id(), "executing remote mutation");
        match mutation {
            Mutation::Close(item)
            | Mutation::Reopen(item)
            | Mutation::Merge(item)
            | Mutation::UpdateBranch(item)
            | Mutation::Ready { item, .. }
            | Mutation::Approve { item, .. }
            | Mutation::Comment { item, .. }
            | Mutation::SetLabels { item, .. }
            | Mutation::Assign { item, .. }
            | Mutation::Unassign { item, .. } => self.execute_item(item, mutation).await,
            Mutation::MarkRead(id) => {
                self.send(Method::PATCH, &thread_path(id), None).await
            }
            Mutation::MarkDone(id) => {
                self.send(Method::DELETE, &thread_path(id), None).await
            }
            Mutation::MarkAllRead => {
                self.send(Method::PUT, "/notifications", Some(json!({ "read": true })))
                    .await
            }
            Mutation::Unsubscribe(id) => {
                self.send(
                    Method::DELETE,
                    &format!("{}/subscription", thread_path(id)),
                    None,
                )
                .await
            }
            other => Err(DashError::Unsupported(format!(
                "{:?} is not a remote action",
                other
            ))),
        }
    }
}

fn thread_path(id: &str) -> String {
    format!("/notifications/threads/{}", urlencoding::encode(id))
}

/// Cursors are 1-based page numbers.
fn parse_page_cursor(cursor: Option<&str>) -> Result<u32> {
    match cursor {
        None => Ok(1),
        Some(c) => c
            .parse::<u32>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| DashError::Api(format!("invalid page cursor {}", c))),
    }
}

fn notifications_path(query: &NotificationQuery, per_page: u32, page: u32) -> String {
    let base = match query.repo.as_deref().and_then(|r| r.split_once('/')) {
        Some((owner, name)) => format!(
            "/repos/{}/{}/notifications",
            urlencoding::encode(owner),
            urlencoding::encode(name)
        ),
        None => "/notifications".to_string(),
    };
    format!(
        "{}?all={}&participating={}&per_page={}&page={}",
        base, query.all, query.participating, per_page, page
    )
}

fn since_param(last_read_at: Option<DateTime<Utc>>) -> String {
    last_read_at
        .map(|t| format!("&since={}", t.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .unwrap_or_default()
}

/// Items whose `key` timestamp is after `since`. Everything counts when there is no `since`.
fn count_since(items: &Value, key: &str, since: Option<DateTime<Utc>>) -> u32 {
    items
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|i| since.map_or(true, |since| time_field(i, key).is_some_and(|t| t > since)))
                .count() as u32
        })
        .unwrap_or(0)
}

/// Activity from an issue or pull request object plus counted comments.
fn activity_from(subject: &Value, new_comments: u32, commenter: Option<String>) -> ThreadActivity {
    let merged = subject.get("merged").and_then(Value::as_bool).unwrap_or(false)
        || subject.get("merged_at").is_some_and(|m| !m.is_null());
    let subject_state = match (merged, subject.get("state").and_then(Value::as_str)) {
        (true, _) => Some(PrState::Merged),
        (false, Some("closed")) => Some(PrState::Closed),
        (false, Some(_)) => Some(PrState::Open),
        (false, None) => None,
    };

    ThreadActivity {
        new_comments,
        subject_state,
        is_draft: subject.get("draft").and_then(Value::as_bool).unwrap_or(false),
        last_actor: commenter.or_else(|| subject.get("user").and_then(|u| str_field(u, "login"))),
    }
}

/// Whether a `Link` response header advertises another page.
fn has_next_link(header: &str) -> bool {
    header
        .split(',')
        .any(|part| part.split(';').skip(1).any(|p| p.trim() == r#"rel="next""#))
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key)?.as_str().map(str::to_string)
}

fn time_field(v: &Value, key: &str) -> Option<DateTime<Utc>> {
    v.get(key)?
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn logins(v: &Value, key: &str, field: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get(field)?.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `https://api.github.com/repos/o/r` to `o/r`.
fn repo_from_url(url: &str) -> Option<String> {
    let rest = url.split("/repos/").nth(1)?;
    let mut parts = rest.split('/');
    Some(format!("{}/{}", parts.next()?, parts.next()?))
}

fn parse_pr(v: &Value) -> Option<PullRequest> {
    let merged = v
        .get("pull_request")
        .and_then(|p| p.get("merged_at"))
        .is_some_and(|m| !m.is_null());
    let state = match (merged, v.get("state")?.as_str()?) {
        (true, _) => PrState::Merged,
        (false, "closed") => PrState::Closed,
        _ => PrState::Open,
    };

    Some(PullRequest {
        repo: repo_from_url(v.get("repository_url")?.as_str()?)?,
        number: v.get("number")?.as_u64()?,
        node_id: str_field(v, "node_id").unwrap_or_default(),
        title: str_field(v, "title").unwrap_or_default(),
        body: str_field(v, "body"),
        author: v
            .get("user")
            .and_then(|u| str_field(u, "login"))
            .unwrap_or_else(|| "unknown".to_string()),
        url: str_field(v, "html_url").unwrap_or_default(),
        state,
        is_draft: v.get("draft").and_then(Value::as_bool).unwrap_or(false),
        labels: logins(v, "labels", "name"),
        assignees: logins(v, "assignees", "login"),
        comments: v.get("comments").and_then(Value::as_u64).unwrap_or(0) as u32,
        recent_comments: Vec::new(),
        base_ref: None,
        head_ref: None,
        created_at: time_field(v, "created_at").unwrap_or_else(Utc::now),
        updated_at: time_field(v, "updated_at").unwrap_or_else(Utc::now),
    })
}

fn parse_issue(v: &Value) -> Option<Issue> {
    Some(Issue {
        repo: repo_from_url(v.get("repository_url")?.as_str()?)?,
        number: v.get("number")?.as_u64()?,
        title: str_field(v, "title").unwrap_or_default(),
        body: str_field(v, "body"),
        author: v
            .get("user")
            .and_then(|u| str_field(u, "login"))
            .unwrap_or_else(|| "unknown".to_string()),
        url: str_field(v, "html_url").unwrap_or_default(),
        state: match v.get("state")?.as_str()? {
            "closed" => IssueState::Closed,
            _ => IssueState::Open,
        },
        labels: logins(v, "labels", "name"),
        assignees: logins(v, "assignees", "login"),
        comments: v.get("comments").and_then(Value::as_u64).unwrap_or(0) as u32,
        recent_comments: Vec::new(),
        created_at: time_field(v, "created_at").unwrap_or_else(Utc::now),
        updated_at: time_field(v, "updated_at").unwrap_or_else(Utc::now),
    })
}

fn parse_notification(v: &Value) -> Option<Notification> {
    let repository = v.get("repository")?;
    let subject = v.get("subject")?;
    let repo_web = str_field(repository, "html_url").unwrap_or_default();

    Some(Notification {
        id: str_field(v, "id")?,
        repo: str_field(repository, "full_name")?,
        subject_title: str_field(subject, "title").unwrap_or_default(),
        subject_type: SubjectType::from_api(subject.get("type")?.as_str()?),
        subject_url: subject_web_url(subject.get("url").and_then(Value::as_str), &repo_web),
        reason: str_field(v, "reason").unwrap_or_default(),
        unread: v.get("unread").and_then(Value::as_bool).unwrap_or(false),
        updated_at: time_field(v, "updated_at").unwrap_or_else(Utc::now),
        last_read_at: time_field(v, "last_read_at"),
        latest_comment_url: str_field(subject, "latest_comment_url"),
        is_bookmarked: false,
        activity: None,
    })
}
