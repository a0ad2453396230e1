use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A hosted repository as `owner/name` on some host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub host: String,
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// The search token that scopes a query to this repository.
    pub fn filter_token(&self) -> String {
        format!("repo:{}", self.full_name())
    }

    pub fn web_url(&self) -> String {
        format!("https://{}/{}/{}", self.host, self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Continuation state returned with every fetched page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

/// One page of rows from a remote source.
#[derive(Debug, Clone)]
pub struct Page<R> {
    pub rows: Vec<R>,
    pub total_count: usize,
    pub page_info: PageInfo,
}

impl<R> Page<R> {
    pub fn empty() -> Self {
        Self {
            rows: Vec::new(),
            total_count: 0,
            page_info: PageInfo::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowId {
    Numbered { repo: String, number: u64 },
    Thread(String),
    Branch(String),
}

/// Capabilities every list row exposes to the section machinery.
pub trait Row: Clone + Send + Sync + 'static {
    fn number(&self) -> u64;
    fn repo(&self) -> &str;
    fn title(&self) -> &str;
    fn url(&self) -> &str;
    fn updated_at(&self) -> DateTime<Utc>;
    fn identity(&self) -> RowId;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrState::Open => write!(f, "Open"),
            PrState::Closed => write!(f, "Closed"),
            PrState::Merged => write!(f, "Merged"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub repo: String,
    pub number: u64,
    pub node_id: String,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub url: String,
    pub state: PrState,
    pub is_draft: bool,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub comments: u32,
    pub recent_comments: Vec<Comment>,
    pub base_ref: Option<String>,
    pub head_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row for PullRequest {
    fn number(&self) -> u64 {
        self.number
    }
    fn repo(&self) -> &str {
        &self.repo
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn url(&self) -> &str {
        &self.url
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    fn identity(&self) -> RowId {
        RowId::Numbered {
            repo: self.repo.clone(),
            number: self.number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueState {
    Open,
    Closed,
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueState::Open => write!(f, "Open"),
            IssueState::Closed => write!(f, "Closed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub author: String,
    pub url: String,
    pub state: IssueState,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub comments: u32,
    pub recent_comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Row for Issue {
    fn number(&self) -> u64 {
        self.number
    }
    fn repo(&self) -> &str {
        &self.repo
    }
    fn title(&self) -> &str {
        &self.title
    }
    fn url(&self) -> &str {
        &self.url
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    fn identity(&self) -> RowId {
        RowId::Numbered {
            repo: self.repo.clone(),
            number: self.number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectType {
    PullRequest,
    Issue,
    Discussion,
    Release,
    Commit,
    Other,
}

impl SubjectType {
    pub fn from_api(kind: &str) -> Self {
        match kind {
            "PullRequest" => SubjectType::PullRequest,
            "Issue" => SubjectType::Issue,
            "Discussion" => SubjectType::Discussion,
            "Release" => SubjectType::Release,
            "Commit" => SubjectType::Commit,
            _ => SubjectType::Other,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            SubjectType::PullRequest => "PR",
            SubjectType::Issue => "IS",
            SubjectType::Discussion => "DI",
            SubjectType::Release => "RL",
            SubjectType::Commit => "CM",
            SubjectType::Other => "--",
        }
    }
}

/// What happened on a thread's subject since it was last read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadActivity {
    /// Comments and reviews newer than the last read, or all of them for a thread never read.
    pub new_comments: u32,
    /// Closed issues report `Closed`; there is no merged issue.
    pub subject_state: Option<PrState>,
    pub is_draft: bool,
    /// Author of the latest comment, else of the subject itself.
    pub last_actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub repo: String,
    pub subject_title: String,
    pub subject_type: SubjectType,
    pub subject_url: String,
    pub reason: String,
    pub unread: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
    /// API URL of the newest comment on the subject.
    #[serde(default)]
    pub latest_comment_url: Option<String>,
    #[serde(default)]
    pub is_bookmarked: bool,
    /// Filled in after the listing arrives.
    #[serde(default)]
    pub activity: Option<ThreadActivity>,
}

impl Notification {
    /// Only issue and pull request subjects carry comments and a state.
    pub fn has_activity(&self) -> bool {
        matches!(
            self.subject_type,
            SubjectType::PullRequest | SubjectType::Issue
        )
    }

    /// One line on why the thread showed up, naming the last actor once known.
    pub fn activity_description(&self) -> String {
        let actor = self
            .activity
            .as_ref()
            .and_then(|a| a.last_actor.as_deref());
        let noun = match self.subject_type {
            SubjectType::PullRequest => Some("pull request"),
            SubjectType::Issue => Some("issue"),
            _ => None,
        };

        match (self.reason.as_str(), actor) {
            ("comment", Some(actor)) => match noun {
                Some(noun) => format!("@{} commented on this {}", actor, noun),
                None => format!("@{} commented", actor),
            },
            ("comment", None) => "New comment".to_string(),
            ("review_requested", Some(actor)) => format!("@{} requested your review", actor),
            ("review_requested", None) => "Review requested".to_string(),
            ("mention", Some(actor)) => format!("@{} mentioned you", actor),
            ("mention", None) => "You were mentioned".to_string(),
            ("author", _) => "Activity on your thread".to_string(),
            ("assign", _) => "You were assigned".to_string(),
            ("state_change", _) => match self.subject_type {
                SubjectType::PullRequest => "Pull request state changed".to_string(),
                SubjectType::Issue => "Issue state changed".to_string(),
                _ => "State changed".to_string(),
            },
            ("ci_activity", _) => "CI activity".to_string(),
            ("subscribed", Some(actor)) => match noun {
                Some(noun) => format!("@{} commented on this {}", actor, noun),
                None => "Activity on subscribed thread".to_string(),
            },
            ("subscribed", None) => "Activity on subscribed thread".to_string(),
            ("team_mention", _) => "Your team was mentioned".to_string(),
            ("security_alert", _) => "Security vulnerability detected".to_string(),
            (_, Some(actor)) => format!("@{} triggered this notification", actor),
            (_, None) => String::new(),
        }
    }

    /// Issue or PR number encoded in the subject URL, 0 when there is none.
    pub fn subject_number(&self) -> u64 {
        match self.subject_type {
            SubjectType::PullRequest | SubjectType::Issue => self
                .subject_url
                .rsplit('/')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0),
            _ => 0,
        }
    }
}

impl Row for Notification {
    fn number(&self) -> u64 {
        self.subject_number()
    }
    fn repo(&self) -> &str {
        &self.repo
    }
    fn title(&self) -> &str {
        &self.subject_title
    }
    fn url(&self) -> &str {
        &self.subject_url
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    fn identity(&self) -> RowId {
        RowId::Thread(self.id.clone())
    }
}

/// Translate an API subject URL into the page a browser should open.
///
/// `https://api.github.com/repos/o/r/pulls/5` becomes `https://github.com/o/r/pull/5`.
pub fn subject_web_url(api_url: Option<&str>, repo_web_url: &str) -> String {
    let Some(api_url) = api_url else {
        return repo_web_url.to_string();
    };
    let Some(rest) = api_url.split("/repos/").nth(1) else {
        return repo_web_url.to_string();
    };
    let host = repo_web_url
        .split("://")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("github.com");
    let path = rest.replacen("/pulls/", "/pull/", 1).replacen("/commits/", "/commit/", 1);
    format!("https://{}/{}", host, path)
}

/// Remote parameters of a notifications listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationQuery {
    /// `owner/name` to scope the listing to one repository.
    pub repo: Option<String>,
    /// Include threads that were already read.
    pub all: bool,
    pub participating: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub repo: String,
    pub name: String,
    pub last_commit_message: String,
    pub last_commit_at: DateTime<Utc>,
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub is_current: bool,
    pub url: String,
}

impl Row for Branch {
    fn number(&self) -> u64 {
        0
    }
    fn repo(&self) -> &str {
        &self.repo
    }
    fn title(&self) -> &str {
        &self.name
    }
    fn url(&self) -> &str {
        &self.url
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.last_commit_at
    }
    fn identity(&self) -> RowId {
        RowId::Branch(self.name.clone())
    }
}

pub fn format_age(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(dt);

    if duration.num_days() >= 365 {
        format!("{}y", duration.num_days() / 365)
    } else if duration.num_days() >= 30 {
        format!("{}mo", duration.num_days() / 30)
    } else if duration.num_days() > 0 {
        format!("{}d", duration.num_days())
    } else if duration.num_hours() > 0 {
        format!("{}h", duration.num_hours())
    } else if duration.num_minutes() > 0 {
        format!("{}m", duration.num_minutes())
    } else {
        "now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn subject_url_maps_pulls_to_pull() {
        assert_eq!(
            subject_web_url(
                Some("https://api.github.com/repos/owner/repo/pulls/42"),
                "https://github.com/owner/repo"
            ),
            "https://github.com/owner/repo/pull/42"
        );
    }

    #[test]
    fn subject_url_keeps_issues_path() {
        assert_eq!(
            subject_web_url(
                Some("https://api.github.com/repos/owner/repo/issues/7"),
                "https://github.com/owner/repo"
            ),
            "https://github.com/owner/repo/issues/7"
        );
    }

    #[test]
    fn subject_url_falls_back_to_repo() {
        assert_eq!(
            subject_web_url(None, "https://github.com/owner/repo"),
            "https://github.com/owner/repo"
        );
    }

    #[test]
    fn notification_number_from_subject() {
        let n = Notification {
            id: "1".into(),
            repo: "owner/repo".into(),
            subject_title: "Fix".into(),
            subject_type: SubjectType::PullRequest,
            subject_url: "https://github.com/owner/repo/pull/42".into(),
            reason: "mention".into(),
            unread: true,
            updated_at: Utc::now(),
            last_read_at: None,
            latest_comment_url: None,
            is_bookmarked: false,
            activity: None,
        };
        assert_eq!(n.subject_number(), 42);

        let release = Notification {
            subject_type: SubjectType::Release,
            ..n
        };
        assert_eq!(release.subject_number(), 0);
    }

    #[test]
    fn activity_description_names_the_actor_once_known() {
        let mut n = Notification {
            id: "1".into(),
            repo: "owner/repo".into(),
            subject_title: "Fix".into(),
            subject_type: SubjectType::PullRequest,
            subject_url: "https://github.com/owner/repo/pull/42".into(),
            reason: "comment".into(),
            unread: true,
            updated_at: Utc::now(),
            last_read_at: None,
            latest_comment_url: None,
            is_bookmarked: false,
            activity: None,
        };
        assert_eq!(n.activity_description(), "New comment");

        n.activity = Some(ThreadActivity {
            last_actor: Some("carol".into()),
            ..ThreadActivity::default()
        });
        assert_eq!(n.activity_description(), "@carol commented on this pull request");

        n.reason = "subscribed".into();
        n.subject_type = SubjectType::Issue;
        assert_eq!(n.activity_description(), "@carol commented on this issue");
        n.subject_type = SubjectType::Release;
        assert!(!n.has_activity());
        assert_eq!(n.activity_description(), "Activity on subscribed thread");

        n.reason = "something_new".into();
        assert_eq!(n.activity_description(), "@carol triggered this notification");
        n.activity = None;
        assert_eq!(n.activity_description(), "");
    }

    #[test]
    fn format_age_buckets() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "now");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h");
        assert_eq!(format_age(now - Duration::days(2), now), "2d");
        assert_eq!(format_age(now - Duration::days(65), now), "2mo");
        assert_eq!(format_age(now - Duration::days(800), now), "2y");
    }

    #[test]
    fn repo_filter_token() {
        let repo = RepoRef {
            host: "github.com".into(),
            owner: "dlvhdr".into(),
            name: "gh-dash".into(),
        };
        assert_eq!(repo.filter_token(), "repo:dlvhdr/gh-dash");
        assert_eq!(repo.web_url(), "https://github.com/dlvhdr/gh-dash");
    }
}
