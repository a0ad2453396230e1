//! Fixtures for section tests.

use chrono::{Duration, TimeZone, Utc};

use crate::action::{Action, Cmd, TaskResult};
use crate::types::{
    Branch, Issue, IssueState, Notification, PrState, PullRequest, SubjectType,
};

/// Run every spawned job of `cmds` and collect the task results, in order.
pub async fn run(cmds: Vec<Cmd>) -> Vec<TaskResult> {
    let mut results = Vec::new();
    for cmd in cmds {
        if let Cmd::Spawn(job) = cmd {
            match job.await {
                Action::TaskFinished(result) => results.push(result),
                other => panic!("unexpected action {:?}", other),
            }
        }
    }
    results
}

/// Like `run`, for exactly one job.
pub async fn run_one(cmds: Vec<Cmd>) -> TaskResult {
    let mut results = run(cmds).await;
    assert_eq!(results.len(), 1, "expected one job");
    results.remove(0)
}

pub fn pr(number: u64) -> PullRequest {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(number as i64);
    PullRequest {
        repo: "acme/widgets".into(),
        number,
        node_id: format!("PR_{}", number),
        title: format!("Change {}", number),
        body: Some("Body".into()),
        author: "alice".into(),
        url: format!("https://github.com/acme/widgets/pull/{}", number),
        state: PrState::Open,
        is_draft: false,
        labels: vec!["bug".into()],
        assignees: vec![],
        comments: 0,
        recent_comments: vec![],
        base_ref: Some("main".into()),
        head_ref: Some(format!("topic-{}", number)),
        created_at: at,
        updated_at: at,
    }
}

pub fn issue(number: u64) -> Issue {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(number as i64);
    Issue {
        repo: "acme/widgets".into(),
        number,
        title: format!("Problem {}", number),
        body: None,
        author: "bob".into(),
        url: format!("https://github.com/acme/widgets/issues/{}", number),
        state: IssueState::Open,
        labels: vec![],
        assignees: vec!["carol".into()],
        comments: 0,
        recent_comments: vec![],
        created_at: at,
        updated_at: at,
    }
}

pub fn notification(id: &str, unread: bool, reason: &str) -> Notification {
    Notification {
        id: id.into(),
        repo: "acme/widgets".into(),
        subject_title: format!("Thread {}", id),
        subject_type: SubjectType::Issue,
        subject_url: format!("https://github.com/acme/widgets/issues/{}", id),
        reason: reason.into(),
        unread,
        updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        last_read_at: None,
        latest_comment_url: None,
        is_bookmarked: false,
        activity: None,
    }
}

pub fn branch(name: &str, current: bool) -> Branch {
    Branch {
        repo: "acme/widgets".into(),
        name: name.into(),
        last_commit_message: "wip".into(),
        last_commit_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        upstream: None,
        ahead: 0,
        behind: 0,
        is_current: current,
        url: String::new(),
    }
}
