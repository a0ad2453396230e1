//! Remote and local actions on a row, with the follow-up each one applies on success.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{info, warn};

use crate::action::{Action, Cmd, SectionMsg, TaskResult};
use crate::error::Result;
use crate::forge::Forge;
use crate::git;
use crate::section::SectionId;
use crate::task::Task;
use crate::types::Comment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Pr,
    Issue,
}

impl ItemKind {
    fn prefix(self) -> &'static str {
        match self {
            ItemKind::Pr => "pr",
            ItemKind::Issue => "issue",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            ItemKind::Pr => "PR",
            ItemKind::Issue => "Issue",
        }
    }
}

/// A pull request or issue addressed by repository and number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub repo: String,
    pub number: u64,
}

impl ItemRef {
    pub fn pr(repo: impl Into<String>, number: u64) -> Self {
        Self {
            kind: ItemKind::Pr,
            repo: repo.into(),
            number,
        }
    }

    pub fn issue(repo: impl Into<String>, number: u64) -> Self {
        Self {
            kind: ItemKind::Issue,
            repo: repo.into(),
            number,
        }
    }

    /// Split `repo` into owner and name.
    pub fn owner_name(&self) -> (&str, &str) {
        self.repo.split_once('/').unwrap_or(("", self.repo.as_str()))
    }

    fn label(&self) -> String {
        format!("{} #{}", self.kind.noun(), self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Close(ItemRef),
    Reopen(ItemRef),
    Ready { item: ItemRef, node_id: String },
    Merge(ItemRef),
    UpdateBranch(ItemRef),
    Approve { item: ItemRef, author: String, body: String },
    Comment { item: ItemRef, author: String, body: String },
    SetLabels { item: ItemRef, labels: Vec<String> },
    Assign { item: ItemRef, users: Vec<String> },
    Unassign { item: ItemRef, users: Vec<String> },
    MarkRead(String),
    MarkDone(String),
    MarkAllRead,
    Unsubscribe(String),
    CheckoutPr { item: ItemRef, dir: PathBuf },
    CheckoutBranch { name: String, dir: PathBuf },
    DeleteBranch { name: String, dir: PathBuf },
}

impl Mutation {
    pub fn task_id(&self) -> String {
        match self {
            Mutation::Close(item) => format!("{}_close_{}", item.kind.prefix(), item.number),
            Mutation::Reopen(item) => format!("{}_reopen_{}", item.kind.prefix(), item.number),
            Mutation::Ready { item, .. } => format!("pr_ready_{}", item.number),
            Mutation::Merge(item) => format!("pr_merge_{}", item.number),
            Mutation::UpdateBranch(item) => format!("pr_update_{}", item.number),
            Mutation::Approve { item, .. } => format!("pr_approve_{}", item.number),
            Mutation::Comment { item, .. } => {
                format!("{}_comment_{}", item.kind.prefix(), item.number)
            }
            Mutation::SetLabels { item, .. } => {
                format!("{}_label_{}", item.kind.prefix(), item.number)
            }
            Mutation::Assign { item, .. } => {
                format!("{}_assign_{}", item.kind.prefix(), item.number)
            }
            Mutation::Unassign { item, .. } => {
                format!("{}_unassign_{}", item.kind.prefix(), item.number)
            }
            Mutation::MarkRead(id) => format!("notification_read_{}", id),
            Mutation::MarkDone(id) => format!("notification_done_{}", id),
            Mutation::MarkAllRead => "notification_read_all".to_string(),
            Mutation::Unsubscribe(id) => format!("notification_unsubscribe_{}", id),
            Mutation::CheckoutPr { item, .. } => format!("pr_checkout_{}", item.number),
            Mutation::CheckoutBranch { name, .. } => format!("branch_checkout_{}", name),
            Mutation::DeleteBranch { name, .. } => format!("branch_delete_{}", name),
        }
    }

    pub fn start_text(&self) -> String {
        match self {
            Mutation::Close(item) => format!("Closing {}", item.label()),
            Mutation::Reopen(item) => format!("Reopening {}", item.label()),
            Mutation::Ready { item, .. } => format!("Marking {} as ready for review", item.label()),
            Mutation::Merge(item) => format!("Merging {}", item.label()),
            Mutation::UpdateBranch(item) => format!("Updating {}", item.label()),
            Mutation::Approve { item, .. } => format!("Approving {}", item.label()),
            Mutation::Comment { item, .. } => format!("Commenting on {}", item.label()),
            Mutation::SetLabels { item, .. } => format!("Setting labels on {}", item.label()),
            Mutation::Assign { item, users } => {
                format!("Assigning {} to {}", users.join(", "), item.label())
            }
            Mutation::Unassign { item, users } => {
                format!("Unassigning {} from {}", users.join(", "), item.label())
            }
            Mutation::MarkRead(_) => "Marking notification as read".to_string(),
            Mutation::MarkDone(_) => "Marking notification as done".to_string(),
            Mutation::MarkAllRead => "Marking all notifications as read".to_string(),
            Mutation::Unsubscribe(_) => "Unsubscribing from thread".to_string(),
            Mutation::CheckoutPr { item, .. } => format!("Checking out {}", item.label()),
            Mutation::CheckoutBranch { name, .. } => format!("Checking out branch {}", name),
            Mutation::DeleteBranch { name, .. } => format!("Deleting branch {}", name),
        }
    }

    pub fn finished_text(&self) -> String {
        match self {
            Mutation::Close(item) => format!("{} has been closed", item.label()),
            Mutation::Reopen(item) => format!("{} has been reopened", item.label()),
            Mutation::Ready { item, .. } => {
                format!("{} has been marked as ready for review", item.label())
            }
            Mutation::Merge(item) => format!("{} has been merged", item.label()),
            Mutation::UpdateBranch(item) => format!("{} has been updated", item.label()),
            Mutation::Approve { item, .. } => format!("{} has been approved", item.label()),
            Mutation::Comment { item, .. } => format!("Commented on {}", item.label()),
            Mutation::SetLabels { item, .. } => format!("Labels set on {}", item.label()),
            Mutation::Assign { item, users } => {
                format!("Assigned {} to {}", users.join(", "), item.label())
            }
            Mutation::Unassign { item, users } => {
                format!("Unassigned {} from {}", users.join(", "), item.label())
            }
            Mutation::MarkRead(_) => "Notification marked as read".to_string(),
            Mutation::MarkDone(_) => "Notification marked as done".to_string(),
            Mutation::MarkAllRead => "All notifications marked as read".to_string(),
            Mutation::Unsubscribe(_) => "Unsubscribed from thread".to_string(),
            Mutation::CheckoutPr { item, .. } => format!("{} checked out", item.label()),
            Mutation::CheckoutBranch { name, .. } => format!("Branch {} checked out", name),
            Mutation::DeleteBranch { name, .. } => format!("Branch {} deleted", name),
        }
    }

    /// Runs against the local clone instead of the forge.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Mutation::CheckoutPr { .. }
                | Mutation::CheckoutBranch { .. }
                | Mutation::DeleteBranch { .. }
        )
    }

    /// The optimistic update applied to the section once the mutation succeeded.
    pub fn follow_up(&self) -> Option<SectionMsg> {
        let item_update = |item: &ItemRef, change: ItemChange| {
            Some(SectionMsg::ItemUpdated(ItemUpdate {
                repo: item.repo.clone(),
                number: item.number,
                change,
            }))
        };

        match self {
            Mutation::Close(item) => item_update(item, ItemChange::Closed),
            Mutation::Reopen(item) => item_update(item, ItemChange::Reopened),
            Mutation::Ready { item, .. } => item_update(item, ItemChange::ReadyForReview),
            Mutation::Merge(item) => item_update(item, ItemChange::Merged),
            Mutation::Approve { item, author, body } | Mutation::Comment { item, author, body } => {
                item_update(
                    item,
                    ItemChange::Commented(Comment {
                        author: author.clone(),
                        body: body.clone(),
                        created_at: Utc::now(),
                    }),
                )
            }
            Mutation::SetLabels { item, labels } => {
                item_update(item, ItemChange::Labels(labels.clone()))
            }
            Mutation::Assign { item, users } => {
                item_update(item, ItemChange::Assigned(users.clone()))
            }
            Mutation::Unassign { item, users } => {
                item_update(item, ItemChange::Unassigned(users.clone()))
            }
            Mutation::MarkRead(id) => Some(SectionMsg::NotificationUpdated(
                NotificationUpdate::Read(id.clone()),
            )),
            Mutation::MarkDone(id) => Some(SectionMsg::NotificationUpdated(
                NotificationUpdate::Done(id.clone()),
            )),
            Mutation::MarkAllRead => Some(SectionMsg::NotificationUpdated(
                NotificationUpdate::AllRead,
            )),
            Mutation::DeleteBranch { name, .. } => Some(SectionMsg::BranchUpdated(
                BranchUpdate::Deleted(name.clone()),
            )),
            Mutation::CheckoutBranch { name, .. } => Some(SectionMsg::BranchUpdated(
                BranchUpdate::CheckedOut(name.clone()),
            )),
            Mutation::UpdateBranch(_) | Mutation::Unsubscribe(_) | Mutation::CheckoutPr { .. } => {
                None
            }
        }
    }
}

/// Change to a pull request or issue row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemChange {
    Closed,
    Reopened,
    Merged,
    ReadyForReview,
    Commented(Comment),
    Labels(Vec<String>),
    Assigned(Vec<String>),
    Unassigned(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpdate {
    pub repo: String,
    pub number: u64,
    pub change: ItemChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationUpdate {
    Read(String),
    Done(String),
    AllRead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchUpdate {
    Deleted(String),
    CheckedOut(String),
}

/// Run `mutation` locally or on the forge.
pub async fn execute(forge: &dyn Forge, mutation: &Mutation) -> Result<()> {
    match mutation {
        Mutation::CheckoutPr { item, dir } => git::checkout_pr(dir, &item.repo, item.number).await,
        Mutation::CheckoutBranch { name, dir } => git::checkout(dir, name).await,
        Mutation::DeleteBranch { name, dir } => git::delete_branch(dir, name).await,
        _ => forge.execute(mutation).await,
    }
}

/// Task entry plus worker for one mutation.
///
/// A failed mutation carries no follow-up, so rows stay as they were.
pub fn mutation_cmds(forge: Arc<dyn Forge>, section: SectionId, mutation: Mutation) -> Vec<Cmd> {
    let task = Task::new(
        mutation.task_id(),
        mutation.start_text(),
        mutation.finished_text(),
    );
    let task_id = task.id.clone();

    let job = async move {
        info!(%task_id, local = mutation.is_local(), "running mutation");
        let (error, msg) = match execute(forge.as_ref(), &mutation).await {
            Ok(()) => (None, mutation.follow_up()),
            Err(err) => {
                warn!(%task_id, %err, "mutation failed");
                (Some(err.to_string()), None)
            }
        };
        Action::TaskFinished(TaskResult {
            task_id,
            generation: None,
            section: Some(section),
            error,
            msg,
        })
    };

    vec![Cmd::StartTask(task), Cmd::Spawn(job.boxed())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::fake::FakeForge;
    use crate::section::SectionKind;

    async fn run(forge: Arc<FakeForge>, mutation: Mutation) -> TaskResult {
        let section = SectionId::new(1, SectionKind::Prs);
        let mut cmds = mutation_cmds(forge, section, mutation).into_iter();
        assert!(matches!(cmds.next(), Some(Cmd::StartTask(_))));
        let Some(Cmd::Spawn(job)) = cmds.next() else {
            panic!("expected a job");
        };
        match job.await {
            Action::TaskFinished(result) => result,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn task_ids_and_texts() {
        let close = Mutation::Close(ItemRef::pr("acme/widgets", 7));
        assert_eq!(close.task_id(), "pr_close_7");
        assert_eq!(close.start_text(), "Closing PR #7");
        assert_eq!(close.finished_text(), "PR #7 has been closed");

        let reopen = Mutation::Reopen(ItemRef::issue("acme/widgets", 3));
        assert_eq!(reopen.task_id(), "issue_reopen_3");
        assert_eq!(reopen.finished_text(), "Issue #3 has been reopened");

        assert_eq!(ItemRef::pr("acme/widgets", 1).owner_name(), ("acme", "widgets"));
    }

    #[tokio::test]
    async fn success_carries_follow_up() {
        let forge = Arc::new(FakeForge::default());
        let mutation = Mutation::Close(ItemRef::pr("acme/widgets", 7));
        let result = run(forge.clone(), mutation.clone()).await;

        assert_eq!(result.task_id, "pr_close_7");
        assert!(result.error.is_none());
        match result.msg {
            Some(SectionMsg::ItemUpdated(update)) => {
                assert_eq!(update.number, 7);
                assert_eq!(update.change, ItemChange::Closed);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(forge.executed(), vec![mutation]);
    }

    #[tokio::test]
    async fn failure_has_no_follow_up() {
        let forge = Arc::new(FakeForge {
            fail_with: Some("forbidden".into()),
            ..Default::default()
        });
        let result = run(forge, Mutation::Merge(ItemRef::pr("acme/widgets", 9))).await;
        assert_eq!(result.error.as_deref(), Some("API error: forbidden"));
        assert!(result.msg.is_none());
    }

    #[test]
    fn comment_follow_up_appends_comment() {
        let mutation = Mutation::Comment {
            item: ItemRef::issue("acme/widgets", 4),
            author: "octocat".into(),
            body: "thanks".into(),
        };
        match mutation.follow_up() {
            Some(SectionMsg::ItemUpdated(ItemUpdate {
                change: ItemChange::Commented(comment),
                ..
            })) => {
                assert_eq!(comment.author, "octocat");
                assert_eq!(comment.body, "thanks");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Mutation::UpdateBranch(ItemRef::pr("a/b", 1)).follow_up().is_none());
    }

    #[test]
    fn local_mutations_are_flagged() {
        let delete = Mutation::DeleteBranch {
            name: "topic".into(),
            dir: PathBuf::from("."),
        };
        assert!(delete.is_local());
        assert!(!Mutation::MarkAllRead.is_local());
    }
}
