use async_trait::async_trait;

use crate::error::Result;
use crate::mutation::Mutation;
use crate::types::{Issue, Notification, NotificationQuery, Page, PullRequest, ThreadActivity};

/// A hosting service the dashboard reads from and acts on.
///
/// Cursors are opaque to callers: pass back whatever `PageInfo::end_cursor` held.
#[async_trait]
pub trait Forge: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn current_user(&self) -> Result<String>;

    async fn search_prs(
        &self,
        query: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<PullRequest>>;

    async fn search_issues(&self, query: &str, limit: u32, cursor: Option<&str>)
        -> Result<Page<Issue>>;

    async fn list_notifications(
        &self,
        query: &NotificationQuery,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Page<Notification>>;

    async fn get_notification(&self, id: &str) -> Result<Notification>;

    /// Comment count, state and last actor of an issue or pull request thread.
    async fn thread_activity(&self, thread: &Notification) -> Result<ThreadActivity>;

    async fn list_labels(&self, repo: &str) -> Result<Vec<String>>;

    /// Perform a remote mutation. Local ones never reach the forge.
    async fn execute(&self, mutation: &Mutation) -> Result<()>;
}
