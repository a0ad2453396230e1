use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::action::{Cmd, SectionMsg};
use crate::config::{SectionConfig, ViewKind};
use crate::context::ProgramContext;
use crate::error::{DashError, Result};
use crate::fetch::{fetch_cmds, Delivery, Feed};
use crate::mutation::{mutation_cmds, ItemChange, ItemRef, Mutation};
use crate::types::{format_age, Issue, IssueState};

use super::prompt::PromptAction;
use super::{
    apply_common_change, submit_mutation, Column, DisplayRow, RowAction, RowRef, Section,
    SectionBase, SectionId, SectionKind,
};

const COLUMNS: &[Column] = &[
    Column::fixed("", 2),
    Column::fixed("Repo", 20),
    Column::fixed("#", 6),
    Column::fill("Title"),
    Column::fixed("Author", 14),
    Column::fixed("Comments", 8),
    Column::fixed("Updated", 8),
];

pub struct IssuesSection {
    base: SectionBase,
    feed: Feed<Issue>,
}

impl IssuesSection {
    pub fn new(id: usize, config: SectionConfig, ctx: Arc<ProgramContext>) -> Self {
        let limit = ctx.config.limit_for(ViewKind::Issues, &config);
        Self {
            base: SectionBase::new(
                SectionId::new(id, SectionKind::Issues),
                config,
                limit,
                ctx,
                "is:issue",
                true,
            ),
            feed: Feed::new(),
        }
    }

    pub fn rows(&self) -> &[Issue] {
        &self.feed.rows
    }

    pub fn query(&self) -> String {
        format!("is:issue {}", self.base.effective_search_value())
            .trim_end()
            .to_string()
    }

    fn current_ref(&self) -> Result<ItemRef> {
        self.feed
            .rows
            .get(self.base.cursor)
            .map(|i| ItemRef::issue(i.repo.clone(), i.number))
            .ok_or_else(|| DashError::Precondition("No issue selected".into()))
    }
}

impl Section for IssuesSection {
    fn base(&self) -> &SectionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SectionBase {
        &mut self.base
    }

    fn num_rows(&self) -> usize {
        self.feed.rows.len()
    }

    fn columns(&self) -> &'static [Column] {
        COLUMNS
    }

    fn build_rows(&self) -> Vec<DisplayRow> {
        let now = Utc::now();
        self.feed
            .rows
            .iter()
            .map(|issue| {
                let icon = match issue.state {
                    IssueState::Open => "○",
                    IssueState::Closed => "✓",
                };
                DisplayRow::new(vec![
                    icon.to_string(),
                    issue.repo.clone(),
                    format!("#{}", issue.number),
                    issue.title.clone(),
                    issue.author.clone(),
                    issue.comments.to_string(),
                    format_age(issue.updated_at, now),
                ])
            })
            .collect()
    }

    fn current_row(&self) -> Option<RowRef<'_>> {
        self.feed.rows.get(self.base.cursor).map(RowRef::Issue)
    }

    fn is_loading(&self) -> bool {
        self.feed.is_loading
    }

    fn error(&self) -> Option<&str> {
        self.feed.error.as_deref()
    }

    fn total_count(&self) -> usize {
        self.feed.total_count
    }

    fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.feed.last_updated
    }

    fn has_fetched(&self) -> bool {
        self.feed.last_fetch_task_id.is_some()
    }

    fn fetch_next_page(&mut self) -> Vec<Cmd> {
        let Some(ticket) = self.feed.begin(&self.base.id.fetch_prefix()) else {
            return Vec::new();
        };

        let forge = self.base.ctx.forge.clone();
        let query = self.query();
        let limit = self.base.limit;
        let cursor = ticket.cursor.clone();
        let title = self.base.title().to_string();

        fetch_cmds(
            self.base.id,
            &ticket,
            format!(r#"Fetching issues for "{}""#, title),
            format!(r#"Issues for "{}" have been fetched"#, title),
            async move { forge.search_issues(&query, limit, cursor.as_deref()).await },
            SectionMsg::IssuesFetched,
        )
    }

    fn reset_rows(&mut self) {
        self.feed.reset();
        self.base.cursor = 0;
    }

    fn restart(&mut self) {
        self.feed.restart();
    }

    fn update(&mut self, msg: SectionMsg) -> Vec<Cmd> {
        match msg {
            SectionMsg::IssuesFetched(fetched) => {
                if self.feed.deliver(fetched) == Delivery::Applied {
                    self.clamp_cursor();
                }
            }
            SectionMsg::FetchFailed { task_id, error } => {
                self.feed.fail(&task_id, error);
            }
            SectionMsg::ItemUpdated(update) => {
                let Some(issue) = self
                    .feed
                    .rows
                    .iter_mut()
                    .find(|i| i.number == update.number && i.repo == update.repo)
                else {
                    return Vec::new();
                };
                let handled = apply_common_change(
                    &update.change,
                    &mut issue.labels,
                    &mut issue.assignees,
                    &mut issue.comments,
                    &mut issue.recent_comments,
                );
                if !handled {
                    match update.change {
                        ItemChange::Closed => issue.state = IssueState::Closed,
                        ItemChange::Reopened => issue.state = IssueState::Open,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        Vec::new()
    }

    fn run_prompt_action(&mut self, action: PromptAction) -> Result<Vec<Cmd>> {
        let item = self.current_ref()?;
        let mutation = match action {
            PromptAction::Close => Mutation::Close(item),
            PromptAction::Reopen => Mutation::Reopen(item),
            other => {
                return Err(DashError::Unsupported(format!(
                    "{:?} is not available for issues",
                    other
                )))
            }
        };
        Ok(mutation_cmds(self.base.ctx.forge.clone(), self.base.id, mutation))
    }

    fn row_action(&mut self, action: RowAction) -> Result<Vec<Cmd>> {
        let item = self.current_ref()?;
        let (kind, text) = match action {
            RowAction::Submit { kind, text } => (kind, text),
            other => {
                return Err(DashError::Unsupported(format!(
                    "{:?} is not available for issues",
                    other
                )))
            }
        };
        Ok(match submit_mutation(&self.base.ctx, item, kind, &text) {
            Some(mutation) => mutation_cmds(self.base.ctx.forge.clone(), self.base.id, mutation),
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::InputKind;
    use crate::config::Config;
    use crate::context::test_context_with;
    use crate::forge::fake::FakeForge;
    use crate::section::testing::{issue, run, run_one};

    fn section(forge: Arc<FakeForge>) -> IssuesSection {
        let ctx = test_context_with(Config::default(), None, forge);
        IssuesSection::new(
            2,
            SectionConfig {
                title: "Assigned".into(),
                filters: "is:open assignee:@me".into(),
                limit: None,
            },
            ctx,
        )
    }

    async fn loaded(forge: Arc<FakeForge>) -> IssuesSection {
        let mut s = section(forge);
        for result in run(s.fetch_next_page()).await {
            s.update(result.msg.unwrap());
        }
        s
    }

    #[tokio::test]
    async fn fetches_with_issue_prefix() {
        let forge = Arc::new(FakeForge {
            issues: vec![issue(1), issue(2)],
            ..Default::default()
        });
        let s = loaded(forge.clone()).await;
        assert_eq!(s.num_rows(), 2);
        assert_eq!(forge.queries(), vec!["is:issue is:open assignee:@me"]);
        assert_eq!(s.build_rows()[0].cells[2], "#1");
    }

    #[tokio::test]
    async fn reopen_and_unassign_apply_after_success() {
        let forge = Arc::new(FakeForge {
            issues: vec![issue(5)],
            ..Default::default()
        });
        let mut s = loaded(forge).await;

        s.update(SectionMsg::ItemUpdated(crate::mutation::ItemUpdate {
            repo: "acme/widgets".into(),
            number: 5,
            change: ItemChange::Closed,
        }));
        assert_eq!(s.rows()[0].state, IssueState::Closed);

        let cmds = s.run_prompt_action(PromptAction::Reopen).unwrap();
        s.update(run_one(cmds).await.msg.unwrap());
        assert_eq!(s.rows()[0].state, IssueState::Open);

        let cmds = s
            .row_action(RowAction::Submit {
                kind: InputKind::Unassign,
                text: "@carol".into(),
            })
            .unwrap();
        s.update(run_one(cmds).await.msg.unwrap());
        assert!(s.rows()[0].assignees.is_empty());
    }

    #[tokio::test]
    async fn merge_is_not_an_issue_action() {
        let forge = Arc::new(FakeForge {
            issues: vec![issue(1)],
            ..Default::default()
        });
        let mut s = loaded(forge).await;
        assert!(matches!(
            s.run_prompt_action(PromptAction::Merge),
            Err(DashError::Unsupported(_))
        ));
        assert!(!s.open_prompt(PromptAction::Merge));
    }

    #[tokio::test]
    async fn failed_mutation_leaves_row_untouched() {
        let forge = Arc::new(FakeForge {
            issues: vec![issue(1)],
            ..Default::default()
        });
        let mut s = loaded(forge).await;

        let failing = test_context_with(
            Config::default(),
            None,
            Arc::new(FakeForge {
                fail_with: Some("denied".into()),
                ..Default::default()
            }),
        );
        s.base.ctx = failing;
        let result = run_one(s.run_prompt_action(PromptAction::Close).unwrap()).await;
        assert_eq!(result.error.as_deref(), Some("API error: denied"));
        assert!(result.msg.is_none());
        assert_eq!(s.rows()[0].state, IssueState::Open);
    }
}
