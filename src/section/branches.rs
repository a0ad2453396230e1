use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::action::{Cmd, SectionMsg};
use crate::config::{SectionConfig, ViewKind};
use crate::context::ProgramContext;
use crate::error::{DashError, Result};
use crate::fetch::{fetch_cmds, Delivery, Feed};
use crate::git;
use crate::mutation::{mutation_cmds, BranchUpdate, Mutation};
use crate::types::{format_age, Branch};

use super::prompt::PromptAction;
use super::{Column, DisplayRow, RowAction, RowRef, Section, SectionBase, SectionId, SectionKind};

const COLUMNS: &[Column] = &[
    Column::fixed("", 2),
    Column::fill("Branch"),
    Column::fixed("Upstream", 24),
    Column::fixed("↑↓", 8),
    Column::fill("Last commit"),
    Column::fixed("Updated", 8),
];

/// Local branches of the working repository.
pub struct BranchesSection {
    base: SectionBase,
    feed: Feed<Branch>,
}

impl BranchesSection {
    pub fn new(id: usize, config: SectionConfig, ctx: Arc<ProgramContext>) -> Self {
        let limit = ctx.config.limit_for(ViewKind::Repo, &config);
        Self {
            base: SectionBase::new(
                SectionId::new(id, SectionKind::Branches),
                config,
                limit,
                ctx,
                "",
                false,
            ),
            feed: Feed::new(),
        }
    }

    pub fn rows(&self) -> &[Branch] {
        &self.feed.rows
    }

    fn current_name(&self) -> Result<String> {
        self.feed
            .rows
            .get(self.base.cursor)
            .map(|b| b.name.clone())
            .ok_or_else(|| DashError::Precondition("No branch selected".into()))
    }

    fn mutate(&self, mutation: Mutation) -> Vec<Cmd> {
        mutation_cmds(self.base.ctx.forge.clone(), self.base.id, mutation)
    }

    fn apply_update(&mut self, update: BranchUpdate) {
        match update {
            BranchUpdate::Deleted(name) => {
                self.feed.rows.retain(|b| b.name != name);
                self.feed.total_count = self.feed.rows.len();
                self.clamp_cursor();
            }
            BranchUpdate::CheckedOut(name) => {
                for b in &mut self.feed.rows {
                    b.is_current = b.name == name;
                }
                git::sort_branches(&mut self.feed.rows);
                self.base.cursor = 0;
            }
        }
    }
}

impl Section for BranchesSection {
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
            .map(|b| {
                let sync = match (b.ahead, b.behind) {
                    (0, 0) => String::new(),
                    (a, 0) => format!("↑{}", a),
                    (0, d) => format!("↓{}", d),
                    (a, d) => format!("↑{} ↓{}", a, d),
                };
                DisplayRow::new(vec![
                    if b.is_current { "*" } else { " " }.to_string(),
                    b.name.clone(),
                    b.upstream.clone().unwrap_or_default(),
                    sync,
                    b.last_commit_message.clone(),
                    format_age(b.last_commit_at, now),
                ])
            })
            .collect()
    }

    fn current_row(&self) -> Option<RowRef<'_>> {
        self.feed.rows.get(self.base.cursor).map(RowRef::Branch)
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

        let dir = self.base.ctx.repo_dir.clone();
        let repo = self.base.ctx.repo.clone();
        let needle = self.base.effective_search_value().to_lowercase();
        let limit = self.base.limit as usize;

        fetch_cmds(
            self.base.id,
            &ticket,
            "Reading local branches".to_string(),
            "Branches have been read".to_string(),
            async move {
                let mut page = git::list_branches(&dir, repo.as_ref()).await?;
                page.rows
                    .retain(|b| needle.is_empty() || b.name.to_lowercase().contains(&needle));
                page.rows.truncate(limit);
                page.total_count = page.rows.len();
                Ok(page)
            },
            SectionMsg::BranchesFetched,
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
            SectionMsg::BranchesFetched(fetched) => {
                if self.feed.deliver(fetched) == Delivery::Applied {
                    self.clamp_cursor();
                }
            }
            SectionMsg::FetchFailed { task_id, error } => {
                self.feed.fail(&task_id, error);
            }
            SectionMsg::BranchUpdated(update) => self.apply_update(update),
            _ => {}
        }
        Vec::new()
    }

    fn run_prompt_action(&mut self, action: PromptAction) -> Result<Vec<Cmd>> {
        match action {
            PromptAction::Delete => {
                let name = self.current_name()?;
                if self.feed.rows.get(self.base.cursor).is_some_and(|b| b.is_current) {
                    return Err(DashError::Precondition(format!(
                        "Cannot delete the checked out branch {}",
                        name
                    )));
                }
                Ok(self.mutate(Mutation::DeleteBranch {
                    name,
                    dir: self.base.ctx.repo_dir.clone(),
                }))
            }
            other => Err(DashError::Unsupported(format!(
                "{:?} is not available for branches",
                other
            ))),
        }
    }

    fn row_action(&mut self, action: RowAction) -> Result<Vec<Cmd>> {
        match action {
            RowAction::Checkout => {
                let name = self.current_name()?;
                Ok(self.mutate(Mutation::CheckoutBranch {
                    name,
                    dir: self.base.ctx.repo_dir.clone(),
                }))
            }
            other => Err(DashError::Unsupported(format!(
                "{:?} is not available for branches",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::test_context;
    use crate::fetch::Fetched;
    use crate::section::testing::branch;
    use crate::types::{Page, PageInfo};

    fn section() -> BranchesSection {
        BranchesSection::new(
            0,
            SectionConfig {
                title: "Local".into(),
                filters: String::new(),
                limit: None,
            },
            test_context(Config::default(), None),
        )
    }

    /// Deliver `rows` as the answer to a freshly dispatched fetch.
    fn loaded(rows: Vec<Branch>) -> BranchesSection {
        let mut s = section();
        let task_id = s
            .fetch_next_page()
            .into_iter()
            .find_map(|cmd| match cmd {
                Cmd::StartTask(task) => Some(task.id),
                _ => None,
            })
            .unwrap();
        s.update(SectionMsg::BranchesFetched(Fetched {
            task_id,
            page: Page {
                total_count: rows.len(),
                rows,
                page_info: PageInfo::default(),
            },
            appending: false,
        }));
        s
    }

    #[tokio::test]
    async fn single_page_listing() {
        let mut s = loaded(vec![branch("main", true), branch("topic", false)]);
        assert_eq!(s.num_rows(), 2);
        assert!(s.fetch_next_page().is_empty());
        assert_eq!(s.build_rows()[0].cells[0], "*");
        assert!(s.pager_content().ends_with("Branch 1/2 (fetched 2)"));
    }

    #[tokio::test]
    async fn checkout_moves_current_marker_to_top() {
        let mut s = loaded(vec![branch("main", true), branch("topic", false)]);
        s.next_row();
        let cmds = s.row_action(RowAction::Checkout).unwrap();
        assert!(matches!(&cmds[0], Cmd::StartTask(t) if t.id == "branch_checkout_topic"));

        s.update(SectionMsg::BranchUpdated(BranchUpdate::CheckedOut("topic".into())));
        assert_eq!(s.rows()[0].name, "topic");
        assert!(s.rows()[0].is_current);
        assert!(!s.rows()[1].is_current);
        assert_eq!(s.cursor(), 0);
    }

    #[tokio::test]
    async fn delete_removes_row_and_refuses_current() {
        let mut s = loaded(vec![branch("main", true), branch("old", false)]);
        assert!(matches!(
            s.run_prompt_action(PromptAction::Delete),
            Err(DashError::Precondition(_))
        ));

        s.last_row();
        let cmds = s.run_prompt_action(PromptAction::Delete).unwrap();
        assert!(matches!(&cmds[0], Cmd::StartTask(t) if t.id == "branch_delete_old"));

        s.update(SectionMsg::BranchUpdated(BranchUpdate::Deleted("old".into())));
        assert_eq!(s.num_rows(), 1);
        assert_eq!(s.cursor(), 0);
    }

    #[tokio::test]
    async fn pr_actions_are_unsupported() {
        let mut s = loaded(vec![branch("main", true)]);
        assert!(s.run_prompt_action(PromptAction::Merge).is_err());
        assert!(s.row_action(RowAction::MarkRead).is_err());
        assert!(!s.open_prompt(PromptAction::Close));
        assert!(s.open_prompt(PromptAction::Delete));
    }
}
