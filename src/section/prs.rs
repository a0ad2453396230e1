use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::action::{Cmd, SectionMsg};
use crate::config::{SectionConfig, ViewKind};
use crate::context::ProgramContext;
use crate::error::{DashError, Result};
use crate::fetch::{fetch_cmds, Delivery, Feed};
use crate::mutation::{mutation_cmds, ItemChange, ItemRef, ItemUpdate, Mutation};
use crate::types::{format_age, PrState, PullRequest};

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
    Column::fixed("Updated", 8),
];

const APPROVE_BODY: &str = "LGTM";

pub struct PrsSection {
    base: SectionBase,
    feed: Feed<PullRequest>,
}

fn state_icon(pr: &PullRequest) -> &'static str {
    match pr.state {
        PrState::Open if pr.is_draft => "◌",
        PrState::Open => "○",
        PrState::Merged => "●",
        PrState::Closed => "✗",
    }
}

fn apply_change(pr: &mut PullRequest, change: &ItemChange) {
    if apply_common_change(
        change,
        &mut pr.labels,
        &mut pr.assignees,
        &mut pr.comments,
        &mut pr.recent_comments,
    ) {
        return;
    }
    match change {
        ItemChange::Closed => pr.state = PrState::Closed,
        ItemChange::Reopened => pr.state = PrState::Open,
        ItemChange::Merged => pr.state = PrState::Merged,
        ItemChange::ReadyForReview => pr.is_draft = false,
        _ => {}
    }
}

impl PrsSection {
    pub fn new(id: usize, config: SectionConfig, ctx: Arc<ProgramContext>) -> Self {
        let limit = ctx.config.limit_for(ViewKind::Prs, &config);
        Self {
            base: SectionBase::new(
                SectionId::new(id, SectionKind::Prs),
                config,
                limit,
                ctx,
                "is:pr",
                true,
            ),
            feed: Feed::new(),
        }
    }

    pub fn rows(&self) -> &[PullRequest] {
        &self.feed.rows
    }

    /// The query sent to the search API.
    pub fn query(&self) -> String {
        let search = self.base.effective_search_value();
        if search.is_empty() {
            "is:pr sort:updated".to_string()
        } else {
            format!("is:pr {} sort:updated", search)
        }
    }

    fn current(&self) -> Result<&PullRequest> {
        self.feed
            .rows
            .get(self.base.cursor)
            .ok_or_else(|| DashError::Precondition("No PR selected".into()))
    }

    fn current_ref(&self) -> Result<ItemRef> {
        let pr = self.current()?;
        Ok(ItemRef::pr(pr.repo.clone(), pr.number))
    }

    fn mutate(&self, mutation: Mutation) -> Vec<Cmd> {
        mutation_cmds(self.base.ctx.forge.clone(), self.base.id, mutation)
    }

    fn apply_update(&mut self, update: ItemUpdate) {
        if let Some(pr) = self
            .feed
            .rows
            .iter_mut()
            .find(|pr| pr.number == update.number && pr.repo == update.repo)
        {
            apply_change(pr, &update.change);
        }
    }
}

impl Section for PrsSection {
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
            .map(|pr| {
                DisplayRow::new(vec![
                    state_icon(pr).to_string(),
                    pr.repo.clone(),
                    format!("#{}", pr.number),
                    pr.title.clone(),
                    pr.author.clone(),
                    format_age(pr.updated_at, now),
                ])
            })
            .collect()
    }

    fn current_row(&self) -> Option<RowRef<'_>> {
        self.feed.rows.get(self.base.cursor).map(RowRef::Pr)
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
            format!(r#"Fetching PRs for "{}""#, title),
            format!(r#"PRs for "{}" have been fetched"#, title),
            async move { forge.search_prs(&query, limit, cursor.as_deref()).await },
            SectionMsg::PrsFetched,
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
            SectionMsg::PrsFetched(fetched) => {
                if self.feed.deliver(fetched) == Delivery::Applied {
                    self.clamp_cursor();
                }
            }
            SectionMsg::FetchFailed { task_id, error } => {
                self.feed.fail(&task_id, error);
            }
            SectionMsg::ItemUpdated(update) => self.apply_update(update),
            _ => {}
        }
        Vec::new()
    }

    fn run_prompt_action(&mut self, action: PromptAction) -> Result<Vec<Cmd>> {
        let item = self.current_ref()?;
        let mutation = match action {
            PromptAction::Close => Mutation::Close(item),
            PromptAction::Reopen => Mutation::Reopen(item),
            PromptAction::Ready => Mutation::Ready {
                node_id: self.current()?.node_id.clone(),
                item,
            },
            PromptAction::Merge => Mutation::Merge(item),
            PromptAction::Update => Mutation::UpdateBranch(item),
            other => {
                return Err(DashError::Unsupported(format!(
                    "{:?} is not available for PRs",
                    other
                )))
            }
        };
        Ok(self.mutate(mutation))
    }

    fn row_action(&mut self, action: RowAction) -> Result<Vec<Cmd>> {
        let item = self.current_ref()?;
        let mutation = match action {
            RowAction::Submit { kind, text } => {
                match submit_mutation(&self.base.ctx, item, kind, &text) {
                    Some(m) => m,
                    None => return Ok(Vec::new()),
                }
            }
            RowAction::Approve => Mutation::Approve {
                item,
                author: self.base.ctx.user.clone().unwrap_or_default(),
                body: APPROVE_BODY.to_string(),
            },
            RowAction::Checkout => {
                let dir = self.base.ctx.config.repo_local_path(&item.repo).ok_or_else(|| {
                    DashError::Precondition(format!(
                        "Local path to {} is not set, add it under [repo_paths] in your config",
                        item.repo
                    ))
                })?;
                Mutation::CheckoutPr { item, dir }
            }
            other => {
                return Err(DashError::Unsupported(format!(
                    "{:?} is not available for PRs",
                    other
                )))
            }
        };
        Ok(self.mutate(mutation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::InputKind;
    use crate::config::Config;
    use crate::context::test_context_with;
    use crate::forge::fake::FakeForge;
    use crate::section::testing::{pr, run, run_one};
    use crate::types::RepoRef;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn section(forge: Arc<FakeForge>, config: Config, repo: Option<RepoRef>) -> PrsSection {
        let ctx = test_context_with(config, repo, forge);
        PrsSection::new(
            1,
            SectionConfig {
                title: "Mine".into(),
                filters: "is:open author:@me".into(),
                limit: Some(2),
            },
            ctx,
        )
    }

    fn forge_with(n: u64) -> Arc<FakeForge> {
        Arc::new(FakeForge {
            prs: (1..=n).map(pr).collect(),
            ..Default::default()
        })
    }

    async fn fetch(s: &mut PrsSection) {
        let cmds = s.fetch_next_page();
        for result in run(cmds).await {
            if let Some(msg) = result.msg {
                s.update(msg);
            }
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[tokio::test]
    async fn pages_grow_until_exhausted() {
        let mut s = section(forge_with(3), Config::default(), None);
        assert_eq!(s.view().lines().last(), Some("No PRs were found that match the given filters"));

        fetch(&mut s).await;
        assert_eq!(s.num_rows(), 2);
        assert_eq!(s.total_count(), 3);

        let cmds = s.next_row();
        assert_eq!(cmds.len(), 2);
        for result in run(cmds).await {
            s.update(result.msg.unwrap());
        }
        assert_eq!(s.num_rows(), 3);

        assert!(s.fetch_next_page().is_empty());
        assert!(s.pager_content().contains("PR 2/3 (fetched 3)"));
    }

    #[tokio::test]
    async fn stale_page_is_dropped() {
        let mut s = section(forge_with(3), Config::default(), None);

        let first = s.fetch_next_page();
        s.reset_rows();
        let second = s.fetch_next_page();

        let stale = run_one(first).await;
        s.update(stale.msg.unwrap());
        assert_eq!(s.num_rows(), 0);
        assert!(s.is_loading());

        let fresh = run_one(second).await;
        s.update(fresh.msg.unwrap());
        assert_eq!(s.num_rows(), 2);
        assert!(!s.is_loading());
    }

    #[tokio::test]
    async fn failed_fetch_keeps_rows() {
        let forge = forge_with(3);
        let mut s = section(forge, Config::default(), None);
        fetch(&mut s).await;

        let ctx = test_context_with(
            Config::default(),
            None,
            Arc::new(FakeForge {
                fail_with: Some("rate limited".into()),
                ..Default::default()
            }),
        );
        s.base.ctx = ctx;
        s.restart();
        let result = run_one(s.fetch_next_page()).await;
        assert!(result.error.is_some());
        s.update(result.msg.unwrap());

        assert_eq!(s.num_rows(), 2);
        assert_eq!(s.error(), Some("API error: rate limited"));
        assert!(!s.is_loading());
    }

    #[tokio::test]
    async fn query_carries_smart_filter() {
        let forge = forge_with(1);
        let repo = RepoRef {
            host: "github.com".into(),
            owner: "acme".into(),
            name: "widgets".into(),
        };
        let mut s = section(forge.clone(), Config::default(), Some(repo));
        fetch(&mut s).await;
        assert_eq!(
            forge.queries(),
            vec!["is:pr repo:acme/widgets is:open author:@me sort:updated"]
        );

        let cmds = s.toggle_smart_filter();
        assert_eq!(s.num_rows(), 0);
        run(cmds).await;
        assert_eq!(
            forge.queries().last().map(String::as_str),
            Some("is:pr is:open author:@me sort:updated")
        );
    }

    #[tokio::test]
    async fn search_enter_refetches_and_escape_reverts() {
        let forge = forge_with(3);
        let mut s = section(forge.clone(), Config::default(), None);
        fetch(&mut s).await;

        s.start_search();
        s.handle_search_key(key(KeyCode::Char('x')));
        assert!(s.handle_search_key(key(KeyCode::Esc)).is_empty());
        assert_eq!(s.base().search.value(), "is:open author:@me");
        assert_eq!(s.num_rows(), 2);

        s.start_search();
        s.handle_search_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        for c in "is:closed".chars() {
            s.handle_search_key(key(KeyCode::Char(c)));
        }
        let cmds = s.handle_search_key(key(KeyCode::Enter));
        assert_eq!(s.num_rows(), 0);
        run(cmds).await;
        assert_eq!(
            forge.queries().last().map(String::as_str),
            Some("is:pr is:closed sort:updated")
        );
    }

    #[tokio::test]
    async fn confirmed_close_updates_row() {
        let forge = forge_with(1);
        let mut s = section(forge.clone(), Config::default(), None);
        fetch(&mut s).await;

        assert!(s.open_prompt(PromptAction::Close));
        let cmds = s.handle_prompt_key(key(KeyCode::Enter)).unwrap();
        assert!(!s.is_prompting());
        let result = run_one(cmds).await;
        assert_eq!(result.task_id, "pr_close_1");
        s.update(result.msg.unwrap());

        assert_eq!(s.rows()[0].state, PrState::Closed);
        assert_eq!(forge.executed(), vec![Mutation::Close(ItemRef::pr("acme/widgets", 1))]);
    }

    #[tokio::test]
    async fn declined_prompt_runs_nothing() {
        let forge = forge_with(1);
        let mut s = section(forge.clone(), Config::default(), None);
        fetch(&mut s).await;

        s.open_prompt(PromptAction::Merge);
        s.handle_prompt_key(key(KeyCode::Char('n'))).unwrap();
        let cmds = s.handle_prompt_key(key(KeyCode::Enter)).unwrap();
        assert!(cmds.is_empty());
        assert!(forge.executed().is_empty());
        assert_eq!(s.rows()[0].state, PrState::Open);
    }

    #[tokio::test]
    async fn checkout_without_local_path_is_rejected() {
        let mut s = section(forge_with(1), Config::default(), None);
        fetch(&mut s).await;

        match s.row_action(RowAction::Checkout) {
            Err(DashError::Precondition(msg)) => assert!(msg.contains("acme/widgets")),
            other => panic!("unexpected {:?}", other.map(|c| c.len())),
        }
        assert_eq!(s.rows()[0].state, PrState::Open);
    }

    #[tokio::test]
    async fn submitted_labels_and_comment_apply() {
        let forge = forge_with(1);
        let mut s = section(forge, Config::default(), None);
        fetch(&mut s).await;

        let cmds = s
            .row_action(RowAction::Submit {
                kind: InputKind::Labels,
                text: "bug, feature, ".into(),
            })
            .unwrap();
        s.update(run_one(cmds).await.msg.unwrap());
        assert_eq!(s.rows()[0].labels, vec!["bug", "feature"]);

        let cmds = s.row_action(RowAction::Approve).unwrap();
        s.update(run_one(cmds).await.msg.unwrap());
        assert_eq!(s.rows()[0].comments, 1);
        assert_eq!(s.rows()[0].recent_comments[0].body, "LGTM");

        let blank = s
            .row_action(RowAction::Submit {
                kind: InputKind::Comment,
                text: "   ".into(),
            })
            .unwrap();
        assert!(blank.is_empty());
    }
}
