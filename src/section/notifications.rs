//! Notification threads, merged with the bookmark, done and session overrides.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use regex::Regex;
use tracing::{debug, warn};

use crate::action::{Action, Cmd, SectionMsg, TaskResult};
use crate::config::{SectionConfig, ViewKind};
use crate::context::ProgramContext;
use crate::error::{DashError, Result};
use crate::fetch::{fetch_cmds, Delivery, Feed};
use crate::forge::Forge;
use crate::mutation::{mutation_cmds, Mutation, NotificationUpdate};
use crate::store::{DoneStore, OverrideStore, SessionSet};
use crate::task::Task;
use crate::types::{format_age, Notification, NotificationQuery, Page, ThreadActivity};

use super::prompt::PromptAction;
use super::{Column, DisplayRow, RowAction, RowRef, Section, SectionBase, SectionId, SectionKind};

const COLUMNS: &[Column] = &[
    Column::fixed("", 2),
    Column::fixed("", 2),
    Column::fixed("Repo", 20),
    Column::fill("Title"),
    Column::fixed("Activity", 32),
    Column::fixed("", 4),
    Column::fixed("Updated", 8),
];

const PARTICIPATING_REASONS: [&str; 6] = [
    "author",
    "comment",
    "mention",
    "review_requested",
    "assign",
    "state_change",
];

fn token_regex(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| DashError::Unsupported(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Unread threads plus bookmarked ones.
    Default,
    Unread,
    Read,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFilter {
    pub repos: Vec<String>,
    pub read_state: ReadState,
    pub reasons: Vec<String>,
}

impl NotificationFilter {
    pub fn include_bookmarked(&self) -> bool {
        self.read_state == ReadState::Default
    }

    /// Parameters for the remote listing. Multiple repositories are filtered locally.
    pub fn query(&self) -> NotificationQuery {
        NotificationQuery {
            repo: match self.repos.as_slice() {
                [repo] => Some(repo.clone()),
                _ => None,
            },
            all: matches!(self.read_state, ReadState::Read | ReadState::All),
            participating: false,
        }
    }

    fn repo_matches(&self, repo: &str) -> bool {
        self.repos.is_empty() || self.repos.iter().any(|r| r == repo)
    }
}

fn normalize_reason(reason: &str) -> String {
    match reason {
        "review-requested" => "review_requested",
        "team-mention" => "team_mention",
        "ci-activity" => "ci_activity",
        "security-alert" => "security_alert",
        "state-change" => "state_change",
        other => other,
    }
    .to_string()
}

/// Parse `repo:`, `is:` and `reason:` tokens. Everything else is ignored.
pub fn parse_filter(search: &str) -> Result<NotificationFilter> {
    let repos = token_regex(r"repo:(\S+)")?
        .captures_iter(search)
        .map(|c| c[1].to_string())
        .collect();

    let mut reasons = Vec::new();
    for cap in token_regex(r"reason:(\S+)")?.captures_iter(search) {
        match &cap[1] {
            "participating" => reasons.extend(PARTICIPATING_REASONS.iter().map(|r| r.to_string())),
            other => reasons.push(normalize_reason(other)),
        }
    }

    let states: HashSet<String> = token_regex(r"is:(unread|read|done|all)")?
        .captures_iter(search)
        .map(|c| c[1].to_string())
        .collect();
    if states.contains("done") {
        return Err(DashError::Unsupported(
            "done notifications cannot be retrieved".into(),
        ));
    }

    let read_state = if states.contains("all") || (states.contains("unread") && states.contains("read")) {
        ReadState::All
    } else if states.contains("read") {
        ReadState::Read
    } else if states.contains("unread") {
        ReadState::Unread
    } else {
        ReadState::Default
    };

    Ok(NotificationFilter {
        repos,
        read_state,
        reasons,
    })
}

/// Snapshot of the local overrides taken when a fetch is dispatched.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bookmarks: HashSet<String>,
    pub session_read: HashSet<String>,
    pub session_done: HashSet<String>,
    pub done: DoneStore,
}

impl Overrides {
    /// Whether a fetched thread belongs in the list.
    pub fn includes(&self, n: &Notification, filter: &NotificationFilter) -> bool {
        if self.done.hides(&n.id, n.updated_at) || self.session_done.contains(&n.id) {
            return false;
        }
        if !filter.repo_matches(&n.repo) {
            return false;
        }

        let include = if self.session_read.contains(&n.id) {
            true
        } else {
            match filter.read_state {
                ReadState::Default => n.unread || self.bookmarks.contains(&n.id),
                ReadState::Unread => n.unread,
                ReadState::Read => !n.unread,
                ReadState::All => true,
            }
        };

        include && (filter.reasons.is_empty() || filter.reasons.contains(&n.reason))
    }

    /// Threads that must be fetched one by one because the listing may not contain them.
    fn missing_ids(&self, page: &[Notification], filter: &NotificationFilter) -> Vec<String> {
        let fetched: HashSet<&str> = page.iter().map(|n| n.id.as_str()).collect();
        let mut wanted: Vec<&String> = Vec::new();
        if filter.include_bookmarked() {
            wanted.extend(self.bookmarks.iter());
        }
        wanted.extend(self.session_read.iter());

        let mut missing: Vec<String> = Vec::new();
        for id in wanted {
            if !fetched.contains(id.as_str()) && !missing.contains(id) {
                missing.push(id.clone());
            }
        }
        missing.sort();
        missing
    }
}

/// Fetch pages until `limit` threads survive the overrides or the listing runs out.
async fn fetch_filtered(
    forge: Arc<dyn Forge>,
    filter: NotificationFilter,
    overrides: Overrides,
    limit: u32,
    mut cursor: Option<String>,
) -> Result<Page<Notification>> {
    let query = filter.query();
    let mut first_page = cursor.is_none();
    let mut included: Vec<Notification> = Vec::new();

    loop {
        let mut page = forge
            .list_notifications(&query, limit, cursor.as_deref())
            .await?;

        if first_page {
            first_page = false;
            let missing = overrides.missing_ids(&page.rows, &filter);
            let fetched = join_all(missing.iter().map(|id| forge.get_notification(id))).await;
            for (id, result) in missing.iter().zip(fetched) {
                match result {
                    Ok(n) => page.rows.push(n),
                    Err(err) => debug!(%id, %err, "could not fetch thread"),
                }
            }
        }

        included.extend(page.rows.into_iter().filter(|n| overrides.includes(n, &filter)).map(
            |mut n| {
                n.is_bookmarked = overrides.bookmarks.contains(&n.id);
                n
            },
        ));

        let page_info = page.page_info;
        let next = page_info.end_cursor.clone().filter(|_| page_info.has_next_page);
        if included.len() >= limit as usize || next.is_none() {
            return Ok(Page {
                total_count: included.len(),
                rows: included,
                page_info,
            });
        }
        debug!(count = included.len(), limit, "fetching another page after filtering");
        cursor = next;
    }
}

/// Look up the subject of one thread. Failures only cost the extra detail.
async fn lookup_activity(forge: Arc<dyn Forge>, section: SectionId, thread: Notification) -> Action {
    let msg = match forge.thread_activity(&thread).await {
        Ok(activity) => Some(SectionMsg::NotificationActivity {
            id: thread.id.clone(),
            activity,
        }),
        Err(err) => {
            debug!(id = %thread.id, %err, "could not look up thread activity");
            None
        }
    };
    Action::TaskFinished(TaskResult {
        task_id: format!("notification_activity_{}", thread.id),
        generation: None,
        section: Some(section),
        error: None,
        msg,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Updated,
    Repo,
}

pub struct NotificationsSection {
    base: SectionBase,
    feed: Feed<Notification>,
    sort: SortOrder,
    session_read: SessionSet,
    session_done: SessionSet,
}

impl NotificationsSection {
    pub fn new(id: usize, config: SectionConfig, ctx: Arc<ProgramContext>) -> Self {
        let limit = ctx.config.limit_for(ViewKind::Notifications, &config);
        Self {
            base: SectionBase::new(
                SectionId::new(id, SectionKind::Notifications),
                config,
                limit,
                ctx,
                "",
                true,
            ),
            feed: Feed::new(),
            sort: SortOrder::Updated,
            session_read: SessionSet::default(),
            session_done: SessionSet::default(),
        }
    }

    pub fn rows(&self) -> &[Notification] {
        &self.feed.rows
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort
    }

    fn overrides(&self) -> Overrides {
        let stores = self.base.ctx.stores.lock();
        Overrides {
            bookmarks: stores.bookmarks.all_marked(),
            session_read: self.session_read.all_marked(),
            session_done: self.session_done.all_marked(),
            done: stores.done.clone(),
        }
    }

    fn current(&self) -> Result<&Notification> {
        self.feed
            .rows
            .get(self.base.cursor)
            .ok_or_else(|| DashError::Precondition("No notification selected".into()))
    }

    fn sort_rows(&mut self) {
        match self.sort {
            SortOrder::Updated => self.feed.rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            SortOrder::Repo => self.feed.rows.sort_by(|a, b| {
                a.repo
                    .cmp(&b.repo)
                    .then_with(|| b.updated_at.cmp(&a.updated_at))
            }),
        }
    }

    /// Background lookups for threads that arrived without activity.
    fn activity_cmds(&self, ids: &HashSet<String>) -> Vec<Cmd> {
        self.feed
            .rows
            .iter()
            .filter(|n| ids.contains(&n.id) && n.activity.is_none() && n.has_activity())
            .map(|n| {
                let forge = self.base.ctx.forge.clone();
                Cmd::Spawn(lookup_activity(forge, self.base.id, n.clone()).boxed())
            })
            .collect()
    }

    /// Activity already looked up, keyed by thread and the update it was looked up for.
    fn known_activity(&self) -> HashMap<String, (DateTime<Utc>, ThreadActivity)> {
        self.feed
            .rows
            .iter()
            .filter_map(|n| Some((n.id.clone(), (n.updated_at, n.activity.clone()?))))
            .collect()
    }

    /// Reattach activity to refetched threads that saw no update since.
    fn restore_activity(&mut self, mut known: HashMap<String, (DateTime<Utc>, ThreadActivity)>) {
        for n in self.feed.rows.iter_mut().filter(|n| n.activity.is_none()) {
            if let Some((at, activity)) = known.remove(&n.id) {
                if at == n.updated_at {
                    n.activity = Some(activity);
                }
            }
        }
    }

    fn set_activity(&mut self, id: &str, activity: ThreadActivity) {
        match self.feed.rows.iter_mut().find(|n| n.id == id) {
            Some(n) => n.activity = Some(activity),
            None => debug!(%id, "thread activity for a row no longer listed"),
        }
    }

    fn mutate(&self, mutation: Mutation) -> Vec<Cmd> {
        mutation_cmds(self.base.ctx.forge.clone(), self.base.id, mutation)
    }

    /// Task entry plus an immediate failure, for filters that cannot be fetched.
    fn reject_cmds(&self, error: String) -> Vec<Cmd> {
        let task_id = format!("{}_rejected", self.base.id.fetch_prefix());
        let result = Action::TaskFinished(TaskResult {
            task_id: task_id.clone(),
            generation: None,
            section: Some(self.base.id),
            error: Some(error),
            msg: None,
        });
        vec![
            Cmd::StartTask(Task::new(task_id, "Fetching notifications", "")),
            Cmd::Spawn(futures::future::ready(result).boxed()),
        ]
    }

    fn apply_update(&mut self, update: NotificationUpdate) -> Result<()> {
        match update {
            NotificationUpdate::Read(id) => {
                if let Some(n) = self.feed.rows.iter_mut().find(|n| n.id == id) {
                    n.unread = false;
                }
                self.session_read.mark(&id)?;
            }
            NotificationUpdate::AllRead => {
                for n in &mut self.feed.rows {
                    n.unread = false;
                    self.session_read.mark(&n.id)?;
                }
            }
            NotificationUpdate::Done(id) => {
                self.session_done.mark(&id)?;
                self.feed.rows.retain(|n| n.id != id);
                self.feed.total_count = self.feed.rows.len();
                self.clamp_cursor();
                self.base.ctx.stores.lock().done.mark_at(&id, Utc::now())?;
            }
        }
        Ok(())
    }

    fn toggle_bookmark(&mut self) -> Result<()> {
        let id = self.current()?.id.clone();
        let marked = self.base.ctx.stores.lock().bookmarks.toggle(&id)?;
        if let Some(n) = self.feed.rows.iter_mut().find(|n| n.id == id) {
            n.is_bookmarked = marked;
        }
        Ok(())
    }
}

impl Section for NotificationsSection {
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
            .map(|n| {
                let mark = match (n.is_bookmarked, n.unread) {
                    (true, _) => "★",
                    (false, true) => "●",
                    (false, false) => " ",
                };
                let activity = match n.activity_description() {
                    text if text.is_empty() => n.reason.replace('_', " "),
                    text => text,
                };
                let new_comments = match &n.activity {
                    Some(a) if a.new_comments > 0 => format!("+{}", a.new_comments),
                    _ => String::new(),
                };
                DisplayRow {
                    cells: vec![
                        mark.to_string(),
                        n.subject_type.icon().to_string(),
                        n.repo.clone(),
                        n.subject_title.clone(),
                        activity,
                        new_comments,
                        format_age(n.updated_at, now),
                    ],
                    dimmed: !n.unread,
                }
            })
            .collect()
    }

    fn current_row(&self) -> Option<RowRef<'_>> {
        self.feed.rows.get(self.base.cursor).map(RowRef::Notification)
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
        self.feed.last_fetch_task_id.is_some() || self.feed.error.is_some()
    }

    fn fetch_next_page(&mut self) -> Vec<Cmd> {
        let filter = match parse_filter(&self.base.effective_search_value()) {
            Ok(filter) => filter,
            Err(err) => {
                let error = err.to_string();
                warn!(section = self.base.id.id, %error, "rejecting notification filter");
                self.feed.reject(error.clone());
                self.base.cursor = 0;
                return self.reject_cmds(error);
            }
        };

        let Some(ticket) = self.feed.begin(&self.base.id.fetch_prefix()) else {
            return Vec::new();
        };

        let forge = self.base.ctx.forge.clone();
        let overrides = self.overrides();
        let limit = self.base.limit;
        let cursor = ticket.cursor.clone();

        fetch_cmds(
            self.base.id,
            &ticket,
            "Fetching notifications".to_string(),
            "Notifications have been fetched".to_string(),
            fetch_filtered(forge, filter, overrides, limit, cursor),
            SectionMsg::NotificationsFetched,
        )
    }

    fn reset_rows(&mut self) {
        self.feed.reset();
        self.base.cursor = 0;
    }

    fn restart(&mut self) {
        self.feed.restart();
    }

    /// Manual refresh also forgets what was read or done this session.
    fn refresh(&mut self) -> Vec<Cmd> {
        self.session_read.clear();
        self.session_done.clear();
        self.reset_rows();
        self.fetch_next_page()
    }

    fn update(&mut self, msg: SectionMsg) -> Vec<Cmd> {
        match msg {
            SectionMsg::NotificationsFetched(fetched) => {
                let arrived: HashSet<String> =
                    fetched.page.rows.iter().map(|n| n.id.clone()).collect();
                let known = self.known_activity();
                if self.feed.deliver(fetched) == Delivery::Applied {
                    self.restore_activity(known);
                    self.feed.total_count = self.feed.rows.len();
                    self.sort_rows();
                    self.clamp_cursor();
                    return self.activity_cmds(&arrived);
                }
            }
            SectionMsg::NotificationActivity { id, activity } => {
                self.set_activity(&id, activity);
            }
            SectionMsg::FetchFailed { task_id, error } => {
                self.feed.fail(&task_id, error);
            }
            SectionMsg::NotificationUpdated(update) => {
                if let Err(err) = self.apply_update(update) {
                    warn!(%err, "could not record notification update");
                }
            }
            _ => {}
        }
        Vec::new()
    }

    fn run_prompt_action(&mut self, action: PromptAction) -> Result<Vec<Cmd>> {
        match action {
            PromptAction::Done => {
                let id = self.current()?.id.clone();
                Ok(self.mutate(Mutation::MarkDone(id)))
            }
            PromptAction::DoneAll => {
                let ids: Vec<String> = self.feed.rows.iter().map(|n| n.id.clone()).collect();
                Ok(ids
                    .into_iter()
                    .flat_map(|id| self.mutate(Mutation::MarkDone(id)))
                    .collect())
            }
            other => Err(DashError::Unsupported(format!(
                "{:?} is not available for notifications",
                other
            ))),
        }
    }

    fn row_action(&mut self, action: RowAction) -> Result<Vec<Cmd>> {
        match action {
            RowAction::MarkRead => {
                let id = self.current()?.id.clone();
                Ok(self.mutate(Mutation::MarkRead(id)))
            }
            RowAction::MarkAllRead => Ok(self.mutate(Mutation::MarkAllRead)),
            RowAction::Unsubscribe => {
                let id = self.current()?.id.clone();
                Ok(self.mutate(Mutation::Unsubscribe(id)))
            }
            RowAction::ToggleBookmark => {
                self.toggle_bookmark()?;
                Ok(Vec::new())
            }
            RowAction::ToggleSort => {
                self.sort = match self.sort {
                    SortOrder::Updated => SortOrder::Repo,
                    SortOrder::Repo => SortOrder::Updated,
                };
                self.sort_rows();
                Ok(Vec::new())
            }
            other => Err(DashError::Unsupported(format!(
                "{:?} is not available for notifications",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::test_context_with;
    use crate::forge::fake::FakeForge;
    use crate::section::testing::{notification, run, run_one};
    use crate::types::{PrState, SubjectType};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn section_with(forge: Arc<FakeForge>, filters: &str) -> NotificationsSection {
        let ctx = test_context_with(Config::default(), None, forge);
        NotificationsSection::new(
            1,
            SectionConfig {
                title: "All".into(),
                filters: filters.into(),
                limit: None,
            },
            ctx,
        )
    }

    fn forge(rows: Vec<Notification>) -> Arc<FakeForge> {
        Arc::new(FakeForge {
            notifications: rows,
            ..Default::default()
        })
    }

    /// Point the section at a new forge, keeping stores and session state.
    fn swap_forge(s: &mut NotificationsSection, rows: Vec<Notification>) {
        let mut ctx = (*s.base.ctx).clone();
        ctx.forge = forge(rows);
        s.base.ctx = Arc::new(ctx);
    }

    async fn apply(s: &mut NotificationsSection, cmds: Vec<Cmd>) {
        for result in run(cmds).await {
            if let Some(msg) = result.msg {
                s.update(msg);
            }
        }
    }

    fn ids(s: &NotificationsSection) -> Vec<&str> {
        s.rows().iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn filter_defaults_to_unread_with_bookmarks() {
        let f = parse_filter("").unwrap();
        assert_eq!(f.read_state, ReadState::Default);
        assert!(f.include_bookmarked());
        assert!(!f.query().all);
    }

    #[test]
    fn explicit_read_states() {
        assert_eq!(parse_filter("is:unread").unwrap().read_state, ReadState::Unread);
        assert_eq!(parse_filter("some text is:read").unwrap().read_state, ReadState::Read);
        assert_eq!(parse_filter("is:all").unwrap().read_state, ReadState::All);
        assert_eq!(parse_filter("is:unread is:read").unwrap().read_state, ReadState::All);
        assert!(!parse_filter("is:unread").unwrap().include_bookmarked());
        assert!(parse_filter("is:read").unwrap().query().all);
    }

    #[test]
    fn done_filter_is_rejected() {
        assert!(matches!(parse_filter("is:done"), Err(DashError::Unsupported(_))));
        assert!(parse_filter("is:done is:all").is_err());
    }

    #[test]
    fn reasons_and_repos() {
        let f = parse_filter("is:unread reason:participating repo:owner/repo").unwrap();
        assert_eq!(f.reasons.len(), 6);
        assert!(f.reasons.contains(&"review_requested".to_string()));
        assert_eq!(f.repos, vec!["owner/repo"]);
        assert_eq!(f.query().repo.as_deref(), Some("owner/repo"));

        let f = parse_filter("reason:team-mention repo:a/b repo:c/d").unwrap();
        assert_eq!(f.reasons, vec!["team_mention"]);
        assert_eq!(f.query().repo, None);
    }

    #[test]
    fn inclusion_order() {
        let mut overrides = Overrides::default();
        let default = parse_filter("").unwrap();
        let unread_only = parse_filter("is:unread").unwrap();

        let read = notification("r", false, "mention");
        assert!(!overrides.includes(&read, &default));

        overrides.bookmarks.insert("r".into());
        assert!(overrides.includes(&read, &default));
        assert!(!overrides.includes(&read, &unread_only));

        overrides.session_read.insert("r".into());
        assert!(overrides.includes(&read, &unread_only));
        assert!(!overrides.includes(&read, &parse_filter("reason:author").unwrap()));

        overrides.session_done.insert("r".into());
        assert!(!overrides.includes(&read, &default));
    }

    #[test]
    fn done_store_hides_until_new_activity() {
        let mut overrides = Overrides::default();
        let n = notification("d", true, "mention");
        overrides.done.mark_at("d", n.updated_at).unwrap();
        assert!(!overrides.includes(&n, &parse_filter("is:all").unwrap()));

        let newer = Notification {
            updated_at: n.updated_at + chrono::Duration::hours(1),
            ..n
        };
        assert!(overrides.includes(&newer, &parse_filter("is:all").unwrap()));
    }

    #[tokio::test]
    async fn session_read_survives_interval_refresh_only() {
        let mut s = section_with(
            forge(vec![
                notification("1", true, "mention"),
                notification("2", true, "author"),
            ]),
            "",
        );
        let cmds = s.fetch_next_page();
        apply(&mut s, cmds).await;
        assert_eq!(ids(&s), vec!["1", "2"]);

        let cmds = s.row_action(RowAction::MarkRead).unwrap();
        apply(&mut s, cmds).await;
        assert!(!s.rows()[0].unread);

        // the remote now reports thread 1 as read
        swap_forge(
            &mut s,
            vec![
                notification("1", false, "mention"),
                notification("2", true, "author"),
            ],
        );

        let cmds = s.interval_refresh();
        apply(&mut s, cmds).await;
        assert_eq!(ids(&s), vec!["2", "1"]);
        assert!(!s.rows()[1].unread);

        let cmds = s.refresh();
        apply(&mut s, cmds).await;
        assert_eq!(ids(&s), vec!["2"]);
    }

    #[tokio::test]
    async fn bookmarked_read_thread_stays_in_default_view() {
        let rows = vec![
            notification("1", false, "mention"),
            notification("2", true, "author"),
        ];
        let mut s = section_with(forge(rows), "");
        s.base.ctx.stores.lock().bookmarks.mark("1").unwrap();

        let cmds = s.fetch_next_page();
        apply(&mut s, cmds).await;
        assert_eq!(ids(&s), vec!["2", "1"]);
        assert!(s.rows()[1].is_bookmarked);
        assert_eq!(s.build_rows()[1].cells[0], "★");

        let mut explicit = section_with(
            forge(vec![
                notification("1", false, "mention"),
                notification("2", true, "author"),
            ]),
            "is:unread",
        );
        explicit.base.ctx.stores.lock().bookmarks.mark("1").unwrap();
        let cmds = explicit.fetch_next_page();
        apply(&mut explicit, cmds).await;
        assert_eq!(ids(&explicit), vec!["2"]);
    }

    #[tokio::test]
    async fn bookmarked_thread_is_not_repeated_by_a_later_page() {
        let rows = (1..=4).map(|i| notification(&i.to_string(), true, "mention")).collect();
        let ctx = test_context_with(Config::default(), None, forge(rows));
        let mut s = NotificationsSection::new(
            1,
            SectionConfig {
                title: "All".into(),
                filters: String::new(),
                limit: Some(2),
            },
            ctx,
        );
        s.base.ctx.stores.lock().bookmarks.mark("4").unwrap();

        let cmds = s.fetch_next_page();
        apply(&mut s, cmds).await;
        assert_eq!(s.num_rows(), 3);

        let cmds = s.fetch_next_page();
        apply(&mut s, cmds).await;
        let mut seen = ids(&s);
        seen.sort();
        assert_eq!(seen, vec!["1", "2", "3", "4"]);
        assert_eq!(s.total_count(), 4);
    }

    #[tokio::test]
    async fn activity_is_looked_up_after_each_page() {
        let mut pr_thread = notification("1", true, "comment");
        pr_thread.subject_type = SubjectType::PullRequest;
        let mut release = notification("2", true, "subscribed");
        release.subject_type = SubjectType::Release;

        let mut activity = HashMap::new();
        activity.insert(
            "1".to_string(),
            ThreadActivity {
                new_comments: 3,
                subject_state: Some(PrState::Open),
                is_draft: true,
                last_actor: Some("dave".into()),
            },
        );
        let forge = Arc::new(FakeForge {
            notifications: vec![pr_thread, release],
            activity,
            ..Default::default()
        });
        let mut s = section_with(forge, "");

        let cmds = s.fetch_next_page();
        let mut lookups = Vec::new();
        for result in run(cmds).await {
            lookups.extend(s.update(result.msg.unwrap()));
        }
        assert_eq!(lookups.len(), 1);
        assert_eq!(s.build_rows()[0].cells[4], "New comment");

        for result in run(lookups).await {
            assert_eq!(result.task_id, "notification_activity_1");
            s.update(result.msg.unwrap());
        }
        let rows = s.build_rows();
        assert_eq!(rows[0].cells[4], "@dave commented on this pull request");
        assert_eq!(rows[0].cells[5], "+3");
        assert_eq!(rows[1].cells[4], "Activity on subscribed thread");
        assert!(s.rows()[0].activity.as_ref().unwrap().is_draft);

        // an unchanged thread keeps its activity across a refresh
        let cmds = s.interval_refresh();
        let mut lookups = Vec::new();
        for result in run(cmds).await {
            lookups.extend(s.update(result.msg.unwrap()));
        }
        assert!(lookups.is_empty());
        assert_eq!(s.build_rows()[0].cells[5], "+3");
    }

    #[tokio::test]
    async fn confirmed_done_removes_row_and_stamps_store() {
        let mut s = section_with(
            forge(vec![
                notification("1", true, "mention"),
                notification("2", true, "author"),
            ]),
            "",
        );
        let cmds = s.fetch_next_page();
        apply(&mut s, cmds).await;

        assert!(s.open_prompt(PromptAction::Done));
        let cmds = s
            .handle_prompt_key(KeyEvent::new(KeyCode::Char('y'), KeyModifiers::NONE))
            .unwrap();
        assert!(cmds.is_empty());
        let cmds = s
            .handle_prompt_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE))
            .unwrap();
        let result = run_one(cmds).await;
        assert_eq!(result.task_id, "notification_done_1");
        s.update(result.msg.unwrap());

        assert_eq!(ids(&s), vec!["2"]);
        assert!(s.base.ctx.stores.lock().done.is_marked("1"));

        let cmds = s.refresh();
        apply(&mut s, cmds).await;
        assert_eq!(ids(&s), vec!["2"]);
    }

    #[tokio::test]
    async fn done_filter_reports_error_without_rows() {
        let mut s = section_with(forge(vec![notification("1", true, "mention")]), "is:done");
        let cmds = s.fetch_next_page();
        assert!(matches!(cmds.first(), Some(Cmd::StartTask(_))));
        let result = run_one(cmds).await;
        assert_eq!(
            result.error.as_deref(),
            Some("done notifications cannot be retrieved")
        );
        assert_eq!(s.num_rows(), 0);
        assert_eq!(s.error(), Some("done notifications cannot be retrieved"));
    }

    #[tokio::test]
    async fn toggle_bookmark_and_sort() {
        let mut a = notification("1", true, "mention");
        a.repo = "zeta/app".into();
        let mut b = notification("2", true, "author");
        b.repo = "alpha/lib".into();
        b.updated_at = a.updated_at - chrono::Duration::hours(1);

        let mut s = section_with(forge(vec![a, b]), "");
        let cmds = s.fetch_next_page();
        apply(&mut s, cmds).await;
        assert_eq!(ids(&s), vec!["1", "2"]);

        s.row_action(RowAction::ToggleSort).unwrap();
        assert_eq!(s.sort_order(), SortOrder::Repo);
        assert_eq!(ids(&s), vec!["2", "1"]);

        s.row_action(RowAction::ToggleBookmark).unwrap();
        assert!(s.rows()[0].is_bookmarked);
        assert!(s.base.ctx.stores.lock().bookmarks.is_marked("2"));
        s.row_action(RowAction::ToggleBookmark).unwrap();
        assert!(!s.rows()[0].is_bookmarked);

        assert!(s.row_action(RowAction::Checkout).is_err());
    }

    #[tokio::test]
    async fn mark_all_read_dims_every_row() {
        let mut s = section_with(
            forge(vec![
                notification("1", true, "mention"),
                notification("2", true, "author"),
            ]),
            "",
        );
        let cmds = s.fetch_next_page();
        apply(&mut s, cmds).await;

        let cmds = s.row_action(RowAction::MarkAllRead).unwrap();
        apply(&mut s, cmds).await;
        assert!(s.build_rows().iter().all(|r| r.dimmed));
    }
}
