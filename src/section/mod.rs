//! One filterable, paginated list and the machinery every list kind shares.

pub mod branches;
pub mod issues;
pub mod notifications;
pub mod prompt;
pub mod prs;
#[cfg(test)]
pub mod testing;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::action::{Cmd, InputKind, SectionMsg};
use crate::config::SectionConfig;
use crate::context::ProgramContext;
use crate::error::{DashError, Result};
use crate::input::TextInput;
use crate::mutation::{ItemChange, ItemRef, Mutation};
use crate::types::{format_age, Branch, Comment, Issue, Notification, PullRequest, RepoRef, Row};

use prompt::{Prompt, PromptAction, PromptOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Prs,
    Issues,
    Notifications,
    Branches,
}

impl SectionKind {
    pub fn singular(self) -> &'static str {
        match self {
            SectionKind::Prs => "PR",
            SectionKind::Issues => "Issue",
            SectionKind::Notifications => "Notification",
            SectionKind::Branches => "Branch",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            SectionKind::Prs => "PRs",
            SectionKind::Issues => "issues",
            SectionKind::Notifications => "notifications",
            SectionKind::Branches => "branches",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            SectionKind::Prs => "prs",
            SectionKind::Issues => "issues",
            SectionKind::Notifications => "notifications",
            SectionKind::Branches => "branches",
        }
    }
}

/// Routing key for results coming back from workers.
///
/// Id 0 belongs to the search pseudo-section; configured sections start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionId {
    pub id: usize,
    pub kind: SectionKind,
}

impl SectionId {
    pub const SEARCH: usize = 0;

    pub fn new(id: usize, kind: SectionKind) -> Self {
        Self { id, kind }
    }

    /// Prefix for fetch task ids, unique per section.
    pub fn fetch_prefix(&self) -> String {
        format!("fetching_{}_{}", self.kind.prefix(), self.id)
    }
}

/// Table column as the renderer should lay it out. `width: None` takes the remaining space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub title: &'static str,
    pub width: Option<u16>,
}

impl Column {
    pub const fn fixed(title: &'static str, width: u16) -> Self {
        Self {
            title,
            width: Some(width),
        }
    }

    pub const fn fill(title: &'static str) -> Self {
        Self { title, width: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRow {
    pub cells: Vec<String>,
    /// Rendered dimmed, e.g. read notifications.
    pub dimmed: bool,
}

impl DisplayRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self {
            cells,
            dimmed: false,
        }
    }
}

/// Borrowed view of whichever record the cursor is on.
#[derive(Debug, Clone, Copy)]
pub enum RowRef<'a> {
    Pr(&'a PullRequest),
    Issue(&'a Issue),
    Notification(&'a Notification),
    Branch(&'a Branch),
}

impl<'a> RowRef<'a> {
    pub fn url(&self) -> &'a str {
        match self {
            RowRef::Pr(r) => r.url(),
            RowRef::Issue(r) => r.url(),
            RowRef::Notification(r) => r.url(),
            RowRef::Branch(r) => r.url(),
        }
    }

    pub fn number(&self) -> u64 {
        match self {
            RowRef::Pr(r) => r.number(),
            RowRef::Issue(r) => r.number(),
            RowRef::Notification(r) => r.number(),
            RowRef::Branch(r) => r.number(),
        }
    }

    pub fn repo(&self) -> &'a str {
        match self {
            RowRef::Pr(r) => r.repo(),
            RowRef::Issue(r) => r.repo(),
            RowRef::Notification(r) => r.repo(),
            RowRef::Branch(r) => r.repo(),
        }
    }

    pub fn title(&self) -> &'a str {
        match self {
            RowRef::Pr(r) => r.title(),
            RowRef::Issue(r) => r.title(),
            RowRef::Notification(r) => r.title(),
            RowRef::Branch(r) => r.title(),
        }
    }

    pub fn labels(&self) -> &'a [String] {
        match self {
            RowRef::Pr(r) => &r.labels,
            RowRef::Issue(r) => &r.labels,
            _ => &[],
        }
    }

    pub fn assignees(&self) -> &'a [String] {
        match self {
            RowRef::Pr(r) => &r.assignees,
            RowRef::Issue(r) => &r.assignees,
            _ => &[],
        }
    }

    /// Author, assignees and commenters, deduplicated in order of appearance.
    pub fn participants(&self) -> Vec<String> {
        let (author, assignees, comments) = match self {
            RowRef::Pr(r) => (&r.author, &r.assignees, &r.recent_comments),
            RowRef::Issue(r) => (&r.author, &r.assignees, &r.recent_comments),
            _ => return Vec::new(),
        };
        let mut out: Vec<String> = Vec::new();
        let names = std::iter::once(author)
            .chain(assignees.iter())
            .chain(comments.iter().map(|c| &c.author));
        for name in names {
            if !name.is_empty() && !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }
}

/// Actions on the current row that do not need a confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    Submit { kind: InputKind, text: String },
    Approve,
    Checkout,
    ToggleBookmark,
    MarkRead,
    MarkAllRead,
    Unsubscribe,
    ToggleSort,
}

/// Split a comma-separated label list, dropping blanks and repeats.
pub fn parse_labels(text: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for label in text.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        if !labels.iter().any(|l| l == label) {
            labels.push(label.to_string());
        }
    }
    labels
}

/// Split a whitespace-separated user list, with or without leading `@`.
pub fn parse_users(text: &str) -> Vec<String> {
    let mut users: Vec<String> = Vec::new();
    for user in text
        .split_whitespace()
        .map(|u| u.trim_start_matches('@'))
        .filter(|u| !u.is_empty())
    {
        if !users.iter().any(|u| u == user) {
            users.push(user.to_string());
        }
    }
    users
}

/// The mutation an input box submits for a pull request or issue, `None` if the text is blank.
pub fn submit_mutation(
    ctx: &ProgramContext,
    item: ItemRef,
    kind: InputKind,
    text: &str,
) -> Option<Mutation> {
    match kind {
        InputKind::Comment => {
            let body = text.trim();
            if body.is_empty() {
                return None;
            }
            Some(Mutation::Comment {
                item,
                author: ctx.user.clone().unwrap_or_default(),
                body: body.to_string(),
            })
        }
        InputKind::Labels => Some(Mutation::SetLabels {
            item,
            labels: parse_labels(text),
        }),
        InputKind::Assign => {
            let users = parse_users(text);
            (!users.is_empty()).then_some(Mutation::Assign { item, users })
        }
        InputKind::Unassign => {
            let users = parse_users(text);
            (!users.is_empty()).then_some(Mutation::Unassign { item, users })
        }
    }
}

fn push_unique(list: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !list.contains(item) {
            list.push(item.clone());
        }
    }
}

/// Apply the parts of an item change that pull requests and issues have in common.
/// Returns `false` for changes the caller has to handle.
fn apply_common_change(
    change: &ItemChange,
    labels: &mut Vec<String>,
    assignees: &mut Vec<String>,
    comments: &mut u32,
    recent_comments: &mut Vec<Comment>,
) -> bool {
    match change {
        ItemChange::Commented(comment) => {
            recent_comments.push(comment.clone());
            *comments += 1;
        }
        ItemChange::Labels(new) => *labels = new.clone(),
        ItemChange::Assigned(users) => push_unique(assignees, users),
        ItemChange::Unassigned(users) => assignees.retain(|a| !users.contains(a)),
        _ => return false,
    }
    true
}

/// State shared by every section kind: search bar, prompt, cursor and smart filter.
#[derive(Debug)]
pub struct SectionBase {
    pub id: SectionId,
    pub config: SectionConfig,
    pub limit: u32,
    pub ctx: Arc<ProgramContext>,
    pub search: TextInput,
    pub search_prefix: &'static str,
    /// Last committed search.
    pub search_value: String,
    pub is_searching: bool,
    pub prompt: Option<Prompt>,
    smart_filtering: bool,
    pub is_filtered_by_current_repo: bool,
    pub cursor: usize,
}

/// Configured filters with the current repository token prepended when smart filtering
/// applies at launch.
pub fn initial_search_value(filters: &str, repo: Option<&RepoRef>, at_launch: bool) -> String {
    let Some(repo) = repo.filter(|_| at_launch) else {
        return filters.to_string();
    };
    if has_repo_token(filters) {
        return filters.to_string();
    }
    format!("{} {}", repo.filter_token(), filters)
        .trim_end()
        .to_string()
}

fn has_repo_token(filters: &str) -> bool {
    filters.split_whitespace().any(|t| t.starts_with("repo:"))
}

impl SectionBase {
    /// `smart_filtering` marks kinds whose remote query understands `repo:` tokens.
    pub fn new(
        id: SectionId,
        config: SectionConfig,
        limit: u32,
        ctx: Arc<ProgramContext>,
        search_prefix: &'static str,
        smart_filtering: bool,
    ) -> Self {
        let at_launch = smart_filtering && ctx.config.smart_filtering_at_launch;
        let value = initial_search_value(&config.filters, ctx.repo.as_ref(), at_launch);
        let is_filtered_by_current_repo = at_launch && value != config.filters;

        Self {
            id,
            limit,
            search: TextInput::new(value.clone()),
            search_prefix,
            search_value: value,
            is_searching: false,
            prompt: None,
            smart_filtering,
            is_filtered_by_current_repo,
            cursor: 0,
            config,
            ctx,
        }
    }

    fn smart_repo(&self) -> Option<&RepoRef> {
        self.ctx.repo.as_ref().filter(|_| self.smart_filtering)
    }

    pub fn has_repo_in_configured_filter(&self) -> bool {
        has_repo_token(&self.config.filters)
    }

    /// The search value sent to the remote, with the repository token added or removed
    /// according to the smart filter.
    pub fn effective_search_value(&self) -> String {
        let Some(repo) = self.smart_repo() else {
            return self.search_value.clone();
        };
        if self.has_repo_in_configured_filter() {
            return self.search_value.clone();
        }

        let token = repo.filter_token();
        let rest: Vec<&str> = self
            .search_value
            .split_whitespace()
            .filter(|t| *t != token)
            .collect();
        let rest = rest.join(" ");

        if !self.is_filtered_by_current_repo {
            rest
        } else if rest.is_empty() {
            token
        } else {
            format!("{} {}", token, rest)
        }
    }

    /// Derive the smart filter flag from what the user left in the search box.
    ///
    /// Removing the repository token by hand turns smart filtering off, so it is not
    /// injected again on the next fetch.
    pub fn sync_smart_filter_with_search_value(&mut self) {
        let Some(token) = self.smart_repo().map(RepoRef::filter_token) else {
            return;
        };
        if self.has_repo_in_configured_filter() {
            return;
        }
        self.is_filtered_by_current_repo = self.search_value.split_whitespace().any(|t| t == token);
    }

    /// Flip the smart filter. Returns whether the search value changed.
    pub fn toggle_smart_filter(&mut self) -> bool {
        if self.smart_repo().is_none() {
            return false;
        }
        if !self.has_repo_in_configured_filter() {
            self.is_filtered_by_current_repo = !self.is_filtered_by_current_repo;
        }
        let value = self.effective_search_value();
        if value == self.search_value {
            return false;
        }
        self.search.set_value(value.clone());
        self.search_value = value;
        self.is_searching = false;
        true
    }

    pub fn start_search(&mut self) {
        self.is_searching = true;
        self.search.set_value(self.search_value.clone());
    }

    pub fn cancel_search(&mut self) {
        self.search.set_value(self.search_value.clone());
        self.is_searching = false;
    }

    pub fn commit_search(&mut self) {
        self.search_value = self.search.value().trim().to_string();
        self.is_searching = false;
        self.sync_smart_filter_with_search_value();
    }

    pub fn search_line(&self) -> String {
        if self.search_prefix.is_empty() {
            format!("> {}", self.search.value())
        } else {
            format!("{} {}", self.search_prefix, self.search.value())
        }
    }

    pub fn title(&self) -> &str {
        &self.config.title
    }
}

fn relative_update(at: DateTime<Utc>) -> String {
    match format_age(at, Utc::now()).as_str() {
        "now" => "just now".to_string(),
        age => format!("~{} ago", age),
    }
}

/// A list kind driven by the coordinator.
///
/// Handlers return the commands to run instead of spawning work themselves.
pub trait Section: Send {
    fn base(&self) -> &SectionBase;
    fn base_mut(&mut self) -> &mut SectionBase;

    fn num_rows(&self) -> usize;
    fn columns(&self) -> &'static [Column];
    fn build_rows(&self) -> Vec<DisplayRow>;
    fn current_row(&self) -> Option<RowRef<'_>>;

    fn is_loading(&self) -> bool;
    fn error(&self) -> Option<&str>;
    fn total_count(&self) -> usize;
    fn last_updated(&self) -> Option<DateTime<Utc>>;
    /// Whether the first page was ever requested.
    fn has_fetched(&self) -> bool;

    fn fetch_next_page(&mut self) -> Vec<Cmd>;
    /// Drop rows and cursor. Used on filter changes and manual refresh.
    fn reset_rows(&mut self);
    /// Start pagination over but keep rows until the new first page arrives.
    fn restart(&mut self);
    fn update(&mut self, msg: SectionMsg) -> Vec<Cmd>;

    /// Manual refresh: start over from an empty list.
    fn refresh(&mut self) -> Vec<Cmd> {
        self.reset_rows();
        self.fetch_next_page()
    }

    /// Timer-driven refresh. Rows stay visible until the first page replaces them.
    fn interval_refresh(&mut self) -> Vec<Cmd> {
        self.restart();
        self.fetch_next_page()
    }

    fn run_prompt_action(&mut self, action: PromptAction) -> Result<Vec<Cmd>>;

    fn row_action(&mut self, action: RowAction) -> Result<Vec<Cmd>> {
        Err(DashError::Unsupported(format!(
            "{:?} is not available for {}",
            action,
            self.id().kind.plural()
        )))
    }

    fn id(&self) -> SectionId {
        self.base().id
    }

    fn kind(&self) -> SectionKind {
        self.base().id.kind
    }

    fn cursor(&self) -> usize {
        self.base().cursor
    }

    fn next_row(&mut self) -> Vec<Cmd> {
        let n = self.num_rows();
        if n == 0 {
            return Vec::new();
        }
        let base = self.base_mut();
        base.cursor = (base.cursor + 1).min(n - 1);
        let at_end = base.cursor + 1 == n;
        if at_end && !self.is_loading() {
            return self.fetch_next_page();
        }
        Vec::new()
    }

    fn prev_row(&mut self) {
        let base = self.base_mut();
        base.cursor = base.cursor.saturating_sub(1);
    }

    fn first_row(&mut self) {
        self.base_mut().cursor = 0;
    }

    fn last_row(&mut self) {
        let n = self.num_rows();
        self.base_mut().cursor = n.saturating_sub(1);
    }

    /// Keep the cursor on a row after the list shrank.
    fn clamp_cursor(&mut self) {
        let n = self.num_rows();
        let base = self.base_mut();
        base.cursor = base.cursor.min(n.saturating_sub(1));
    }

    fn is_searching(&self) -> bool {
        self.base().is_searching
    }

    fn is_prompting(&self) -> bool {
        self.base().prompt.is_some()
    }

    fn start_search(&mut self) {
        self.base_mut().start_search();
    }

    /// Input while the search bar has focus.
    fn handle_search_key(&mut self, key: KeyEvent) -> Vec<Cmd> {
        let interrupt = key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => {
                self.base_mut().cancel_search();
                Vec::new()
            }
            _ if interrupt => {
                self.base_mut().cancel_search();
                Vec::new()
            }
            KeyCode::Enter => {
                self.base_mut().commit_search();
                self.reset_rows();
                self.fetch_next_page()
            }
            _ => {
                self.base_mut().search.handle_key(key);
                Vec::new()
            }
        }
    }

    fn toggle_smart_filter(&mut self) -> Vec<Cmd> {
        if self.base_mut().toggle_smart_filter() {
            self.reset_rows();
            return self.fetch_next_page();
        }
        Vec::new()
    }

    /// Ask for confirmation before `action`. Returns false when there is nothing to act on.
    fn open_prompt(&mut self, action: PromptAction) -> bool {
        if self.current_row().is_none() {
            return false;
        }
        let kind = self.kind();
        match Prompt::new(action, kind) {
            Some(prompt) => {
                self.base_mut().prompt = Some(prompt);
                true
            }
            None => false,
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) -> Result<Vec<Cmd>> {
        let Some(prompt) = self.base_mut().prompt.as_mut() else {
            return Ok(Vec::new());
        };
        match prompt.handle_key(key) {
            PromptOutcome::Pending => Ok(Vec::new()),
            PromptOutcome::Cancelled => {
                self.base_mut().prompt = None;
                Ok(Vec::new())
            }
            PromptOutcome::Confirmed(action) => {
                self.base_mut().prompt = None;
                self.run_prompt_action(action)
            }
        }
    }

    /// One-line status summary, empty until something was fetched.
    fn pager_content(&self) -> String {
        let total = self.total_count();
        if total == 0 {
            return String::new();
        }
        let updated = self
            .last_updated()
            .map(relative_update)
            .unwrap_or_else(|| "-".to_string());
        format!(
            "Updated {} • {} {}/{} (fetched {})",
            updated,
            self.kind().singular(),
            self.cursor() + 1,
            total,
            self.num_rows()
        )
    }

    fn empty_state(&self) -> String {
        format!(
            "No {} were found that match the given filters",
            self.kind().plural()
        )
    }

    /// Plain-text rendition: search bar, then rows or a placeholder.
    fn view(&self) -> String {
        let base = self.base();
        let mut lines = vec![base.search_line()];
        if let Some(prompt) = &base.prompt {
            lines.push(format!("{}{}", prompt.question, prompt.input.value()));
        }

        let rows = self.build_rows();
        if rows.is_empty() {
            lines.push(if self.is_loading() {
                "Loading...".to_string()
            } else {
                self.empty_state()
            });
        } else {
            for (i, row) in rows.iter().enumerate() {
                let marker = if i == base.cursor { ">" } else { " " };
                lines.push(format!("{} {}", marker, row.cells.join("  ")));
            }
        }

        if let Some(err) = self.error() {
            lines.push(format!("! {}", err));
        }
        lines.join("\n")
    }
}
