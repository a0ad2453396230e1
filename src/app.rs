use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::action::{Action, Cmd, InputKind, Job, TaskResult};
use crate::autocomplete::{Autocomplete, Mode};
use crate::config::{SectionConfig, ViewKind};
use crate::context::ProgramContext;
use crate::error::{DashError, Result};
use crate::event::{paste_text, Event};
use crate::input::TextInput;
use crate::section::branches::BranchesSection;
use crate::section::issues::IssuesSection;
use crate::section::notifications::NotificationsSection;
use crate::section::prompt::{Prompt, PromptAction, PromptOutcome};
use crate::section::prs::PrsSection;
use crate::section::{RowAction, RowRef, Section, SectionId, SectionKind};
use crate::task::{Task, TaskHandle, TaskRegistry, CLEAR_DELAY};

fn view_of(kind: SectionKind) -> ViewKind {
    match kind {
        SectionKind::Prs => ViewKind::Prs,
        SectionKind::Issues => ViewKind::Issues,
        SectionKind::Notifications => ViewKind::Notifications,
        SectionKind::Branches => ViewKind::Repo,
    }
}

fn kind_of(view: ViewKind) -> SectionKind {
    match view {
        ViewKind::Prs => SectionKind::Prs,
        ViewKind::Issues => SectionKind::Issues,
        ViewKind::Notifications => SectionKind::Notifications,
        ViewKind::Repo => SectionKind::Branches,
    }
}

fn build_section(
    view: ViewKind,
    id: usize,
    config: SectionConfig,
    ctx: Arc<ProgramContext>,
) -> Box<dyn Section> {
    match view {
        ViewKind::Prs => Box::new(PrsSection::new(id, config, ctx)),
        ViewKind::Issues => Box::new(IssuesSection::new(id, config, ctx)),
        ViewKind::Notifications => Box::new(NotificationsSection::new(id, config, ctx)),
        ViewKind::Repo => Box::new(BranchesSection::new(id, config, ctx)),
    }
}

fn section_configs(ctx: &ProgramContext, view: ViewKind) -> Vec<SectionConfig> {
    match view {
        ViewKind::Repo => vec![SectionConfig {
            title: "Local Branches".to_string(),
            filters: String::new(),
            limit: None,
        }],
        _ => ctx.config.sections_for(view).to_vec(),
    }
}

/// Tie a worker's result to the task run it was spawned for.
fn stamp_run(job: Job, handle: TaskHandle) -> Job {
    job.map(move |mut action| {
        if let Action::TaskFinished(result) = &mut action {
            if result.task_id == handle.id {
                result.generation = Some(handle.generation);
            }
        }
        action
    })
    .boxed()
}

/// Search tab placed before the configured sections. Local branches have none.
fn search_config(view: ViewKind) -> Option<SectionConfig> {
    let filters = match view {
        ViewKind::Prs | ViewKind::Notifications => "archived:false",
        ViewKind::Issues => "",
        ViewKind::Repo => return None,
    };
    Some(SectionConfig {
        title: String::new(),
        filters: filters.to_string(),
        limit: None,
    })
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| DashError::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text.to_string())
        .map_err(|e| DashError::Clipboard(e.to_string()))
}

/// Sections of one view and which one is selected.
pub struct ViewState {
    pub sections: Vec<Box<dyn Section>>,
    pub current: usize,
}

/// Text box for comments, labels and assignees, with its suggestion popup.
pub struct InputBox {
    pub kind: InputKind,
    pub section: SectionId,
    pub repo: String,
    pub input: TextInput,
    pub autocomplete: Autocomplete,
}

impl InputBox {
    fn refilter(&mut self) {
        self.autocomplete
            .filter(self.input.value(), self.input.cursor());
    }
}

#[derive(Debug, Clone, Copy)]
enum CopyTarget {
    Url,
    Number,
}

pub struct App {
    pub ctx: Arc<ProgramContext>,
    pub view: ViewKind,
    views: HashMap<ViewKind, ViewState>,
    pub tasks: TaskRegistry,
    pub preview_open: bool,
    pub input: Option<InputBox>,
    pub quit_prompt: Option<Prompt>,
    // labels per repository, fetched on first use
    labels: HashMap<String, Vec<String>>,
    pub should_quit: bool,
    last_refetch: Instant,
    action_tx: mpsc::UnboundedSender<Action>,
}

impl App {
    pub fn new(
        ctx: Arc<ProgramContext>,
        view: ViewKind,
        action_tx: mpsc::UnboundedSender<Action>,
    ) -> Self {
        Self {
            preview_open: ctx.config.defaults.preview_open,
            ctx,
            view,
            views: HashMap::new(),
            tasks: TaskRegistry::new(),
            input: None,
            quit_prompt: None,
            labels: HashMap::new(),
            should_quit: false,
            last_refetch: Instant::now(),
            action_tx,
        }
    }

    pub fn view_state(&self) -> Option<&ViewState> {
        self.views.get(&self.view)
    }

    pub fn current_section(&self) -> Option<&dyn Section> {
        let state = self.views.get(&self.view)?;
        state.sections.get(state.current).map(|s| s.as_ref())
    }

    fn current_section_mut(&mut self) -> Option<&mut Box<dyn Section>> {
        let state = self.views.get_mut(&self.view)?;
        state.sections.get_mut(state.current)
    }

    fn section_mut(&mut self, id: SectionId) -> Option<&mut Box<dyn Section>> {
        self.views
            .get_mut(&view_of(id.kind))?
            .sections
            .iter_mut()
            .find(|s| s.id() == id)
    }

    /// The row the preview pane shows.
    pub fn current_row(&self) -> Option<RowRef<'_>> {
        self.current_section()?.current_row()
    }

    /// Whether keys go to a text field or prompt instead of the key map.
    pub fn captures_input(&self) -> bool {
        self.quit_prompt.is_some()
            || self.input.is_some()
            || self
                .current_section()
                .is_some_and(|s| s.is_searching() || s.is_prompting())
    }

    pub fn handle_event(&self, event: Event) -> Action {
        match event {
            Event::Init => Action::SetView(self.view),
            Event::Tick => Action::Tick,
            Event::Resize(..) => Action::Resize,
            Event::Key(key) => self.handle_key(key),
            Event::Paste(text) if self.captures_input() => Action::Paste(text),
            Event::Paste(_) | Event::Render => Action::None,
        }
    }

    fn handle_key(&self, key: KeyEvent) -> Action {
        if self.captures_input() {
            return Action::Key(key);
        }
        if let Some(action) = self.view_key(key) {
            return action;
        }

        match key.code {
            KeyCode::Char('q') => Action::Quit,
            KeyCode::Char('j') | KeyCode::Down => Action::NextRow,
            KeyCode::Char('k') | KeyCode::Up => Action::PrevRow,
            KeyCode::Char('g') | KeyCode::Home => Action::FirstRow,
            KeyCode::Char('G') | KeyCode::End => Action::LastRow,
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Tab => Action::NextSection,
            KeyCode::Char('h') | KeyCode::Left | KeyCode::BackTab => Action::PrevSection,
            KeyCode::Char('s') => Action::SwitchView,
            KeyCode::Char('r') => Action::Refresh,
            KeyCode::Char('R') => Action::RefreshAll,
            KeyCode::Char('/') => Action::StartSearch,
            KeyCode::Char('t') => Action::ToggleSmartFilter,
            KeyCode::Char('p') => Action::TogglePreview,
            KeyCode::Char('o') => Action::OpenInBrowser,
            KeyCode::Char('y') => Action::CopyNumber,
            KeyCode::Char('Y') => Action::CopyUrl,
            _ => Action::None,
        }
    }

    /// Keys whose meaning depends on the active view.
    fn view_key(&self, key: KeyEvent) -> Option<Action> {
        let KeyCode::Char(c) = key.code else {
            return None;
        };
        let action = match (self.view, c) {
            (ViewKind::Prs | ViewKind::Issues, 'x') => Action::Prompt(PromptAction::Close),
            (ViewKind::Prs | ViewKind::Issues, 'X') => Action::Prompt(PromptAction::Reopen),
            (ViewKind::Prs | ViewKind::Issues, 'c') => Action::OpenInput(InputKind::Comment),
            (ViewKind::Prs | ViewKind::Issues, 'L') => Action::OpenInput(InputKind::Labels),
            (ViewKind::Prs | ViewKind::Issues, 'a') => Action::OpenInput(InputKind::Assign),
            (ViewKind::Prs | ViewKind::Issues, 'A') => Action::OpenInput(InputKind::Unassign),
            (ViewKind::Prs, 'W') => Action::Prompt(PromptAction::Ready),
            (ViewKind::Prs, 'm') => Action::Prompt(PromptAction::Merge),
            (ViewKind::Prs, 'u') => Action::Prompt(PromptAction::Update),
            (ViewKind::Prs, 'v') => Action::Approve,
            (ViewKind::Prs | ViewKind::Repo, 'C' | ' ') => Action::Checkout,
            (ViewKind::Notifications, 'm') => Action::MarkRead,
            (ViewKind::Notifications, 'M') => Action::MarkAllRead,
            (ViewKind::Notifications, 'd') => Action::Prompt(PromptAction::Done),
            (ViewKind::Notifications, 'D') => Action::Prompt(PromptAction::DoneAll),
            (ViewKind::Notifications, 'b') => Action::ToggleBookmark,
            (ViewKind::Notifications, 'u') => Action::Unsubscribe,
            (ViewKind::Notifications, 'S') => Action::ToggleSort,
            (ViewKind::Repo, 'D') => Action::Prompt(PromptAction::Delete),
            _ => return None,
        };
        Some(action)
    }

    pub fn update(&mut self, action: Action) {
        match action {
            Action::Quit => self.request_quit(),
            Action::Tick => {
                self.tasks.tick();
                if self.refetch_due() {
                    self.interval_refresh();
                }
            }
            Action::Resize | Action::None => {}

            Action::NextRow => {
                let cmds = self.with_current(|s| s.next_row());
                self.run(cmds);
            }
            Action::PrevRow => self.with_current(|s| s.prev_row()),
            Action::FirstRow => self.with_current(|s| s.first_row()),
            Action::LastRow => self.with_current(|s| s.last_row()),
            Action::NextSection => self.move_section(true),
            Action::PrevSection => self.move_section(false),
            Action::SwitchView => self.set_view(self.view.next()),
            Action::SetView(view) => self.set_view(view),

            Action::Refresh => {
                let cmds = self.with_current(|s| s.refresh());
                self.run(cmds);
            }
            Action::RefreshAll => {
                let mut cmds = Vec::new();
                if let Some(state) = self.views.get_mut(&self.view) {
                    for section in &mut state.sections {
                        cmds.extend(section.refresh());
                    }
                }
                self.run(cmds);
            }
            Action::IntervalRefresh => self.interval_refresh(),

            Action::StartSearch => self.with_current(|s| s.start_search()),
            Action::ToggleSmartFilter => {
                let cmds = self.with_current(|s| s.toggle_smart_filter());
                self.run(cmds);
            }
            Action::Prompt(PromptAction::Quit) => self.request_quit(),
            Action::Prompt(prompt) => self.open_prompt(prompt),
            Action::Key(key) => self.handle_captured_key(key),
            Action::Paste(text) => self.paste(&text),

            Action::TogglePreview => self.preview_open = !self.preview_open,
            Action::OpenInBrowser => self.open_in_browser(),
            Action::CopyUrl => self.copy(CopyTarget::Url),
            Action::CopyNumber => self.copy(CopyTarget::Number),
            Action::OpenInput(kind) => self.open_input(kind),
            Action::Approve => self.row_action(RowAction::Approve),
            Action::Checkout => self.row_action(RowAction::Checkout),
            Action::ToggleBookmark => self.row_action(RowAction::ToggleBookmark),
            Action::MarkRead => self.row_action(RowAction::MarkRead),
            Action::MarkAllRead => self.row_action(RowAction::MarkAllRead),
            Action::Unsubscribe => self.row_action(RowAction::Unsubscribe),
            Action::ToggleSort => self.row_action(RowAction::ToggleSort),

            Action::TaskFinished(result) => self.finish_task(result),
            Action::ClearTask(handle) => self.tasks.clear(&handle),
            Action::LabelsFetched { repo, labels } => {
                if let Some(input) = self
                    .input
                    .as_mut()
                    .filter(|i| i.kind == InputKind::Labels && i.repo == repo)
                {
                    input.autocomplete.set_suggestions(labels.clone());
                    input.refilter();
                }
                self.labels.insert(repo, labels);
            }
            Action::Error(msg) => self.report_error(msg),
        }
    }

    fn with_current<T: Default>(&mut self, f: impl FnOnce(&mut Box<dyn Section>) -> T) -> T {
        match self.current_section_mut() {
            Some(section) => f(section),
            None => T::default(),
        }
    }

    /// Switch to `view`, creating and fetching its sections the first time.
    fn set_view(&mut self, view: ViewKind) {
        self.view = view;
        if self.views.contains_key(&view) {
            return;
        }

        let search = search_config(view);
        let offset = usize::from(search.is_none());
        let mut cmds = Vec::new();
        let sections: Vec<Box<dyn Section>> = search
            .into_iter()
            .chain(section_configs(&self.ctx, view))
            .enumerate()
            .map(|(i, config)| {
                let id = i + offset;
                let mut section = build_section(view, id, config, self.ctx.clone());
                // the search tab waits until it is focused
                if id != SectionId::SEARCH {
                    cmds.extend(section.fetch_next_page());
                }
                section
            })
            .collect();
        info!(?view, count = sections.len(), "activated view");

        let current = if offset == 0 && sections.len() > 1 { 1 } else { 0 };
        self.views.insert(view, ViewState { sections, current });
        self.fetch_if_unfetched();
        self.run(cmds);
    }

    fn move_section(&mut self, forward: bool) {
        let Some(state) = self.views.get_mut(&self.view) else {
            return;
        };
        let n = state.sections.len();
        if n == 0 {
            return;
        }
        state.current = if forward {
            (state.current + 1) % n
        } else {
            (state.current + n - 1) % n
        };
        self.fetch_if_unfetched();
    }

    /// Fetch the focused section if nothing was requested for it yet.
    fn fetch_if_unfetched(&mut self) {
        let cmds = match self.current_section_mut() {
            Some(section) if !section.has_fetched() => section.fetch_next_page(),
            _ => return,
        };
        self.run(cmds);
    }

    fn refetch_due(&self) -> bool {
        let minutes = self.ctx.config.defaults.refetch_interval_minutes;
        minutes > 0 && self.last_refetch.elapsed() >= Duration::from_secs(minutes * 60)
    }

    /// Refetch every section that was fetched before, in every view.
    fn interval_refresh(&mut self) {
        self.last_refetch = Instant::now();
        let mut cmds = Vec::new();
        for state in self.views.values_mut() {
            for section in state.sections.iter_mut().filter(|s| s.has_fetched()) {
                cmds.extend(section.interval_refresh());
            }
        }
        debug!(count = cmds.len(), "interval refresh");
        self.run(cmds);
    }

    fn request_quit(&mut self) {
        if !self.ctx.config.confirm_quit {
            self.should_quit = true;
            return;
        }
        self.quit_prompt = Prompt::new(PromptAction::Quit, kind_of(self.view));
    }

    fn open_prompt(&mut self, action: PromptAction) {
        let opened = self.with_current(|s| s.open_prompt(action));
        if !opened && self.current_row().is_some() {
            self.report_error(format!(
                "{:?} is not available for {}",
                action,
                kind_of(self.view).plural()
            ));
        }
    }

    fn handle_captured_key(&mut self, key: KeyEvent) {
        if let Some(prompt) = self.quit_prompt.as_mut() {
            match prompt.handle_key(key) {
                PromptOutcome::Pending => {}
                PromptOutcome::Confirmed(_) => self.should_quit = true,
                PromptOutcome::Cancelled => self.quit_prompt = None,
            }
            return;
        }
        if self.input.is_some() {
            self.handle_input_key(key);
            return;
        }

        let Some(section) = self.current_section_mut() else {
            return;
        };
        let result = if section.is_prompting() {
            section.handle_prompt_key(key)
        } else if section.is_searching() {
            Ok(section.handle_search_key(key))
        } else {
            Ok(Vec::new())
        };
        self.apply(result);
    }

    /// Insert pasted text into whichever field has focus.
    fn paste(&mut self, text: &str) {
        if let Some(prompt) = self.quit_prompt.as_mut() {
            prompt.input.insert_str(&paste_text(text, false));
            return;
        }
        if let Some(input) = self.input.as_mut() {
            let multiline = input.kind == InputKind::Comment;
            input.input.insert_str(&paste_text(text, multiline));
            input.refilter();
            return;
        }

        let Some(section) = self.current_section_mut() else {
            return;
        };
        let base = section.base_mut();
        if let Some(prompt) = base.prompt.as_mut() {
            prompt.input.insert_str(&paste_text(text, false));
        } else if base.is_searching {
            base.search.insert_str(&paste_text(text, false));
        }
    }

    fn row_action(&mut self, action: RowAction) {
        let result = match self.current_section_mut() {
            Some(section) => section.row_action(action),
            None => return,
        };
        self.apply(result);
    }

    fn apply(&mut self, result: Result<Vec<Cmd>>) {
        match result {
            Ok(cmds) => self.run(cmds),
            Err(err) => self.report_error(err),
        }
    }

    fn open_input(&mut self, kind: InputKind) {
        let target = self.current_section().and_then(|s| {
            let row = s.current_row()?;
            matches!(row, RowRef::Pr(_) | RowRef::Issue(_)).then(|| {
                (
                    s.id(),
                    row.repo().to_string(),
                    row.labels().to_vec(),
                    row.assignees().to_vec(),
                    row.participants(),
                )
            })
        });
        let Some((section, repo, labels, assignees, participants)) = target else {
            if self.current_row().is_some() {
                self.report_error(format!(
                    "{} is not available for {}",
                    kind.title(),
                    kind_of(self.view).plural()
                ));
            }
            return;
        };

        let (mode, initial, suggestions) = match kind {
            InputKind::Comment => (Mode::Mention, String::new(), participants),
            InputKind::Labels => {
                let initial = if labels.is_empty() {
                    String::new()
                } else {
                    format!("{}, ", labels.join(", "))
                };
                let known = self.labels.get(&repo).cloned().unwrap_or_default();
                (Mode::CommaList, initial, known)
            }
            InputKind::Assign => (Mode::Whitespace, String::new(), participants),
            InputKind::Unassign => {
                let initial = if assignees.is_empty() {
                    String::new()
                } else {
                    format!("{} ", assignees.join(" "))
                };
                (Mode::Whitespace, initial, assignees)
            }
        };

        if kind == InputKind::Labels && !self.labels.contains_key(&repo) {
            self.fetch_labels(repo.clone());
        }

        let mut autocomplete = Autocomplete::new(mode);
        autocomplete.set_suggestions(suggestions);
        self.input = Some(InputBox {
            kind,
            section,
            repo,
            input: TextInput::new(initial),
            autocomplete,
        });
    }

    fn fetch_labels(&self, repo: String) {
        let forge = self.ctx.forge.clone();
        self.spawn(
            async move {
                match forge.list_labels(&repo).await {
                    Ok(labels) => Action::LabelsFetched { repo, labels },
                    Err(err) => Action::Error(format!("Could not fetch labels: {}", err)),
                }
            }
            .boxed(),
        );
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        let Some(input) = self.input.as_mut() else {
            return;
        };
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let popup = input.autocomplete.is_visible();
        let multiline = input.kind == InputKind::Comment;

        match key.code {
            KeyCode::Esc if popup => input.autocomplete.hide(),
            KeyCode::Esc => self.input = None,
            KeyCode::Char('c') if ctrl => self.input = None,
            KeyCode::Tab | KeyCode::Enter if popup => {
                let value = input.input.value().to_string();
                if let Some((text, cursor)) = input.autocomplete.accept(&value, input.input.cursor())
                {
                    input.input.set(text, cursor);
                }
            }
            KeyCode::Tab if input.autocomplete.has_suggestions() => {
                input.refilter();
                input.autocomplete.show();
            }
            KeyCode::Down if popup => input.autocomplete.next(),
            KeyCode::Up if popup => input.autocomplete.prev(),
            KeyCode::Char('n') if ctrl && popup => input.autocomplete.next(),
            KeyCode::Char('p') if ctrl && popup => input.autocomplete.prev(),
            KeyCode::Char('d') if ctrl => self.submit_input(),
            KeyCode::Enter if multiline => {
                input.input.insert('\n');
                input.refilter();
            }
            KeyCode::Enter => self.submit_input(),
            _ => {
                if input.input.handle_key(key) {
                    input.refilter();
                }
            }
        }
    }

    fn submit_input(&mut self) {
        let Some(input) = self.input.take() else {
            return;
        };
        let action = RowAction::Submit {
            kind: input.kind,
            text: input.input.value().to_string(),
        };
        let result = match self.section_mut(input.section) {
            Some(section) => section.row_action(action),
            None => return,
        };
        self.apply(result);
    }

    fn open_in_browser(&mut self) {
        let Some(url) = self.current_row().map(|r| r.url().to_string()) else {
            return;
        };
        if url.is_empty() {
            self.report_error("Nothing to open for this row");
            return;
        }
        debug!(%url, "opening in browser");
        if let Err(err) = open::that(&url) {
            self.report_error(DashError::Io(err));
        }
    }

    fn copy(&mut self, target: CopyTarget) {
        let Some(text) = self.current_row().map(|row| match (target, row) {
            (CopyTarget::Url, row) => row.url().to_string(),
            (CopyTarget::Number, RowRef::Branch(b)) => b.name.clone(),
            (CopyTarget::Number, row) => row.number().to_string(),
        }) else {
            return;
        };
        match copy_to_clipboard(&text) {
            Ok(()) => self.flash("clipboard", format!("Copied {} to clipboard", text)),
            Err(err) => self.report_error(err),
        }
    }

    fn finish_task(&mut self, result: TaskResult) {
        let TaskResult {
            task_id,
            generation,
            section,
            error,
            msg,
        } = result;

        if let Some(handle) = self.tasks.finish_run(&task_id, generation, error) {
            self.schedule_clear(handle);
        }

        let (Some(id), Some(msg)) = (section, msg) else {
            return;
        };
        let cmds = match self.section_mut(id) {
            Some(section) => section.update(msg),
            None => {
                debug!(?id, %task_id, "no section for task result");
                return;
            }
        };
        self.run(cmds);
    }

    /// A finished task that only shows a message.
    fn flash(&mut self, id: &str, text: String) {
        self.tasks.start(Task::new(id, text.clone(), text));
        if let Some(handle) = self.tasks.finish(id, None) {
            self.schedule_clear(handle);
        }
    }

    fn report_error(&mut self, err: impl Display) {
        let error = err.to_string();
        warn!(%error, "action failed");
        self.tasks.start(Task::new("error", "", ""));
        if let Some(handle) = self.tasks.finish("error", Some(error)) {
            self.schedule_clear(handle);
        }
    }

    fn schedule_clear(&self, handle: TaskHandle) {
        self.spawn(
            async move {
                tokio::time::sleep(CLEAR_DELAY).await;
                Action::ClearTask(handle)
            }
            .boxed(),
        );
    }

    fn run(&mut self, cmds: Vec<Cmd>) {
        let mut started: Option<TaskHandle> = None;
        for cmd in cmds {
            match cmd {
                Cmd::StartTask(task) => started = Some(self.tasks.start(task)),
                Cmd::Spawn(job) => match started.take() {
                    Some(handle) => self.spawn(stamp_run(job, handle)),
                    None => self.spawn(job),
                },
            }
        }
    }

    fn spawn(&self, job: Job) {
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            tx.send(job.await).ok();
        });
    }
}
