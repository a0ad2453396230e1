use crossterm::event::KeyEvent;
use futures::future::BoxFuture;

use crate::config::ViewKind;
use crate::error::DashError;
use crate::fetch::Fetched;
use crate::mutation::{BranchUpdate, ItemUpdate, NotificationUpdate};
use crate::section::prompt::PromptAction;
use crate::section::SectionId;
use crate::task::{Task, TaskHandle};
use crate::types::{Branch, Issue, Notification, PullRequest, ThreadActivity};

/// Work handed to the runtime. It resolves to exactly one action for the event loop.
pub type Job = BoxFuture<'static, Action>;

/// Side effects a section asks the coordinator to perform.
///
/// A `Spawn` right after a `StartTask` is the worker of that task run; its
/// result is tied to that run only.
pub enum Cmd {
    StartTask(Task),
    Spawn(Job),
}

impl std::fmt::Debug for Cmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cmd::StartTask(task) => f.debug_tuple("StartTask").field(&task.id).finish(),
            Cmd::Spawn(_) => f.write_str("Spawn(..)"),
        }
    }
}

/// Messages addressed to one section.
#[derive(Debug, Clone)]
pub enum SectionMsg {
    PrsFetched(Fetched<PullRequest>),
    IssuesFetched(Fetched<Issue>),
    NotificationsFetched(Fetched<Notification>),
    BranchesFetched(Fetched<Branch>),
    FetchFailed { task_id: String, error: String },
    ItemUpdated(ItemUpdate),
    NotificationUpdated(NotificationUpdate),
    /// Background lookup of one thread's subject finished.
    NotificationActivity { id: String, activity: ThreadActivity },
    BranchUpdated(BranchUpdate),
}

/// Completion report of a background task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    /// Run of `task_id` that produced this, stamped when the worker is spawned.
    pub generation: Option<u64>,
    pub section: Option<SectionId>,
    pub error: Option<String>,
    pub msg: Option<SectionMsg>,
}

/// Input field opened from the preview pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Comment,
    Labels,
    Assign,
    Unassign,
}

impl InputKind {
    pub fn title(self) -> &'static str {
        match self {
            InputKind::Comment => "Comment",
            InputKind::Labels => "Labels",
            InputKind::Assign => "Assign",
            InputKind::Unassign => "Unassign",
        }
    }
}

#[derive(Debug)]
pub enum Action {
    Quit,
    Tick,
    Resize,

    // Row and section navigation
    NextRow,
    PrevRow,
    FirstRow,
    LastRow,
    NextSection,
    PrevSection,
    SwitchView,
    SetView(ViewKind),

    // Fetching
    Refresh,
    RefreshAll,
    IntervalRefresh,

    // Section modes
    StartSearch,
    ToggleSmartFilter,
    Prompt(PromptAction),

    // Raw key or pasted text for whichever text input has focus
    Key(KeyEvent),
    Paste(String),

    // Preview pane and row actions
    TogglePreview,
    OpenInBrowser,
    CopyUrl,
    CopyNumber,
    OpenInput(InputKind),
    Approve,
    Checkout,
    ToggleBookmark,
    MarkRead,
    MarkAllRead,
    Unsubscribe,
    ToggleSort,

    // Worker results
    TaskFinished(TaskResult),
    ClearTask(TaskHandle),
    LabelsFetched { repo: String, labels: Vec<String> },

    Error(String),
    None,
}

impl From<DashError> for Action {
    fn from(err: DashError) -> Self {
        Action::Error(err.to_string())
    }
}
