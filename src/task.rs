use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// How long a finished or failed task stays in the status line.
pub const CLEAR_DELAY: Duration = Duration::from_secs(2);

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

pub const SUCCESS_ICON: &str = "✓";
pub const FAILURE_ICON: &str = "✗";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Start,
    Finished,
    Error,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub start_text: String,
    pub finished_text: String,
    pub state: TaskState,
    pub error: Option<String>,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
    started_seq: u64,
    finished_seq: Option<u64>,
}

impl Task {
    pub fn new(
        id: impl Into<String>,
        start_text: impl Into<String>,
        finished_text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            start_text: start_text.into(),
            finished_text: finished_text.into(),
            state: TaskState::Start,
            error: None,
            started_at: Instant::now(),
            finished_at: None,
            started_seq: 0,
            finished_seq: None,
        }
    }
}

/// Identifies one incarnation of a task id, so a delayed clear never
/// removes a task that was restarted under the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: String,
    pub generation: u64,
}

/// What the status line should show for the most relevant task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub badge: Option<String>,
    pub text: String,
    pub state: TaskState,
}

#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Task>,
    seq: u64,
    spinner_frame: usize,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Record `task` as running. A task with the same id is replaced and its timer reset.
    pub fn start(&mut self, mut task: Task) -> TaskHandle {
        let generation = self.stamp();
        task.state = TaskState::Start;
        task.error = None;
        task.started_at = Instant::now();
        task.finished_at = None;
        task.started_seq = generation;
        task.finished_seq = None;

        let handle = TaskHandle {
            id: task.id.clone(),
            generation,
        };
        self.tasks.insert(task.id.clone(), task);
        handle
    }

    /// Mark a task finished or failed. Returns the handle the caller should clear
    /// after [`CLEAR_DELAY`], or `None` for an unknown id.
    pub fn finish(&mut self, id: &str, error: Option<String>) -> Option<TaskHandle> {
        let stamp = self.stamp();
        let task = self.tasks.get_mut(id)?;
        task.state = if error.is_some() {
            TaskState::Error
        } else {
            TaskState::Finished
        };
        task.error = error;
        task.finished_at = Some(Instant::now());
        task.finished_seq = Some(stamp);

        Some(TaskHandle {
            id: task.id.clone(),
            generation: task.started_seq,
        })
    }

    /// Like [`finish`](Self::finish), but only for the run `generation` was issued to.
    /// A result of an earlier run of a restarted task is dropped. Without a
    /// generation the current run is finished.
    pub fn finish_run(
        &mut self,
        id: &str,
        generation: Option<u64>,
        error: Option<String>,
    ) -> Option<TaskHandle> {
        if let Some(generation) = generation {
            let current = self.tasks.get(id).map(|t| t.started_seq);
            if current != Some(generation) {
                debug!(%id, generation, ?current, "ignoring result of an earlier run");
                return None;
            }
        }
        self.finish(id, error)
    }

    pub fn clear(&mut self, handle: &TaskHandle) {
        let matches = self
            .tasks
            .get(&handle.id)
            .is_some_and(|t| t.started_seq == handle.generation && t.state != TaskState::Start);
        if matches {
            self.tasks.remove(&handle.id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.state == TaskState::Start)
            .count()
    }

    /// Advance the spinner. Returns whether anything is still running.
    pub fn tick(&mut self) -> bool {
        let running = self.running_count() > 0;
        if running {
            self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
        }
        running
    }

    /// Running tasks first (latest start wins), then finished ones (latest finish wins).
    pub fn current(&self) -> Option<&Task> {
        self.tasks.values().min_by_key(|t| match t.finished_seq {
            None => (0, Reverse(t.started_seq)),
            Some(done) => (1, Reverse(done)),
        })
    }

    pub fn status(&self) -> Option<TaskStatus> {
        let task = self.current()?;
        let text = match task.state {
            TaskState::Start => format!("{} {}", SPINNER_FRAMES[self.spinner_frame], task.start_text),
            TaskState::Error => format!(
                "{} {}",
                FAILURE_ICON,
                task.error.as_deref().unwrap_or("failed")
            ),
            TaskState::Finished => format!("{} {}", SUCCESS_ICON, task.finished_text),
        };

        let running = self.running_count();
        let badge = (running > 1).then(|| format!("[{}] ", running));

        Some(TaskStatus {
            badge,
            text,
            state: task.state,
        })
    }
}
