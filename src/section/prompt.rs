use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::input::TextInput;
use crate::section::SectionKind;

/// Actions that require a yes/no confirmation before they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptAction {
    Close,
    Reopen,
    Ready,
    Merge,
    Update,
    Delete,
    Done,
    DoneAll,
    Quit,
}

impl PromptAction {
    /// Question shown for `self` on a section of `kind`, `None` when the pair makes no sense.
    pub fn question(self, kind: SectionKind) -> Option<&'static str> {
        use PromptAction::*;
        use SectionKind::*;

        let text = match (self, kind) {
            (Close, Prs) => "Are you sure you want to close this PR? (Y/n) ",
            (Reopen, Prs) => "Are you sure you want to reopen this PR? (Y/n) ",
            (Ready, Prs) => "Are you sure you want to mark this PR as ready? (Y/n) ",
            (Merge, Prs) => "Are you sure you want to merge this PR? (Y/n) ",
            (Update, Prs) => "Are you sure you want to update this PR? (Y/n) ",
            (Close, Issues) => "Are you sure you want to close this issue? (Y/n) ",
            (Reopen, Issues) => "Are you sure you want to reopen this issue? (Y/n) ",
            (Delete, Branches) => "Are you sure you want to delete this branch? (Y/n) ",
            (Done, Notifications) => "Are you sure you want to mark this notification as done? (Y/n) ",
            (DoneAll, Notifications) => {
                "Are you sure you want to mark all notifications as done? (Y/n) "
            }
            (Quit, _) => "Are you sure you want to quit? (Y/n) ",
            _ => return None,
        };
        Some(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptOutcome {
    Pending,
    Confirmed(PromptAction),
    Cancelled,
}

/// An open confirmation box.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub action: PromptAction,
    pub question: &'static str,
    pub input: TextInput,
}

impl Prompt {
    pub fn new(action: PromptAction, kind: SectionKind) -> Option<Self> {
        Some(Self {
            action,
            question: action.question(kind)?,
            input: TextInput::default(),
        })
    }

    /// Empty input and `y`/`Y` confirm. Everything else cancels.
    pub fn answer(&self) -> PromptOutcome {
        match self.input.value().trim() {
            "" | "y" | "Y" => PromptOutcome::Confirmed(self.action),
            _ => PromptOutcome::Cancelled,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> PromptOutcome {
        match key.code {
            KeyCode::Esc => PromptOutcome::Cancelled,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                PromptOutcome::Cancelled
            }
            KeyCode::Enter => self.answer(),
            _ => {
                self.input.handle_key(key);
                PromptOutcome::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(prompt: &mut Prompt, code: KeyCode) -> PromptOutcome {
        prompt.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn close_pr() -> Prompt {
        Prompt::new(PromptAction::Close, SectionKind::Prs).unwrap()
    }

    #[test]
    fn empty_input_confirms() {
        let mut prompt = close_pr();
        assert_eq!(
            press(&mut prompt, KeyCode::Enter),
            PromptOutcome::Confirmed(PromptAction::Close)
        );
    }

    #[test]
    fn y_confirms_in_either_case() {
        for c in ['y', 'Y'] {
            let mut prompt = close_pr();
            assert_eq!(press(&mut prompt, KeyCode::Char(c)), PromptOutcome::Pending);
            assert_eq!(
                press(&mut prompt, KeyCode::Enter),
                PromptOutcome::Confirmed(PromptAction::Close)
            );
        }
    }

    #[test]
    fn anything_else_cancels() {
        for text in ["n", "N", "yes", "q"] {
            let mut prompt = close_pr();
            for c in text.chars() {
                press(&mut prompt, KeyCode::Char(c));
            }
            assert_eq!(press(&mut prompt, KeyCode::Enter), PromptOutcome::Cancelled);
        }
    }

    #[test]
    fn escape_and_interrupt_cancel() {
        let mut prompt = close_pr();
        assert_eq!(press(&mut prompt, KeyCode::Esc), PromptOutcome::Cancelled);

        let mut prompt = close_pr();
        assert_eq!(
            prompt.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            PromptOutcome::Cancelled
        );
    }

    #[test]
    fn questions_depend_on_section_kind() {
        assert_eq!(
            PromptAction::Close.question(SectionKind::Issues),
            Some("Are you sure you want to close this issue? (Y/n) ")
        );
        assert_eq!(
            PromptAction::Delete.question(SectionKind::Branches),
            Some("Are you sure you want to delete this branch? (Y/n) ")
        );
        assert!(PromptAction::Merge.question(SectionKind::Issues).is_none());
        assert!(Prompt::new(PromptAction::Delete, SectionKind::Prs).is_none());
    }
}
