use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone)]
pub enum Event {
    Init,
    Tick,
    Render,
    Resize(u16, u16),
    Key(KeyEvent),
    /// Bracketed paste, delivered whole so pasted newlines never act as Enter.
    Paste(String),
}

impl Event {
    /// Ctrl+C outside of any text input quits immediately.
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            Event::Key(KeyEvent {
                code: KeyCode::Char('c'),
                modifiers: KeyModifiers::CONTROL,
                ..
            })
        )
    }
}

/// Pasted text ready for a text field. Line endings become `\n` in comment
/// bodies; single line fields such as searches and label lists get spaces.
pub fn paste_text(raw: &str, multiline: bool) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    if multiline {
        return text;
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
