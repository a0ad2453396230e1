use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;

use crate::action::InputKind;
use crate::app::InputBox;
use crate::autocomplete::MAX_VISIBLE;
use crate::section::prompt::Prompt;

fn title(text: &str) -> Span<'static> {
    Span::styled(
        format!(" {} ", text),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    )
}

/// Text with a block cursor drawn at char index `cursor`.
fn with_cursor(value: &str, cursor: usize) -> Vec<Line<'static>> {
    let before: String = value.chars().take(cursor).collect();
    let at = value.chars().nth(cursor).filter(|c| *c != '\n');
    let after: String = value
        .chars()
        .skip(cursor + usize::from(at.is_some()))
        .collect();
    let cursor_style = Style::default().bg(Color::White).fg(Color::Black);

    let mut text = before;
    text.push('\u{0}');
    text.push_str(&after);

    text.split('\n')
        .map(|line| match line.split_once('\u{0}') {
            Some((head, tail)) => Line::from(vec![
                Span::raw(head.to_string()),
                Span::styled(at.unwrap_or(' ').to_string(), cursor_style),
                Span::raw(tail.to_string()),
            ]),
            None => Line::from(line.to_string()),
        })
        .collect()
}

/// Centered yes/no question with the typed answer.
pub fn render_prompt(frame: &mut Frame, prompt: &Prompt) {
    let area = centered_rect(64, 5, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![Line::from("")];
    let mut answer = with_cursor(prompt.input.value(), prompt.input.cursor());
    let mut first = vec![Span::raw(prompt.question)];
    if let Some(line) = answer.first_mut() {
        first.append(&mut line.spans);
    }
    lines.push(Line::from(first));

    let popup = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title("Confirm")))
        .wrap(Wrap { trim: false });
    frame.render_widget(popup, area);
}

/// Input box for comments, labels and assignees, with suggestions below it.
pub fn render_input(frame: &mut Frame, input: &InputBox) {
    let height = if input.kind == InputKind::Comment { 12 } else { 5 };
    let area = centered_rect(70, height, frame.area());
    frame.render_widget(Clear, area);

    let hint = match input.kind {
        InputKind::Comment => "Ctrl+d: submit | Enter: newline | Tab: mention | Esc: cancel",
        InputKind::Labels => "Enter: submit | Tab: complete | comma separated | Esc: cancel",
        InputKind::Assign | InputKind::Unassign => {
            "Enter: submit | Tab: complete | space separated | Esc: cancel"
        }
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let field = Paragraph::new(with_cursor(input.input.value(), input.input.cursor()))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title(&format!("{} {}", input.kind.title(), input.repo))),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(field, chunks[0]);
    frame.render_widget(
        Paragraph::new(Span::styled(hint, Style::default().fg(Color::Gray))),
        chunks[1],
    );

    if input.autocomplete.is_visible() {
        let below = Rect {
            y: area.y.saturating_add(area.height),
            ..area
        };
        render_suggestions(
            frame,
            input.autocomplete.filtered(),
            input.autocomplete.selected_index(),
            below,
        );
    }
}

fn render_suggestions(frame: &mut Frame, items: &[String], selected: usize, below: Rect) {
    let outer = frame.area();
    let height = (items.len().min(MAX_VISIBLE) + 2) as u16;
    if below.y >= outer.height {
        return;
    }
    let area = Rect {
        x: below.x,
        y: below.y,
        width: below.width.min(40),
        height: height.min(outer.height - below.y),
    };
    frame.render_widget(Clear, area);

    let list_items: Vec<ListItem> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let style = if i == selected {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let prefix = if i == selected { "> " } else { "  " };
            ListItem::new(Line::from(Span::styled(
                format!("{}{}", prefix, item),
                style,
            )))
        })
        .collect();

    let list = List::new(list_items).block(Block::default().borders(Borders::ALL));

    let mut state = ListState::default();
    state.select(Some(selected));
    frame.render_stateful_widget(list, area, &mut state);
}

/// Create a centered rect of at most `width` x `height` cells
fn centered_rect(width: u16, height: u16, outer: Rect) -> Rect {
    let popup_width = width.min(outer.width);
    let popup_height = height.min(outer.height);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length((outer.height.saturating_sub(popup_height)) / 2),
            Constraint::Length(popup_height),
            Constraint::Min(0),
        ])
        .split(outer);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length((outer.width.saturating_sub(popup_width)) / 2),
            Constraint::Length(popup_width),
            Constraint::Min(0),
        ])
        .split(vertical[1]);

    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn cursor_is_drawn_over_the_current_char() {
        let lines = with_cursor("abc", 1);
        assert_eq!(plain(&lines), ["abc"]);
        assert_eq!(lines[0].spans[1].content, "b");
    }

    #[test]
    fn cursor_at_end_and_across_lines() {
        assert_eq!(plain(&with_cursor("ab", 2)), ["ab "]);
        let lines = with_cursor("one\ntwo", 3);
        assert_eq!(plain(&lines), ["one ", "two"]);
    }

    #[test]
    fn centered_rect_fits_inside_outer() {
        let r = centered_rect(50, 7, Rect::new(0, 0, 40, 5));
        assert_eq!((r.width, r.height), (40, 5));
        let r = centered_rect(10, 2, Rect::new(0, 0, 20, 10));
        assert_eq!((r.x, r.y), (5, 4));
    }
}
