mod popup;
mod preview;

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState};
use ratatui::Frame;

use crate::app::App;
use crate::config::ViewKind;
use crate::section::Section;
use crate::task::TaskState;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_section_tabs(frame, app, chunks[1]);

    let body = if app.preview_open && app.current_row().is_some() {
        let width = app.ctx.config.defaults.preview_width.min(90);
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20), Constraint::Percentage(width)])
            .split(chunks[2]);
        preview::render(frame, app, split[1]);
        split[0]
    } else {
        chunks[2]
    };

    match app.current_section() {
        Some(section) => render_section(frame, section, body),
        None => frame.render_widget(
            Paragraph::new("No sections configured for this view")
                .style(Style::default().fg(Color::Gray)),
            body,
        ),
    }

    render_status_bar(frame, app, chunks[3]);

    if let Some(prompt) = app.current_section().and_then(|s| s.base().prompt.as_ref()) {
        popup::render_prompt(frame, prompt);
    }
    if let Some(prompt) = &app.quit_prompt {
        popup::render_prompt(frame, prompt);
    }
    if let Some(input) = &app.input {
        popup::render_input(frame, input);
    }
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        " gitdash ",
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];

    for view in ViewKind::ALL {
        let style = if view == app.view {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" {} ", view.label()), style));
    }

    if let Some(repo) = &app.ctx.repo {
        spans.push(Span::styled(
            format!("  {}", repo.full_name()),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

/// The search section has no title of its own.
fn tab_label(title: &str) -> &str {
    if title.is_empty() {
        "🔍"
    } else {
        title
    }
}

fn render_section_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let Some(state) = app.view_state() else {
        return;
    };

    let mut spans = Vec::new();
    for (i, section) in state.sections.iter().enumerate() {
        let count = if section.has_fetched() && !section.is_loading() {
            format!(" ({})", section.total_count())
        } else {
            String::new()
        };
        let style = if i == state.current {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(
            format!(" {}{} ", tab_label(section.base().title()), count),
            style,
        ));
        spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_section(frame: &mut Frame, section: &dyn Section, area: Rect) {
    let base = section.base();
    let border = if base.is_searching {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let mut search = vec![Span::styled(
        base.search_line(),
        if base.is_searching {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::Gray)
        },
    )];
    if base.is_filtered_by_current_repo {
        search.push(Span::styled(
            "  [this repo]",
            Style::default().fg(Color::Cyan),
        ));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(Line::from(search));

    let rows = section.build_rows();
    if rows.is_empty() {
        let (text, color) = match section.error() {
            Some(err) => (format!("Error: {}", err), Color::Red),
            None if section.is_loading() || !section.has_fetched() => {
                ("Loading...".to_string(), Color::Yellow)
            }
            None => (section.empty_state(), Color::Gray),
        };
        let empty = Paragraph::new(text)
            .block(block)
            .style(Style::default().fg(color));
        frame.render_widget(empty, area);
        return;
    }

    let columns = section.columns();
    let widths: Vec<Constraint> = columns
        .iter()
        .map(|c| match c.width {
            Some(w) => Constraint::Length(w),
            None => Constraint::Fill(1),
        })
        .collect();

    let header = Row::new(columns.iter().map(|c| Cell::from(c.title))).style(
        Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::BOLD),
    );

    let table_rows: Vec<Row> = rows
        .into_iter()
        .map(|row| {
            let style = if row.dimmed {
                Style::default().fg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(row.cells).style(style)
        })
        .collect();

    let table = Table::new(table_rows, widths)
        .header(header)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = TableState::default();
    state.select(Some(section.cursor()));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();

    if let Some(status) = app.tasks.status() {
        if let Some(badge) = status.badge {
            spans.push(Span::styled(badge, Style::default().fg(Color::Cyan)));
        }
        let color = match status.state {
            TaskState::Start => Color::Yellow,
            TaskState::Finished => Color::Green,
            TaskState::Error => Color::Red,
        };
        spans.push(Span::styled(status.text, Style::default().fg(color)));
        spans.push(Span::raw("  "));
    }

    let pager = app
        .current_section()
        .map(|s| s.pager_content())
        .unwrap_or_default();
    if pager.is_empty() {
        spans.push(Span::styled(help(app.view), Style::default().fg(Color::Gray)));
    } else {
        spans.push(Span::styled(pager, Style::default().fg(Color::Gray)));
    }

    let status_bar = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(status_bar, area);
}

fn help(view: ViewKind) -> &'static str {
    match view {
        ViewKind::Prs => "j/k: nav | h/l: sections | s: view | /: search | x/m/c/L/a: act | q: quit",
        ViewKind::Issues => "j/k: nav | h/l: sections | s: view | /: search | x/c/L/a: act | q: quit",
        ViewKind::Notifications => {
            "j/k: nav | h/l: sections | s: view | m/M: read | d/D: done | b: bookmark | q: quit"
        }
        ViewKind::Repo => "j/k: nav | s: view | C: checkout | D: delete | q: quit",
    }
}
