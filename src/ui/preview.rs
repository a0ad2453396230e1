use chrono::Utc;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::app::App;
use crate::section::RowRef;
use crate::types::{format_age, Comment, PrState};

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let Some(row) = app.current_row() else {
        return;
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Preview ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));

    let preview = Paragraph::new(preview_lines(row))
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(preview, area);
}

fn heading(text: String) -> Line<'static> {
    Line::from(Span::styled(
        text,
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    ))
}

fn field(name: &str, value: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<10}", name), Style::default().fg(Color::Gray)),
        Span::raw(value),
    ])
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn body_lines(lines: &mut Vec<Line<'static>>, body: Option<&str>) {
    lines.push(Line::from(""));
    match body.map(str::trim).filter(|b| !b.is_empty()) {
        Some(body) => lines.extend(body.lines().map(|l| Line::from(l.to_string()))),
        None => lines.push(Line::from(Span::styled(
            "No description provided.",
            Style::default().fg(Color::DarkGray),
        ))),
    }
}

fn comment_lines(lines: &mut Vec<Line<'static>>, comments: &[Comment]) {
    if comments.is_empty() {
        return;
    }
    let now = Utc::now();
    lines.push(Line::from(""));
    lines.push(heading(format!("Comments ({})", comments.len())));
    for comment in comments {
        lines.push(Line::from(vec![
            Span::styled(format!("@{}", comment.author), Style::default().fg(Color::Cyan)),
            Span::styled(
                format!("  {}", format_age(comment.created_at, now)),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
        lines.extend(comment.body.lines().map(|l| Line::from(format!("  {}", l))));
    }
}

/// Detail lines for the row under the cursor.
pub fn preview_lines(row: RowRef<'_>) -> Vec<Line<'static>> {
    let now = Utc::now();
    let mut lines = Vec::new();

    match row {
        RowRef::Pr(pr) => {
            lines.push(heading(format!("#{} {}", pr.number, pr.title)));
            lines.push(field("Repo", pr.repo.clone()));
            let state = match (pr.state, pr.is_draft) {
                (PrState::Open, true) => "Draft".to_string(),
                (state, _) => state.to_string(),
            };
            lines.push(field("State", state));
            lines.push(field("Author", format!("@{}", pr.author)));
            if let (Some(base), Some(head)) = (&pr.base_ref, &pr.head_ref) {
                lines.push(field("Branch", format!("{} ← {}", base, head)));
            }
            lines.push(field("Labels", list(&pr.labels)));
            lines.push(field("Assignees", list(&pr.assignees)));
            lines.push(field("Updated", format_age(pr.updated_at, now)));
            body_lines(&mut lines, pr.body.as_deref());
            comment_lines(&mut lines, &pr.recent_comments);
        }
        RowRef::Issue(issue) => {
            lines.push(heading(format!("#{} {}", issue.number, issue.title)));
            lines.push(field("Repo", issue.repo.clone()));
            lines.push(field("State", issue.state.to_string()));
            lines.push(field("Author", format!("@{}", issue.author)));
            lines.push(field("Labels", list(&issue.labels)));
            lines.push(field("Assignees", list(&issue.assignees)));
            lines.push(field("Updated", format_age(issue.updated_at, now)));
            body_lines(&mut lines, issue.body.as_deref());
            comment_lines(&mut lines, &issue.recent_comments);
        }
        RowRef::Notification(n) => {
            lines.push(heading(n.subject_title.clone()));
            lines.push(field("Repo", n.repo.clone()));
            lines.push(field("Type", format!("{:?}", n.subject_type)));
            lines.push(field("Reason", n.reason.replace('_', " ")));
            lines.push(field(
                "Status",
                if n.unread { "Unread" } else { "Read" }.to_string(),
            ));
            if let Some(activity) = &n.activity {
                let state = match (activity.subject_state, activity.is_draft) {
                    (Some(PrState::Open), true) => Some("Draft".to_string()),
                    (state, _) => state.map(|s| s.to_string()),
                };
                if let Some(state) = state {
                    lines.push(field("State", state));
                }
                lines.push(field("New", activity.new_comments.to_string()));
            }
            let description = n.activity_description();
            if !description.is_empty() {
                lines.push(field("Activity", description));
            }
            if n.is_bookmarked {
                lines.push(field("Bookmark", "yes".to_string()));
            }
            lines.push(field("Updated", format_age(n.updated_at, now)));
        }
        RowRef::Branch(b) => {
            lines.push(heading(b.name.clone()));
            if b.is_current {
                lines.push(field("Current", "checked out".to_string()));
            }
            lines.push(field(
                "Upstream",
                b.upstream.clone().unwrap_or_else(|| "-".to_string()),
            ));
            lines.push(field("Ahead", b.ahead.to_string()));
            lines.push(field("Behind", b.behind.to_string()));
            lines.push(field("Updated", format_age(b.last_commit_at, now)));
            lines.push(Line::from(""));
            lines.push(Line::from(b.last_commit_message.clone()));
        }
    }

    lines
}
