//! Terminal UI rendering.
//!
//! One screen: an input box, the mirrored task list, and a status bar. The
//! list is rendered exactly in the order the sync core produced it.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::app::{App, PanelFocus};
use crate::sync::Task;

/// Main draw function for the entire UI.
pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    render_input(frame, chunks[0], app);
    render_tasks(frame, chunks[1], app);
    render_status_bar(frame, chunks[2], app);
}

/// Render the input box.
fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let border_style = if app.focus == PanelFocus::Input {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let input = Paragraph::new(app.input.as_str())
        .block(Block::default().title("New task").borders(Borders::ALL))
        .style(border_style);
    frame.render_widget(input, area);

    if app.focus == PanelFocus::Input {
        let cursor_x = u16::try_from(app.input[..app.cursor_position].chars().count())
            .unwrap_or(u16::MAX)
            .saturating_add(area.x + 1);
        frame.set_cursor_position(Position::new(cursor_x, area.y + 1));
    }
}

/// Render the task list, most recently created first.
fn render_tasks(frame: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .tasks
        .iter()
        .map(|task| task_line(task, &app.timestamp_format))
        .collect();

    let border_style = if app.focus == PanelFocus::List {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let list = List::new(items)
        .block(
            Block::default()
                .title(format!("Tasks ({})", app.tasks.len()))
                .borders(Borders::ALL)
                .border_style(border_style),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if app.focus == PanelFocus::List && !app.tasks.is_empty() {
        state.select(Some(app.selected));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

/// Render one task row: text plus a dim creation time (or a pending marker
/// while the server timestamp is unresolved).
fn task_line(task: &Task, timestamp_format: &str) -> ListItem<'static> {
    let when = task.created_at.map_or_else(
        || "(pending)".to_string(),
        |ts| format_timestamp_ms(ts.as_millis(), timestamp_format),
    );
    let line = Line::from(vec![
        Span::raw(task.text.clone()),
        Span::raw("  "),
        Span::styled(when, Style::default().fg(Color::DarkGray)),
    ]);
    ListItem::new(line)
}

/// Render the status bar: connection state, status message, key hints.
fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let connection = if app.connected {
        Span::styled("● live", Style::default().fg(Color::Green))
    } else {
        Span::styled("○ offline", Style::default().fg(Color::Red))
    };
    let line = Line::from(vec![
        connection,
        Span::raw("  "),
        Span::raw(app.status.clone()),
        Span::raw("  "),
        Span::styled(
            "Tab: focus · Enter: add · d: delete · Esc: quit",
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

/// Format an epoch-millisecond timestamp with the given chrono format.
fn format_timestamp_ms(ms: u64, format: &str) -> String {
    use chrono::{Local, TimeZone};
    let secs = i64::try_from(ms / 1000).unwrap_or(i64::MAX);
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format(format).to_string(),
        _ => "??:??".to_string(),
    }
}
