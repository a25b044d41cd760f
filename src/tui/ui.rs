//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Widget, Wrap},
    Frame,
};

use super::app::{App, Overlay, Pane};
use super::compose;
use super::messages;
use super::sidebar;
use crate::notifications::ToastKind;
use crate::realtime::ConnectionState;

/// Sidebar width in columns.
const SIDEBAR_WIDTH: u16 = 32;

const TITLE: &str = " SkillSwap";

/// Indicator symbol and color for the chat connection.
fn status_indicator(state: &ConnectionState) -> (&'static str, Color) {
    match state {
        ConnectionState::Connected => ("*", Color::Green),
        ConnectionState::Connecting | ConnectionState::Reconnecting { .. } => ("~", Color::Yellow),
        ConnectionState::Idle => ("o", Color::Red),
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let [header_area, main_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    let [sidebar_area, content_area] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Fill(1)])
            .areas(main_area);

    sidebar::render(
        sidebar_area,
        frame.buffer_mut(),
        &app.sidebar,
        &app.list,
        app.active_pane == Pane::Sidebar,
    );

    let [messages_area, compose_area] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
    ])
    .areas(content_area);

    messages::render(
        messages_area,
        frame.buffer_mut(),
        &app.messages,
        app.room.as_ref(),
        &app.session.user_id,
    );

    if let Some(ref room) = app.room {
        let placeholder = format!("Message {}...", room.room().title());
        compose::render(
            compose_area,
            frame,
            &app.compose,
            &placeholder,
            app.is_connected(),
            app.active_pane == Pane::Compose,
        );
    }

    render_status(status_area, frame.buffer_mut(), app);

    match app.overlay {
        Overlay::None => {}
        Overlay::Logs => {
            let height = popup_area(area).height.saturating_sub(2) as usize;
            let lines = app.logs.tail(height);
            let title = format!(" Logs, {} lines (Esc to close) ", app.logs.len());
            render_popup(frame, &title, lines);
        }
        Overlay::Notifications => {
            let recent = app
                .notifications
                .as_ref()
                .map(|n| n.recent())
                .unwrap_or_default();
            let lines = if recent.is_empty() {
                vec!["No notifications yet".to_string()]
            } else {
                recent
                    .iter()
                    .map(|n| {
                        if n.title.is_empty() {
                            n.toast_text().to_string()
                        } else {
                            format!("{}: {}", n.title, n.toast_text())
                        }
                    })
                    .collect()
            };
            render_popup(frame, " Notifications (Esc to close) ", lines);
        }
    }
}

fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = Span::styled(
        TITLE,
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let (symbol, color) = status_indicator(&app.connection);
    let state = format!(" {} {} ", symbol, app.connection.describe());
    let user = format!(" {} ", app.session.display_name());

    let right_width = state.chars().count() + user.chars().count();
    let padding_width =
        (area.width as usize).saturating_sub(TITLE.chars().count() + right_width);

    let header_line = Line::from(vec![
        title,
        Span::raw(" ".repeat(padding_width)),
        Span::styled(state, Style::default().fg(color)),
        Span::styled(user, Style::default().fg(Color::Cyan)),
    ]);

    Paragraph::new(header_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Status bar: the active toast, or key hints.
fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    if let Some((ref toast, _)) = app.toast {
        let color = match toast.kind {
            ToastKind::Success => Color::Green,
            ToastKind::Error => Color::Red,
            ToastKind::Info => Color::Cyan,
        };
        let line = Line::from(Span::styled(
            format!(" {} ", toast.text),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let sep_style = Style::default().fg(Color::DarkGray);
    let hint_style = Style::default().fg(Color::Gray);
    let room = app
        .room
        .as_ref()
        .map(|r| r.room().title().to_string())
        .unwrap_or_else(|| "(none)".to_string());

    let status_line = Line::from(vec![
        Span::styled(format!(" {} ", room), Style::default().fg(Color::Yellow)),
        Span::styled(" | ", sep_style),
        Span::styled(
            format!("Tab: {} ", app.active_pane.as_str()),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(" | ", sep_style),
        Span::styled("/: search", hint_style),
        Span::styled(" | ", sep_style),
        Span::styled("C-n: notifications", hint_style),
        Span::styled(" | ", sep_style),
        Span::styled("C-l: logs", hint_style),
        Span::styled(" | ", sep_style),
        Span::styled("C-c: quit", hint_style),
    ]);

    Paragraph::new(status_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Centered area covering most of the screen.
fn popup_area(area: Rect) -> Rect {
    let width = area.width.saturating_sub(8).max(20).min(area.width);
    let height = area.height.saturating_sub(4).max(5).min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn render_popup(frame: &mut Frame, title: &str, lines: Vec<String>) {
    let area = popup_area(frame.area());
    frame.render_widget(Clear, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title.to_string());

    let text: Vec<Line> = lines.into_iter().map(Line::from).collect();
    let popup = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(popup, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_indicator() {
        assert_eq!(status_indicator(&ConnectionState::Connected).1, Color::Green);
        assert_eq!(status_indicator(&ConnectionState::Idle).1, Color::Red);
        let reconnecting = ConnectionState::Reconnecting {
            reason: "closed".to_string(),
        };
        assert_eq!(status_indicator(&reconnecting).0, "~");
    }

    #[test]
    fn test_popup_area_fits_inside() {
        let screen = Rect::new(0, 0, 100, 40);
        let popup = popup_area(screen);
        assert_eq!(popup, Rect::new(4, 2, 92, 36));

        let tiny = Rect::new(0, 0, 10, 3);
        let popup = popup_area(tiny);
        assert!(popup.width <= tiny.width && popup.height <= tiny.height);
    }
}
