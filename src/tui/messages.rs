//! Messages pane: the open room's timeline, newest at the bottom.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::chat::room::RoomSession;
use crate::chat::time::time_label;
use crate::models::Message;

/// Scroll position, counted in lines up from the bottom. Zero follows new
/// messages.
#[derive(Default)]
pub struct MessagesState {
    pub scroll_from_bottom: usize,
}

impl MessagesState {
    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(lines);
    }

    pub fn reset(&mut self) {
        self.scroll_from_bottom = 0;
    }
}

/// Render the room header and timeline. `room` is `None` when no room is open.
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    state: &MessagesState,
    room: Option<&RoomSession>,
    me: &str,
) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let Some(session) = room else {
        render_placeholder(area, buf, "Select a conversation to start chatting");
        return;
    };

    let header_area = Rect::new(area.x, area.y, area.width, 1);
    render_room_header(header_area, buf, session);

    let body = Rect::new(
        area.x,
        area.y + 1,
        area.width,
        area.height.saturating_sub(1),
    );
    if body.height == 0 {
        return;
    }

    let timeline = session.timeline();
    if timeline.is_loading() {
        render_placeholder(body, buf, "Loading messages...");
        return;
    }
    if timeline.messages().is_empty() {
        render_placeholder(body, buf, "No messages yet. Say hello!");
        return;
    }

    let lines = build_lines(timeline.messages(), me, session.room().title(), body.width as usize);
    let visible = body.height as usize;
    let start = window_start(lines.len(), visible, state.scroll_from_bottom);

    for (row, line) in lines.iter().skip(start).take(visible).enumerate() {
        let line_area = Rect::new(body.x, body.y + row as u16, body.width, 1);
        Paragraph::new(line.clone()).render(line_area, buf);
    }

    if lines.len() > visible {
        let x = body.x + body.width.saturating_sub(1);
        if start > 0 {
            let cell = &mut buf[(x, body.y)];
            cell.set_char('^');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
        if start + visible < lines.len() {
            let cell = &mut buf[(x, body.y + body.height - 1)];
            cell.set_char('v');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
    }
}

fn render_room_header(area: Rect, buf: &mut Buffer, session: &RoomSession) {
    let room = session.room();
    let line = Line::from(vec![
        Span::styled(
            format!(" {} ", room.title()),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(
                " teaches {} / learns {} ",
                room.offered_skill, room.requested_skill
            ),
            Style::default().fg(Color::Gray),
        ),
    ]);
    Paragraph::new(line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

fn render_placeholder(area: Rect, buf: &mut Buffer, text: &str) {
    let y = area.y + area.height / 2;
    let row = Rect::new(area.x, y, area.width, 1);
    Paragraph::new(Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::DarkGray),
    )))
    .alignment(ratatui::layout::Alignment::Center)
    .render(row, buf);
}

/// First line to draw so that the window ends `from_bottom` lines above the
/// last one.
fn window_start(total: usize, visible: usize, from_bottom: usize) -> usize {
    let max_start = total.saturating_sub(visible);
    max_start.saturating_sub(from_bottom)
}

/// Flatten messages into display lines: a sender/time line, the wrapped
/// body, and a blank separator.
fn build_lines(messages: &[Message], me: &str, other_name: &str, width: usize) -> Vec<Line<'static>> {
    let body_width = width.saturating_sub(3);
    let mut lines = Vec::new();

    for msg in messages {
        let mine = msg.is_from(me);
        let (sender, color) = if mine {
            ("You".to_string(), Color::Cyan)
        } else {
            (other_name.to_string(), Color::Magenta)
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!(" {}", sender),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {}", time_label(msg.created_at)),
                Style::default().fg(Color::DarkGray),
            ),
        ]));
        for chunk in wrap_text(&msg.content, body_width) {
            lines.push(Line::from(Span::styled(
                format!("   {}", chunk),
                Style::default().fg(Color::White),
            )));
        }
        lines.push(Line::default());
    }
    lines.pop();
    lines
}

/// Word-wrap to `max_width` columns. Words longer than a line are split.
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if max_width == 0 {
        return Vec::new();
    }
    let mut result = Vec::new();
    for line in text.lines() {
        if line.width() <= max_width {
            result.push(line.to_string());
            continue;
        }
        let mut current = String::new();
        let mut current_w = 0;
        for word in line.split_whitespace() {
            let word_w = word.width();
            if current_w > 0 && current_w + 1 + word_w <= max_width {
                current.push(' ');
                current.push_str(word);
                current_w += 1 + word_w;
                continue;
            }
            if current_w > 0 {
                result.push(std::mem::take(&mut current));
                current_w = 0;
            }
            if word_w <= max_width {
                current.push_str(word);
                current_w = word_w;
                continue;
            }
            for c in word.chars() {
                let w = c.width().unwrap_or(0);
                if current_w + w > max_width {
                    result.push(std::mem::take(&mut current));
                    current_w = 0;
                }
                current.push(c);
                current_w += w;
            }
        }
        if !current.is_empty() {
            result.push(current);
        }
    }
    result
}
