//! Sidebar widget: the conversation list with a search filter.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::chat::conversations::ConversationList;
use crate::chat::time::format_date;
use crate::models::Room;

/// Rows per room: name line + preview line.
const ROWS_PER_ROOM: usize = 2;

/// Sidebar navigation state. The room data itself lives in
/// [`ConversationList`]; this only tracks the cursor and the filter.
#[derive(Default)]
pub struct SidebarState {
    /// Room id under the cursor. Tracked by id so it follows reordering.
    pub cursor: Option<String>,
    /// Current filter text.
    pub filter: String,
    /// Whether keystrokes go to the filter.
    pub filtering: bool,
}

impl SidebarState {
    /// Rooms currently shown.
    pub fn visible<'a>(&self, list: &'a ConversationList) -> Vec<&'a Room> {
        list.filtered(&self.filter)
    }

    /// Index of the cursor within the visible rooms, clamped to the first.
    pub fn cursor_index(&self, list: &ConversationList) -> usize {
        let visible = self.visible(list);
        self.cursor
            .as_deref()
            .and_then(|id| visible.iter().position(|r| r.id == id))
            .unwrap_or(0)
    }

    /// Room id under the cursor, if any room is visible.
    pub fn cursor_room<'a>(&self, list: &'a ConversationList) -> Option<&'a Room> {
        let visible = self.visible(list);
        let idx = self.cursor_index(list);
        visible.get(idx).copied()
    }

    pub fn move_up(&mut self, list: &ConversationList) {
        let visible = self.visible(list);
        let idx = self.cursor_index(list);
        if let Some(room) = visible.get(idx.saturating_sub(1)) {
            self.cursor = Some(room.id.clone());
        }
    }

    pub fn move_down(&mut self, list: &ConversationList) {
        let visible = self.visible(list);
        let idx = self.cursor_index(list);
        if let Some(room) = visible.get(idx + 1).or_else(|| visible.get(idx)) {
            self.cursor = Some(room.id.clone());
        }
    }

    pub fn push_filter(&mut self, c: char) {
        self.filter.push(c);
    }

    pub fn pop_filter(&mut self) {
        self.filter.pop();
    }

    pub fn clear_filter(&mut self) {
        self.filter.clear();
        self.filtering = false;
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the sidebar into the given area.
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    state: &SidebarState,
    list: &ConversationList,
    focused: bool,
) {
    let border_style = if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let border_type = if focused {
        BorderType::Double
    } else {
        BorderType::Plain
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style)
        .title(" Chats ");

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    // First row: the search filter.
    let filter_area = Rect::new(inner.x, inner.y, inner.width, 1);
    render_filter(filter_area, buf, state);

    let rooms_area = Rect::new(
        inner.x,
        inner.y + 1,
        inner.width,
        inner.height.saturating_sub(1),
    );
    if rooms_area.height == 0 {
        return;
    }

    if list.is_loading() && list.is_empty() {
        render_hint(rooms_area, buf, " Loading...");
        return;
    }
    if list.is_empty() {
        render_hint(rooms_area, buf, " No conversations yet");
        return;
    }

    let visible = state.visible(list);
    if visible.is_empty() {
        render_hint(rooms_area, buf, " No matches");
        return;
    }

    let slots = (rooms_area.height as usize / ROWS_PER_ROOM).max(1);
    let cursor = state.cursor_index(list);
    let offset = compute_scroll_offset(cursor, slots, visible.len());

    for (slot, room) in visible.iter().skip(offset).take(slots).enumerate() {
        let y = rooms_area.y + (slot * ROWS_PER_ROOM) as u16;
        if y >= rooms_area.y + rooms_area.height {
            break;
        }
        let ctx = RowCtx {
            area: Rect::new(rooms_area.x, y, rooms_area.width, 1),
            under_cursor: focused && offset + slot == cursor,
            open: list.selected_id() == Some(room.id.as_str()),
        };
        render_room(buf, &ctx, room, rooms_area.y + rooms_area.height);
    }
}

fn render_filter(area: Rect, buf: &mut Buffer, state: &SidebarState) {
    let (text, style) = if state.filtering {
        (
            format!(" /{}_", state.filter),
            Style::default().fg(Color::Yellow),
        )
    } else if state.filter.is_empty() {
        (" / to search".to_string(), Style::default().fg(Color::DarkGray))
    } else {
        (format!(" /{}", state.filter), Style::default().fg(Color::Gray))
    };
    let truncated: String = text.chars().take(area.width as usize).collect();
    Paragraph::new(Line::from(Span::styled(truncated, style))).render(area, buf);
}

fn render_hint(area: Rect, buf: &mut Buffer, text: &str) {
    let row = Rect::new(area.x, area.y, area.width, 1);
    Paragraph::new(Line::from(Span::styled(
        text.to_string(),
        Style::default().fg(Color::DarkGray),
    )))
    .render(row, buf);
}

/// Keep the cursor's slot visible.
fn compute_scroll_offset(cursor: usize, slots: usize, total: usize) -> usize {
    if total <= slots || cursor < slots {
        return 0;
    }
    cursor.saturating_sub(slots - 1).min(total.saturating_sub(slots))
}

/// Rendering context for one room entry.
struct RowCtx {
    area: Rect,
    under_cursor: bool,
    /// The room currently open in the message pane.
    open: bool,
}

/// Render a room as a name row and a preview row.
fn render_room(buf: &mut Buffer, ctx: &RowCtx, room: &Room, bottom: u16) {
    let marker = if ctx.under_cursor { "\u{25BA}" } else { " " };
    let name_style = match (ctx.under_cursor, ctx.open) {
        (true, _) => Style::default()
            .fg(Color::White)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
        (false, true) => Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
        (false, false) => Style::default().fg(Color::Gray),
    };

    let badge = room
        .last_activity_at
        .map(format_date)
        .unwrap_or_default();
    let badge_style = Style::default().fg(Color::DarkGray);
    render_row(
        buf,
        ctx.area,
        &format!("{}{}", marker, room.title()),
        &badge,
        name_style,
        badge_style,
    );

    let preview_y = ctx.area.y + 1;
    if preview_y < bottom {
        let preview_area = Rect::new(ctx.area.x, preview_y, ctx.area.width, 1);
        let active = if room.last_activity_at.is_some() {
            "Active"
        } else {
            ""
        };
        render_row(
            buf,
            preview_area,
            &format!("   {}", room.preview()),
            active,
            Style::default().fg(Color::DarkGray),
            Style::default().fg(Color::Green),
        );
    }
}

/// Render a row with left-aligned text and an optional right-aligned badge.
fn render_row(
    buf: &mut Buffer,
    area: Rect,
    left: &str,
    badge: &str,
    text_style: Style,
    badge_style: Style,
) {
    let width = area.width as usize;
    if width == 0 {
        return;
    }

    let badge_len = badge.chars().count();
    let max_left = if badge_len > 0 {
        width.saturating_sub(badge_len + 1)
    } else {
        width
    };

    let left_truncated: String = left.chars().take(max_left).collect();
    let left_len = left_truncated.chars().count();
    let pad = width.saturating_sub(left_len + badge_len);

    let line = Line::from(vec![
        Span::styled(left_truncated, text_style),
        Span::styled(" ".repeat(pad), text_style),
        Span::styled(badge.to_string(), badge_style),
    ]);

    Paragraph::new(line).render(Rect::new(area.x, area.y, area.width, 1), buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::testing::room;

    fn list() -> ConversationList {
        let mut list = ConversationList::new();
        list.load_finished(vec![room("a", "Ann"), room("b", "Bob"), room("c", "Cy")]);
        list
    }

    #[test]
    fn test_cursor_moves_and_clamps() {
        let list = list();
        let mut sidebar = SidebarState::default();
        assert_eq!(sidebar.cursor_room(&list).map(|r| r.id.as_str()), Some("a"));
        sidebar.move_up(&list);
        assert_eq!(sidebar.cursor.as_deref(), Some("a"));
        sidebar.move_down(&list);
        sidebar.move_down(&list);
        sidebar.move_down(&list);
        assert_eq!(sidebar.cursor.as_deref(), Some("c"));
    }

    #[test]
    fn test_cursor_follows_room_after_reorder() {
        let mut list = list();
        let mut sidebar = SidebarState::default();
        sidebar.move_down(&list);
        assert_eq!(sidebar.cursor.as_deref(), Some("b"));
        list.notify_activity("c");
        assert_eq!(sidebar.cursor_index(&list), 2);
        assert_eq!(sidebar.cursor_room(&list).map(|r| r.id.as_str()), Some("b"));
    }

    #[test]
    fn test_filter_narrows_rooms() {
        let list = list();
        let mut sidebar = SidebarState::default();
        for c in "BO".chars() {
            sidebar.push_filter(c);
        }
        let ids: Vec<_> = sidebar.visible(&list).iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
        sidebar.pop_filter();
        sidebar.pop_filter();
        assert_eq!(sidebar.visible(&list).len(), 3);
        sidebar.filtering = true;
        sidebar.clear_filter();
        assert!(!sidebar.filtering);
    }

    #[test]
    fn test_scroll_offset() {
        assert_eq!(compute_scroll_offset(0, 3, 10), 0);
        assert_eq!(compute_scroll_offset(5, 3, 10), 3);
        assert_eq!(compute_scroll_offset(9, 3, 10), 7);
        assert_eq!(compute_scroll_offset(2, 5, 3), 0);
    }
}
