//! Compose box: single-line message input for the open room.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
    Frame,
};
use unicode_width::UnicodeWidthChar;

/// Height of the compose box: border + input + border.
pub const COMPOSE_HEIGHT: u16 = 3;

/// Text being typed. The cursor is a char offset into `input`.
#[derive(Default)]
pub struct ComposeState {
    pub input: String,
    pub cursor_pos: usize,
}

impl ComposeState {
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = self.char_to_byte(self.cursor_pos);
        self.input.insert(byte_pos, c);
        self.cursor_pos += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor_pos == 0 {
            return;
        }
        let end = self.char_to_byte(self.cursor_pos);
        let start = self.char_to_byte(self.cursor_pos - 1);
        self.input.drain(start..end);
        self.cursor_pos -= 1;
    }

    pub fn delete(&mut self) {
        if self.cursor_pos >= self.input.chars().count() {
            return;
        }
        let start = self.char_to_byte(self.cursor_pos);
        let end = self.char_to_byte(self.cursor_pos + 1);
        self.input.drain(start..end);
    }

    pub fn move_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor_pos < self.input.chars().count() {
            self.cursor_pos += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_pos = self.input.chars().count();
    }

    pub fn clear(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    /// Whether there is anything worth sending.
    pub fn is_blank(&self) -> bool {
        self.input.trim().is_empty()
    }

    fn char_to_byte(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Render the compose box. Takes the `Frame` so the terminal cursor can be
/// placed when focused.
pub fn render(
    area: Rect,
    frame: &mut Frame,
    state: &ComposeState,
    placeholder: &str,
    connected: bool,
    focused: bool,
) {
    let border_style = match (focused, connected) {
        (true, true) => Style::default().fg(Color::Yellow),
        (true, false) => Style::default().fg(Color::Red),
        (false, _) => Style::default().fg(Color::DarkGray),
    };
    let border_type = if focused {
        BorderType::Double
    } else {
        BorderType::Plain
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let input_area = Rect::new(inner.x, inner.y, inner.width, 1);
    let display = display_text(&state.input, state.cursor_pos, input_area.width as usize);
    render_input(input_area, frame.buffer_mut(), state, &display, placeholder, connected);

    if focused {
        let offset = if state.input.is_empty() { 0 } else { display.cursor_offset };
        frame.set_cursor_position((input_area.x + 1 + offset as u16, input_area.y));
    }
}

fn render_input(
    area: Rect,
    buf: &mut Buffer,
    state: &ComposeState,
    display: &DisplayText,
    placeholder: &str,
    connected: bool,
) {
    let line = if state.input.is_empty() {
        let hint = if connected {
            format!(" {}", placeholder)
        } else {
            " Connecting to server...".to_string()
        };
        let truncated: String = hint.chars().take(area.width as usize).collect();
        Line::from(Span::styled(truncated, Style::default().fg(Color::DarkGray)))
    } else {
        let color = if connected { Color::White } else { Color::Gray };
        Line::from(Span::styled(
            format!(" {}", display.visible),
            Style::default().fg(color),
        ))
    };
    Paragraph::new(line).render(area, buf);
}

/// The visible window of the input and where the cursor lands in it.
#[derive(Debug, PartialEq, Eq)]
struct DisplayText {
    visible: String,
    /// Columns from the start of `visible`.
    cursor_offset: usize,
}

/// Scroll the input horizontally so the cursor stays on screen. Widths are
/// in terminal columns, so wide characters count double.
fn display_text(input: &str, cursor_pos: usize, width: usize) -> DisplayText {
    // One column of left margin.
    let avail = width.saturating_sub(1);
    if avail == 0 {
        return DisplayText {
            visible: String::new(),
            cursor_offset: 0,
        };
    }

    let chars: Vec<(char, usize)> = input
        .chars()
        .map(|c| (c, c.width().unwrap_or(0)))
        .collect();
    let col_of = |idx: usize| -> usize { chars.iter().take(idx).map(|(_, w)| w).sum() };
    let cursor_col = col_of(cursor_pos.min(chars.len()));

    // Leave one column for the cursor itself past the last char.
    let mut start = 0;
    while cursor_col - col_of(start) >= avail && start < chars.len() {
        start += 1;
    }

    let mut visible = String::new();
    let mut used = 0;
    for (c, w) in chars.iter().skip(start) {
        if used + w > avail {
            break;
        }
        visible.push(*c);
        used += w;
    }

    DisplayText {
        visible,
        cursor_offset: cursor_col - col_of(start),
    }
}
