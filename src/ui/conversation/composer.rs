use crate::ui::conversation::commands::{ParsedCommand, parse_slash_command};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

/// Result returned when the user interacts with the composer
#[derive(Debug, PartialEq)]
pub enum ComposerResult {
    /// Enter pressed on non-blank text; the composer keeps the text until
    /// the caller confirms it was accepted
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// State for the text area within the composer
#[derive(Debug, Clone, Default)]
pub struct TextAreaState {
    pub content: String,
    /// Byte offset, always on a char boundary
    pub cursor_position: usize,
}

/// Input box at the bottom of the chat screen
#[derive(Debug, Clone)]
pub struct ConversationComposer {
    state: TextAreaState,
    placeholder: String,
    busy: bool,
}

impl ConversationComposer {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            state: TextAreaState::default(),
            placeholder: placeholder.into(),
            busy: false,
        }
    }

    /// Handle key input
    pub fn handle_key(&mut self, key: KeyEvent) -> ComposerResult {
        if key.kind != KeyEventKind::Press {
            return ComposerResult::None;
        }

        match key.code {
            KeyCode::Enter => {
                if key.modifiers.contains(KeyModifiers::SHIFT) {
                    self.insert_char('\n');
                } else if !self.state.content.trim().is_empty() {
                    if let Some(command) = parse_slash_command(&self.state.content) {
                        self.clear();
                        return ComposerResult::Command(command);
                    }
                    return ComposerResult::Submitted(self.state.content.clone());
                }
            }
            KeyCode::Char(c) => {
                if key.modifiers.contains(KeyModifiers::CONTROL) {
                    if c == 'u' {
                        self.clear();
                    }
                } else {
                    self.insert_char(c);
                }
            }
            KeyCode::Backspace => {
                self.backspace();
            }
            KeyCode::Delete => {
                self.delete();
            }
            KeyCode::Left => {
                if let Some(c) = self.state.content[..self.state.cursor_position].chars().next_back() {
                    self.state.cursor_position -= c.len_utf8();
                }
            }
            KeyCode::Right => {
                if let Some(c) = self.state.content[self.state.cursor_position..].chars().next() {
                    self.state.cursor_position += c.len_utf8();
                }
            }
            KeyCode::Home => {
                self.state.cursor_position = 0;
            }
            KeyCode::End => {
                self.state.cursor_position = self.state.content.len();
            }
            _ => {}
        }

        ComposerResult::None
    }

    /// Insert a character at the cursor position
    fn insert_char(&mut self, c: char) {
        self.state.content.insert(self.state.cursor_position, c);
        self.state.cursor_position += c.len_utf8();
    }

    /// Delete character before cursor
    fn backspace(&mut self) -> bool {
        match self.state.content[..self.state.cursor_position].chars().next_back() {
            Some(c) => {
                self.state.cursor_position -= c.len_utf8();
                self.state.content.remove(self.state.cursor_position);
                true
            }
            None => false,
        }
    }

    /// Delete character at cursor
    fn delete(&mut self) -> bool {
        if self.state.cursor_position < self.state.content.len() {
            self.state.content.remove(self.state.cursor_position);
            true
        } else {
            false
        }
    }

    /// Grey the box out while a reply is pending
    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    pub fn content(&self) -> &str {
        &self.state.content
    }

    pub fn clear(&mut self) {
        self.state = TextAreaState::default();
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let (title, border) = if self.busy {
            ("Waiting for reply…", Style::default().fg(Color::DarkGray))
        } else {
            ("Ask a question", Style::default().fg(Color::Green))
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(border);

        let lines: Vec<Line> = if self.state.content.is_empty() {
            vec![Line::from(Span::styled(
                self.placeholder.as_str(),
                Style::default().fg(Color::DarkGray),
            ))]
        } else {
            let mut content = self.state.content.clone();
            content.insert(self.state.cursor_position.min(content.len()), '▌');
            content.split('\n').map(|l| Line::from(l.to_string())).collect()
        };

        // Keep the cursor line visible when the text is taller than the box
        let inner_height = area.height.saturating_sub(2) as usize;
        let skip = lines.len().saturating_sub(inner_height.max(1));
        let visible: Vec<Line> = lines.into_iter().skip(skip).collect();

        frame.render_widget(Paragraph::new(visible).block(block), area);
    }
}
