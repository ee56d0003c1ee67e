//! Conversation transcript display component

use crate::format::{DisplaySegment, MarkerKind, format_message};
use crate::message::{ChatMessage, ChatRole};
use ratatui::{
    Frame,
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

/// What the transcript area is showing besides the messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStatus {
    Ready,
    Loading,
    /// Loading failed; the user can retry
    Failed(String),
}

/// Scrollable view over the conversation
#[derive(Debug, Clone)]
pub struct Transcript {
    /// Lines scrolled up from the bottom
    scroll_offset: usize,
    status: HistoryStatus,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            scroll_offset: 0,
            status: HistoryStatus::Ready,
        }
    }

    pub fn status(&self) -> &HistoryStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: HistoryStatus) {
        self.status = status;
        self.scroll_to_bottom();
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect, messages: &[ChatMessage], waiting: bool) {
        let block = Block::default()
            .borders(Borders::ALL)
            .title("💬 Conversation");
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let placeholder = match &self.status {
            HistoryStatus::Loading => Some(vec![Line::from(Span::styled(
                "Loading your conversation…",
                Style::default().fg(Color::Blue),
            ))]),
            HistoryStatus::Failed(error) => Some(vec![
                Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red))),
                Line::from(""),
                Line::from(Span::styled(
                    "Press r (or type /reload) to try again",
                    Style::default().fg(Color::Gray),
                )),
            ]),
            HistoryStatus::Ready if messages.is_empty() && !waiting => Some(vec![
                Line::from(Span::styled(
                    "Start your first conversation!",
                    Style::default().fg(Color::Green),
                )),
                Line::from(""),
                Line::from(Span::styled(
                    "Press Enter to send, Shift+Enter for a new line, /help for commands.",
                    Style::default().fg(Color::DarkGray),
                )),
            ]),
            HistoryStatus::Ready => None,
        };

        if let Some(lines) = placeholder {
            let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
            let top = inner.height / 2;
            let centered = Rect {
                y: inner.y + top.saturating_sub(1),
                height: inner.height.saturating_sub(top.saturating_sub(1)),
                ..inner
            };
            frame.render_widget(paragraph, centered);
            return;
        }

        let width = inner.width as usize;
        let mut all_lines: Vec<Line<'static>> = Vec::new();
        for message in messages {
            all_lines.extend(message_lines(message, width));
            all_lines.push(Line::from(""));
        }
        if waiting {
            all_lines.push(Line::from(Span::styled(
                "🤖 thinking…",
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        // Window of lines ending `scroll_offset` lines above the bottom
        let height = inner.height as usize;
        let total = all_lines.len();
        let max_offset = total.saturating_sub(height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
        let end = total - self.scroll_offset;
        let start = end.saturating_sub(height);
        let visible: Vec<Line<'static>> = all_lines.drain(start..end).collect();

        frame.render_widget(Paragraph::new(visible), inner);
    }
}

/// Render a single message into display lines, wrapped to `width`
pub fn message_lines(message: &ChatMessage, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let is_user = message.is_user();

    let (icon, name, alignment) = match message.role {
        ChatRole::User => ("👤", "You", Alignment::Right),
        ChatRole::Assistant => ("🤖", "Assistant", Alignment::Left),
    };
    let timestamp = message.timestamp.with_timezone(&chrono::Local).format("%H:%M");
    lines.push(
        Line::from(Span::styled(
            format!("{} {} · {}", icon, name, timestamp),
            Style::default().fg(Color::DarkGray),
        ))
        .alignment(alignment),
    );

    let body_width = width.saturating_sub(2).max(1);
    for segment in format_message(&message.content, is_user) {
        match segment {
            DisplaySegment::Paragraph(text) => {
                let style = if is_user {
                    Style::default().fg(Color::Cyan)
                } else {
                    Style::default()
                };
                for part in text.split('\n') {
                    for row in wrap_text(part, body_width) {
                        lines.push(Line::from(Span::styled(row, style)).alignment(alignment));
                    }
                }
            }
            DisplaySegment::Marker { kind, text } => {
                let (prefix, style) = marker_style(kind);
                for row in wrap_text(&text, body_width.saturating_sub(2).max(1)) {
                    lines.push(Line::from(vec![
                        Span::styled(prefix, style),
                        Span::styled(row, style),
                    ]));
                }
            }
            DisplaySegment::ListItem(text) => {
                for row in wrap_text(&text, body_width.saturating_sub(2).max(1)) {
                    lines.push(Line::from(vec![Span::raw("  "), Span::raw(row)]));
                }
            }
            DisplaySegment::CodeBlock { language, lines: code } => {
                let code_style = Style::default().fg(Color::White).bg(Color::Rgb(40, 44, 52));
                lines.push(Line::from(Span::styled(
                    format!(" {} ", language),
                    Style::default().fg(Color::Gray).bg(Color::Rgb(60, 64, 72)),
                )));
                for code_line in code {
                    // Code is not wrapped; long lines are clipped by the frame
                    lines.push(Line::from(Span::styled(format!(" {}", code_line), code_style)));
                }
            }
        }
    }

    lines
}

fn marker_style(kind: MarkerKind) -> (&'static str, Style) {
    match kind {
        MarkerKind::Tip => ("▌ ", Style::default().fg(Color::Blue)),
        MarkerKind::Think => ("▌ ", Style::default().fg(Color::Magenta)),
        MarkerKind::Example => ("▌ ", Style::default().fg(Color::Green)),
        MarkerKind::Summary => ("▌ ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        MarkerKind::Step => ("│ ", Style::default().fg(Color::LightBlue)),
        MarkerKind::Warning => ("▌ ", Style::default().fg(Color::Red)),
    }
}

/// Wrap text to fit within the given width (in chars)
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len > width {
            // Hard-split words longer than a full row
            let chars: Vec<char> = word.chars().collect();
            for chunk in chars.chunks(width) {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                }
                current = chunk.iter().collect();
                current_len = chunk.len();
            }
            continue;
        }

        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}
