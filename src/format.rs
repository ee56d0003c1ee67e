//! Turns raw reply text into typed display segments.
//!
//! Assistant replies are split on triple-backtick fences. Every part at an
//! odd index is code, including an unterminated trailing fence. Prose parts
//! are classified line by line by their leading marker glyph. User text is
//! never segmented.

use strum::{AsRefStr, EnumIter, IntoEnumIterator};

const FENCE: &str = "```";
const DEFAULT_LANGUAGE: &str = "text";
const LIST_BULLET: char = '•';

/// Semantic annotation carried by a leading emoji glyph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum MarkerKind {
    Tip,
    Think,
    Example,
    Summary,
    Step,
    Warning,
}

impl MarkerKind {
    pub fn glyph(self) -> &'static str {
        match self {
            MarkerKind::Tip => "💡",
            MarkerKind::Think => "🤔",
            MarkerKind::Example => "📝",
            MarkerKind::Summary => "✨",
            MarkerKind::Step => "👉",
            MarkerKind::Warning => "❗",
        }
    }

    /// Marker introduced by the first character of `line`, if any
    pub fn from_line(line: &str) -> Option<Self> {
        let first = line.chars().next()?;
        match first {
            '💡' => Some(MarkerKind::Tip),
            '🤔' => Some(MarkerKind::Think),
            '📝' => Some(MarkerKind::Example),
            '✨' => Some(MarkerKind::Summary),
            '👉' => Some(MarkerKind::Step),
            '❗' => Some(MarkerKind::Warning),
            _ => None,
        }
    }

    pub fn all() -> impl Iterator<Item = MarkerKind> {
        MarkerKind::iter()
    }
}

/// One renderable block of a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplaySegment {
    Paragraph(String),
    CodeBlock { language: String, lines: Vec<String> },
    Marker { kind: MarkerKind, text: String },
    ListItem(String),
}

impl DisplaySegment {
    pub fn is_code(&self) -> bool {
        matches!(self, DisplaySegment::CodeBlock { .. })
    }
}

/// Format one message for display.
pub fn format_message(content: &str, is_user: bool) -> Vec<DisplaySegment> {
    if is_user {
        if content.is_empty() {
            return Vec::new();
        }
        return vec![DisplaySegment::Paragraph(content.to_string())];
    }

    let mut segments = Vec::new();
    for (index, part) in content.split(FENCE).enumerate() {
        if index % 2 == 1 {
            if let Some(block) = code_block(part) {
                segments.push(block);
            }
        } else {
            segments.extend(part.lines().filter_map(classify_line));
        }
    }
    segments
}

fn code_block(part: &str) -> Option<DisplaySegment> {
    if part.is_empty() {
        return None;
    }

    let (language, body) = match part.split_once('\n') {
        Some((tag, body)) => (tag.trim(), body),
        // "```foo```" has no body line; keep the text as code rather than
        // swallowing it as a language tag
        None => ("", part),
    };
    let language = if language.is_empty() {
        DEFAULT_LANGUAGE
    } else {
        language
    };

    Some(DisplaySegment::CodeBlock {
        language: language.to_string(),
        lines: body.lines().map(str::to_string).collect(),
    })
}

fn classify_line(line: &str) -> Option<DisplaySegment> {
    if line.is_empty() {
        return None;
    }

    let text = line.to_string();
    if let Some(kind) = MarkerKind::from_line(line) {
        return Some(DisplaySegment::Marker { kind, text });
    }
    if line.starts_with(LIST_BULLET) {
        return Some(DisplaySegment::ListItem(text));
    }
    Some(DisplaySegment::Paragraph(text))
}
