//! Sign-in / sign-up screen shown when cloud history is on and nobody is
//! signed in.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AuthMode {
    #[strum(serialize = "Sign in")]
    SignIn,
    #[strum(serialize = "Create account")]
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Email,
    Password,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthFormResult {
    Submit {
        mode: AuthMode,
        email: String,
        password: String,
    },
    Quit,
    None,
}

pub struct AuthForm {
    mode: AuthMode,
    email: String,
    password: String,
    focus: Field,
    error: Option<String>,
    busy: bool,
}

impl Default for AuthForm {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthForm {
    pub fn new() -> Self {
        Self {
            mode: AuthMode::SignIn,
            email: String::new(),
            password: String::new(),
            focus: Field::Email,
            error: None,
            busy: false,
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.busy = false;
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
        if busy {
            self.error = None;
        }
    }

    /// Forget the typed credentials, keeping the e-mail for convenience
    pub fn reset(&mut self) {
        self.password.clear();
        self.focus = Field::Email;
        self.busy = false;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AuthFormResult {
        if key.kind != KeyEventKind::Press || self.busy {
            return AuthFormResult::None;
        }

        match key.code {
            KeyCode::Esc => return AuthFormResult::Quit,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                self.focus = match self.focus {
                    Field::Email => Field::Password,
                    Field::Password => Field::Email,
                };
            }
            KeyCode::Enter => {
                if self.focus == Field::Email && self.password.is_empty() {
                    self.focus = Field::Password;
                    return AuthFormResult::None;
                }
                if self.email.trim().is_empty() || self.password.is_empty() {
                    self.error = Some("Please enter your e-mail and password".to_string());
                    return AuthFormResult::None;
                }
                return AuthFormResult::Submit {
                    mode: self.mode,
                    email: self.email.trim().to_string(),
                    password: self.password.clone(),
                };
            }
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.mode = match self.mode {
                    AuthMode::SignIn => AuthMode::SignUp,
                    AuthMode::SignUp => AuthMode::SignIn,
                };
                self.error = None;
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.field_mut().push(c);
            }
            KeyCode::Backspace => {
                self.field_mut().pop();
            }
            _ => {}
        }

        AuthFormResult::None
    }

    fn field_mut(&mut self) -> &mut String {
        match self.focus {
            Field::Email => &mut self.email,
            Field::Password => &mut self.password,
        }
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let width = area.width.min(60);
        let height = area.height.min(14);
        let form_area = Rect {
            x: area.x + (area.width - width) / 2,
            y: area.y + (area.height - height) / 2,
            width,
            height,
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("🔐 {}", self.mode))
            .title_alignment(Alignment::Center);
        let inner = block.inner(form_area);
        frame.render_widget(block, form_area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(3),
                Constraint::Min(1),
            ])
            .split(inner);

        let masked = "•".repeat(self.password.chars().count());
        frame.render_widget(self.input("E-mail", &self.email, self.focus == Field::Email), chunks[0]);
        frame.render_widget(self.input("Password", &masked, self.focus == Field::Password), chunks[1]);

        let mut footer = Vec::new();
        if self.busy {
            footer.push(Line::from(Span::styled(
                "Contacting the sign-in service…",
                Style::default().fg(Color::Blue),
            )));
        } else if let Some(error) = &self.error {
            footer.push(Line::from(Span::styled(
                error.as_str(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )));
        }
        let switch_hint = match self.mode {
            AuthMode::SignIn => "Ctrl+R: create an account instead",
            AuthMode::SignUp => "Ctrl+R: sign in to an existing account",
        };
        footer.push(Line::from(Span::styled(
            format!("Enter: submit · Tab: next field · {} · Esc: quit", switch_hint),
            Style::default().fg(Color::DarkGray),
        )));

        frame.render_widget(Paragraph::new(footer).wrap(Wrap { trim: true }), chunks[2]);
    }

    fn input<'a>(&self, title: &'a str, value: &'a str, focused: bool) -> Paragraph<'a> {
        let border = if focused {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Gray)
        };
        let text = if focused && !self.busy {
            format!("{}▌", value)
        } else {
            value.to_string()
        };
        Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(border),
        )
    }
}
