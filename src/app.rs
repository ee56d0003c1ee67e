//! Full-screen chat client.

use crate::auth::AuthPort;
use crate::llm::LlmClient;
use crate::message::AuthUser;
use crate::state::AppState;
use crate::store::FirestoreStore;
use crate::ui::conversation::{ConversationAction, ConversationManager};
use crate::ui::{AuthForm, AuthFormResult, AuthMode};
use anyhow::Result;
use crossterm::{
    ExecutableCommand,
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
};
use std::io::{self, Stdout};
use tokio::time::{Duration, interval};

type Tui = Terminal<CrosstermBackend<Stdout>>;

const TICK: Duration = Duration::from_millis(100);
/// How often the ID token's expiry is checked
const TOKEN_CHECK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Auth,
    Chat,
}

pub struct App {
    state: AppState,
    chat: ConversationManager<LlmClient, FirestoreStore>,
    auth_form: AuthForm,
    screen: Screen,
    model: String,
    should_quit: bool,
}

/// Launch the TUI and block until the user quits
pub async fn run(state: AppState) -> Result<()> {
    // Configuration errors surface before the terminal is taken over
    let client = state.completion_client()?;
    let model = client.model().to_string();
    let chat = ConversationManager::new(state.orchestrator(client));

    let mut app = App {
        state,
        chat,
        auth_form: AuthForm::new(),
        screen: Screen::Chat,
        model,
        should_quit: false,
    };

    enable_raw_mode()?;
    io::stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    let result = app.run_loop(&mut terminal).await;

    // Restore terminal
    disable_raw_mode()?;
    io::stdout().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

impl App {
    async fn run_loop(&mut self, terminal: &mut Tui) -> Result<()> {
        self.start(terminal).await?;

        let mut events = EventStream::new();
        let mut ticker = interval(TICK);
        let mut token_check = interval(TOKEN_CHECK);

        while !self.should_quit {
            self.chat.tick();
            terminal.draw(|frame| self.draw(frame))?;

            tokio::select! {
                _ = ticker.tick() => {}
                _ = token_check.tick() => self.refresh_token().await,
                event = events.next() => match event {
                    Some(Ok(Event::Key(key))) => self.handle_key(key, terminal).await?,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                    None => break,
                },
            }
        }

        tracing::info!("chat closed");
        Ok(())
    }

    /// Pick the first screen, restoring a saved session when history is on
    async fn start(&mut self, terminal: &mut Tui) -> Result<()> {
        if !self.state.history_enabled() {
            self.screen = Screen::Chat;
            return Ok(());
        }

        self.screen = Screen::Auth;
        self.auth_form.set_busy(true);
        terminal.draw(|frame| self.draw(frame))?;

        match self.state.restore_user().await {
            Some(user) => self.enter_chat(user, terminal).await?,
            None => self.auth_form.set_busy(false),
        }
        Ok(())
    }

    async fn enter_chat(&mut self, user: AuthUser, terminal: &mut Tui) -> Result<()> {
        self.state.set_user(Some(&user));
        self.chat.set_user(Some(user));
        self.auth_form.reset();
        self.screen = Screen::Chat;
        self.reload_history(terminal).await
    }

    async fn refresh_token(&self) {
        if let Err(err) = self.state.refresh_if_stale().await {
            tracing::warn!(error = %err, "could not refresh id token");
        }
    }

    async fn reload_history(&mut self, terminal: &mut Tui) -> Result<()> {
        self.chat.begin_history_load();
        terminal.draw(|frame| self.draw(frame))?;
        self.refresh_token().await;
        self.chat.load_history().await;
        Ok(())
    }

    async fn handle_key(&mut self, key: KeyEvent, terminal: &mut Tui) -> Result<()> {
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return Ok(());
        }

        match self.screen {
            Screen::Auth => match self.auth_form.handle_key(key) {
                AuthFormResult::Submit { mode, email, password } => {
                    self.submit_credentials(mode, &email, &password, terminal).await?;
                }
                AuthFormResult::Quit => self.should_quit = true,
                AuthFormResult::None => {}
            },
            Screen::Chat => match self.chat.handle_key(key) {
                ConversationAction::None => {}
                ConversationAction::ReloadHistory => self.reload_history(terminal).await?,
                ConversationAction::Logout => self.logout().await,
                ConversationAction::Quit => self.should_quit = true,
            },
        }
        Ok(())
    }

    async fn submit_credentials(
        &mut self,
        mode: AuthMode,
        email: &str,
        password: &str,
        terminal: &mut Tui,
    ) -> Result<()> {
        let Some(auth) = self.state.auth.clone() else {
            return Ok(());
        };

        self.auth_form.set_busy(true);
        terminal.draw(|frame| self.draw(frame))?;

        let result = match mode {
            AuthMode::SignIn => auth.sign_in(email, password).await,
            AuthMode::SignUp => auth.sign_up(email, password).await,
        };
        match result {
            Ok(user) => self.enter_chat(user, terminal).await?,
            Err(err) => {
                tracing::warn!(error = %err, %mode, "authentication failed");
                self.auth_form.set_error(err.to_string());
            }
        }
        Ok(())
    }

    async fn logout(&mut self) {
        if let Some(auth) = self.state.auth.clone() {
            if let Err(err) = auth.sign_out().await {
                tracing::warn!(error = %err, "sign-out did not complete cleanly");
            }
        }
        self.state.set_user(None);
        self.chat.set_user(None);
        self.auth_form.reset();
        self.screen = Screen::Auth;
    }

    fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(5)])
            .split(frame.size());

        let who = match self.chat.orchestrator().user() {
            Some(user) => user.label().to_string(),
            None if self.state.history_enabled() => "signed out".to_string(),
            None => "history off".to_string(),
        };
        let header = Line::from(vec![
            Span::styled(
                " 📚 StudyMate ",
                Style::default().fg(Color::Black).bg(Color::Cyan).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!(" {} ", self.model), Style::default().fg(Color::Gray)),
            Span::styled(format!("· {}", who), Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(header), chunks[0]);

        match self.screen {
            Screen::Auth => self.auth_form.render(frame, chunks[1]),
            Screen::Chat => self.chat.render(frame, chunks[1]),
        }
    }
}
