use crate::llm::CompletionClient;
use crate::message::AuthUser;
use crate::orchestrator::{ChatOrchestrator, IgnoreReason, Submission};
use crate::store::HistoryStore;
use crate::ui::conversation::composer::ComposerResult;
use crate::ui::conversation::transcript::HistoryStatus;
use crate::ui::conversation::{ConversationComposer, ParsedCommand, SlashCommand, Transcript, get_help_text};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph, Wrap},
};

const SCROLL_STEP: usize = 5;

/// Actions the chat screen hands back to the app loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationAction {
    None,
    ReloadHistory,
    Logout,
    Quit,
}

/// Chat screen: the orchestrator plus the transcript and composer around it
pub struct ConversationManager<C, H> {
    orchestrator: ChatOrchestrator<C, H>,
    transcript: Transcript,
    composer: ConversationComposer,
    /// Help text or a short status line shown above the composer
    notice: Option<String>,
}

impl<C: CompletionClient, H: HistoryStore> ConversationManager<C, H> {
    pub fn new(orchestrator: ChatOrchestrator<C, H>) -> Self {
        Self {
            orchestrator,
            transcript: Transcript::new(),
            composer: ConversationComposer::new("Ask anything… (/help for commands)"),
            notice: None,
        }
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator<C, H> {
        &self.orchestrator
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn history_status(&self) -> &HistoryStatus {
        self.transcript.status()
    }

    pub fn set_user(&mut self, user: Option<AuthUser>) {
        self.orchestrator.set_user(user);
        self.composer.clear();
        self.notice = None;
        self.transcript.set_status(HistoryStatus::Ready);
    }

    /// Show the loading state; call before awaiting [`load_history`].
    ///
    /// [`load_history`]: ConversationManager::load_history
    pub fn begin_history_load(&mut self) {
        if self.orchestrator.persistence_enabled() {
            self.transcript.set_status(HistoryStatus::Loading);
        }
    }

    pub async fn load_history(&mut self) {
        match self.orchestrator.load_history().await {
            Ok(count) => {
                tracing::debug!(count, "transcript refreshed");
                self.transcript.set_status(HistoryStatus::Ready);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to load history");
                self.transcript.set_status(HistoryStatus::Failed(format!(
                    "Couldn't load your conversation: {}",
                    err
                )));
            }
        }
    }

    /// Collect a finished reply, if any (called from the main loop tick)
    pub fn tick(&mut self) {
        if self.orchestrator.poll_reply().is_some() {
            self.transcript.scroll_to_bottom();
        }
        self.composer.set_busy(self.orchestrator.is_busy());
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> ConversationAction {
        if key.kind != KeyEventKind::Press {
            return ConversationAction::None;
        }

        match key.code {
            KeyCode::PageUp => {
                self.transcript.scroll_up(SCROLL_STEP);
                return ConversationAction::None;
            }
            KeyCode::PageDown => {
                self.transcript.scroll_down(SCROLL_STEP);
                return ConversationAction::None;
            }
            KeyCode::Esc => {
                self.notice = None;
                return ConversationAction::None;
            }
            KeyCode::Char('r')
                if self.composer.content().is_empty()
                    && matches!(self.transcript.status(), HistoryStatus::Failed(_)) =>
            {
                return ConversationAction::ReloadHistory;
            }
            _ => {}
        }

        match self.composer.handle_key(key) {
            ComposerResult::Submitted(input) => {
                self.handle_input(&input);
                ConversationAction::None
            }
            ComposerResult::Command(command) => self.handle_slash_command(command),
            ComposerResult::None => ConversationAction::None,
        }
    }

    fn handle_input(&mut self, input: &str) {
        match self.orchestrator.submit(input) {
            Submission::Accepted => {
                self.composer.clear();
                self.notice = None;
                self.transcript.scroll_to_bottom();
                self.composer.set_busy(true);
            }
            Submission::Ignored(IgnoreReason::Busy) => {
                self.notice = Some("Still waiting for the previous reply…".to_string());
            }
            Submission::Ignored(IgnoreReason::NotSignedIn) => {
                self.notice = Some("Sign in to chat with history enabled.".to_string());
            }
            Submission::Ignored(IgnoreReason::EmptyInput) => {}
        }
    }

    fn handle_slash_command(&mut self, command: ParsedCommand) -> ConversationAction {
        let with_account = self.orchestrator.persistence_enabled();

        if self.orchestrator.is_busy() && !command.command.available_while_busy() {
            self.notice = Some(format!(
                "/{} is unavailable while waiting for a reply",
                command.command.command()
            ));
            return ConversationAction::None;
        }
        if command.command.needs_account() && !with_account {
            self.notice = Some("Cloud history is off; there is no account session.".to_string());
            return ConversationAction::None;
        }

        match command.command {
            SlashCommand::Reload => ConversationAction::ReloadHistory,
            SlashCommand::Logout => ConversationAction::Logout,
            SlashCommand::Help => {
                self.notice = Some(get_help_text(with_account));
                ConversationAction::None
            }
            SlashCommand::Quit => ConversationAction::Quit,
        }
    }

    pub fn render(&mut self, frame: &mut Frame, area: Rect) {
        let composer_height = (self.composer.content().lines().count().max(1) as u16 + 2).min(8);
        let notice_height = self
            .notice
            .as_ref()
            .map(|n| n.lines().count() as u16 + 2)
            .unwrap_or(0);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),
                Constraint::Length(notice_height),
                Constraint::Length(composer_height),
            ])
            .split(area);

        let waiting = self.orchestrator.is_busy();
        self.transcript
            .render(frame, chunks[0], self.orchestrator.messages(), waiting);

        if let Some(notice) = &self.notice {
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Esc to dismiss")
                .border_style(Style::default().fg(Color::DarkGray));
            frame.render_widget(
                Paragraph::new(notice.as_str())
                    .block(block)
                    .wrap(Wrap { trim: false }),
                chunks[1],
            );
        }

        self.composer.render(frame, chunks[2]);
    }
}
