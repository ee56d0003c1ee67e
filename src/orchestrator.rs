use crate::error::{CompletionError, HistoryError};
use crate::llm::{CompletionClient, build_request};
use crate::message::{AuthUser, ChatMessage};
use crate::store::HistoryStore;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;

/// Assistant text shown in place of a reply when the completion call fails
pub const ERROR_PLACEHOLDER: &str = "Sorry, an error occurred. Please try again.";

/// How the last exchange ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Replied,
    Failed,
}

/// Lifecycle of one chat exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Submitting,
    AwaitingReply,
    /// Accepts new input just like `Idle`
    Settled(ExchangeOutcome),
}

impl ExchangeState {
    pub fn is_busy(&self) -> bool {
        matches!(self, ExchangeState::Submitting | ExchangeState::AwaitingReply)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyInput,
    Busy,
    NotSignedIn,
}

/// Result of a submit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted,
    Ignored(IgnoreReason),
}

type PendingReply = oneshot::Receiver<Result<String, CompletionError>>;

/// Owns the conversation and sequences each exchange.
///
/// Only one exchange is in flight at a time. The completion request runs on
/// a spawned task and its result is collected with [`poll_reply`] (from a UI
/// tick) or [`await_reply`]. Persistence is fire-and-forget.
///
/// [`poll_reply`]: ChatOrchestrator::poll_reply
/// [`await_reply`]: ChatOrchestrator::await_reply
pub struct ChatOrchestrator<C, H> {
    client: Arc<C>,
    history: Option<Arc<H>>,
    system_prompt: String,
    user: Option<AuthUser>,
    messages: Vec<ChatMessage>,
    state: ExchangeState,
    pending: Option<PendingReply>,
    saves: Vec<JoinHandle<()>>,
}

impl<C: CompletionClient, H: HistoryStore> ChatOrchestrator<C, H> {
    /// Persistence is enabled exactly when `history` is `Some`.
    pub fn new(client: Arc<C>, history: Option<Arc<H>>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            history,
            system_prompt: system_prompt.into(),
            user: None,
            messages: Vec::new(),
            state: ExchangeState::Idle,
            pending: None,
            saves: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.user.as_ref()
    }

    pub fn persistence_enabled(&self) -> bool {
        self.history.is_some()
    }

    /// Install or clear the signed-in user.
    ///
    /// Switching identity drops the local conversation and any reply still
    /// in flight; the caller reloads history for the new user.
    pub fn set_user(&mut self, user: Option<AuthUser>) {
        let same_identity = match (&self.user, &user) {
            (Some(current), Some(next)) => current.uid == next.uid,
            (None, None) => true,
            _ => false,
        };

        self.user = user;
        if !same_identity {
            self.messages.clear();
            self.pending = None;
            self.state = ExchangeState::Idle;
        }
    }

    fn user_id(&self) -> Option<String> {
        if self.history.is_some() {
            self.user.as_ref().map(|u| u.uid.clone())
        } else {
            None
        }
    }

    /// Start an exchange for `input`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, input: &str) -> Submission {
        if input.trim().is_empty() {
            return Submission::Ignored(IgnoreReason::EmptyInput);
        }
        if self.state.is_busy() {
            tracing::debug!("submit ignored, exchange in flight");
            return Submission::Ignored(IgnoreReason::Busy);
        }
        if self.history.is_some() && self.user.is_none() {
            return Submission::Ignored(IgnoreReason::NotSignedIn);
        }

        self.state = ExchangeState::Submitting;
        let message = ChatMessage::user(input, self.user_id());
        self.messages.push(message.clone());
        self.persist(message);

        let request = build_request(&self.system_prompt, &self.messages);
        let client = Arc::clone(&self.client);
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = client.complete(&request).await;
            // Receiver is gone when the user signed out mid-exchange
            let _ = tx.send(result);
        });

        self.pending = Some(rx);
        self.state = ExchangeState::AwaitingReply;
        tracing::debug!(messages = self.messages.len(), "exchange submitted");
        Submission::Accepted
    }

    /// Collect the reply if it has arrived. Never blocks.
    pub fn poll_reply(&mut self) -> Option<&ChatMessage> {
        let rx = self.pending.as_mut()?;
        let reply = match rx.try_recv() {
            Ok(reply) => reply,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(CompletionError::Interrupted),
        };
        Some(self.settle(reply))
    }

    /// Wait for the in-flight reply, if any.
    pub async fn await_reply(&mut self) -> Option<&ChatMessage> {
        let rx = self.pending.as_mut()?;
        let reply = rx.await.unwrap_or(Err(CompletionError::Interrupted));
        Some(self.settle(reply))
    }

    fn settle(&mut self, reply: Result<String, CompletionError>) -> &ChatMessage {
        self.pending = None;

        let (content, outcome) = match reply {
            Ok(text) => (text, ExchangeOutcome::Replied),
            Err(err) => {
                tracing::warn!(error = %err, "completion failed");
                (ERROR_PLACEHOLDER.to_string(), ExchangeOutcome::Failed)
            }
        };

        let message = ChatMessage::assistant(content, self.user_id());
        if outcome == ExchangeOutcome::Replied {
            self.persist(message.clone());
        }
        self.messages.push(message);
        self.state = ExchangeState::Settled(outcome);
        &self.messages[self.messages.len() - 1]
    }

    fn persist(&mut self, message: ChatMessage) {
        let Some(store) = &self.history else {
            return;
        };

        let store = Arc::clone(store);
        self.saves.retain(|handle| !handle.is_finished());
        self.saves.push(tokio::spawn(async move {
            if let Err(err) = store.save(&message).await {
                tracing::warn!(error = %err, role = %message.role, "failed to save message");
            }
        }));
    }

    /// Wait for outstanding saves. One-shot callers use this before the
    /// runtime shuts down; the TUI never needs to.
    pub async fn flush_saves(&mut self) {
        for handle in self.saves.drain(..) {
            let _ = handle.await;
        }
    }

    /// Replace the conversation with the signed-in user's stored history.
    ///
    /// Returns the number of messages loaded. With persistence disabled this
    /// is a no-op.
    pub async fn load_history(&mut self) -> Result<usize, HistoryError> {
        let Some(store) = self.history.clone() else {
            return Ok(self.messages.len());
        };
        let Some(uid) = self.user.as_ref().map(|u| u.uid.clone()) else {
            return Err(HistoryError::Unauthenticated);
        };
        if self.state.is_busy() {
            tracing::debug!("history reload skipped, exchange in flight");
            return Ok(self.messages.len());
        }

        let mut fetched = store.list_by_user(&uid).await?;
        fetched.reverse();

        self.messages = fetched;
        self.state = ExchangeState::Idle;
        tracing::info!(count = self.messages.len(), "history loaded");
        Ok(self.messages.len())
    }
}
