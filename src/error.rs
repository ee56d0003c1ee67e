use thiserror::Error;

/// Failure of a chat-completion request
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    Malformed(String),

    #[error("completion task ended without a reply")]
    Interrupted,
}

/// Failure talking to the history store
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("history store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed history document: {0}")]
    Malformed(String),

    #[error("not signed in")]
    Unauthenticated,
}

/// Failure from the identity provider
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider rejected the request; the message is user-facing
    #[error("{0}")]
    Rejected(String),

    /// The provider failed on its side (5xx); the request may be retried
    #[error("sign-in service unavailable ({0})")]
    Unavailable(u16),

    #[error("malformed auth response: {0}")]
    Malformed(String),

    #[error("session file: {0}")]
    Session(String),
}
