use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Who produced a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A single entry in a conversation.
///
/// Messages are append-only: once pushed onto a conversation neither the
/// role nor the content changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Document id in the history store, if the message has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Authenticated principal, only set when history persistence is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ChatMessage {
    /// Create a message stamped with a fresh local id and the current time
    pub fn new(role: ChatRole, content: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            user_id,
        }
    }

    pub fn user(content: impl Into<String>, user_id: Option<String>) -> Self {
        Self::new(ChatRole::User, content, user_id)
    }

    pub fn assistant(content: impl Into<String>, user_id: Option<String>) -> Self {
        Self::new(ChatRole::Assistant, content, user_id)
    }

    pub fn is_user(&self) -> bool {
        self.role == ChatRole::User
    }
}

/// Handle for the signed-in user as supplied by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// When `id_token` stops being accepted; unknown for older sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthUser {
    /// Name shown in the header: display name when set, e-mail otherwise
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }

    /// True when the ID token is expired or will be within `margin`
    pub fn token_expires_within(&self, margin: chrono::Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - margin <= Utc::now())
    }
}
