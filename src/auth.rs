//! Sign-in through the hosted identity provider.
//!
//! [`AuthPort`] is what the UI and CLI depend on. [`FirebaseAuth`] is the
//! production adapter: e-mail/password accounts via the Identity Toolkit
//! REST API, with the session kept on disk by [`SessionManager`].

use crate::config::FirebaseSettings;
use crate::error::AuthError;
use crate::message::AuthUser;
use crate::session::SessionManager;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::RwLock;
use tokio::time::Duration;

const IDENTITY_BASE: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh the ID token this long before it expires
const REFRESH_MARGIN_SECS: i64 = 300;

/// Port for the identity provider
pub trait AuthPort: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;

    /// Create an account and sign it in
    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    profile_picture: Option<String>,
    id_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Turn a provider error code into something a user can act on.
///
/// Codes may carry a detail suffix, e.g. `WEAK_PASSWORD : Password should
/// be at least 6 characters`.
pub fn describe_error_code(code: &str) -> String {
    let (head, detail) = match code.split_once(" : ") {
        Some((head, detail)) => (head.trim(), Some(detail.trim())),
        None => (code.trim(), None),
    };

    let text = match head {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" => {
            "Incorrect e-mail or password"
        }
        "EMAIL_EXISTS" => "An account with this e-mail already exists",
        "INVALID_EMAIL" => "That e-mail address is not valid",
        "MISSING_PASSWORD" => "Please enter a password",
        "WEAK_PASSWORD" => "Password should be at least 6 characters",
        "USER_DISABLED" => "This account has been disabled",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Too many attempts, please try again later",
        "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" => "Your session has expired, please sign in again",
        _ => return detail.unwrap_or(head).to_string(),
    };
    text.to_string()
}

/// Absolute expiry from the provider's `expiresIn` seconds string
fn expiry(expires_in: Option<&str>) -> Option<DateTime<Utc>> {
    let secs = expires_in?.trim().parse::<i64>().ok()?;
    Some(Utc::now() + chrono::Duration::seconds(secs))
}

fn into_user(account: AccountResponse, email: &str) -> AuthUser {
    AuthUser {
        uid: account.local_id,
        email: if account.email.is_empty() {
            email.to_string()
        } else {
            account.email
        },
        display_name: account.display_name.filter(|n| !n.is_empty()),
        photo_url: account.profile_picture.filter(|p| !p.is_empty()),
        id_token: account.id_token,
        expires_at: expiry(account.expires_in.as_deref()),
        refresh_token: account.refresh_token,
    }
}

/// Firebase Authentication over REST
pub struct FirebaseAuth {
    client: reqwest::Client,
    api_key: String,
    identity_base: String,
    token_url: String,
    sessions: SessionManager,
    current: RwLock<Option<AuthUser>>,
}

impl FirebaseAuth {
    pub fn new(settings: &FirebaseSettings, sessions: SessionManager) -> Result<Self> {
        Self::with_endpoints(settings, sessions, IDENTITY_BASE, SECURE_TOKEN_URL)
    }

    /// Same as [`FirebaseAuth::new`] against other Identity Toolkit and
    /// token endpoints (emulator, tests)
    pub(crate) fn with_endpoints(
        settings: &FirebaseSettings,
        sessions: SessionManager,
        identity_base: &str,
        token_url: &str,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            identity_base: identity_base.trim_end_matches('/').to_string(),
            token_url: token_url.to_string(),
            sessions,
            current: RwLock::new(None),
        })
    }

    pub(crate) fn set_current(&self, user: Option<AuthUser>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = user;
    }

    /// Bring back the stored session, exchanging its refresh token for a
    /// fresh ID token.
    ///
    /// The session file is only removed when the provider rejects the
    /// refresh token. Network and server failures keep it for the next run.
    pub async fn restore(&self) -> Option<AuthUser> {
        let stored = match self.sessions.load() {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("Could not read session: {err:#}");
                return None;
            }
        };

        match self.refresh(&stored.user).await {
            Ok(user) => {
                if let Err(err) = self.sessions.save(&user) {
                    tracing::warn!("Could not update session file: {err:#}");
                }
                self.set_current(Some(user.clone()));
                tracing::info!(uid = %user.uid, "session restored");
                Some(user)
            }
            Err(AuthError::Rejected(reason)) => {
                tracing::warn!(%reason, "stored session rejected, signing out");
                if let Err(err) = self.sessions.clear() {
                    tracing::warn!("Could not remove session file: {err:#}");
                }
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not refresh stored session, keeping it for later");
                None
            }
        }
    }

    /// Current user with an ID token good for at least a few more minutes,
    /// refreshing it first when it is about to expire.
    pub async fn fresh_user(&self) -> Result<Option<AuthUser>, AuthError> {
        let Some(user) = self.current_user() else {
            return Ok(None);
        };
        if !user.token_expires_within(chrono::Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(Some(user));
        }

        let refreshed = self.refresh(&user).await?;
        // Signed out while the request ran
        if self.current_user().is_none() {
            return Ok(None);
        }
        if let Err(err) = self.sessions.save(&refreshed) {
            tracing::warn!("Could not update session file: {err:#}");
        }
        self.set_current(Some(refreshed.clone()));
        tracing::debug!(uid = %refreshed.uid, "id token refreshed");
        Ok(Some(refreshed))
    }

    async fn refresh(&self, user: &AuthUser) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .post(&self.token_url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", user.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let body = Self::check(response).await?;
        let refreshed: RefreshResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        if refreshed.user_id != user.uid {
            return Err(AuthError::Malformed("refresh returned a different user".to_string()));
        }

        Ok(AuthUser {
            expires_at: expiry(refreshed.expires_in.as_deref()),
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
            ..user.clone()
        })
    }

    async fn check(response: reqwest::Response) -> Result<String, AuthError> {
        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }
        if status.is_server_error() {
            tracing::debug!(status = %status, body = %body, "identity provider unavailable");
            return Err(AuthError::Unavailable(status.as_u16()));
        }

        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| describe_error_code(&envelope.error.message))
            .unwrap_or_else(|_| format!("Sign-in failed ({})", status));
        tracing::debug!(status = %status, body = %body, "identity provider rejected request");
        Err(AuthError::Rejected(message))
    }

    async fn account_request(&self, endpoint: &str, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Rejected("Please enter your e-mail and password".to_string()));
        }

        let url = format!("{}/accounts:{}", self.identity_base, endpoint);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;

        let body = Self::check(response).await?;
        let account: AccountResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Malformed(e.to_string()))?;
        let user = into_user(account, email);

        self.sessions
            .save(&user)
            .map_err(|e| AuthError::Session(format!("{e:#}")))?;
        self.set_current(Some(user.clone()));
        tracing::info!(uid = %user.uid, endpoint, "signed in");
        Ok(user)
    }
}

impl AuthPort for FirebaseAuth {
    fn current_user(&self) -> Option<AuthUser> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send {
        self.account_request("signInWithPassword", email, password)
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthUser, AuthError>> + Send {
        self.account_request("signUp", email, password)
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send {
        let result = self
            .sessions
            .clear()
            .map_err(|e| AuthError::Session(format!("{e:#}")));
        if result.is_ok() {
            self.set_current(None);
            tracing::info!("signed out");
        }
        std::future::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FirebaseSettings {
        FirebaseSettings {
            api_key: "k".into(),
            project_id: "demo".into(),
        }
    }

    #[test]
    fn test_error_codes_are_readable() {
        assert_eq!(describe_error_code("EMAIL_NOT_FOUND"), "Incorrect e-mail or password");
        assert_eq!(describe_error_code("INVALID_LOGIN_CREDENTIALS"), "Incorrect e-mail or password");
        assert_eq!(
            describe_error_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            "Password should be at least 6 characters"
        );
        assert_eq!(describe_error_code("SOMETHING_NEW : extra detail"), "extra detail");
        assert_eq!(describe_error_code("OPERATION_NOT_ALLOWED"), "OPERATION_NOT_ALLOWED");
    }

    #[test]
    fn test_account_response_to_user() {
        let body = r#"{
            "kind": "identitytoolkit#VerifyPasswordResponse",
            "localId": "uid-42",
            "email": "kid@example.com",
            "displayName": "",
            "idToken": "id-token",
            "registered": true,
            "refreshToken": "refresh-token",
            "expiresIn": "3600"
        }"#;
        let account: AccountResponse = serde_json::from_str(body).unwrap();
        let user = into_user(account, "ignored@example.com");
        assert_eq!(user.uid, "uid-42");
        assert_eq!(user.email, "kid@example.com");
        assert_eq!(user.display_name, None);
        assert_eq!(user.id_token, "id-token");
        assert_eq!(user.refresh_token, "refresh-token");
        assert!(user.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_blank_credentials_rejected_locally() {
        let dir = tempfile::tempdir().unwrap();
        let auth = FirebaseAuth::new(&settings(), SessionManager::new(dir.path().join("s.json"))).unwrap();
        let err = auth.sign_in("  ", "secret").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(_)));
        assert!(auth.current_user().is_none());
    }

    /// Nothing listens on the discard port, so requests fail to connect
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    const REFRESHED: &str =
        r#"{"id_token":"fresh-id","refresh_token":"fresh-refresh","user_id":"u","expires_in":"3600"}"#;

    fn stored_user() -> AuthUser {
        AuthUser {
            uid: "u".into(),
            email: "e@example.com".into(),
            display_name: None,
            photo_url: None,
            id_token: "t".into(),
            refresh_token: "r".into(),
            expires_at: None,
        }
    }

    fn auth_at(dir: &std::path::Path, token_base: &str) -> (FirebaseAuth, SessionManager) {
        let sessions = SessionManager::new(dir.join("s.json"));
        let auth = FirebaseAuth::with_endpoints(
            &settings(),
            sessions.clone(),
            UNREACHABLE,
            &format!("{}/v1/token", token_base),
        )
        .unwrap();
        (auth, sessions)
    }

    #[test]
    fn test_account_expiry_is_absolute() {
        let before = Utc::now();
        let expires_at = expiry(Some("3600")).unwrap();
        assert!(expires_at >= before + chrono::Duration::seconds(3600));
        assert!(expires_at <= Utc::now() + chrono::Duration::seconds(3600));
        assert_eq!(expiry(None), None);
        assert_eq!(expiry(Some("soon")), None);
    }

    #[tokio::test]
    async fn test_restore_keeps_session_when_offline() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, sessions) = auth_at(dir.path(), UNREACHABLE);
        sessions.save(&stored_user()).unwrap();

        assert!(auth.restore().await.is_none());
        assert!(auth.current_user().is_none());
        assert_eq!(sessions.load().unwrap().unwrap().user, stored_user());
    }

    #[tokio::test]
    async fn test_restore_keeps_session_on_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let server = crate::testing::serve_once(503, r#"{"error":{"message":"BACKEND_ERROR"}}"#).await;
        let (auth, sessions) = auth_at(dir.path(), &server);
        sessions.save(&stored_user()).unwrap();

        assert!(auth.restore().await.is_none());
        assert!(sessions.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_restore_clears_rejected_session() {
        let dir = tempfile::tempdir().unwrap();
        let server =
            crate::testing::serve_once(400, r#"{"error":{"message":"INVALID_REFRESH_TOKEN"}}"#).await;
        let (auth, sessions) = auth_at(dir.path(), &server);
        sessions.save(&stored_user()).unwrap();

        assert!(auth.restore().await.is_none());
        assert!(sessions.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_refreshes_token() {
        let dir = tempfile::tempdir().unwrap();
        let server = crate::testing::serve_once(200, REFRESHED).await;
        let (auth, sessions) = auth_at(dir.path(), &server);
        sessions.save(&stored_user()).unwrap();

        let user = auth.restore().await.unwrap();
        assert_eq!(user.id_token, "fresh-id");
        assert!(user.expires_at.is_some());
        assert_eq!(sessions.load().unwrap().unwrap().user.id_token, "fresh-id");
    }

    #[tokio::test]
    async fn test_fresh_user_leaves_valid_token_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, _) = auth_at(dir.path(), UNREACHABLE);
        let user = AuthUser {
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..stored_user()
        };
        auth.set_current(Some(user.clone()));

        // No request is made, so the unreachable endpoint doesn't matter
        assert_eq!(auth.fresh_user().await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_fresh_user_refreshes_stale_token() {
        let dir = tempfile::tempdir().unwrap();
        let server = crate::testing::serve_once(200, REFRESHED).await;
        let (auth, sessions) = auth_at(dir.path(), &server);
        auth.set_current(Some(AuthUser {
            expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            ..stored_user()
        }));

        let user = auth.fresh_user().await.unwrap().unwrap();
        assert_eq!(user.id_token, "fresh-id");
        assert_eq!(user.refresh_token, "fresh-refresh");
        assert!(!user.token_expires_within(chrono::Duration::minutes(5)));
        assert_eq!(auth.current_user().unwrap().id_token, "fresh-id");
        assert_eq!(sessions.load().unwrap().unwrap().user.id_token, "fresh-id");
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionManager::new(dir.path().join("s.json"));
        let user = stored_user();
        sessions.save(&user).unwrap();

        let auth = FirebaseAuth::new(&settings(), sessions.clone()).unwrap();
        auth.set_current(Some(user));
        auth.sign_out().await.unwrap();

        assert!(auth.current_user().is_none());
        assert!(sessions.load().unwrap().is_none());
    }
}
