//! Application state wiring config, identity and history together.
//!
//! The orchestrator is generic over its ports; `AppState` pins it to the
//! production adapters.

use crate::auth::{AuthPort, FirebaseAuth};
use crate::config::Config;
use crate::error::AuthError;
use crate::llm::LlmClient;
use crate::message::AuthUser;
use crate::orchestrator::ChatOrchestrator;
use crate::session::SessionManager;
use crate::store::FirestoreStore;
use anyhow::{Context, Result};
use std::sync::Arc;

pub type ConcreteOrchestrator = ChatOrchestrator<LlmClient, FirestoreStore>;

/// Shared state for the TUI and the one-shot commands
pub struct AppState {
    pub config: Config,
    /// Present when cloud history is configured
    pub store: Option<Arc<FirestoreStore>>,
    pub auth: Option<Arc<FirebaseAuth>>,
}

impl AppState {
    pub fn init(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.home)
            .with_context(|| format!("Failed to create {}", config.home.display()))?;

        let (store, auth) = match config.firebase()? {
            Some(settings) => {
                let store = FirestoreStore::new(&settings)?;
                let auth = FirebaseAuth::new(&settings, SessionManager::new(config.session_path()))?;
                (Some(Arc::new(store)), Some(Arc::new(auth)))
            }
            None => (None, None),
        };

        tracing::debug!(history = store.is_some(), "app state ready");
        Ok(Self { config, store, auth })
    }

    pub fn history_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn completion_client(&self) -> Result<Arc<LlmClient>> {
        Ok(Arc::new(LlmClient::new(&self.config)?))
    }

    pub fn orchestrator(&self, client: Arc<LlmClient>) -> ConcreteOrchestrator {
        ChatOrchestrator::new(client, self.store.clone(), self.config.system_prompt())
    }

    /// Keep the history store's credentials in step with the signed-in user
    pub fn set_user(&self, user: Option<&AuthUser>) {
        if let Some(store) = &self.store {
            store.set_id_token(user.map(|u| u.id_token.clone()));
        }
    }

    /// Restore the saved session, if history is on and one exists
    pub async fn restore_user(&self) -> Option<AuthUser> {
        let auth = self.auth.as_ref()?;
        let user = match auth.fresh_user().await {
            Ok(Some(user)) => Some(user),
            Ok(None) => auth.restore().await,
            Err(err) => {
                tracing::warn!(error = %err, "could not refresh id token");
                auth.current_user()
            }
        };
        self.set_user(user.as_ref());
        user
    }

    /// Renew the ID token shortly before it expires and hand the new one to
    /// the history store
    pub async fn refresh_if_stale(&self) -> Result<(), AuthError> {
        let Some(auth) = &self.auth else {
            return Ok(());
        };
        if let Some(user) = auth.fresh_user().await? {
            self.set_user(Some(&user));
        }
        Ok(())
    }

    /// Like [`restore_user`], but fails with a hint when nobody is signed in
    ///
    /// [`restore_user`]: AppState::restore_user
    pub async fn require_user(&self) -> Result<AuthUser> {
        if !self.history_enabled() {
            anyhow::bail!("Cloud history is not configured. Run `studymate config` for details.");
        }
        self.restore_user()
            .await
            .context("Not signed in. Run `studymate login` first.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;

    fn config(home: &std::path::Path, history: HistoryConfig) -> Config {
        Config {
            api_key: Some("sk-test".into()),
            history,
            home: home.to_path_buf(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_offline_state_has_no_adapters() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init(config(dir.path(), HistoryConfig::default())).unwrap();
        assert!(!state.history_enabled());
        assert!(state.restore_user().await.is_none());
        assert!(state.require_user().await.is_err());

        let chat = state.orchestrator(state.completion_client().unwrap());
        assert!(!chat.persistence_enabled());
    }

    #[tokio::test]
    async fn test_history_state_without_session() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryConfig {
            enabled: true,
            firebase_api_key: Some("fb-key".into()),
            project_id: Some("demo".into()),
        };
        let state = AppState::init(config(dir.path(), history)).unwrap();
        assert!(state.history_enabled());
        // No session file, so nothing to restore and no network call is made
        assert!(state.restore_user().await.is_none());

        let chat = state.orchestrator(state.completion_client().unwrap());
        assert!(chat.persistence_enabled());
    }

    #[tokio::test]
    async fn test_stale_token_is_renewed_for_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryConfig {
            enabled: true,
            firebase_api_key: Some("fb-key".into()),
            project_id: Some("demo".into()),
        };
        let mut state = AppState::init(config(dir.path(), history)).unwrap();

        let server = crate::testing::serve_once(
            200,
            r#"{"id_token":"fresh-id","refresh_token":"r2","user_id":"u1","expires_in":"3600"}"#,
        )
        .await;
        let settings = state.config.firebase().unwrap().unwrap();
        let auth = FirebaseAuth::with_endpoints(
            &settings,
            SessionManager::new(state.config.session_path()),
            &server,
            &format!("{}/v1/token", server),
        )
        .unwrap();
        auth.set_current(Some(AuthUser {
            id_token: "expired-id".into(),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::minutes(1)),
            ..crate::testing::user("u1")
        }));
        state.auth = Some(Arc::new(auth));
        state.set_user(state.auth.as_ref().unwrap().current_user().as_ref());

        let store = state.store.clone().unwrap();
        assert_eq!(store.token().unwrap(), "expired-id");

        state.refresh_if_stale().await.unwrap();
        assert_eq!(store.token().unwrap(), "fresh-id");

        // Now valid for an hour, so no second request goes out
        state.refresh_if_stale().await.unwrap();
        assert_eq!(store.token().unwrap(), "fresh-id");
    }
}
