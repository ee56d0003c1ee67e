use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::prompts::{self, Persona};

pub const API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
pub const FIREBASE_API_KEY_ENV: &str = "FIREBASE_API_KEY";
pub const FIREBASE_PROJECT_ENV: &str = "FIREBASE_PROJECT_ID";

static DEFAULT_HOME: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".studymate")
});

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the completion endpoint
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    pub base_url: String,

    pub model: String,

    pub temperature: f32,

    /// HTTP timeout for completion requests
    pub request_timeout_secs: u64,

    pub persona: Persona,

    /// Replaces the persona's instruction when set
    pub system_prompt: Option<String>,

    pub history: HistoryConfig,

    /// Directory holding config.toml, the session file and the log
    #[serde(skip)]
    pub home: PathBuf,
}

/// Cloud history settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub firebase_api_key: Option<String>,
    pub project_id: Option<String>,
}

/// Resolved Firebase credentials, present only when history is enabled
#[derive(Debug, Clone, PartialEq)]
pub struct FirebaseSettings {
    pub api_key: String,
    pub project_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: None,
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            request_timeout_secs: 60,
            persona: Persona::default(),
            system_prompt: None,
            history: HistoryConfig::default(),
            home: DEFAULT_HOME.clone(),
        }
    }
}

impl Config {
    pub fn default_home() -> PathBuf {
        DEFAULT_HOME.clone()
    }

    /// Load configuration from `<home>/config.toml`, falling back to defaults
    pub fn load(home: Option<&Path>) -> Result<Self> {
        let home = home.map(Path::to_path_buf).unwrap_or_else(Self::default_home);

        fs::create_dir_all(&home)
            .with_context(|| format!("Failed to create {}", home.display()))?;

        let config_path = home.join("config.toml");
        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::debug!("No config at {}, using defaults", config_path.display());
            Config::default()
        };

        config.home = home;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(self.config_path(), content)
            .context("Failed to write config file")?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    pub fn session_path(&self) -> PathBuf {
        self.home.join("session.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("studymate.log")
    }

    pub fn system_prompt(&self) -> String {
        prompts::system_prompt(self.persona, self.system_prompt.as_deref())
    }

    /// Get API key from config or environment
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    fn api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| non_empty(env(API_KEY_ENV)))
    }

    /// API key, or a fatal configuration error when none is set
    pub fn require_api_key(&self) -> Result<String> {
        match self.api_key() {
            Some(key) => Ok(key),
            None => bail!(
                "No API key configured. Set `api_key` in {} or export {}",
                self.config_path().display(),
                API_KEY_ENV
            ),
        }
    }

    /// Firebase credentials when history is enabled.
    ///
    /// Returns `Ok(None)` with history off and an error when it is on but
    /// the credentials are incomplete.
    pub fn firebase(&self) -> Result<Option<FirebaseSettings>> {
        self.firebase_with(|name| std::env::var(name).ok())
    }

    fn firebase_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Option<FirebaseSettings>> {
        if !self.history.enabled {
            return Ok(None);
        }

        let api_key = non_empty(self.history.firebase_api_key.clone())
            .or_else(|| non_empty(env(FIREBASE_API_KEY_ENV)));
        let project_id = non_empty(self.history.project_id.clone())
            .or_else(|| non_empty(env(FIREBASE_PROJECT_ENV)));

        match (api_key, project_id) {
            (Some(api_key), Some(project_id)) => Ok(Some(FirebaseSettings { api_key, project_id })),
            _ => bail!(
                "History is enabled but the Firebase configuration is incomplete. \
                 Set [history] firebase_api_key and project_id, or export {} and {}",
                FIREBASE_API_KEY_ENV,
                FIREBASE_PROJECT_ENV
            ),
        }
    }

    /// Human-readable dump with secrets masked
    pub fn describe(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("config file : {}\n", self.config_path().display()));
        out.push_str(&format!("api key     : {}\n", mask(self.api_key().as_deref())));
        out.push_str(&format!("base url    : {}\n", self.base_url));
        out.push_str(&format!("model       : {}\n", self.model));
        out.push_str(&format!("temperature : {}\n", self.temperature));
        out.push_str(&format!("timeout     : {}s\n", self.request_timeout_secs));
        let persona = if self.system_prompt.is_some() {
            "custom".to_string()
        } else {
            self.persona.to_string()
        };
        out.push_str(&format!("persona     : {}\n", persona));
        out.push_str(&format!(
            "history     : {}\n",
            if self.history.enabled { "enabled" } else { "disabled" }
        ));
        if self.history.enabled {
            out.push_str(&format!(
                "  project   : {}\n",
                self.history.project_id.as_deref().unwrap_or("(from env)")
            ));
        }
        out
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn mask(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(s) if s.chars().count() <= 8 => "********".to_string(),
        Some(s) => {
            let tail: String = s.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("****{}", tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(dir.path())).unwrap();
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.persona, Persona::Tutor);
        assert!(!config.history.enabled);
        assert_eq!(config.home, dir.path());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "persona = \"plain\"\n[history]\nenabled = true\nproject_id = \"demo\"\n",
        )
        .unwrap();

        let config = Config::load(Some(dir.path())).unwrap();
        assert_eq!(config.persona, Persona::Plain);
        assert_eq!(config.base_url, "https://api.deepseek.com/v1");
        assert!(config.history.enabled);
        assert_eq!(config.history.project_id.as_deref(), Some("demo"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load(Some(dir.path())).unwrap();
        config.model = "deepseek-reasoner".into();
        config.save().unwrap();

        let reloaded = Config::load(Some(dir.path())).unwrap();
        assert_eq!(reloaded.model, "deepseek-reasoner");
    }

    #[test]
    fn test_api_key_env_fallback() {
        let mut config = Config::default();
        let env = |name: &str| (name == API_KEY_ENV).then(|| "sk-env".to_string());
        assert_eq!(config.api_key_with(env).as_deref(), Some("sk-env"));

        config.api_key = Some("sk-file".into());
        assert_eq!(config.api_key_with(env).as_deref(), Some("sk-file"));

        config.api_key = Some("  ".into());
        assert_eq!(config.api_key_with(no_env), None);
    }

    #[test]
    fn test_firebase_disabled_is_none() {
        let config = Config::default();
        assert_eq!(config.firebase_with(no_env).unwrap(), None);
    }

    #[test]
    fn test_firebase_enabled_requires_settings() {
        let mut config = Config::default();
        config.history.enabled = true;
        config.history.project_id = Some("demo".into());
        assert!(config.firebase_with(no_env).is_err());

        let env = |name: &str| (name == FIREBASE_API_KEY_ENV).then(|| "fb-key".to_string());
        let settings = config.firebase_with(env).unwrap().unwrap();
        assert_eq!(settings.api_key, "fb-key");
        assert_eq!(settings.project_id, "demo");
    }

    #[test]
    fn test_mask_hides_secret() {
        assert_eq!(mask(None), "(not set)");
        assert_eq!(mask(Some("short")), "********");
        assert_eq!(mask(Some("sk-1234567890abcd")), "****abcd");
    }
}
