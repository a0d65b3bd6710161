use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::platform;

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "VAULT_API_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub undo: UndoConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend origin, without the `/api` prefix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Lifecycle clock polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Undo grace window after an unearth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoConfig {
    /// When the placeholder starts fading out, measured from arming.
    #[serde(default = "default_fade_after_ms")]
    pub fade_after_ms: u64,
    /// When the undo option disappears, measured from arming.
    #[serde(default = "default_clear_after_ms")]
    pub clear_after_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewsConfig {
    /// How many tracks the dashboard "ready" widget fetches.
    #[serde(default = "default_ready_limit")]
    pub ready_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where the session and csrf cookies are persisted between runs.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            fade_after_ms: default_fade_after_ms(),
            clear_after_ms: default_clear_after_ms(),
        }
    }
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            ready_limit: default_ready_limit(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            session_file: default_session_file(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_fade_after_ms() -> u64 {
    14_700
}

fn default_clear_after_ms() -> u64 {
    15_000
}

fn default_ready_limit() -> usize {
    5
}

fn default_session_file() -> PathBuf {
    platform::data_dir().join("session.json")
}

impl ClockConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// Longest undo window honoured, whatever the config says.
pub const MAX_UNDO_WINDOW_MS: u64 = 10 * 60 * 1000;

impl UndoConfig {
    pub fn fade_after(&self) -> Duration {
        Duration::from_millis(self.fade_after_ms.min(MAX_UNDO_WINDOW_MS))
    }

    /// Never earlier than the fade start.
    pub fn clear_after(&self) -> Duration {
        let clear_ms = self.clear_after_ms.max(self.fade_after_ms);
        Duration::from_millis(clear_ms.min(MAX_UNDO_WINDOW_MS))
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        let mut config = if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            config
        } else {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml_str(&content)?
        };

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api.base_url = url.trim().to_string();
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8000");
        assert_eq!(config.clock.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.undo.fade_after(), Duration::from_millis(14_700));
        assert_eq!(config.undo.clear_after(), Duration::from_millis(15_000));
        assert_eq!(config.views.ready_limit, 5);
        assert!(config.paths.session_file.ends_with("session.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [api]
            base_url = "https://vault.example"

            [undo]
            clear_after_ms = 10000
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://vault.example");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.undo.fade_after_ms, 14_700);
        // a clear before the fade is pushed back to the fade start
        assert_eq!(config.undo.clear_after(), Duration::from_millis(14_700));
    }

    #[test]
    fn test_undo_window_is_capped() {
        let undo = UndoConfig {
            fade_after_ms: u64::MAX,
            clear_after_ms: u64::MAX,
        };
        assert_eq!(undo.fade_after(), Duration::from_millis(MAX_UNDO_WINDOW_MS));
        assert_eq!(undo.clear_after(), Duration::from_millis(MAX_UNDO_WINDOW_MS));
    }
}
