use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use super::feeds::FeedKey;
use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub default_feed: FeedKey,
}

/// What happens to the focused station when a refreshed collection no
/// longer contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingFocus {
    /// Drop the focus.
    #[default]
    Clear,
    /// Keep the last snapshot, flagged as stale.
    Keep,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub on_missing: MissingFocus,
}

/// Optional pre-issued credentials for headless runs. Overridden by the
/// `TRANSIT_USER` / `TRANSIT_TOKEN` environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "platform::default_log_file")]
    pub log_file: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            default_feed: FeedKey::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_file: platform::default_log_file(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("transit-hub/{}", env!("CARGO_PKG_VERSION"))
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            info!("[config] wrote defaults to {}", config_path.display());
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Let `TRANSIT_USER` / `TRANSIT_TOKEN` override the `[auth]` table.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("TRANSIT_USER").ok(),
            std::env::var("TRANSIT_TOKEN").ok(),
        );
    }

    fn apply_overrides(&mut self, user_id: Option<String>, token: Option<String>) {
        if let Some(user_id) = user_id.filter(|s| !s.is_empty()) {
            self.auth.user_id = Some(user_id);
        }
        if let Some(token) = token.filter(|s| !s.is_empty()) {
            self.auth.token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.backend.base_url, "http://127.0.0.1:5000");
        assert_eq!(config.polling.interval(), Duration::from_secs(60));
        assert_eq!(config.polling.default_feed, FeedKey::Numbered);
        assert_eq!(config.selection.on_missing, MissingFocus::Clear);
        assert!(config.http.enabled);
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert!(config.auth.token.is_none());
        assert!(config.paths.log_file.ends_with("transit-hub/transit-watch.log"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [polling]
            default_feed = "ace"

            [selection]
            on_missing = "keep"
            "#,
        )
        .unwrap();
        assert_eq!(config.polling.default_feed, FeedKey::Ace);
        assert_eq!(config.polling.interval_secs, 60);
        assert_eq!(config.selection.on_missing, MissingFocus::Keep);
        assert_eq!(config.backend.request_timeout_secs, 15);
    }

    #[test]
    fn test_unknown_feed_in_file_is_an_error() {
        let parsed = toml::from_str::<Config>("[polling]\ndefault_feed = \"xyz\"\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_load_from_writes_defaults_then_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let first = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let mut edited = first.clone();
        edited.polling.interval_secs = 5;
        edited.auth.user_id = Some("rider".into());
        edited.save_to(&path).unwrap();

        let second = Config::load_from(&path).unwrap();
        assert_eq!(second.polling.interval_secs, 5);
        assert_eq!(second.auth.user_id.as_deref(), Some("rider"));
    }

    #[test]
    fn test_env_overrides_skip_empty_values() {
        let mut config = Config::default();
        config.auth.user_id = Some("from-file".into());
        config.apply_overrides(Some(String::new()), Some("tok".into()));
        assert_eq!(config.auth.user_id.as_deref(), Some("from-file"));
        assert_eq!(config.auth.token.as_deref(), Some("tok"));
    }
}
