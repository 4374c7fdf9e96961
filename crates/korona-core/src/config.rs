//! Korona configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{KoronaError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KoronaConfig {
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
}

impl KoronaConfig {
    /// Load config from the default path (~/.korona/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KoronaError::config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| KoronaError::config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Apply `KORONA_BOT_TOKEN` / `KORONA_SCHEDULE` overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("KORONA_BOT_TOKEN").ok(),
            std::env::var("KORONA_SCHEDULE").ok(),
        );
    }

    fn apply_overrides(&mut self, token: Option<String>, schedule: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = token.trim().to_string();
        }
        if let Some(expr) = schedule.filter(|s| !s.trim().is_empty()) {
            self.schedule.expression = expr.trim().to_string();
        }
    }

    /// Sanity checks that do not need other crates. The schedule expression
    /// itself is parsed by the scheduler at startup.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.enabled && self.telegram.bot_token.trim().is_empty() {
            return Err(KoronaError::config(
                "telegram.bot_token is empty (set it in config.toml or KORONA_BOT_TOKEN)",
            ));
        }
        if self.schedule.dispatch_concurrency == 0 {
            return Err(KoronaError::config("schedule.dispatch_concurrency must be > 0"));
        }
        if self.data.api_base.trim().is_empty() {
            return Err(KoronaError::config("data.api_base is empty"));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Korona home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".korona")
    }
}

/// Expand `~` in a configured path.
pub fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSection {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    /// Pause between long-poll requests, seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

fn bool_true() -> bool { true }
fn default_poll_interval() -> u64 { 1 }

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// Daily notification schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Five-field time expression, evaluated in local time.
    #[serde(default = "default_expression")]
    pub expression: String,
    /// Re-download the dataset before every scheduled batch.
    #[serde(default = "bool_true")]
    pub refresh_before_dispatch: bool,
    /// Users notified in parallel during a batch.
    #[serde(default = "default_concurrency")]
    pub dispatch_concurrency: usize,
}

fn default_expression() -> String { "0 19 * * *".into() }
fn default_concurrency() -> usize { 4 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            expression: default_expression(),
            refresh_before_dispatch: true,
            dispatch_concurrency: default_concurrency(),
        }
    }
}

/// Metric data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_rows")]
    pub rows: u32,
    /// HTTP timeout, seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String { "https://opendata.wuerzburg.de".into() }
fn default_dataset() -> String { "rki_corona_landkreise".into() }
fn default_rows() -> u32 { 500 }
fn default_timeout() -> u64 { 30 }

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            dataset: default_dataset(),
            rows: default_rows(),
            timeout_secs: default_timeout(),
        }
    }
}

/// User store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_users_db")]
    pub users_db: String,
}

fn default_users_db() -> String { "~/.korona/users.db".into() }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_db: default_users_db(),
        }
    }
}

/// Picture assets, one `<level>.jpg` per bucket plus `error.jpg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_assets_dir")]
    pub dir: String,
}

fn default_assets_dir() -> String { "Assets".into() }

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            dir: default_assets_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KoronaConfig::default();
        assert_eq!(config.schedule.expression, "0 19 * * *");
        assert!(config.schedule.refresh_before_dispatch);
        assert_eq!(config.schedule.dispatch_concurrency, 4);
        assert_eq!(config.data.api_base, "https://opendata.wuerzburg.de");
        assert_eq!(config.data.rows, 500);
        assert_eq!(config.assets.dir, "Assets");
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [telegram]
            bot_token = "123:abc"

            [schedule]
            expression = "30 7 * * 1"
            dispatch_concurrency = 2
        "#;

        let config: KoronaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.schedule.expression, "30 7 * * 1");
        assert_eq!(config.schedule.dispatch_concurrency, 2);
        assert!(config.schedule.refresh_before_dispatch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: KoronaConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.users_db, "~/.korona/users.db");
        assert_eq!(config.telegram.poll_interval, 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[assets]\ndir = \"/srv/pics\"\n").unwrap();
        let config = KoronaConfig::load_from(&path).unwrap();
        assert_eq!(config.assets.dir, "/srv/pics");

        std::fs::write(&path, "[assets\n").unwrap();
        assert!(matches!(
            KoronaConfig::load_from(&path),
            Err(KoronaError::Config(_))
        ));
    }

    #[test]
    fn test_validate_requires_token() {
        let config = KoronaConfig::default();
        assert!(config.validate().is_err());

        let mut config = KoronaConfig::default();
        config.telegram.enabled = false;
        assert!(config.validate().is_ok());
        config.schedule.dispatch_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = KoronaConfig::default();
        config.apply_overrides(Some(" tok ".into()), Some("".into()));
        assert_eq!(config.telegram.bot_token, "tok");
        assert_eq!(config.schedule.expression, "0 19 * * *");

        config.apply_overrides(None, Some("* * * * *".into()));
        assert_eq!(config.schedule.expression, "* * * * *");
    }

    #[test]
    fn test_home_dir() {
        let home = KoronaConfig::home_dir();
        assert!(home.to_string_lossy().contains("korona"));
    }
}
