//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Default length of the fetch and retention window.
pub const DEFAULT_DAYS: u32 = 30;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the entry cache.
    pub database_path: PathBuf,
    /// Toggl API token.
    pub api_token: Option<String>,
    /// Days to fetch, and age after which cached entries are pruned.
    pub days: u32,
    /// Workspace to report on; the account's first workspace if unset.
    pub workspace_id: Option<i64>,
    /// Identifies this tool to the reports API.
    pub user_agent: String,
    /// Base URL of the Toggl API (`/me`).
    pub api_base_url: String,
    /// Base URL of the Toggl reports API (`/details`).
    pub reports_base_url: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("days", &self.days)
            .field("workspace_id", &self.workspace_id)
            .field("user_agent", &self.user_agent)
            .field("api_base_url", &self.api_base_url)
            .field("reports_base_url", &self.reports_base_url)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("database"));
        Self {
            database_path: data_dir.join("time_entries.db"),
            api_token: None,
            days: DEFAULT_DAYS,
            workspace_id: None,
            user_agent: "toggl-watch".to_string(),
            api_base_url: tw_toggl::DEFAULT_API_URL.to_string(),
            reports_base_url: tw_toggl::DEFAULT_REPORTS_URL.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    ///
    /// Later sources win: defaults, `~/.config/tw/config.toml`, the given
    /// file, `API_TOKEN`, then `TW_*` variables.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Bare API_TOKEN is accepted alongside TW_API_TOKEN
        figment = figment.merge(Env::raw().only(&["API_TOKEN"]));
        figment = figment.merge(Env::prefixed("TW_"));

        figment.extract()
    }

    /// Returns the API token, or an error if it is missing or blank.
    pub fn api_token(&self) -> anyhow::Result<&str> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "missing Toggl API token (set API_TOKEN, TW_API_TOKEN or api_token in config.toml)"
                )
            })
    }
}

/// Returns the platform-specific config directory for tw.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tw"))
}

/// Returns the platform-specific data directory for tw.
///
/// On Linux: `~/.local/share/tw`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tw"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_tw() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "tw");
    }

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(
            config.database_path,
            dirs_data_path().unwrap().join("time_entries.db")
        );
        assert_eq!(config.days, 30);
        assert!(config.api_token.is_none());
        assert_eq!(config.api_base_url, tw_toggl::DEFAULT_API_URL);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
database_path = "/tmp/tw-test/entries.db"
days = 7
workspace_id = 42
api_base_url = "http://localhost:1234/api"
reports_base_url = "http://localhost:1234/reports"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/tw-test/entries.db"));
        assert_eq!(config.days, 7);
        assert_eq!(config.workspace_id, Some(42));
        assert_eq!(config.api_base_url, "http://localhost:1234/api");
        assert_eq!(config.reports_base_url, "http://localhost:1234/reports");
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = Config {
            api_token: Some("secret-token".to_string()),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_blank_token_is_missing() {
        let config = Config {
            api_token: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(config.api_token().is_err());

        let config = Config {
            api_token: Some(" abc ".to_string()),
            ..Config::default()
        };
        assert_eq!(config.api_token().unwrap(), "abc");
    }
}
