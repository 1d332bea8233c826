//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Seconds between autosave checkpoints while the host runs.
    pub autosave_interval_secs: u64,

    /// Keep tab instances when resuming the session that was active when the
    /// previous host process exited.
    pub resume_trusts_instances: bool,

    /// Append logs to this file instead of stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Directory for `bt backup` output.
    pub backup_dir: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("autosave_interval_secs", &self.autosave_interval_secs)
            .field("resume_trusts_instances", &self.resume_trusts_instances)
            .field("log_file", &self.log_file)
            .field("backup_dir", &self.backup_dir)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("bt.db"),
            autosave_interval_secs: 30,
            resume_trusts_instances: true,
            log_file: None,
            backup_dir: data_dir.join("backups"),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (BT_*)
        figment = figment.merge(Env::prefixed("BT_"));

        figment.extract()
    }

    /// Autosave period, never shorter than one second.
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }
}

/// Returns the platform-specific config directory for bt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("bt"))
}

/// Returns the platform-specific data directory for bt.
///
/// On Linux: `~/.local/share/bt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("bt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_data_path_ends_with_bt() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "bt");
    }

    #[test]
    fn test_default_config_uses_data_dir() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("bt.db"));
        assert_eq!(config.backup_dir, data_dir.join("backups"));
        assert_eq!(config.autosave_interval(), Duration::from_secs(30));
        assert!(config.resume_trusts_instances);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "autosave_interval_secs = 5\nresume_trusts_instances = false\nlog_file = \"/tmp/bt.log\"\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.autosave_interval(), Duration::from_secs(5));
        assert!(!config.resume_trusts_instances);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/bt.log")));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = Config {
            autosave_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.autosave_interval(), Duration::from_secs(1));
    }
}
