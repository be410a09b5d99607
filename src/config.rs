//! Runtime configuration for the Alertmanager sync.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `AMC_STAGING_ROOT` | `<temp dir>/mimir-operator` | Root of the staging area |
//! | `AMC_REQUEST_TIMEOUT` | 30 | HTTP request timeout (seconds) |
//! | `AMC_SYNC_TIMEOUT` | 120 | Deadline for the remote calls of one sync (seconds, 0 disables) |
//! | `AMC_LOG_LEVEL` | info | Log level |

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::staging::StagingStore;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Sync configuration
///
/// Built from environment variables with [`SyncConfig::from_env`], from
/// command line arguments with [`SyncConfig::parse`], or programmatically.
#[derive(Debug, Clone, Parser)]
#[command(name = "mimir-alertmanager-sync")]
#[command(about = "Synchronizes AlertManagerConfig resources with Mimir")]
pub struct SyncConfig {
    /// Root directory for staged configuration documents.
    #[arg(long, env = "AMC_STAGING_ROOT")]
    pub staging_root: Option<PathBuf>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "AMC_REQUEST_TIMEOUT", default_value = "30")]
    pub request_timeout: u64,

    /// Deadline in seconds for the remote calls of a single sync (0 disables).
    #[arg(long, env = "AMC_SYNC_TIMEOUT", default_value = "120")]
    pub sync_timeout: u64,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "AMC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            staging_root: None,
            request_timeout: 30,
            sync_timeout: 120,
            log_level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    /// Reads the configuration from environment variables only
    ///
    /// Falls back to defaults when a variable cannot be parsed.
    pub fn from_env() -> Self {
        Self::try_parse_from(["mimir-alertmanager-sync"]).unwrap_or_default()
    }

    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(StagingStore::default_root)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn sync_timeout(&self) -> Option<Duration> {
        (self.sync_timeout > 0).then(|| Duration::from_secs(self.sync_timeout))
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.request_timeout == 0 {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if let Some(root) = &self.staging_root {
            if !root.is_absolute() {
                errors.push(format!(
                    "Staging root must be an absolute path: {}",
                    root.display()
                ));
            }
        }

        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(format!("Unknown log level: {}", self.log_level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.sync_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.staging_root(), StagingStore::default_root());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_arguments() {
        let config = SyncConfig::try_parse_from([
            "mimir-alertmanager-sync",
            "--staging-root",
            "/var/run/amc",
            "--request-timeout",
            "5",
            "--sync-timeout",
            "0",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(config.staging_root(), PathBuf::from("/var/run/amc"));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let config = SyncConfig {
            staging_root: Some(PathBuf::from("relative/dir")),
            request_timeout: 0,
            log_level: "verbose".to_string(),
            ..Default::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
