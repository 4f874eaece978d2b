//! Configuration management for the backup pipeline.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides (`FTP_BACKUP__REMOTE__HOST=...`). The resulting [`Config`] is
//! immutable and handed to each component at construction time.

use crate::retention::{RetentionPolicy, TieredPolicy};
use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "FTP_BACKUP";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backup: BackupConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory whose contents are archived
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,

    /// Where archives are written (default: `<content_dir>/.backups`)
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Archive filename prefix
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Sub-paths of `content_dir` left out of the archive
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

/// Remote transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Ftp,
    Ftps,
    Sftp,
}

impl Protocol {
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Ftp | Protocol::Ftps => 21,
            Protocol::Sftp => 22,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Protocol::Ftp => "FTP",
            Protocol::Ftps => "FTPS",
            Protocol::Sftp => "SFTP",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub protocol: Protocol,

    #[serde(default)]
    pub host: String,

    /// Port (default: 21 for FTP/FTPS, 22 for SFTP)
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Remote directory archives are uploaded to
    #[serde(default = "default_remote_directory")]
    pub directory: String,

    /// Use passive mode (FTP/FTPS only)
    #[serde(default = "default_true")]
    pub passive: bool,

    /// Private key file for SFTP key authentication
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Passphrase for the private key
    #[serde(default)]
    pub passphrase: Option<String>,

    /// Upload new archives to the remote server
    #[serde(default = "default_true")]
    pub upload: bool,

    /// Apply retention to the remote directory as well
    #[serde(default = "default_true")]
    pub delete_from_remote: bool,
}

/// Which retention algorithm prunes old archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionStrategy {
    #[default]
    Simple,
    Tiered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub strategy: RetentionStrategy,

    /// Archives kept by the simple strategy (<= 0 keeps everything)
    #[serde(default = "default_keep_count")]
    pub keep_count: i64,

    /// Days during which every archive is kept
    #[serde(default = "default_daily")]
    pub daily: u32,

    /// 7-day periods after the daily window, one archive each
    #[serde(default = "default_weekly")]
    pub weekly: u32,

    /// 30-day periods after the weekly window, one archive each
    #[serde(default = "default_monthly")]
    pub monthly: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen port
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Public base URL, part of the download key
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Token required by the execute-via-URL endpoint (disabled when unset)
    #[serde(default)]
    pub run_token: Option<String>,

    /// Cron expression for scheduled backups (disabled when unset)
    #[serde(default)]
    pub cron_schedule: Option<String>,
}

// Default values
fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_file_prefix() -> String {
    "backup-".to_string()
}

fn default_exclude() -> Vec<String> {
    vec![".backups".to_string()]
}

fn default_remote_directory() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_keep_count() -> i64 {
    10
}

fn default_daily() -> u32 {
    10
}

fn default_weekly() -> u32 {
    4
}

fn default_monthly() -> u32 {
    6
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_port() -> u16 {
    3000
}

fn default_site_url() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string());
    format!("http://{}", host)
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            content_dir: default_content_dir(),
            backup_dir: None,
            file_prefix: default_file_prefix(),
            exclude: default_exclude(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            host: String::new(),
            port: None,
            username: String::new(),
            password: String::new(),
            directory: default_remote_directory(),
            passive: true,
            private_key: None,
            passphrase: None,
            upload: true,
            delete_from_remote: true,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            strategy: RetentionStrategy::default(),
            keep_count: default_keep_count(),
            daily: default_daily(),
            weekly: default_weekly(),
            monthly: default_monthly(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            site_url: default_site_url(),
            run_token: None,
            cron_schedule: None,
        }
    }
}

impl BackupConfig {
    /// Resolved archive directory.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self
                .content_dir
                .parent()
                .map(|p| p.join(dir))
                .unwrap_or_else(|| dir.clone()),
            None => self.content_dir.join(".backups"),
        }
    }
}

impl RemoteConfig {
    /// Effective port, falling back to the protocol default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// True when a host is set; remote steps are skipped otherwise.
    pub fn is_enabled(&self) -> bool {
        !self.host.trim().is_empty()
    }

    /// Check the credentials the selected protocol needs.
    ///
    /// FTP/FTPS need host, username and password; SFTP accepts a private key
    /// in place of the password.
    pub fn missing_credentials(&self) -> Option<String> {
        let has_secret = match self.protocol {
            Protocol::Ftp | Protocol::Ftps => !self.password.is_empty(),
            Protocol::Sftp => !self.password.is_empty() || self.private_key.is_some(),
        };

        if self.host.trim().is_empty() || self.username.is_empty() || !has_secret {
            Some(format!(
                "Incomplete {} settings. Unable to perform {} operations.",
                self.protocol.label(),
                self.protocol.label()
            ))
        } else {
            None
        }
    }

    /// Remote path for a file inside the configured directory.
    pub fn remote_path(&self, filename: &str) -> String {
        let dir = self.directory.trim_end_matches('/');
        format!("{}/{}", dir, filename)
    }
}

impl RetentionConfig {
    /// The immutable policy handed to the retention engine.
    pub fn policy(&self) -> RetentionPolicy {
        match self.strategy {
            RetentionStrategy::Simple => RetentionPolicy::Simple {
                keep_count: self.keep_count,
            },
            RetentionStrategy::Tiered => RetentionPolicy::Tiered(TieredPolicy {
                daily_days: self.daily,
                weekly_periods: self.weekly,
                monthly_periods: self.monthly,
            }),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            let path_str = path.to_string_lossy();
            builder = builder.add_source(
                config::File::new(&path_str, config::FileFormat::Toml).required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, without environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| BackupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render this configuration as TOML (used by `init-config`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BackupError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.backup.content_dir.as_os_str().is_empty() {
            return Err(BackupError::Config("backup.content_dir must not be empty".into()));
        }
        if self.backup.file_prefix.contains('/') {
            return Err(BackupError::Config(
                "backup.file_prefix must not contain '/'".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_plugin_defaults() {
        let config = Config::default();
        assert_eq!(config.backup.file_prefix, "backup-");
        assert_eq!(config.retention.keep_count, 10);
        assert_eq!(config.retention.strategy, RetentionStrategy::Simple);
        assert_eq!(
            (config.retention.daily, config.retention.weekly, config.retention.monthly),
            (10, 4, 6)
        );
        assert!(config.remote.passive);
        assert!(config.remote.delete_from_remote);
        assert_eq!(config.remote.port(), 21);
    }

    #[test]
    fn test_sftp_default_port() {
        let remote = RemoteConfig {
            protocol: Protocol::Sftp,
            ..RemoteConfig::default()
        };
        assert_eq!(remote.port(), 22);
    }

    #[test]
    fn test_from_file_partial_sections() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("backup.toml");
        fs::write(
            &path,
            r#"
[backup]
content_dir = "/srv/site/content"

[remote]
protocol = "sftp"
host = "backup.example.com"
username = "deploy"
private_key = "/home/deploy/.ssh/id_rsa"

[retention]
strategy = "tiered"
daily = 7
weekly = 4
monthly = 3
"#,
        )?;

        let config = Config::from_file(&path)?;
        assert_eq!(config.remote.protocol, Protocol::Sftp);
        assert!(config.remote.missing_credentials().is_none());
        assert_eq!(
            config.backup.backup_dir(),
            PathBuf::from("/srv/site/content/.backups")
        );
        match config.retention.policy() {
            RetentionPolicy::Tiered(p) => {
                assert_eq!((p.daily_days, p.weekly_periods, p.monthly_periods), (7, 4, 3));
            }
            other => panic!("expected tiered policy, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_load_with_config_crate() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("backup.toml");
        fs::write(&path, "[retention]\nkeep_count = 3\n")?;

        let config = Config::load(Some(&path))?;
        assert_eq!(config.retention.keep_count, 3);
        assert_eq!(config.retention.policy(), RetentionPolicy::Simple { keep_count: 3 });
        Ok(())
    }

    #[test]
    fn test_missing_credentials() {
        let mut remote = RemoteConfig {
            host: "ftp.example.com".into(),
            username: "user".into(),
            ..RemoteConfig::default()
        };
        let message = remote.missing_credentials().unwrap();
        assert!(message.contains("Incomplete FTP settings"));

        remote.password = "secret".into();
        assert!(remote.missing_credentials().is_none());
    }

    #[test]
    fn test_relative_backup_dir_resolves_next_to_content() {
        let backup = BackupConfig {
            content_dir: PathBuf::from("/srv/site/content"),
            backup_dir: Some(PathBuf::from("backups")),
            ..BackupConfig::default()
        };
        assert_eq!(backup.backup_dir(), PathBuf::from("/srv/site/backups"));
    }

    #[test]
    fn test_remote_path_joins_directory() {
        let mut remote = RemoteConfig::default();
        assert_eq!(remote.remote_path("a.zip"), "/a.zip");
        remote.directory = "/backups/site/".into();
        assert_eq!(remote.remote_path("a.zip"), "/backups/site/a.zip");
    }

    #[test]
    fn test_toml_round_trip_of_defaults() -> Result<()> {
        let rendered = Config::default().to_toml()?;
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.backup.file_prefix, "backup-");
        assert_eq!(parsed.remote.directory, "/");
        Ok(())
    }
}
