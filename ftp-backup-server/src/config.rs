use ftp_backup::Config;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub site_url: String,
    pub run_token: Option<String>,
    pub cron_schedule: Option<String>,
    pub log_level: String,
    pub backup: Config,
}

impl AppConfig {
    /// Load `.env`, then the backup configuration named by `FTP_BACKUP_CONFIG`
    /// (environment overrides apply either way). `PORT` overrides the
    /// configured listen port.
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let path = std::env::var("FTP_BACKUP_CONFIG").ok().map(PathBuf::from);
        let backup = Config::load(path.as_deref())?;

        let mut config = Self::from_config(backup);
        if let Some(port) = std::env::var("PORT").ok().and_then(|v| v.parse().ok()) {
            config.port = port;
        }
        Ok(config)
    }

    pub fn from_config(backup: Config) -> Self {
        let server = &backup.server;
        Self {
            port: server.port,
            site_url: server.site_url.trim_end_matches('/').to_string(),
            run_token: server.run_token.clone().filter(|t| !t.is_empty()),
            cron_schedule: server.cron_schedule.clone().filter(|c| !c.trim().is_empty()),
            log_level: backup.log.level.clone(),
            backup,
        }
    }
}
