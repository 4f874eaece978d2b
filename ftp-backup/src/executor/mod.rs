//! Backup orchestrator - sequences archive, upload and retention.
//!
//! A run is blocking and strictly ordered:
//!
//! 1. Archive the content directory (fatal on failure)
//! 2. Upload the archive (failure is reported, the run continues)
//! 3. Apply retention to the local backup directory
//! 4. Apply retention to the remote directory, when enabled
//!
//! Async callers wrap [`BackupOrchestrator::run`] in
//! `tokio::task::spawn_blocking`.

pub mod outcome;
pub mod remote;

pub use outcome::{
    ArchiveInfo, BackupOutcome, BackupReport, RemoteRetention, RetentionSummary, UploadOutcome,
};
pub use remote::{RemoteFile, RemoteStats};

use crate::archive::{backup_filename, Archiver};
use crate::config::Config;
use crate::fs::LocalStore;
use crate::retention::RetentionPolicy;
use crate::transport::{self, Connection, TransportError, TransportFactory};
use crate::utils::errors::{BackupError, Result};
use crate::utils::format::{format_duration, format_size};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Source of "now" for archive names and retention windows.
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

/// Per-run switches.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Upload the new archive to the remote server
    pub upload: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { upload: true }
    }
}

/// Opens the remote connection on first use and remembers the result, so a
/// run connects at most once. Dropping it disconnects.
struct LazyConnection<'a> {
    config: &'a Config,
    factory: &'a TransportFactory,
    state: Option<std::result::Result<Connection, TransportError>>,
}

impl<'a> LazyConnection<'a> {
    fn new(config: &'a Config, factory: &'a TransportFactory) -> Self {
        Self {
            config,
            factory,
            state: None,
        }
    }

    fn get(&mut self) -> std::result::Result<&mut Connection, TransportError> {
        if self.state.is_none() {
            self.state = Some(Connection::open(&self.config.remote, self.factory));
        }
        match self.state.as_mut() {
            Some(Ok(conn)) => Ok(conn),
            Some(Err(e)) => Err(e.clone()),
            None => Err(TransportError::NotConnected),
        }
    }
}

pub struct BackupOrchestrator {
    config: Config,
    store: LocalStore,
    archiver: Archiver,
    transports: TransportFactory,
    clock: Clock,
}

impl BackupOrchestrator {
    pub fn new(config: Config) -> Self {
        let store = LocalStore::new(config.backup.backup_dir());
        Self {
            config,
            store,
            archiver: Archiver::new(),
            transports: transport::default_factory(),
            clock: Arc::new(Local::now),
        }
    }

    pub fn with_transport_factory(mut self, factory: TransportFactory) -> Self {
        self.transports = factory;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    fn policy(&self) -> RetentionPolicy {
        self.config.retention.policy()
    }

    fn remote_retention_enabled(&self) -> bool {
        self.config.remote.delete_from_remote && self.config.remote.is_enabled()
    }

    /// Sub-paths of the content directory left out of the archive: the
    /// configured excludes plus the backup directory when it lives inside.
    fn excluded_paths(&self) -> Vec<PathBuf> {
        let mut excluded: Vec<PathBuf> =
            self.config.backup.exclude.iter().map(PathBuf::from).collect();

        if let Ok(inside) = self.store.dir().strip_prefix(&self.config.backup.content_dir) {
            if !inside.as_os_str().is_empty() && !excluded.iter().any(|e| e == inside) {
                excluded.push(inside.to_path_buf());
            }
        }
        excluded
    }

    /// Run the full pipeline and describe the result.
    pub fn run(&self, options: RunOptions) -> BackupOutcome {
        let started = Instant::now();
        let now = (self.clock)();
        let mut report = BackupReport::default();

        // Archiving
        let archive = match self.create_archive(now) {
            Ok(info) => info,
            Err(e) => {
                error!(error = %e, "Backup failed");
                return BackupOutcome::failed(format!("Backup failed: {}", e), Some(report));
            }
        };
        report.archive = Some(archive.clone());

        let mut connection = LazyConnection::new(&self.config, &self.transports);

        // Uploading
        report.upload = self.upload(&mut connection, &archive, options);

        // Local retention
        match self.apply_local_retention(now.timestamp()) {
            Ok(summary) => report.local_retention = Some(summary),
            Err(e) => {
                warn!(error = %e, "Local retention failed");
                report.local_retention_error = Some(e.to_string());
            }
        }

        // Remote retention
        report.remote_retention = self.remote_retention(&mut connection, now.timestamp());
        drop(connection);

        let message = summarize(&archive, &report);
        info!(
            duration = %format_duration(started.elapsed().as_secs()),
            message = %message,
            "Backup run finished"
        );
        BackupOutcome::succeeded(message, report)
    }

    /// Apply retention only (no new archive), locally and remotely.
    pub fn prune(&self) -> BackupOutcome {
        let now = (self.clock)().timestamp();
        let mut report = BackupReport {
            upload: UploadOutcome::Skipped {
                reason: "prune only".to_string(),
            },
            ..BackupReport::default()
        };

        let local = match self.apply_local_retention(now) {
            Ok(summary) => summary,
            Err(e) => {
                return BackupOutcome::failed(format!("Local retention failed: {}", e), Some(report))
            }
        };
        let mut message = format!("Deleted {} old local backups", local.deleted_count());
        report.local_retention = Some(local);

        let mut connection = LazyConnection::new(&self.config, &self.transports);
        report.remote_retention = self.remote_retention(&mut connection, now);
        drop(connection);

        message.push_str(&local_failure_note(&report));
        message.push_str(&remote_retention_note(&report.remote_retention));
        BackupOutcome::succeeded(message, report)
    }

    /// Create a new archive in the backup directory.
    pub fn create_archive(&self, now: DateTime<Local>) -> Result<ArchiveInfo> {
        self.store.ensure_dir()?;

        let filename = backup_filename(&self.config.backup.file_prefix, now);
        let dest = self.store.dir().join(&filename);
        let summary = self
            .archiver
            .create(&self.config.backup.content_dir, &dest, &self.excluded_paths())?;

        Ok(ArchiveInfo {
            filename,
            size_bytes: summary.size_bytes,
            size_formatted: format_size(summary.size_bytes),
            files: summary.files,
        })
    }

    fn upload(
        &self,
        connection: &mut LazyConnection<'_>,
        archive: &ArchiveInfo,
        options: RunOptions,
    ) -> UploadOutcome {
        let remote = &self.config.remote;
        if !options.upload || !remote.upload {
            return UploadOutcome::Skipped {
                reason: "upload not requested".to_string(),
            };
        }
        if !remote.is_enabled() {
            return UploadOutcome::Skipped {
                reason: "no remote server configured".to_string(),
            };
        }

        let local_path = self.store.dir().join(&archive.filename);
        let remote_path = remote.remote_path(&archive.filename);

        let result = connection
            .get()
            .and_then(|conn| conn.upload(&local_path, &remote_path));

        match result {
            Ok(()) => {
                info!(remote = %remote_path, "Archive uploaded");
                UploadOutcome::Uploaded {
                    remote_path,
                    protocol: remote.protocol.label().to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Upload failed");
                UploadOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Apply the retention policy to the local backup directory.
    pub fn apply_local_retention(&self, now: i64) -> Result<RetentionSummary> {
        let policy = self.policy();
        let records = self.store.records()?;
        let plan = policy.plan(&records, now);

        let mut failed = Vec::new();
        for record in &plan.delete {
            if let Err(e) = self.store.remove(&record.filename) {
                warn!(file = %record.filename, error = %e, "Failed to delete local backup");
                failed.push(record.filename.clone());
            }
        }

        info!(
            strategy = policy.name(),
            kept = plan.keep.len(),
            deleted = plan.delete.len() - failed.len(),
            "Local retention applied"
        );

        Ok(RetentionSummary {
            strategy: policy.name().to_string(),
            plan,
            failed,
        })
    }

    fn remote_retention(&self, connection: &mut LazyConnection<'_>, now: i64) -> RemoteRetention {
        if !self.remote_retention_enabled() {
            return RemoteRetention::Disabled;
        }

        let conn = match connection.get() {
            Ok(conn) => conn,
            Err(e) => {
                return RemoteRetention::Skipped {
                    reason: e.to_string(),
                }
            }
        };

        match remote::cleanup_remote(&mut **conn, &self.config.remote, &self.policy(), now) {
            Ok(summary) => RemoteRetention::Completed(summary),
            Err(e) => {
                warn!(error = %e, "Remote retention failed");
                RemoteRetention::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// List remote archives with sizes and dates.
    pub fn remote_stats(&self) -> Result<RemoteStats> {
        if !self.config.remote.is_enabled() {
            return Err(BackupError::Config("No remote server configured".to_string()));
        }
        let mut conn = Connection::open(&self.config.remote, &self.transports)?;
        Ok(remote::collect_remote_stats(&mut *conn, &self.config.remote)?)
    }
}

fn summarize(archive: &ArchiveInfo, report: &BackupReport) -> String {
    let mut message = match &report.upload {
        UploadOutcome::Uploaded { protocol, .. } => format!(
            "Backup created successfully and uploaded to {} server: {} ({})",
            protocol, archive.filename, archive.size_formatted
        ),
        UploadOutcome::Skipped { .. } => format!(
            "Backup created successfully: {} ({})",
            archive.filename, archive.size_formatted
        ),
        UploadOutcome::Failed { error } => format!(
            "Backup created, not uploaded: {} ({}). {}",
            archive.filename, archive.size_formatted, error
        ),
    };

    if let Some(local) = &report.local_retention {
        if local.deleted_count() > 0 {
            message.push_str(&format!(". Deleted {} old local backups", local.deleted_count()));
        }
    }
    message.push_str(&local_failure_note(report));
    message.push_str(&remote_retention_note(&report.remote_retention));
    message
}

fn local_failure_note(report: &BackupReport) -> String {
    let mut note = String::new();
    if let Some(local) = &report.local_retention {
        if !local.failed.is_empty() {
            note.push_str(&format!(". {} local backups could not be deleted", local.failed.len()));
        }
    }
    if let Some(error) = &report.local_retention_error {
        note.push_str(&format!(". Local cleanup failed: {}", error));
    }
    note
}

fn remote_retention_note(remote: &RemoteRetention) -> String {
    match remote {
        RemoteRetention::Disabled => String::new(),
        RemoteRetention::Completed(summary) if summary.failed.is_empty() => {
            format!(". Deleted {} old backups from remote server", summary.deleted_count())
        }
        RemoteRetention::Completed(summary) => format!(
            ". Deleted {} old backups from remote server, {} could not be deleted",
            summary.deleted_count(),
            summary.failed.len()
        ),
        RemoteRetention::Skipped { reason } => format!(". Remote cleanup skipped: {}", reason),
        RemoteRetention::Failed { error } => {
            format!(". Error cleaning up remote backups: {}", error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetentionStrategy, RemoteConfig};
    use crate::transport::memory::MemoryTransport;
    use chrono::TimeZone;
    use std::fs::{self, File};
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        config: Config,
        remote: MemoryTransport,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let content = temp.path().join("content");
            fs::create_dir_all(content.join("pages")).unwrap();
            fs::write(content.join("site.txt"), b"Title: Site").unwrap();
            fs::write(content.join("pages/home.txt"), b"Title: Home").unwrap();

            let mut config = Config::default();
            config.backup.content_dir = content;
            config.retention.strategy = RetentionStrategy::Simple;
            config.retention.keep_count = 2;
            config.remote = RemoteConfig {
                host: "ftp.example.com".into(),
                username: "user".into(),
                password: "secret".into(),
                directory: "/backups".into(),
                ..RemoteConfig::default()
            };

            Self {
                _temp: temp,
                config,
                remote: MemoryTransport::default(),
            }
        }

        fn backup_dir(&self) -> PathBuf {
            self.config.backup.backup_dir()
        }

        fn seed_local(&self, name: &str, age_days: u64) {
            let dir = self.backup_dir();
            fs::create_dir_all(&dir).unwrap();
            let path = dir.join(name);
            fs::write(&path, b"PK old").unwrap();
            let mtime = SystemTime::now() - Duration::from_secs(age_days * 86_400);
            File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(mtime)
                .unwrap();
        }

        fn orchestrator(&self) -> BackupOrchestrator {
            let at = Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
            BackupOrchestrator::new(self.config.clone())
                .with_transport_factory(self.remote.factory())
                .with_clock(Arc::new(move || at))
        }
    }

    fn local_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_full_run_uploads_and_prunes_both_sides() {
        let fx = Fixture::new();
        fx.seed_local("backup-2024-05-01-000000.zip", 30);
        fx.seed_local("backup-2024-05-02-000000.zip", 29);
        fx.remote.insert("/backups/backup-2024-05-01-000000.zip", 10, 0);
        fx.remote.insert("/backups/backup-2024-05-02-000000.zip", 10, 0);

        let outcome = fx.orchestrator().run(RunOptions::default());

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.message.contains("uploaded to FTP server"));
        assert!(outcome.message.contains("backup-2024-06-01-120000.zip"));

        assert_eq!(
            local_names(&fx.backup_dir()),
            vec!["backup-2024-05-02-000000.zip", "backup-2024-06-01-120000.zip"]
        );

        let state = fx.remote.state.lock().unwrap();
        let remote: Vec<_> = state.files.keys().cloned().collect();
        assert_eq!(
            remote,
            vec![
                "/backups/backup-2024-05-02-000000.zip",
                "/backups/backup-2024-06-01-120000.zip"
            ]
        );
        assert_eq!(state.calls.iter().filter(|c| *c == "connect").count(), 1);
        assert!(!state.connected);
        assert_eq!(state.disconnects, 1);
    }

    #[test]
    fn test_upload_failure_is_partial_success() {
        let fx = Fixture::new();
        fx.seed_local("backup-2024-05-01-000000.zip", 30);
        fx.seed_local("backup-2024-05-02-000000.zip", 29);
        fx.remote.state.lock().unwrap().fail_upload = true;

        let outcome = fx.orchestrator().run(RunOptions::default());

        assert!(outcome.success);
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.message.contains("not uploaded"), "{}", outcome.message);

        let report = outcome.report.unwrap();
        assert!(matches!(report.upload, UploadOutcome::Failed { .. }));
        let local = report.local_retention.unwrap();
        assert_eq!(local.deleted_count(), 1);
        assert_eq!(local_names(&fx.backup_dir()).len(), 2);
    }

    #[test]
    fn test_connect_failure_skips_remote_cleanup() {
        let fx = Fixture::new();
        fx.remote.state.lock().unwrap().fail_connect =
            Some(TransportError::Connect("connection refused".into()));

        let outcome = fx.orchestrator().run(RunOptions::default());

        assert!(outcome.success);
        assert!(outcome.message.contains("not uploaded"));
        assert!(outcome.message.contains("Remote cleanup skipped"));
        let state = fx.remote.state.lock().unwrap();
        assert_eq!(state.calls, vec!["connect"]);
    }

    #[test]
    fn test_archive_failure_is_fatal() {
        let mut fx = Fixture::new();
        fx.config.backup.content_dir = fx.config.backup.content_dir.join("missing");
        fx.config.backup.backup_dir = Some(fx._temp.path().join("backups"));

        let outcome = fx.orchestrator().run(RunOptions::default());

        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, 1);
        assert!(outcome.message.starts_with("Backup failed:"));
        assert!(fx.remote.state.lock().unwrap().calls.is_empty());
    }

    #[test]
    fn test_no_upload_still_cleans_remote() {
        let fx = Fixture::new();
        for day in 1..=4 {
            fx.remote
                .insert(&format!("/backups/backup-2024-05-0{}-000000.zip", day), 1, 0);
        }

        let outcome = fx.orchestrator().run(RunOptions { upload: false });

        assert!(outcome.success);
        assert!(outcome.message.starts_with("Backup created successfully:"));
        assert!(outcome.message.contains("Deleted 2 old backups from remote server"));
        let state = fx.remote.state.lock().unwrap();
        assert!(!state.calls.iter().any(|c| c.starts_with("upload")));
    }

    #[test]
    fn test_remote_retention_disabled() {
        let mut fx = Fixture::new();
        fx.config.remote.delete_from_remote = false;

        let outcome = fx.orchestrator().run(RunOptions::default());

        assert!(outcome.success);
        let state = fx.remote.state.lock().unwrap();
        assert!(!state.calls.iter().any(|c| c.starts_with("list")));
        assert!(matches!(
            outcome.report.unwrap().remote_retention,
            RemoteRetention::Disabled
        ));
    }

    #[test]
    fn test_incomplete_credentials_reported() {
        let mut fx = Fixture::new();
        fx.config.remote.password.clear();
        let orchestrator = BackupOrchestrator::new(fx.config.clone());

        let outcome = orchestrator.run(RunOptions::default());

        assert!(outcome.success);
        assert!(outcome.message.contains("Incomplete FTP settings"), "{}", outcome.message);
    }

    #[test]
    fn test_backup_dir_inside_content_is_excluded() {
        let fx = Fixture::new();
        fx.seed_local("backup-2024-05-01-000000.zip", 1);

        let orchestrator = fx.orchestrator();
        assert!(orchestrator
            .excluded_paths()
            .contains(&PathBuf::from(".backups")));

        let outcome = orchestrator.run(RunOptions { upload: false });
        let archive = outcome.report.unwrap().archive.unwrap();
        assert_eq!(archive.files, 2);
    }

    #[test]
    fn test_prune_only() {
        let fx = Fixture::new();
        fx.seed_local("backup-2024-05-01-000000.zip", 3);
        fx.seed_local("backup-2024-05-02-000000.zip", 2);
        fx.seed_local("backup-2024-05-03-000000.zip", 1);

        let outcome = fx.orchestrator().prune();

        assert!(outcome.success);
        assert!(outcome.message.starts_with("Deleted 1 old local backups"));
        assert_eq!(local_names(&fx.backup_dir()).len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_undeletable_local_backup_is_reported() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let fx = Fixture::new();
        fx.seed_local("backup-2024-05-01-000000.zip", 2);
        // Lists under a lossy name that no longer resolves on disk
        let stuck = fx.backup_dir().join(OsStr::from_bytes(b"backup-\xff.zip"));
        fs::write(&stuck, b"PK old").unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(5 * 86_400);
        File::options().write(true).open(&stuck).unwrap().set_modified(mtime).unwrap();

        let outcome = fx.orchestrator().run(RunOptions { upload: false });

        assert!(outcome.success);
        assert!(
            outcome.message.contains(". 1 local backups could not be deleted"),
            "{}",
            outcome.message
        );
        assert!(!outcome.message.contains("old local backups"), "{}", outcome.message);
        let local = outcome.report.unwrap().local_retention.unwrap();
        assert_eq!(local.failed.len(), 1);
        assert!(stuck.exists());
    }

    #[test]
    fn test_local_cleanup_error_reaches_message() {
        let archive = ArchiveInfo {
            filename: "backup-2024-06-01-120000.zip".into(),
            size_bytes: 2048,
            size_formatted: "2.00 KB".into(),
            files: 2,
        };
        let report = BackupReport {
            archive: Some(archive.clone()),
            upload: UploadOutcome::Skipped {
                reason: "Upload disabled".into(),
            },
            local_retention_error: Some("Permission denied (os error 13)".into()),
            remote_retention: RemoteRetention::Disabled,
            ..BackupReport::default()
        };

        assert_eq!(
            summarize(&archive, &report),
            "Backup created successfully: backup-2024-06-01-120000.zip (2.00 KB). \
             Local cleanup failed: Permission denied (os error 13)"
        );
    }

    #[test]
    fn test_remote_stats() {
        let fx = Fixture::new();
        fx.remote.insert("/backups/a.zip", 2048, 1_700_000_000);

        let stats = fx.orchestrator().remote_stats().unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.total_size_formatted, "2.00 KB");
        assert_eq!(fx.remote.state.lock().unwrap().disconnects, 1);
    }
}
