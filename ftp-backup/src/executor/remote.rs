//! Remote-side operations: retention sweep and directory statistics.

use super::outcome::RetentionSummary;
use crate::config::RemoteConfig;
use crate::retention::{extract_timestamp, BackupRecord, RetentionPolicy};
use crate::transport::{RemoteTransport, TransportResult};
use crate::utils::format::{format_size, format_timestamp};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct RemoteFile {
    pub filename: String,
    pub size: Option<u64>,
    pub size_formatted: String,
    pub modified: i64,
    pub modified_formatted: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteStats {
    pub files: Vec<RemoteFile>,
    pub count: usize,
    pub total_size: u64,
    pub total_size_formatted: String,
    pub latest_modified: String,
}

fn is_archive(name: &str) -> bool {
    name.ends_with(".zip")
}

/// Zip archives in the configured remote directory.
fn list_archives(
    transport: &mut dyn RemoteTransport,
    remote: &RemoteConfig,
) -> TransportResult<Vec<String>> {
    Ok(transport
        .list(&remote.directory)?
        .into_iter()
        .filter(|name| is_archive(name))
        .collect())
}

/// Records for the remote listing. Dates come from filenames; names without
/// one fall back to the server's modification time, then to 0.
pub fn remote_records(
    transport: &mut dyn RemoteTransport,
    remote: &RemoteConfig,
) -> TransportResult<Vec<BackupRecord>> {
    let names = list_archives(transport, remote)?;

    Ok(names
        .into_iter()
        .map(|name| {
            let (timestamp, matched) = extract_timestamp(&name);
            let timestamp = if matched {
                timestamp
            } else {
                match transport.stat_mtime(&remote.remote_path(&name)) {
                    Ok(mtime) => mtime,
                    Err(e) => {
                        debug!(file = %name, error = %e, "No date for remote file");
                        0
                    }
                }
            };
            BackupRecord::new(name, timestamp)
        })
        .collect())
}

/// Apply `policy` to the remote directory. A failed delete is recorded and
/// the sweep moves on to the next file.
pub fn cleanup_remote(
    transport: &mut dyn RemoteTransport,
    remote: &RemoteConfig,
    policy: &RetentionPolicy,
    now: i64,
) -> TransportResult<RetentionSummary> {
    let records = remote_records(transport, remote)?;
    let plan = policy.plan(&records, now);

    let mut failed = Vec::new();
    for record in &plan.delete {
        let path = remote.remote_path(&record.filename);
        match transport.delete(&path) {
            Ok(()) => debug!(file = %record.filename, "Deleted remote backup"),
            Err(e) => {
                warn!(file = %record.filename, error = %e, "Failed to delete remote backup");
                failed.push(record.filename.clone());
            }
        }
    }

    info!(
        kept = plan.keep.len(),
        deleted = plan.delete.len() - failed.len(),
        "Remote retention applied"
    );

    Ok(RetentionSummary {
        strategy: policy.name().to_string(),
        plan,
        failed,
    })
}

/// Size and date of every remote archive, newest first. Files the server
/// will not stat are listed as unknown.
pub fn collect_remote_stats(
    transport: &mut dyn RemoteTransport,
    remote: &RemoteConfig,
) -> TransportResult<RemoteStats> {
    let names = list_archives(transport, remote)?;

    let mut files = Vec::with_capacity(names.len());
    let mut total_size = 0u64;
    let mut latest = 0i64;

    for name in names {
        let path = remote.remote_path(&name);
        let details = transport
            .stat_size(&path)
            .and_then(|size| transport.stat_mtime(&path).map(|mtime| (size, mtime)));

        let file = match details {
            Ok((size, modified)) => {
                total_size += size;
                latest = latest.max(modified);
                RemoteFile {
                    filename: name,
                    size: Some(size),
                    size_formatted: format_size(size),
                    modified,
                    modified_formatted: format_timestamp(modified),
                }
            }
            Err(e) => {
                debug!(file = %name, error = %e, "Could not stat remote file");
                RemoteFile {
                    filename: name,
                    size: None,
                    size_formatted: "Unknown".to_string(),
                    modified: 0,
                    modified_formatted: "Unknown".to_string(),
                }
            }
        };
        files.push(file);
    }

    files.sort_by(|a, b| b.modified.cmp(&a.modified));

    Ok(RemoteStats {
        count: files.len(),
        files,
        total_size,
        total_size_formatted: format_size(total_size),
        latest_modified: if latest > 0 {
            format_timestamp(latest)
        } else {
            "None".to_string()
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::TieredPolicy;
    use crate::transport::memory::MemoryTransport;
    use chrono::{Local, TimeZone};

    fn remote() -> RemoteConfig {
        RemoteConfig {
            directory: "/backups".into(),
            ..RemoteConfig::default()
        }
    }

    fn local_ts(y: i32, m: u32, d: u32) -> i64 {
        Local.with_ymd_and_hms(y, m, d, 0, 0, 0).earliest().unwrap().timestamp()
    }

    #[test]
    fn test_remote_records_fall_back_to_mtime() -> TransportResult<()> {
        let mut transport = MemoryTransport::default();
        transport.insert("/backups/backup-2024-05-01-000000.zip", 10, 99);
        transport.insert("/backups/manual.zip", 10, 1_234);
        transport.insert("/backups/broken.zip", 10, 0);
        transport.insert("/backups/readme.txt", 10, 5);
        transport.state.lock().unwrap().fail_stat = vec!["/backups/broken.zip".into()];

        let mut records = remote_records(&mut transport, &remote())?;
        records.sort_by(|a, b| a.filename.cmp(&b.filename));

        let summary: Vec<_> = records.iter().map(|r| (r.filename.as_str(), r.timestamp)).collect();
        assert_eq!(
            summary,
            vec![
                ("backup-2024-05-01-000000.zip", local_ts(2024, 5, 1)),
                ("broken.zip", 0),
                ("manual.zip", 1_234),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_cleanup_continues_after_failed_delete() -> TransportResult<()> {
        let mut transport = MemoryTransport::default();
        for day in 1..=5 {
            transport.insert(&format!("/backups/backup-2024-05-0{}-000000.zip", day), 1, 0);
        }
        transport.state.lock().unwrap().fail_delete =
            vec!["/backups/backup-2024-05-01-000000.zip".into()];

        let policy = RetentionPolicy::Simple { keep_count: 2 };
        let summary = cleanup_remote(&mut transport, &remote(), &policy, 0)?;

        assert_eq!(summary.plan.delete.len(), 3);
        assert_eq!(summary.failed, vec!["backup-2024-05-01-000000.zip"]);
        assert_eq!(summary.deleted_count(), 2);

        let state = transport.state.lock().unwrap();
        let remaining: Vec<_> = state.files.keys().cloned().collect();
        assert_eq!(
            remaining,
            vec![
                "/backups/backup-2024-05-01-000000.zip",
                "/backups/backup-2024-05-04-000000.zip",
                "/backups/backup-2024-05-05-000000.zip",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_tiered_cleanup_uses_filename_dates() -> TransportResult<()> {
        let mut transport = MemoryTransport::default();
        transport.insert("/backups/backup-2024-06-01-000000.zip", 1, 0);
        transport.insert("/backups/backup-2024-05-31-000000.zip", 1, 0);
        transport.insert("/backups/backup-2023-01-01-000000.zip", 1, 0);
        transport.insert("/backups/backup-2022-01-01-000000.zip", 1, 0);

        let policy = RetentionPolicy::Tiered(TieredPolicy {
            daily_days: 3,
            weekly_periods: 0,
            monthly_periods: 0,
        });
        let now = local_ts(2024, 6, 1) + 3_600;
        let summary = cleanup_remote(&mut transport, &remote(), &policy, now)?;

        assert_eq!(
            summary.plan.kept_names(),
            vec![
                "backup-2024-06-01-000000.zip",
                "backup-2024-05-31-000000.zip",
                "backup-2022-01-01-000000.zip",
            ]
        );
        assert_eq!(summary.plan.deleted_names(), vec!["backup-2023-01-01-000000.zip"]);
        Ok(())
    }

    #[test]
    fn test_stats_mark_unknown_files() -> TransportResult<()> {
        let mut transport = MemoryTransport::default();
        transport.insert("/backups/a.zip", 1024, 2_000_000_000);
        transport.insert("/backups/b.zip", 512, 1_000_000_000);
        transport.insert("/backups/c.zip", 1, 1);
        transport.insert("/backups/notes.txt", 1, 1);
        transport.state.lock().unwrap().fail_stat = vec!["/backups/c.zip".into()];

        let stats = collect_remote_stats(&mut transport, &remote())?;
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_size, 1536);
        assert_eq!(stats.total_size_formatted, "1.50 KB");
        assert_eq!(stats.files[0].filename, "a.zip");
        assert_eq!(stats.files[2].filename, "c.zip");
        assert_eq!(stats.files[2].size_formatted, "Unknown");
        assert_eq!(stats.latest_modified, format_timestamp(2_000_000_000));
        Ok(())
    }

    #[test]
    fn test_stats_empty_directory() -> TransportResult<()> {
        let mut transport = MemoryTransport::default();
        let stats = collect_remote_stats(&mut transport, &remote())?;
        assert_eq!(stats.count, 0);
        assert_eq!(stats.latest_modified, "None");
        Ok(())
    }
}
