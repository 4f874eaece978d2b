//! The local backup directory: listing, lookup and removal of archives.

use crate::retention::{sort_newest_first, BackupRecord};
use crate::utils::errors::{BackupError, Result};
use crate::utils::format::{format_size, format_timestamp};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const ARCHIVE_EXTENSION: &str = "zip";

/// One archive in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalArchive {
    pub name: String,
    pub size_bytes: u64,
    /// Modification time, seconds since epoch
    pub mtime: i64,
}

impl LocalArchive {
    pub fn record(&self) -> BackupRecord {
        BackupRecord::new(&self.name, self.mtime).with_size(self.size_bytes)
    }
}

/// Aggregate figures for the backup directory.
#[derive(Debug, Clone, Serialize)]
pub struct BackupStats {
    pub count: usize,
    pub total_size: u64,
    pub total_size_formatted: String,
    pub latest_backup: Option<String>,
    pub latest_backup_time: Option<String>,
}

/// True for a bare `*.zip` file name that cannot escape its directory.
pub fn is_safe_archive_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Archives in the directory, newest first. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<LocalArchive>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut archives = Vec::new();
        for entry in entries {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_safe_archive_name(&name) {
                continue;
            }

            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            archives.push(LocalArchive {
                name,
                size_bytes: metadata.len(),
                mtime,
            });
        }

        archives.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| b.name.cmp(&a.name)));
        Ok(archives)
    }

    /// Retention records for the current listing, newest first.
    pub fn records(&self) -> Result<Vec<BackupRecord>> {
        let mut records: Vec<_> = self.list()?.iter().map(LocalArchive::record).collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Full path of an existing archive, rejecting unsafe names.
    pub fn path_of(&self, name: &str) -> Result<PathBuf> {
        if !is_safe_archive_name(name) {
            return Err(BackupError::NotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(BackupError::NotFound(name.to_string()))
        }
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_of(name)?;
        fs::remove_file(path)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<BackupStats> {
        let archives = self.list()?;
        let total_size: u64 = archives.iter().map(|a| a.size_bytes).sum();
        let latest = archives.first();

        Ok(BackupStats {
            count: archives.len(),
            total_size,
            total_size_formatted: format_size(total_size),
            latest_backup: latest.map(|a| a.name.clone()),
            latest_backup_time: latest.map(|a| format_timestamp(a.mtime)),
        })
    }
}
