//! Zip archive creation for the content directory.

use crate::fs::walker::{calculate_total_size, walk_directory_with_callback, FileInfo, WalkOptions};
use crate::utils::format::format_size;
use crate::utils::errors::{BackupError, Result};
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Archive name for a backup taken at `at`: `<prefix>YYYY-MM-DD-HHMMSS.zip`.
pub fn backup_filename(prefix: &str, at: DateTime<Local>) -> String {
    format!("{}{}.zip", prefix, at.format("%Y-%m-%d-%H%M%S"))
}

/// What a finished archive contains.
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub files: usize,
    pub directories: usize,
}

#[derive(Debug, Default)]
pub struct Archiver;

impl Archiver {
    pub fn new() -> Self {
        Self
    }

    /// Zip everything under `source` into `dest`, skipping `excluded`
    /// sub-paths (relative to `source`). A partial archive is removed on
    /// failure.
    pub fn create(&self, source: &Path, dest: &Path, excluded: &[PathBuf]) -> Result<ArchiveSummary> {
        if !source.is_dir() {
            return Err(BackupError::Archive(format!(
                "Content directory not found: {}",
                source.display()
            )));
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let options = WalkOptions::excluding(excluded).with_dirs();
        let content_size = calculate_total_size(source, &options)?;
        info!(
            source = %source.display(),
            dest = %dest.display(),
            content_size = %format_size(content_size),
            "Creating archive"
        );

        match self.write_archive(source, dest, &options) {
            Ok(summary) => {
                info!(
                    files = summary.files,
                    directories = summary.directories,
                    size = summary.size_bytes,
                    "Archive created"
                );
                Ok(summary)
            }
            Err(e) => {
                if dest.exists() {
                    if let Err(cleanup) = fs::remove_file(dest) {
                        warn!(error = %cleanup, "Failed to remove partial archive");
                    }
                }
                Err(e)
            }
        }
    }

    fn write_archive(&self, source: &Path, dest: &Path, options: &WalkOptions) -> Result<ArchiveSummary> {
        let file = File::create(dest).map_err(|e| {
            BackupError::Archive(format!("Could not create archive {}: {}", dest.display(), e))
        })?;
        let mut writer = ZipWriter::new(BufWriter::new(file));

        let mut files = 0usize;
        let mut directories = 0usize;
        let mut failure: Option<BackupError> = None;

        walk_directory_with_callback(source, options, |info| {
            if failure.is_some() || info.path == dest {
                return;
            }
            match add_entry(&mut writer, info) {
                Ok(true) => directories += 1,
                Ok(false) => files += 1,
                Err(e) => failure = Some(e),
            }
        })?;

        if let Some(e) = failure {
            return Err(e);
        }

        writer.finish()?.flush()?;

        let size_bytes = fs::metadata(dest)?.len();
        Ok(ArchiveSummary {
            path: dest.to_path_buf(),
            size_bytes,
            files,
            directories,
        })
    }
}

/// Entry name inside the zip: forward slashes, directories end with `/`.
fn entry_name(info: &FileInfo) -> String {
    let mut name = info
        .relative_path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if info.is_dir {
        name.push('/');
    }
    name
}

/// Returns true when the entry was a directory.
fn add_entry<W: io::Write + io::Seek>(writer: &mut ZipWriter<W>, info: &FileInfo) -> Result<bool> {
    let name = entry_name(info);
    let mut options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(info.size >= u32::MAX as u64);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = fs::metadata(&info.path) {
            options = options.unix_permissions(metadata.permissions().mode());
        }
    }

    if info.is_dir {
        writer.add_directory(name, options)?;
        return Ok(true);
    }

    debug!(entry = %name, size = info.size, "Adding file");
    writer.start_file(name, options)?;
    let mut input = File::open(&info.path)?;
    io::copy(&mut input, writer)?;
    Ok(false)
}
