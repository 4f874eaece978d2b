//! Content directory traversal.
//!
//! Walks the tree to be archived without following directory symlinks, so a
//! link cycle cannot loop the archiver. Excluded sub-paths are pruned as whole
//! subtrees.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Paths relative to the root whose subtrees are skipped
    pub excluded: Vec<PathBuf>,

    /// Report directories as well as files
    pub include_dirs: bool,
}

impl WalkOptions {
    pub fn excluding<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            excluded: paths
                .into_iter()
                .map(|p| p.as_ref().to_path_buf())
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            include_dirs: false,
        }
    }

    pub fn with_dirs(mut self) -> Self {
        self.include_dirs = true;
        self
    }
}

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes (0 for directories)
    pub size: u64,

    pub is_dir: bool,

    pub is_symlink: bool,
}

impl FileInfo {
    /// Symlinks to files resolve to the target's size. Symlinks to
    /// directories and broken links yield `None`.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        let is_symlink = raw_metadata.is_symlink();

        let (size, is_dir) = if is_symlink {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_dir() => return Ok(None),
                Ok(resolved) => (resolved.len(), false),
                Err(_) => return Ok(None),
            }
        } else if raw_metadata.is_dir() {
            (0, true)
        } else {
            (raw_metadata.len(), false)
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
            is_dir,
            is_symlink,
        }))
    }
}

/// Walk a directory tree with a callback for each entry.
///
/// Entries arrive parents first, so a directory is always reported before
/// anything inside it. The root itself is never reported.
pub fn walk_directory_with_callback<F>(
    root: &Path,
    options: &WalkOptions,
    mut callback: F,
) -> std::io::Result<()>
where
    F: FnMut(&FileInfo),
{
    let walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry, root, &options.excluded));

    for entry in walker {
        let entry = entry?;

        if entry.file_type().is_dir() && !options.include_dirs {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            callback(&file_info);
        }
    }

    Ok(())
}

/// Calculate total size of all files in a directory
pub fn calculate_total_size(root: &Path, options: &WalkOptions) -> std::io::Result<u64> {
    let mut total_size = 0u64;

    walk_directory_with_callback(root, options, |file| {
        total_size += file.size;
    })?;

    Ok(total_size)
}

fn is_excluded(entry: &DirEntry, root: &Path, excluded: &[PathBuf]) -> bool {
    match entry.path().strip_prefix(root) {
        Ok(relative) => excluded.iter().any(|ex| relative.starts_with(ex)),
        Err(_) => false,
    }
}
