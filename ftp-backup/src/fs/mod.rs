//! Filesystem access: content traversal and the local backup directory.

pub mod local_store;
pub mod walker;

pub use local_store::{is_safe_archive_name, BackupStats, LocalArchive, LocalStore};
pub use walker::{calculate_total_size, walk_directory_with_callback, FileInfo, WalkOptions};
