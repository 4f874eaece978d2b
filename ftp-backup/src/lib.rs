//! FTP Backup Library
//!
//! Zips a content directory, ships the archive to an FTP/SFTP server and
//! prunes old archives locally and remotely with simple or tiered retention.

pub mod archive;
pub mod config;
pub mod executor;
pub mod fs;
pub mod retention;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupOrchestrator, BackupOutcome};
pub use retention::{BackupRecord, RetentionPolicy, RetentionTag};
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
