//! Utility modules for the backup pipeline.

pub mod errors;
pub mod format;
pub mod logger;

pub use errors::{BackupError, Result};
pub use format::{format_duration, format_size, format_timestamp};
