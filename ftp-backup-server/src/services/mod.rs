pub mod backup_scheduler;
pub mod download_key;
