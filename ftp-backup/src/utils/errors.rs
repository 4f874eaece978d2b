//! Custom error types for the backup pipeline.

use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Backup not found: {0}")]
    NotFound(String),
}

impl From<zip::result::ZipError> for BackupError {
    fn from(e: zip::result::ZipError) -> Self {
        BackupError::Archive(e.to_string())
    }
}

impl From<config::ConfigError> for BackupError {
    fn from(e: config::ConfigError) -> Self {
        BackupError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
