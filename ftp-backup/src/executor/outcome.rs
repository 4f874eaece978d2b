//! Results reported by a backup run.

use crate::retention::RetentionPlan;
use serde::Serialize;

/// Single human-readable result of a run, shared by the CLI, the HTTP
/// endpoints and the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome {
    pub success: bool,
    pub message: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<BackupReport>,
}

impl BackupOutcome {
    pub fn succeeded(message: impl Into<String>, report: BackupReport) -> Self {
        Self {
            success: true,
            message: message.into(),
            exit_code: 0,
            report: Some(report),
        }
    }

    pub fn failed(message: impl Into<String>, report: Option<BackupReport>) -> Self {
        Self {
            success: false,
            message: message.into(),
            exit_code: 1,
            report,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveInfo>,
    pub upload: UploadOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_retention: Option<RetentionSummary>,
    /// Set when the local retention pass could not run at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_retention_error: Option<String>,
    pub remote_retention: RemoteRetention,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub filename: String,
    pub size_bytes: u64,
    pub size_formatted: String,
    pub files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    Skipped { reason: String },
    Uploaded { remote_path: String, protocol: String },
    Failed { error: String },
}

impl Default for UploadOutcome {
    fn default() -> Self {
        UploadOutcome::Skipped {
            reason: "not requested".to_string(),
        }
    }
}

/// What a retention pass did to one side (local or remote).
#[derive(Debug, Clone, Serialize)]
pub struct RetentionSummary {
    pub strategy: String,
    pub plan: RetentionPlan,
    /// Names whose deletion failed; the sweep continued past them
    pub failed: Vec<String>,
}

impl RetentionSummary {
    pub fn deleted_count(&self) -> usize {
        self.plan.delete.len().saturating_sub(self.failed.len())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteRetention {
    #[default]
    Disabled,
    Skipped {
        reason: String,
    },
    Completed(RetentionSummary),
    Failed {
        error: String,
    },
}
