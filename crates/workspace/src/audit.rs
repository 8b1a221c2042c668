//! Patch audit logging.
//!
//! Every patch attempt, successful or not, is appended as one line to
//! `<workspace>/a2ia/logs/patch_attempts.log`:
//!
//! ```text
//! [2025-01-31 14:02:11] src/main.rs diff_len=212 success=true
//! [2025-01-31 14:02:40] src/main.rs diff_len=87 error=Invalid diff format: missing ---/+++ header lines
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;
use crate::workspace::Workspace;

/// Workspace-relative directory holding the audit log.
pub const LOG_DIR: &str = "a2ia/logs";

pub const LOG_FILE: &str = "patch_attempts.log";

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Target path as the caller gave it
    pub path: String,
    pub diff_len: usize,
    pub outcome: AuditOutcome,
}

/// Outcome of an audited patch attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The patch ran; `success` says whether every hunk applied.
    Applied { success: bool },
    /// The attempt was rejected before application.
    Error(String),
}

impl AuditEntry {
    pub fn new(path: &str, diff_len: usize, outcome: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            path: path.to_string(),
            diff_len,
            outcome,
        }
    }

    /// Render the one-line log form.
    pub fn to_line(&self) -> String {
        let tail = match &self.outcome {
            AuditOutcome::Applied { success } => format!("success={success}"),
            AuditOutcome::Error(msg) => format!("error={}", msg.replace('\n', " ")),
        };
        format!(
            "[{}] {} diff_len={} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.path,
            self.diff_len,
            tail
        )
    }
}

/// Append-only audit log file inside a workspace.
#[derive(Debug, Clone)]
pub struct PatchAuditLog {
    path: PathBuf,
}

impl PatchAuditLog {
    /// Locate the log inside `workspace`. The directory is created lazily.
    pub fn for_workspace(workspace: &Workspace) -> Result<Self, WorkspaceError> {
        let dir = workspace.resolve_path(LOG_DIR)?;
        Ok(Self {
            path: dir.join(LOG_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry. Failures are logged and swallowed so that auditing
    /// never changes the outcome of the patch itself.
    pub fn record(&self, entry: &AuditEntry) {
        if let Err(e) = self.try_record(entry) {
            tracing::warn!(log = %self.path.display(), error = %e, "Failed to write patch audit log");
        }
        tracing::info!(
            path = %entry.path,
            diff_len = entry.diff_len,
            outcome = ?entry.outcome,
            "AUDIT patch"
        );
    }

    fn try_record(&self, entry: &AuditEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.to_line())
    }

    /// Read back all lines (diagnostics and tests).
    pub fn lines(&self) -> Vec<String> {
        std::fs::read_to_string(&self.path)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
