//! Workspace sandbox for A2IA: path confinement, file operations, and
//! unified-diff patching.
//!
//! Provides:
//! - **Workspace**: create / attach / resume a root directory and resolve
//!   every path against its canonical form
//! - **File operations**: read, write, append, truncate, delete, move, list,
//!   find/replace
//! - **PatchEngine**: apply unified diffs atomically, one file at a time
//! - **Audit logging**: one line per patch attempt under `a2ia/logs/`

pub mod audit;
pub mod error;
pub mod files;
pub mod patch;
pub mod workspace;

pub use audit::{AuditEntry, AuditOutcome, PatchAuditLog};
pub use error::{PatchError, WorkspaceError};
pub use files::FileInfo;
pub use patch::{FilePatch, Hunk, HunkFailure, PatchEngine, PatchOutcome, apply_to_text, parse_unified_diff};
pub use workspace::{METADATA_FILE, Workspace, WorkspaceInfo, WorkspaceMetadata};
