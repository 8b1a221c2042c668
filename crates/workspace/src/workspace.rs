//! Workspace sandbox: the directory subtree a session is confined to.
//!
//! The root is canonicalized once, when the workspace is created or attached.
//! Every later path is resolved against that anchor by [`Workspace::resolve_path`],
//! which follows symlinks component by component and rejects anything whose
//! resolved form is not the root or a descendant of it.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;

/// Name of the metadata sidecar stored at the workspace root.
pub const METADATA_FILE: &str = ".a2ia_workspace.json";

/// Upper bound on symlink expansions during one resolution.
const MAX_SYMLINK_HOPS: usize = 40;

/// Persisted sidecar contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub workspace_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Serializable summary returned by `info()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub workspace_id: String,
    pub path: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A sandboxed root directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    workspace_id: String,
    root: PathBuf,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl Workspace {
    /// Create (or reuse) `<workspaces_root>/<workspace_id>` and write its sidecar.
    ///
    /// A missing id is generated as `ws_<12 hex chars>`.
    pub fn create(
        workspaces_root: &Path,
        workspace_id: Option<&str>,
        description: Option<&str>,
    ) -> Result<Self, WorkspaceError> {
        let workspace_id = match workspace_id {
            Some(id) => {
                validate_id(id)?;
                id.to_string()
            }
            None => generate_id(),
        };

        let dir = workspaces_root.join(&workspace_id);
        std::fs::create_dir_all(&dir).map_err(|e| WorkspaceError::io(&dir, e))?;
        let root = dir.canonicalize().map_err(|e| WorkspaceError::io(&dir, e))?;

        let ws = Self {
            workspace_id,
            root,
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        ws.save_metadata()?;
        tracing::info!(workspace_id = %ws.workspace_id, root = %ws.root.display(), "Workspace created");
        Ok(ws)
    }

    /// Use an existing directory as the workspace.
    ///
    /// An existing sidecar is honored; otherwise the directory name becomes the
    /// id and a fresh sidecar is written.
    pub fn attach(path: &Path, description: Option<&str>) -> Result<Self, WorkspaceError> {
        if !path.exists() {
            return Err(WorkspaceError::NotFound(format!(
                "Directory not found: {}",
                path.display()
            )));
        }
        if !path.is_dir() {
            return Err(WorkspaceError::NotADirectory(path.display().to_string()));
        }
        let root = path.canonicalize().map_err(|e| WorkspaceError::io(path, e))?;

        let sidecar = root.join(METADATA_FILE);
        if sidecar.is_file() {
            let raw = std::fs::read_to_string(&sidecar).map_err(|e| WorkspaceError::io(&sidecar, e))?;
            let meta: WorkspaceMetadata =
                serde_json::from_str(&raw).map_err(|e| WorkspaceError::Metadata(e.to_string()))?;
            tracing::debug!(workspace_id = %meta.workspace_id, "Attached to existing workspace");
            return Ok(Self {
                workspace_id: meta.workspace_id,
                root,
                description: meta.description.or_else(|| description.map(str::to_string)),
                created_at: meta.created_at,
            });
        }

        let workspace_id = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(generate_id);
        let ws = Self {
            workspace_id,
            root,
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        ws.save_metadata()?;
        tracing::info!(workspace_id = %ws.workspace_id, root = %ws.root.display(), "Workspace attached");
        Ok(ws)
    }

    /// Re-open `<workspaces_root>/<workspace_id>` from its sidecar.
    pub fn resume(workspaces_root: &Path, workspace_id: &str) -> Result<Self, WorkspaceError> {
        validate_id(workspace_id)?;
        let dir = workspaces_root.join(workspace_id);
        if !dir.is_dir() {
            return Err(WorkspaceError::NotFound(format!(
                "Workspace not found: {workspace_id}"
            )));
        }
        Self::attach(&dir, None)
    }

    /// Closing a persistent workspace keeps every file and the sidecar.
    pub fn close(&self) {
        tracing::debug!(workspace_id = %self.workspace_id, "Workspace closed");
    }

    pub fn info(&self) -> WorkspaceInfo {
        WorkspaceInfo {
            workspace_id: self.workspace_id.clone(),
            path: self.root.display().to_string(),
            description: self.description.clone(),
            created_at: self.created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.workspace_id
    }

    /// The canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Write the sidecar file.
    pub fn save_metadata(&self) -> Result<(), WorkspaceError> {
        let meta = WorkspaceMetadata {
            workspace_id: self.workspace_id.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
        };
        let path = self.root.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| WorkspaceError::Metadata(e.to_string()))?;
        std::fs::write(&path, json).map_err(|e| WorkspaceError::io(&path, e))
    }

    /// Resolve `candidate` to an absolute path inside the workspace.
    ///
    /// - A leading `/` (or `\`) means workspace-root-relative, never the
    ///   filesystem root.
    /// - Any other absolute path is taken literally.
    /// - Relative paths are joined to the root.
    ///
    /// Symlinks are followed and `..` is applied to the resolved prefix, so
    /// both traversal and link indirection are caught by the final
    /// containment check. Components that do not exist yet are kept as is,
    /// which lets callers resolve paths they are about to create.
    pub fn resolve_path(&self, candidate: &str) -> Result<PathBuf, WorkspaceError> {
        let joined = if let Some(rest) = candidate.strip_prefix(['/', '\\']) {
            self.root.join(rest.trim_start_matches(['/', '\\']))
        } else if Path::new(candidate).is_absolute() {
            PathBuf::from(candidate)
        } else {
            self.root.join(candidate)
        };

        let resolved = resolve_symlinks(&joined).map_err(|reason| {
            WorkspaceError::Security(format!("Cannot resolve path '{candidate}': {reason}"))
        })?;

        if !resolved.starts_with(&self.root) {
            tracing::warn!(path = %candidate, "Rejected path outside workspace");
            return Err(WorkspaceError::Security(format!(
                "Path '{candidate}' resolves outside workspace"
            )));
        }
        Ok(resolved)
    }

    /// Root-relative display form of a resolved path, `/`-separated.
    pub fn relative(&self, resolved: &Path) -> String {
        match resolved.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => resolved.display().to_string(),
        }
    }
}

fn generate_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("ws_{}", &hex[..12])
}

fn validate_id(id: &str) -> Result<(), WorkspaceError> {
    if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(WorkspaceError::InvalidInput(format!(
            "invalid workspace id '{id}'"
        )));
    }
    Ok(())
}

/// Seed `resolved` with any prefix/root of `path` and return its remaining
/// segments (`..` kept as a segment, `.` dropped).
fn split_components(path: &Path, resolved: &mut PathBuf) -> Vec<OsString> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => segments.push(OsString::from("..")),
            Component::Normal(name) => segments.push(name.to_os_string()),
        }
    }
    segments
}

/// Lenient canonicalization: like `std::fs::canonicalize` but tolerates
/// components that do not exist.
fn resolve_symlinks(path: &Path) -> Result<PathBuf, String> {
    let mut resolved = PathBuf::new();
    let mut pending: VecDeque<OsString> = split_components(path, &mut resolved).into();
    let mut hops = 0usize;

    while let Some(segment) = pending.pop_front() {
        if segment == ".." {
            resolved.pop();
            continue;
        }

        let next = resolved.join(&segment);
        match std::fs::symlink_metadata(&next) {
            Ok(meta) if meta.file_type().is_symlink() => {
                hops += 1;
                if hops > MAX_SYMLINK_HOPS {
                    return Err("too many levels of symbolic links".into());
                }
                let target = std::fs::read_link(&next).map_err(|e| e.to_string())?;
                if target.is_absolute() {
                    resolved = PathBuf::new();
                }
                let target_segments = split_components(&target, &mut resolved);
                for seg in target_segments.into_iter().rev() {
                    pending.push_front(seg);
                }
            }
            _ => resolved = next,
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attached() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::attach(dir.path(), Some("test")).unwrap();
        (dir, ws)
    }

    #[test]
    fn leading_slash_is_root_relative() {
        let (_dir, ws) = attached();
        let resolved = ws.resolve_path("/a.txt").unwrap();
        assert_eq!(resolved, ws.root().join("a.txt"));
        assert_ne!(resolved, PathBuf::from("/a.txt"));
    }

    #[test]
    fn relative_and_dot_paths_resolve_inside() {
        let (_dir, ws) = attached();
        assert_eq!(ws.resolve_path("src/lib.rs").unwrap(), ws.root().join("src/lib.rs"));
        assert_eq!(ws.resolve_path(".").unwrap(), ws.root());
        assert_eq!(ws.resolve_path("").unwrap(), ws.root());
        assert_eq!(ws.resolve_path("a/../b.txt").unwrap(), ws.root().join("b.txt"));
    }

    #[test]
    fn traversal_is_rejected() {
        let (_dir, ws) = attached();
        for candidate in ["../../etc/passwd", "./../../etc/passwd", "sub/../../x"] {
            let err = ws.resolve_path(candidate).unwrap_err();
            assert!(err.is_security(), "{candidate} should be rejected");
            assert!(err.to_string().contains("outside workspace"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn host_absolute_path_stays_inside() {
        let (_dir, ws) = attached();
        let resolved = ws.resolve_path("/etc/passwd").unwrap();
        assert_eq!(resolved, ws.root().join("etc/passwd"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_outside_is_rejected() {
        let (_dir, ws) = attached();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.root().join("escape")).unwrap();

        let err = ws.resolve_path("escape/secret.txt").unwrap_err();
        assert!(err.is_security());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_resolves_to_target() {
        let (_dir, ws) = attached();
        std::fs::create_dir(ws.root().join("real")).unwrap();
        std::fs::write(ws.root().join("real/data.txt"), "d").unwrap();
        std::os::unix::fs::symlink("real/data.txt", ws.root().join("link.txt")).unwrap();

        let resolved = ws.resolve_path("link.txt").unwrap();
        assert_eq!(resolved, ws.root().join("real/data.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_then_parent_uses_link_target() {
        let (_dir, ws) = attached();
        std::fs::create_dir_all(ws.root().join("deep/inner")).unwrap();
        std::os::unix::fs::symlink(ws.root().join("deep/inner"), ws.root().join("short")).unwrap();

        // short/.. is deep, not the root
        let resolved = ws.resolve_path("short/../x.txt").unwrap();
        assert_eq!(resolved, ws.root().join("deep/x.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_is_rejected() {
        let (_dir, ws) = attached();
        std::os::unix::fs::symlink("b", ws.root().join("a")).unwrap();
        std::os::unix::fs::symlink("a", ws.root().join("b")).unwrap();

        let err = ws.resolve_path("a").unwrap_err();
        assert!(err.is_security());
        assert!(err.to_string().contains("symbolic links"));
    }

    #[test]
    fn create_generates_id_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::create(dir.path(), None, Some("scratch")).unwrap();
        assert!(ws.id().starts_with("ws_"));
        assert_eq!(ws.id().len(), 15);
        assert!(ws.root().join(METADATA_FILE).is_file());
        assert_eq!(ws.description(), Some("scratch"));
    }

    #[test]
    fn create_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Workspace::create(dir.path(), Some("../evil"), None).is_err());
        assert!(Workspace::create(dir.path(), Some(".."), None).is_err());
    }

    #[test]
    fn resume_reads_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let created = Workspace::create(dir.path(), Some("proj"), Some("my project")).unwrap();
        let resumed = Workspace::resume(dir.path(), "proj").unwrap();
        assert_eq!(resumed.id(), "proj");
        assert_eq!(resumed.description(), Some("my project"));
        assert_eq!(resumed.created_at(), created.created_at());
        assert_eq!(resumed.root(), created.root());
    }

    #[test]
    fn resume_missing_workspace_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Workspace::resume(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[test]
    fn attach_uses_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("checkout");
        std::fs::create_dir(&sub).unwrap();
        let ws = Workspace::attach(&sub, None).unwrap();
        assert_eq!(ws.id(), "checkout");
    }

    #[test]
    fn attach_rejects_missing_or_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Workspace::attach(&dir.path().join("missing"), None),
            Err(WorkspaceError::NotFound(_))
        ));
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            Workspace::attach(&file, None),
            Err(WorkspaceError::NotADirectory(_))
        ));
    }

    #[test]
    fn close_keeps_state() {
        let (_dir, ws) = attached();
        std::fs::write(ws.root().join("keep.txt"), "k").unwrap();
        ws.close();
        assert!(ws.root().join("keep.txt").exists());
        assert!(ws.root().join(METADATA_FILE).exists());
    }

    #[test]
    fn info_and_relative() {
        let (_dir, ws) = attached();
        let info = ws.info();
        assert_eq!(info.workspace_id, ws.id());
        assert_eq!(info.description.as_deref(), Some("test"));
        assert_eq!(ws.relative(&ws.root().join("a/b.txt")), "a/b.txt");
        assert_eq!(ws.relative(ws.root()), ".");
    }
}
