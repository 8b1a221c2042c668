//! File operations confined to a [`Workspace`].
//!
//! Every operation resolves its path(s) through [`Workspace::resolve_path`]
//! first. Paths handed back to callers are root-relative.

use std::io::Write;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::WorkspaceError;
use crate::workspace::{METADATA_FILE, Workspace};

/// Size and kind of a workspace entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
}

impl Workspace {
    pub fn read_file(&self, path: &str) -> Result<String, WorkspaceError> {
        let resolved = self.resolve_path(path)?;
        if resolved.is_dir() {
            return Err(WorkspaceError::InvalidInput(format!("'{path}' is a directory")));
        }
        std::fs::read_to_string(&resolved).map_err(|e| WorkspaceError::io(&resolved, e))
    }

    /// Write (replace) a file, creating parent directories. Returns bytes written.
    pub fn write_file(&self, path: &str, content: &str) -> Result<usize, WorkspaceError> {
        let resolved = self.resolve_path(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }
        std::fs::write(&resolved, content).map_err(|e| WorkspaceError::io(&resolved, e))?;
        tracing::debug!(path = %path, bytes = content.len(), "File written");
        Ok(content.len())
    }

    /// Append to a file, creating it (and its parents) when missing.
    pub fn append_file(&self, path: &str, content: &str) -> Result<usize, WorkspaceError> {
        let resolved = self.resolve_path(path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&resolved)
            .map_err(|e| WorkspaceError::io(&resolved, e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| WorkspaceError::io(&resolved, e))?;
        Ok(content.len())
    }

    /// Cut an existing file down to `length` bytes.
    pub fn truncate_file(&self, path: &str, length: u64) -> Result<u64, WorkspaceError> {
        let resolved = self.resolve_path(path)?;
        if !resolved.is_file() {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&resolved)
            .map_err(|e| WorkspaceError::io(&resolved, e))?;
        file.set_len(length)
            .map_err(|e| WorkspaceError::io(&resolved, e))?;
        Ok(length)
    }

    /// Delete a file or directory tree. Returns `false` if nothing was there.
    pub fn delete_file(&self, path: &str) -> Result<bool, WorkspaceError> {
        let resolved = self.resolve_path(path)?;
        if resolved == self.root() {
            return Err(WorkspaceError::Security(
                "refusing to delete the workspace root".into(),
            ));
        }
        let meta = match std::fs::symlink_metadata(&resolved) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(WorkspaceError::io(&resolved, e)),
        };
        if meta.is_dir() {
            std::fs::remove_dir_all(&resolved).map_err(|e| WorkspaceError::io(&resolved, e))?;
        } else {
            std::fs::remove_file(&resolved).map_err(|e| WorkspaceError::io(&resolved, e))?;
        }
        tracing::debug!(path = %path, "Deleted");
        Ok(true)
    }

    /// Rename `source` to `destination`, creating destination parents.
    pub fn move_file(&self, source: &str, destination: &str) -> Result<(), WorkspaceError> {
        let from = self.resolve_path(source)?;
        let to = self.resolve_path(destination)?;
        if !from.exists() {
            return Err(WorkspaceError::NotFound(source.to_string()));
        }
        if from == self.root() {
            return Err(WorkspaceError::Security(
                "refusing to move the workspace root".into(),
            ));
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }
        std::fs::rename(&from, &to).map_err(|e| WorkspaceError::io(&from, e))
    }

    /// List a directory as sorted root-relative paths.
    ///
    /// Directories carry a trailing `/`. The metadata sidecar is never listed.
    pub fn list_directory(&self, path: &str, recursive: bool) -> Result<Vec<String>, WorkspaceError> {
        let resolved = self.resolve_path(path)?;
        if !resolved.exists() {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }
        if !resolved.is_dir() {
            return Err(WorkspaceError::NotADirectory(path.to_string()));
        }

        let mut walker = WalkDir::new(&resolved).min_depth(1);
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut entries = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| WorkspaceError::Io {
                path: path.to_string(),
                source: e.into(),
            })?;
            if entry.file_name() == METADATA_FILE {
                continue;
            }
            let mut rel = self.relative(entry.path());
            if entry.file_type().is_dir() {
                rel.push('/');
            }
            entries.push(rel);
        }
        entries.sort();
        Ok(entries)
    }

    /// Replace occurrences of `find` with `replace`, at most `max_count` times
    /// when given. Returns the number of replacements made.
    pub fn find_replace(
        &self,
        path: &str,
        find: &str,
        replace: &str,
        max_count: Option<usize>,
    ) -> Result<usize, WorkspaceError> {
        if find.is_empty() {
            return Err(WorkspaceError::InvalidInput("search text must not be empty".into()));
        }
        let resolved = self.resolve_path(path)?;
        let content =
            std::fs::read_to_string(&resolved).map_err(|e| WorkspaceError::io(&resolved, e))?;

        let found = content.matches(find).count();
        let count = max_count.map_or(found, |max| found.min(max));
        if count == 0 {
            return Ok(0);
        }
        let updated = content.replacen(find, replace, count);
        std::fs::write(&resolved, updated).map_err(|e| WorkspaceError::io(&resolved, e))?;
        Ok(count)
    }

    pub fn file_info(&self, path: &str) -> Result<FileInfo, WorkspaceError> {
        let resolved = self.resolve_path(path)?;
        let meta = std::fs::metadata(&resolved).map_err(|e| WorkspaceError::io(&resolved, e))?;
        Ok(FileInfo {
            path: self.relative(&resolved),
            size: meta.len(),
            is_dir: meta.is_dir(),
        })
    }
}
