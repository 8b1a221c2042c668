//! Unified-diff application inside a [`Workspace`].
//!
//! A diff is parsed in full before the target is read, so malformed input
//! never touches the file. Hunks are located against the original text
//! (exact position first, then the nearest matching offset that does not
//! overlap the previous hunk) and the result is written atomically. If any
//! hunk fails to match, nothing is written.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, AuditOutcome, PatchAuditLog};
use crate::error::{PatchError, WorkspaceError};
use crate::workspace::Workspace;

const DEV_NULL: &str = "/dev/null";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

/// One `@@ -a,b +c,d @@` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_count: usize,
    pub new_start: usize,
    pub new_count: usize,
    pub(crate) lines: Vec<HunkLine>,
    /// `\ No newline at end of file` follows the last new-side line.
    pub new_missing_newline: bool,
}

impl Hunk {
    fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Remove(s) => Some(s.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|l| match l {
                HunkLine::Context(s) | HunkLine::Add(s) => Some(s.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }

    pub fn added(&self) -> usize {
        self.lines.iter().filter(|l| matches!(l, HunkLine::Add(_))).count()
    }

    pub fn removed(&self) -> usize {
        self.lines.iter().filter(|l| matches!(l, HunkLine::Remove(_))).count()
    }

    /// Zero-based line index the header points at. A zero-length old range
    /// means "insert after line `old_start`".
    fn expected_index(&self) -> usize {
        if self.old_count == 0 {
            self.old_start
        } else {
            self.old_start.saturating_sub(1)
        }
    }
}

/// A parsed single-file unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub old_path: String,
    pub new_path: String,
    /// 1 when the headers use `a/` `b/` prefixes, else 0.
    pub strip_level: usize,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    /// Header path with the strip level applied.
    pub fn header_target(&self) -> &str {
        let raw = if self.new_path == DEV_NULL {
            &self.old_path
        } else {
            &self.new_path
        };
        if self.strip_level == 1 {
            raw.split_once('/').map_or(raw.as_str(), |(_, rest)| rest)
        } else {
            raw
        }
    }
}

/// Line endings to LF, and a guaranteed trailing newline.
fn normalize_newlines(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\r', "\n");
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn header_path(raw: &str) -> String {
    raw.split('\t').next().unwrap_or(raw).trim().to_string()
}

fn infer_strip_level(old: &str, new: &str) -> Result<usize, PatchError> {
    let new_prefixed = new.starts_with("b/");
    if old == DEV_NULL {
        return Ok(usize::from(new_prefixed));
    }
    let old_prefixed = old.starts_with("a/");
    if new == DEV_NULL {
        return Ok(usize::from(old_prefixed));
    }
    match (old_prefixed, new_prefixed) {
        (true, true) => Ok(1),
        (false, false) => Ok(0),
        _ => Err(PatchError::InvalidFormat(format!(
            "mismatched header prefixes '--- {old}' / '+++ {new}' (expected a/ and b/, or no prefix on both)"
        ))),
    }
}

fn parse_range(s: &str) -> Option<(usize, usize)> {
    match s.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}

fn parse_hunk_header(line: &str) -> Result<(usize, usize, usize, usize), PatchError> {
    let bad = || PatchError::InvalidFormat(format!("bad hunk header '{line}'"));
    let rest = line.strip_prefix("@@ -").ok_or_else(bad)?;
    let end = rest.find(" @@").ok_or_else(bad)?;
    let mut ranges = rest[..end].split(' ');
    let old = ranges.next().ok_or_else(bad)?;
    let new = ranges
        .next()
        .and_then(|r| r.strip_prefix('+'))
        .ok_or_else(bad)?;
    let (old_start, old_count) = parse_range(old).ok_or_else(bad)?;
    let (new_start, new_count) = parse_range(new).ok_or_else(bad)?;
    Ok((old_start, old_count, new_start, new_count))
}

fn is_file_header(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("--- ") && lines.get(i + 1).is_some_and(|n| n.starts_with("+++ "))
}

/// Parse a single-file unified diff.
pub fn parse_unified_diff(diff: &str) -> Result<FilePatch, PatchError> {
    let text = normalize_newlines(diff);
    let lines: Vec<&str> = text.lines().collect();
    let missing_headers = || PatchError::InvalidFormat("missing ---/+++ header lines".into());

    let mut i = 0;
    let (old_path, new_path) = loop {
        let line = *lines.get(i).ok_or_else(missing_headers)?;
        if line.starts_with("@@") {
            return Err(missing_headers());
        }
        if let Some(old) = line.strip_prefix("--- ") {
            let new = lines
                .get(i + 1)
                .and_then(|l| l.strip_prefix("+++ "))
                .ok_or_else(missing_headers)?;
            i += 2;
            break (header_path(old), header_path(new));
        }
        i += 1;
    };
    let strip_level = infer_strip_level(&old_path, &new_path)?;

    let mut hunks = Vec::new();
    while i < lines.len() {
        if is_file_header(&lines, i) {
            return Err(PatchError::InvalidFormat(
                "multiple files in one diff are not supported".into(),
            ));
        }
        if !lines[i].starts_with("@@") {
            i += 1;
            continue;
        }

        let (old_start, old_count, new_start, new_count) = parse_hunk_header(lines[i])?;
        i += 1;
        let mut body = Vec::new();
        let mut new_missing_newline = false;
        while i < lines.len() && !lines[i].starts_with("@@") && !is_file_header(&lines, i) {
            let line = lines[i];
            match line.as_bytes().first() {
                Some(b' ') => body.push(HunkLine::Context(line[1..].to_string())),
                Some(b'-') => body.push(HunkLine::Remove(line[1..].to_string())),
                Some(b'+') => body.push(HunkLine::Add(line[1..].to_string())),
                Some(b'\\') => {
                    if matches!(body.last(), Some(HunkLine::Add(_) | HunkLine::Context(_))) {
                        new_missing_newline = true;
                    }
                }
                None => body.push(HunkLine::Context(String::new())),
                Some(_) => {
                    return Err(PatchError::InvalidFormat(format!(
                        "unexpected line in hunk #{}: '{line}'",
                        hunks.len() + 1
                    )));
                }
            }
            i += 1;
        }

        // Blank lines trailing a hunk are separators, not context, once the
        // header's old-side count is already satisfied.
        let old_len = |b: &[HunkLine]| {
            b.iter()
                .filter(|l| !matches!(l, HunkLine::Add(_)))
                .count()
        };
        while matches!(body.last(), Some(HunkLine::Context(s)) if s.is_empty())
            && old_len(&body) > old_count
        {
            body.pop();
        }

        let new_len = body
            .iter()
            .filter(|l| !matches!(l, HunkLine::Remove(_)))
            .count();
        if old_len(&body) != old_count || new_len != new_count {
            return Err(PatchError::InvalidFormat(format!(
                "hunk #{} does not match its header: expected -{old_count} +{new_count} lines, found -{} +{new_len}",
                hunks.len() + 1,
                old_len(&body)
            )));
        }

        hunks.push(Hunk {
            old_start,
            old_count,
            new_start,
            new_count,
            lines: body,
            new_missing_newline,
        });
    }

    if hunks.is_empty() {
        return Err(PatchError::InvalidFormat("no hunks found".into()));
    }

    Ok(FilePatch {
        old_path,
        new_path,
        strip_level,
        hunks,
    })
}

/// Why a hunk could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkFailure {
    ContextMismatch { hunk: usize, line: usize },
    PreviouslyApplied { hunk: usize, line: usize },
}

impl std::fmt::Display for HunkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HunkFailure::ContextMismatch { hunk, line } => {
                write!(f, "Hunk #{hunk} FAILED at {line} (context mismatch)")
            }
            HunkFailure::PreviouslyApplied { hunk, line } => write!(
                f,
                "Hunk #{hunk} FAILED at {line} (reversed or previously applied patch detected)"
            ),
        }
    }
}

/// Result of applying a patch to in-memory text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedText {
    pub content: String,
    pub hunks: usize,
    pub added: usize,
    pub removed: usize,
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect()
}

/// Nearest index `>= min` where `needle` matches, preferring `expected`.
fn locate(lines: &[&str], needle: &[&str], expected: usize, min: usize) -> Option<usize> {
    let max_start = lines.len().checked_sub(needle.len())?;
    if min > max_start {
        return None;
    }
    let matches_at = |p: usize| &lines[p..p + needle.len()] == needle;
    let expected = expected.clamp(min, max_start);
    if matches_at(expected) {
        return Some(expected);
    }
    let span = (expected - min).max(max_start - expected);
    for delta in 1..=span {
        if let Some(p) = expected.checked_sub(delta).filter(|p| *p >= min)
            && matches_at(p)
        {
            return Some(p);
        }
        let p = expected + delta;
        if p <= max_start && matches_at(p) {
            return Some(p);
        }
    }
    None
}

/// Apply every hunk of `patch` to `original`, all or nothing.
pub fn apply_to_text(original: &str, patch: &FilePatch) -> Result<AppliedText, HunkFailure> {
    let crlf = original.contains("\r\n");
    let had_trailing_newline = original.is_empty() || original.ends_with('\n');
    let lines = split_lines(original);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut cursor = 0;
    let mut eof_newline: Option<bool> = None;
    let (mut added, mut removed) = (0, 0);

    for (n, hunk) in patch.hunks.iter().enumerate() {
        let old = hunk.old_lines();
        let new = hunk.new_lines();
        let expected = hunk.expected_index();

        let pos = match locate(&lines, &old, expected, cursor) {
            Some(pos) => pos,
            None => {
                let hunk_no = n + 1;
                let applied_already =
                    !new.is_empty() && new != old && locate(&lines, &new, expected, cursor).is_some();
                return Err(if applied_already {
                    HunkFailure::PreviouslyApplied {
                        hunk: hunk_no,
                        line: hunk.old_start,
                    }
                } else {
                    HunkFailure::ContextMismatch {
                        hunk: hunk_no,
                        line: hunk.old_start,
                    }
                });
            }
        };

        out.extend_from_slice(&lines[cursor..pos]);
        out.extend(new.iter().copied());
        cursor = pos + old.len();
        if cursor == lines.len() {
            eof_newline = Some(!hunk.new_missing_newline);
        }
        added += hunk.added();
        removed += hunk.removed();
    }
    out.extend_from_slice(&lines[cursor..]);

    let separator = if crlf { "\r\n" } else { "\n" };
    let mut content = out.join(separator);
    if !out.is_empty() && eof_newline.unwrap_or(had_trailing_newline) {
        content.push_str(separator);
    }

    Ok(AppliedText {
        content,
        hunks: patch.hunks.len(),
        added,
        removed,
    })
}

/// What a patch attempt did, in the shape tools report back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOutcome {
    pub success: bool,
    pub path: String,
    #[serde(default)]
    pub hunks: usize,
    #[serde(default)]
    pub added: usize,
    #[serde(default)]
    pub removed: usize,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PatchOutcome {
    fn format_error(path: &str, err: &PatchError) -> Self {
        Self {
            success: false,
            path: path.to_string(),
            hunks: 0,
            added: 0,
            removed: 0,
            stdout: String::new(),
            stderr: err.to_string(),
            error: Some(err.to_string()),
        }
    }
}

/// Applies diffs to files in one workspace.
///
/// Concurrent calls for the same resolved path are serialized; different
/// paths proceed independently.
#[derive(Debug)]
pub struct PatchEngine {
    workspace: Arc<Workspace>,
    audit: PatchAuditLog,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PatchEngine {
    pub fn new(workspace: Arc<Workspace>) -> Result<Self, WorkspaceError> {
        let audit = PatchAuditLog::for_workspace(&workspace)?;
        Ok(Self {
            workspace,
            audit,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn audit_log(&self) -> &PatchAuditLog {
        &self.audit
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(path.to_path_buf()).or_default().clone()
    }

    /// Apply `diff` to the workspace-relative `path`.
    ///
    /// Sandbox and I/O failures are errors. Malformed diffs and hunks that do
    /// not match are reported through an unsuccessful [`PatchOutcome`], with
    /// the file left untouched.
    pub fn apply_patch(&self, path: &str, diff: &str) -> Result<PatchOutcome, WorkspaceError> {
        let diff_len = diff.len();
        let fail = |err: WorkspaceError| {
            self.audit
                .record(&AuditEntry::new(path, diff_len, AuditOutcome::Error(err.to_string())));
            err
        };

        let target = self.workspace.resolve_path(path).map_err(fail)?;
        if target.is_dir() {
            return Err(fail(WorkspaceError::InvalidInput(format!("'{path}' is a directory"))));
        }

        let patch = match parse_unified_diff(diff) {
            Ok(patch) => patch,
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "Rejected malformed diff");
                self.audit
                    .record(&AuditEntry::new(path, diff_len, AuditOutcome::Error(err.to_string())));
                return Ok(PatchOutcome::format_error(path, &err));
            }
        };
        tracing::debug!(
            path = %path,
            header = %patch.header_target(),
            strip_level = patch.strip_level,
            hunks = patch.hunks.len(),
            "Applying patch"
        );

        let lock = self.lock_for(&target);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let original = match std::fs::read_to_string(&target) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(fail(WorkspaceError::io(&target, e))),
        };

        match apply_to_text(&original, &patch) {
            Ok(applied) => {
                write_atomic(&target, &applied.content).map_err(fail)?;
                self.audit
                    .record(&AuditEntry::new(path, diff_len, AuditOutcome::Applied { success: true }));
                Ok(PatchOutcome {
                    success: true,
                    path: path.to_string(),
                    hunks: applied.hunks,
                    added: applied.added,
                    removed: applied.removed,
                    stdout: format!(
                        "patching file {path}\nApplied {} hunk(s) (+{}/-{})",
                        applied.hunks, applied.added, applied.removed
                    ),
                    stderr: String::new(),
                    error: None,
                })
            }
            Err(failure) => {
                tracing::warn!(path = %path, %failure, "Patch did not apply");
                self.audit
                    .record(&AuditEntry::new(path, diff_len, AuditOutcome::Applied { success: false }));
                Ok(PatchOutcome {
                    success: false,
                    path: path.to_string(),
                    hunks: patch.hunks.len(),
                    added: 0,
                    removed: 0,
                    stdout: format!("patching file {path}"),
                    stderr: format!("{failure}\nPatch not applied; {path} left unchanged"),
                    error: None,
                })
            }
        }
    }
}

/// Replace `target` via a temp file in the same directory.
fn write_atomic(target: &Path, content: &str) -> Result<(), WorkspaceError> {
    let parent = target
        .parent()
        .ok_or_else(|| WorkspaceError::InvalidInput(format!("no parent for {}", target.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| WorkspaceError::io(parent, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| WorkspaceError::io(tmp.path(), e))?;
    if let Ok(meta) = std::fs::metadata(target) {
        let _ = tmp.as_file().set_permissions(meta.permissions());
    }
    tmp.persist(target)
        .map_err(|e| WorkspaceError::io(target, e.error))?;
    Ok(())
}
