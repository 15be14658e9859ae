//! Unified diff model, patch validation and in-process application

mod diff;
mod validator;

pub use diff::{FilePatch, Hunk, HunkLine, PatchKind, parse_unified_diff, parse_unified_diff_for};
pub use validator::{
    PatchValidator, ResolvedChange, ValidationReport, ValidationResult, ValidationTarget,
    apply_to_text,
};

use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// How a patch expresses its change
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatchFormat {
    UnifiedDiff,
    /// Replace the first occurrence of `old` with `new`
    SimpleReplace { old: String, new: String },
}

/// A change to one file expressed as a diff or a replacement
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Target file, `None` when the response did not name one
    pub file: Option<String>,
    /// Raw text as found in the response
    pub content: String,
    pub format: PatchFormat,
}

impl Patch {
    pub fn unified(file: Option<String>, content: String) -> Self {
        Self {
            file,
            content,
            format: PatchFormat::UnifiedDiff,
        }
    }

    pub fn replace(file: Option<String>, old: String, new: String) -> Self {
        Self {
            file,
            content: format!("-{old}\n+{new}"),
            format: PatchFormat::SimpleReplace { old, new },
        }
    }

    /// Target file for display
    pub fn file_label(&self) -> &str {
        self.file.as_deref().unwrap_or("unknown")
    }
}

/// What a whole-file edit does
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EditAction {
    Write { content: String },
    Delete,
}

/// Whole-file content proposed for a path, or its deletion
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileEdit {
    pub path: String,
    #[serde(flatten)]
    pub action: EditAction,
}

impl FileEdit {
    pub fn write(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: EditAction::Write {
                content: content.into(),
            },
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: EditAction::Delete,
        }
    }
}

/// Errors raised while parsing, validating or applying a patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    Malformed(String),
    MissingTarget,
    FileMissing(String),
    FileExists(String),
    ContextMismatch { file: String, hunk: usize },
    AlreadyApplied(String),
    PathEscape(String),
    Io(String),
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchError::Malformed(e) => write!(f, "malformed diff: {e}"),
            PatchError::MissingTarget => write!(f, "no target file named"),
            PatchError::FileMissing(path) => write!(f, "file missing: {path}"),
            PatchError::FileExists(path) => write!(f, "file exists: {path}"),
            PatchError::ContextMismatch { file, hunk } => {
                write!(f, "context mismatch at hunk {hunk} in {file}")
            }
            PatchError::AlreadyApplied(_) => write!(f, "already applied"),
            PatchError::PathEscape(path) => write!(f, "path outside repository: {path}"),
            PatchError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for PatchError {}

/// Clean up a path as written by a model: quotes, `a/`/`b/` prefixes, `./`,
/// trailing timestamps after a tab, backslashes.
pub fn normalize_path(raw: &str) -> String {
    let mut path = raw.split('\t').next().unwrap_or(raw).trim();
    path = path.trim_matches(|c| c == '"' || c == '\'' || c == '`');
    let mut path = path.replace('\\', "/");
    for prefix in ["a/", "b/"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            path = rest.to_string();
            break;
        }
    }
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    path
}

/// Reject paths that would land outside the work tree or inside `.git`
pub fn check_relative_path(path: &str) -> Result<(), PatchError> {
    let escape = || PatchError::PathEscape(path.to_string());
    if path.is_empty() || path == "unknown" {
        return Err(PatchError::MissingTarget);
    }
    let has_drive = path.len() > 1 && path.as_bytes().get(1) == Some(&b':');
    if path.starts_with('/') || has_drive || Path::new(path).is_absolute() {
        return Err(escape());
    }

    let mut depth = 0usize;
    for (i, component) in Path::new(path).components().enumerate() {
        match component {
            Component::Normal(name) => {
                if i == 0 && name == ".git" {
                    return Err(escape());
                }
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                depth = depth.checked_sub(1).ok_or_else(escape)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }
    if depth == 0 {
        return Err(escape());
    }
    Ok(())
}

/// Resolve `relative` under `root`, following symlinks in its directories.
///
/// Directories that do not exist yet are kept as written. The result, and the
/// target of a symlinked last component, must stay inside `root` and outside
/// its `.git` directory. The returned path keeps the last component itself,
/// so deleting it removes a link rather than what it points at.
pub fn contained_path(root: &Path, relative: &str) -> Result<PathBuf, PatchError> {
    check_relative_path(relative)?;
    let escape = || PatchError::PathEscape(relative.to_string());
    let root = root
        .canonicalize()
        .map_err(|e| PatchError::Io(e.to_string()))?;

    let mut parts: Vec<&OsStr> = Vec::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => parts.push(name),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    let (leaf, dirs) = parts.split_last().ok_or_else(escape)?;

    let mut parent = root.clone();
    let mut exists = true;
    for dir in dirs {
        let next = parent.join(dir);
        exists = exists && fs::symlink_metadata(&next).is_ok();
        // A dangling link cannot be canonicalized and counts as an escape
        parent = if exists {
            next.canonicalize().map_err(|_| escape())?
        } else {
            next
        };
    }

    let target = parent.join(leaf);
    let is_link = fs::symlink_metadata(&target).is_ok_and(|meta| meta.file_type().is_symlink());
    let real = if is_link {
        target.canonicalize().map_err(|_| escape())?
    } else {
        target.clone()
    };

    let git_dir = root.join(".git");
    for resolved in [&parent, &real] {
        if !resolved.starts_with(&root) || resolved.starts_with(&git_dir) {
            return Err(escape());
        }
    }
    if real == root {
        return Err(escape());
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("a/src/lib.rs"), "src/lib.rs");
        assert_eq!(normalize_path("b/src/lib.rs\t2024-01-01"), "src/lib.rs");
        assert_eq!(normalize_path("./docs/guide.md"), "docs/guide.md");
        assert_eq!(normalize_path("`src\\main.rs`"), "src/main.rs");
    }

    #[test]
    fn test_check_relative_path() {
        assert!(check_relative_path("src/lib.rs").is_ok());
        assert!(check_relative_path("src/../lib.rs").is_ok());
        assert_eq!(
            check_relative_path("../outside.txt"),
            Err(PatchError::PathEscape("../outside.txt".to_string()))
        );
        assert!(check_relative_path("/etc/passwd").is_err());
        assert!(check_relative_path("C:/Windows/win.ini").is_err());
        assert!(check_relative_path(".git/config").is_err());
        assert_eq!(check_relative_path("unknown"), Err(PatchError::MissingTarget));
    }

    #[test]
    fn test_contained_path_plain_and_missing_dirs() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        let root = dir.path().canonicalize().expect("canonical root");
        fs::create_dir_all(root.join("src")).expect("src dir");

        assert_eq!(contained_path(&root, "src/lib.rs"), Ok(root.join("src/lib.rs")));
        assert_eq!(contained_path(&root, "new/deep/file.rs"), Ok(root.join("new/deep/file.rs")));
        assert_eq!(contained_path(&root, "src/../README.md"), Ok(root.join("README.md")));
        assert!(contained_path(&root, "../outside.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_contained_path_rejects_symlink_escapes() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::TempDir::new().expect("temp dir");
        let outside = tempfile::TempDir::new().expect("outside dir");
        let root = dir.path().canonicalize().expect("canonical root");
        fs::create_dir_all(root.join("src")).expect("src dir");
        fs::create_dir_all(root.join(".git")).expect("git dir");
        symlink(outside.path(), root.join("link")).expect("dir link");
        symlink(outside.path().join("x.txt"), root.join("dangling.txt")).expect("file link");
        symlink(root.join(".git"), root.join("meta")).expect("git link");
        symlink(root.join("src"), root.join("alias")).expect("inner link");

        for path in ["link/evil.txt", "link/new/evil.txt", "dangling.txt", "meta/config"] {
            assert_eq!(
                contained_path(&root, path),
                Err(PatchError::PathEscape(path.to_string())),
                "{path}"
            );
        }
        // Links that stay inside the tree resolve to their target directory
        assert_eq!(contained_path(&root, "alias/lib.rs"), Ok(root.join("src/lib.rs")));
    }
}
