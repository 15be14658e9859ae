use super::diff::{FilePatch, Hunk, HunkLine, PatchKind, parse_unified_diff_for};
use super::{
    EditAction, FileEdit, Patch, PatchError, PatchFormat, check_relative_path, contained_path,
    normalize_path,
};

use log::debug;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Which input a validation result belongs to (zero-based index)
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationTarget {
    Patch(usize),
    Edit(usize),
}

impl std::fmt::Display for ValidationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationTarget::Patch(i) => write!(f, "patch {}", i + 1),
            ValidationTarget::Edit(i) => write!(f, "edit {}", i + 1),
        }
    }
}

/// A change that passed validation, ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChange {
    pub kind: PatchKind,
    /// Path that exists after the change (the deleted path for deletions)
    pub path: String,
    /// Old path of a rename, removed when the change is applied
    pub renamed_from: Option<String>,
    /// The diff with hunk positions rewritten to where they matched
    pub diff: Option<FilePatch>,
    /// Full resulting content, `None` for deletions
    pub new_content: Option<String>,
}

/// Outcome of validating one patch or file edit
#[derive(Serialize, Debug, Clone)]
pub struct ValidationResult {
    pub target: ValidationTarget,
    pub file: String,
    pub valid: bool,
    pub reason: Option<String>,
    /// 1-based line in the current file where each hunk matched
    pub offsets: Vec<usize>,
    #[serde(skip)]
    pub error: Option<PatchError>,
    #[serde(skip)]
    pub resolved: Option<ResolvedChange>,
}

impl ValidationResult {
    fn from_outcome(
        target: ValidationTarget,
        file: String,
        outcome: Result<(ResolvedChange, Vec<usize>), PatchError>,
    ) -> Self {
        match outcome {
            Ok((resolved, offsets)) => Self {
                target,
                file,
                valid: true,
                reason: None,
                offsets,
                error: None,
                resolved: Some(resolved),
            },
            Err(error) => Self {
                target,
                file,
                valid: false,
                reason: Some(error.to_string()),
                offsets: Vec::new(),
                error: Some(error),
                resolved: None,
            },
        }
    }

    pub fn is_already_applied(&self) -> bool {
        matches!(self.error, Some(PatchError::AlreadyApplied(_)))
    }
}

/// Validation results split by outcome, each side in input order
#[derive(Serialize, Debug, Clone, Default)]
pub struct ValidationReport {
    pub valid: Vec<ValidationResult>,
    pub invalid: Vec<ValidationResult>,
}

impl ValidationReport {
    fn push(&mut self, result: ValidationResult) {
        if result.valid {
            self.valid.push(result);
        } else {
            self.invalid.push(result);
        }
    }

    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Old,
    New,
}

/// Checks patches and edits against the current work tree without writing
pub struct PatchValidator {
    root: PathBuf,
}

impl PatchValidator {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn validate(&self, patch: &Patch) -> ValidationResult {
        self.validate_patch_at(0, patch)
    }

    pub fn validate_all(&self, patches: &[Patch]) -> ValidationReport {
        self.validate_changes(patches, &[])
    }

    /// Validate patches then edits, each against the tree as it is on disk
    pub fn validate_changes(&self, patches: &[Patch], edits: &[FileEdit]) -> ValidationReport {
        let mut report = ValidationReport::default();
        for (i, patch) in patches.iter().enumerate() {
            report.push(self.validate_patch_at(i, patch));
        }
        for (i, edit) in edits.iter().enumerate() {
            report.push(self.validate_edit_at(i, edit));
        }
        debug!(
            "Validated {} changes: {} valid, {} invalid",
            report.total(),
            report.valid.len(),
            report.invalid.len()
        );
        report
    }

    pub fn validate_edit(&self, edit: &FileEdit) -> ValidationResult {
        self.validate_edit_at(0, edit)
    }

    fn validate_patch_at(&self, index: usize, patch: &Patch) -> ValidationResult {
        let outcome = self.resolve_patch(patch);
        let file = match &outcome {
            Ok((resolved, _)) => resolved.path.clone(),
            Err(_) => patch.file_label().to_string(),
        };
        if let Err(e) = &outcome {
            debug!("Patch {} for {file} rejected: {e}", index + 1);
        }
        ValidationResult::from_outcome(ValidationTarget::Patch(index), file, outcome)
    }

    fn validate_edit_at(&self, index: usize, edit: &FileEdit) -> ValidationResult {
        let path = normalize_path(&edit.path);
        let outcome = self.resolve_edit(&path, &edit.action);
        if let Err(e) = &outcome {
            debug!("Edit {} for {path} rejected: {e}", index + 1);
        }
        ValidationResult::from_outcome(ValidationTarget::Edit(index), path, outcome)
    }

    /// Resolve a patch against the files currently on disk
    pub fn resolve_patch(&self, patch: &Patch) -> Result<(ResolvedChange, Vec<usize>), PatchError> {
        let file = patch
            .file
            .as_deref()
            .map(normalize_path)
            .filter(|f| !f.is_empty() && f != "unknown");

        match &patch.format {
            PatchFormat::SimpleReplace { old, new } => {
                let file = file.ok_or(PatchError::MissingTarget)?;
                self.resolve_replace(&file, old, new)
            }
            PatchFormat::UnifiedDiff => {
                let mut files = parse_unified_diff_for(&patch.content, file.as_deref())?;
                if files.len() != 1 {
                    return Err(PatchError::Malformed(format!(
                        "diff touches {} files",
                        files.len()
                    )));
                }
                let file_patch = files.remove(0);
                self.resolve_file_patch(&file_patch)
            }
        }
    }

    fn resolve_file_patch(
        &self,
        file: &FilePatch,
    ) -> Result<(ResolvedChange, Vec<usize>), PatchError> {
        let kind = file.kind();
        let path = file.target_path().to_string();
        check_relative_path(&path)?;

        match kind {
            PatchKind::Create => {
                let content = created_content(file);
                if let Some(existing) = self.read_existing(&path)? {
                    return Err(if existing == content {
                        PatchError::AlreadyApplied(path)
                    } else {
                        PatchError::FileExists(path)
                    });
                }
                let resolved = ResolvedChange {
                    kind,
                    path,
                    renamed_from: None,
                    diff: Some(with_offsets(file, &[0])),
                    new_content: Some(content),
                };
                Ok((resolved, vec![1]))
            }
            PatchKind::Delete => {
                let original = self
                    .read_existing(&path)?
                    .ok_or_else(|| PatchError::FileMissing(path.clone()))?;
                let lines = split_lines(&original).lines;
                let offsets = locate(&lines, &file.hunks, Side::Old, &path)?;
                let resolved = ResolvedChange {
                    kind,
                    path,
                    renamed_from: None,
                    diff: Some(with_offsets(file, &offsets)),
                    new_content: None,
                };
                Ok((resolved, one_based(&offsets)))
            }
            PatchKind::Modify | PatchKind::Rename => {
                let source = file.old_path.clone().unwrap_or_else(|| path.clone());
                check_relative_path(&source)?;
                let renamed_from = (kind == PatchKind::Rename).then(|| source.clone());

                let Some(original) = self.read_existing(&source)? else {
                    if renamed_from.is_some() && self.read_existing(&path)?.is_some() {
                        return Err(PatchError::AlreadyApplied(path));
                    }
                    return Err(PatchError::FileMissing(source));
                };
                if renamed_from.is_some() && self.read_existing(&path)?.is_some() {
                    return Err(PatchError::FileExists(path));
                }

                let (content, offsets) = match splice(&original, file) {
                    Ok(spliced) => spliced,
                    Err(PatchError::ContextMismatch { file: name, hunk }) => {
                        let lines = split_lines(&original).lines;
                        let changes = file.hunks.iter().any(Hunk::has_changes);
                        if changes && locate(&lines, &file.hunks, Side::New, &path).is_ok() {
                            return Err(PatchError::AlreadyApplied(path));
                        }
                        return Err(PatchError::ContextMismatch { file: name, hunk });
                    }
                    Err(e) => return Err(e),
                };

                let resolved = ResolvedChange {
                    kind,
                    path,
                    renamed_from,
                    diff: Some(with_offsets(file, &offsets)),
                    new_content: Some(content),
                };
                Ok((resolved, one_based(&offsets)))
            }
        }
    }

    fn resolve_replace(
        &self,
        path: &str,
        old: &str,
        new: &str,
    ) -> Result<(ResolvedChange, Vec<usize>), PatchError> {
        check_relative_path(path)?;
        if old.is_empty() {
            return Err(PatchError::Malformed("empty replacement target".to_string()));
        }
        let original = self
            .read_existing(path)?
            .ok_or_else(|| PatchError::FileMissing(path.to_string()))?;

        let Some(at) = original.find(old) else {
            if !new.is_empty() && original.contains(new) {
                return Err(PatchError::AlreadyApplied(path.to_string()));
            }
            return Err(PatchError::ContextMismatch {
                file: path.to_string(),
                hunk: 1,
            });
        };

        let line = original[..at].matches('\n').count() + 1;
        let resolved = ResolvedChange {
            kind: PatchKind::Modify,
            path: path.to_string(),
            renamed_from: None,
            diff: None,
            new_content: Some(original.replacen(old, new, 1)),
        };
        Ok((resolved, vec![line]))
    }

    fn resolve_edit(
        &self,
        path: &str,
        action: &EditAction,
    ) -> Result<(ResolvedChange, Vec<usize>), PatchError> {
        check_relative_path(path)?;
        let existing = self.read_existing(path)?;

        let resolved = match action {
            EditAction::Write { content } => {
                if existing.as_deref() == Some(content.as_str()) {
                    return Err(PatchError::AlreadyApplied(path.to_string()));
                }
                ResolvedChange {
                    kind: if existing.is_some() {
                        PatchKind::Modify
                    } else {
                        PatchKind::Create
                    },
                    path: path.to_string(),
                    renamed_from: None,
                    diff: None,
                    new_content: Some(content.clone()),
                }
            }
            EditAction::Delete => {
                if existing.is_none() {
                    return Err(PatchError::FileMissing(path.to_string()));
                }
                ResolvedChange {
                    kind: PatchKind::Delete,
                    path: path.to_string(),
                    renamed_from: None,
                    diff: None,
                    new_content: None,
                }
            }
        };
        Ok((resolved, Vec::new()))
    }

    /// Read a file inside the root; `None` if it does not exist.
    /// Paths reaching outside the root through symlinks count as escapes.
    fn read_existing(&self, path: &str) -> Result<Option<String>, PatchError> {
        let full = contained_path(&self.root, path)?;
        if !full.exists() {
            return Ok(None);
        }
        if !full.is_file() {
            return Err(PatchError::Io(format!("{path} is not a regular file")));
        }

        let bytes = fs::read(&full).map_err(|e| PatchError::Io(e.to_string()))?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| PatchError::Io(format!("{path} is not valid UTF-8")))
    }
}

/// Apply a file patch to `original` in memory, locating hunks the same way
/// validation does. Line endings and the trailing newline are preserved
/// unless the patch changes them.
pub fn apply_to_text(original: &str, file: &FilePatch) -> Result<String, PatchError> {
    splice(original, file).map(|(content, _)| content)
}

struct SplitText<'a> {
    lines: Vec<&'a str>,
    eol: &'static str,
    trailing_newline: bool,
}

fn split_lines(text: &str) -> SplitText<'_> {
    SplitText {
        lines: text.lines().collect(),
        eol: if text.contains("\r\n") { "\r\n" } else { "\n" },
        trailing_newline: text.ends_with('\n'),
    }
}

fn splice(original: &str, file: &FilePatch) -> Result<(String, Vec<usize>), PatchError> {
    let text = split_lines(original);
    let offsets = locate(&text.lines, &file.hunks, Side::Old, file.target_path())?;

    let mut out: Vec<&str> = Vec::with_capacity(text.lines.len());
    let mut cursor = 0;
    let mut trailing = text.trailing_newline;

    for (hunk, &start) in file.hunks.iter().zip(&offsets) {
        out.extend_from_slice(&text.lines[cursor..start]);
        let mut pos = start;
        for line in &hunk.lines {
            match line {
                HunkLine::Context(_) => {
                    // Keep the file's own text; matching ignored trailing whitespace
                    out.push(text.lines[pos]);
                    pos += 1;
                }
                HunkLine::Remove(_) => pos += 1,
                HunkLine::Add(added) => out.push(added),
            }
        }
        cursor = pos;

        if cursor == text.lines.len() {
            let ends_with_context = matches!(hunk.lines.last(), Some(HunkLine::Context(_)));
            trailing = if hunk.new_missing_newline {
                false
            } else if ends_with_context && !hunk.old_missing_newline {
                text.trailing_newline || text.lines.is_empty()
            } else {
                true
            };
        }
    }
    out.extend_from_slice(&text.lines[cursor..]);

    let mut content = out.join(text.eol);
    if trailing && !out.is_empty() {
        content.push_str(text.eol);
    }
    Ok((content, offsets))
}

/// Find the zero-based start of each hunk's chosen side in `lines`.
///
/// Each hunk is searched nearest to its header position first, and must
/// start at or after the end of the previous hunk.
fn locate(
    lines: &[&str],
    hunks: &[Hunk],
    side: Side,
    file: &str,
) -> Result<Vec<usize>, PatchError> {
    let mut offsets = Vec::with_capacity(hunks.len());
    let mut floor = 0;

    for (n, hunk) in hunks.iter().enumerate() {
        let (wanted, header_start) = match side {
            Side::Old => (hunk.old_lines(), hunk.old_start),
            Side::New => (hunk.new_lines(), hunk.new_start),
        };

        let pos = if wanted.is_empty() {
            // Pure insertion after line `header_start`
            header_start.clamp(floor, lines.len().max(floor))
        } else {
            let expected = header_start.saturating_sub(1).max(floor);
            find_nearest(lines, &wanted, floor, expected).ok_or_else(|| {
                PatchError::ContextMismatch {
                    file: file.to_string(),
                    hunk: n + 1,
                }
            })?
        };
        offsets.push(pos);
        floor = pos + wanted.len();
    }
    Ok(offsets)
}

fn find_nearest(lines: &[&str], wanted: &[&str], floor: usize, expected: usize) -> Option<usize> {
    if wanted.len() > lines.len().saturating_sub(floor) {
        return None;
    }
    let last = lines.len() - wanted.len();
    let expected = expected.min(last);
    let matches_at = |start: usize| {
        lines[start..start + wanted.len()]
            .iter()
            .zip(wanted)
            .all(|(have, want)| have.trim_end() == want.trim_end())
    };

    for distance in 0..=(last - floor) {
        if let Some(below) = expected.checked_sub(distance)
            && below >= floor
            && matches_at(below)
        {
            return Some(below);
        }
        let above = expected + distance;
        if distance > 0 && above <= last && matches_at(above) {
            return Some(above);
        }
    }
    None
}

fn created_content(file: &FilePatch) -> String {
    let lines: Vec<&str> = file.hunks.iter().flat_map(Hunk::new_lines).collect();
    let mut content = lines.join("\n");
    let missing_newline = file.hunks.last().is_some_and(|h| h.new_missing_newline);
    if !lines.is_empty() && !missing_newline {
        content.push('\n');
    }
    content
}

/// Copy of the diff with hunk starts moved to where they matched
fn with_offsets(file: &FilePatch, offsets: &[usize]) -> FilePatch {
    let mut resolved = file.clone();
    let mut delta: isize = 0;
    for (hunk, &offset) in resolved.hunks.iter_mut().zip(offsets) {
        hunk.old_start = if hunk.old_len == 0 { offset } else { offset + 1 };
        let new_start = isize::try_from(offset + 1).unwrap_or(isize::MAX) + delta;
        hunk.new_start = if hunk.new_len == 0 {
            usize::try_from(new_start - 1).unwrap_or(0)
        } else {
            usize::try_from(new_start).unwrap_or(1)
        };
        delta += isize::try_from(hunk.new_len).unwrap_or(0)
            - isize::try_from(hunk.old_len).unwrap_or(0);
    }
    resolved
}

fn one_based(offsets: &[usize]) -> Vec<usize> {
    offsets.iter().map(|o| o + 1).collect()
}
