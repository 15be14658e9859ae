use super::{PatchError, normalize_path};

use log::debug;
use regex::Regex;
use serde::Serialize;
use std::fmt::Write;
use std::sync::LazyLock;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header pattern is valid")
});

const NO_NEWLINE_MARKER: &str = "\\ No newline at end of file";

/// One line of a hunk body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

/// A contiguous block of changes.
///
/// `old_len` and `new_len` are always the counts of the parsed body, even
/// when the header claimed something else. A start of 0 on a side with lines
/// means the header carried no usable position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
    /// The old side's last line has no trailing newline
    pub old_missing_newline: bool,
    /// The new side's last line has no trailing newline
    pub new_missing_newline: bool,
}

impl Hunk {
    /// Context and removed lines, in order
    pub fn old_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                HunkLine::Context(text) | HunkLine::Remove(text) => Some(text.as_str()),
                HunkLine::Add(_) => None,
            })
            .collect()
    }

    /// Context and added lines, in order
    pub fn new_lines(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                HunkLine::Context(text) | HunkLine::Add(text) => Some(text.as_str()),
                HunkLine::Remove(_) => None,
            })
            .collect()
    }

    pub fn has_changes(&self) -> bool {
        self.lines
            .iter()
            .any(|line| !matches!(line, HunkLine::Context(_)))
    }

    fn recount(&mut self) {
        let old_len = self.old_lines().len();
        let new_len = self.new_lines().len();
        if old_len != self.old_len || new_len != self.new_len {
            debug!(
                "Hunk header said -{},{} +{},{}; body has {old_len} and {new_len} lines",
                self.old_start, self.old_len, self.new_start, self.new_len
            );
        }
        self.old_len = old_len;
        self.new_len = new_len;
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PatchKind {
    Create,
    Delete,
    Modify,
    Rename,
}

/// The changes a diff makes to a single file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// `None` for a file being created
    pub old_path: Option<String>,
    /// `None` for a file being deleted
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FilePatch {
    pub fn kind(&self) -> PatchKind {
        match (&self.old_path, &self.new_path) {
            (None, _) => PatchKind::Create,
            (_, None) => PatchKind::Delete,
            (Some(old), Some(new)) if old != new => PatchKind::Rename,
            _ => PatchKind::Modify,
        }
    }

    /// The path the patch leaves behind, or the deleted path
    pub fn target_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("")
    }

    /// Render as a canonical unified diff with `a/`/`b/` prefixes and
    /// hunk headers matching the bodies
    pub fn to_unified(&self) -> String {
        let mut out = String::new();
        let old = self
            .old_path
            .as_ref()
            .map_or_else(|| "/dev/null".to_string(), |p| format!("a/{p}"));
        let new = self
            .new_path
            .as_ref()
            .map_or_else(|| "/dev/null".to_string(), |p| format!("b/{p}"));
        writeln!(out, "--- {old}").expect("writing to string should never fail");
        writeln!(out, "+++ {new}").expect("writing to string should never fail");

        for hunk in &self.hunks {
            let old_start = if hunk.old_len == 0 {
                hunk.old_start
            } else {
                hunk.old_start.max(1)
            };
            let new_start = if hunk.new_len == 0 {
                hunk.new_start
            } else {
                hunk.new_start.max(1)
            };
            writeln!(
                out,
                "@@ -{old_start},{} +{new_start},{} @@",
                hunk.old_len, hunk.new_len
            )
            .expect("writing to string should never fail");

            let last_old = hunk.lines.iter().rposition(|l| !matches!(l, HunkLine::Add(_)));
            let last_new = hunk
                .lines
                .iter()
                .rposition(|l| !matches!(l, HunkLine::Remove(_)));
            for (i, line) in hunk.lines.iter().enumerate() {
                let (prefix, text) = match line {
                    HunkLine::Context(text) => (' ', text),
                    HunkLine::Remove(text) => ('-', text),
                    HunkLine::Add(text) => ('+', text),
                };
                writeln!(out, "{prefix}{text}").expect("writing to string should never fail");
                let old_ends = hunk.old_missing_newline && Some(i) == last_old;
                let new_ends = hunk.new_missing_newline && Some(i) == last_new;
                let marks = match line {
                    HunkLine::Context(_) => old_ends || new_ends,
                    HunkLine::Remove(_) => old_ends,
                    HunkLine::Add(_) => new_ends,
                };
                if marks {
                    writeln!(out, "{NO_NEWLINE_MARKER}")
                        .expect("writing to string should never fail");
                }
            }
        }
        out
    }
}

/// Parse a unified diff that names its files
pub fn parse_unified_diff(text: &str) -> Result<Vec<FilePatch>, PatchError> {
    parse_unified_diff_for(text, None)
}

/// Parse a unified diff; hunks appearing before any file header are attributed
/// to `fallback_path` when one is given.
pub fn parse_unified_diff_for(
    text: &str,
    fallback_path: Option<&str>,
) -> Result<Vec<FilePatch>, PatchError> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    let mut patches = Vec::new();
    let mut current: Option<FilePatch> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(rest) = line.strip_prefix("diff --git ") {
            finish(&mut patches, current.take());
            let (old, new) = split_git_header(rest);
            current = Some(FilePatch {
                old_path: old,
                new_path: new,
                hunks: Vec::new(),
            });
            i += 1;
        } else if is_file_header(&lines, i) {
            let old = header_path(&lines[i][4..]);
            let new = header_path(&lines[i + 1][4..]);
            match current.as_mut() {
                // `diff --git` header already opened this file
                Some(patch) if patch.hunks.is_empty() => {
                    patch.old_path = old;
                    patch.new_path = new;
                }
                _ => {
                    finish(&mut patches, current.take());
                    current = Some(FilePatch {
                        old_path: old,
                        new_path: new,
                        hunks: Vec::new(),
                    });
                }
            }
            i += 2;
        } else if line.starts_with("@@") {
            if current.is_none() {
                let Some(path) = fallback_path else {
                    return Err(PatchError::Malformed(
                        "hunk without a file header".to_string(),
                    ));
                };
                let path = normalize_path(path);
                current = Some(FilePatch {
                    old_path: Some(path.clone()),
                    new_path: Some(path),
                    hunks: Vec::new(),
                });
            }
            let (hunk, next) = parse_hunk(&lines, i);
            if let Some(patch) = current.as_mut() {
                patch.hunks.push(hunk);
            }
            i = next;
        } else {
            if let Some(patch) = current.as_mut() {
                apply_extended_header(patch, line);
            }
            i += 1;
        }
    }
    finish(&mut patches, current.take());

    if patches.is_empty() {
        return Err(PatchError::Malformed("no hunks found".to_string()));
    }
    Ok(patches)
}

fn finish(patches: &mut Vec<FilePatch>, patch: Option<FilePatch>) {
    if let Some(patch) = patch {
        let pure_rename = patch.kind() == PatchKind::Rename;
        if !patch.hunks.is_empty() || pure_rename {
            patches.push(patch);
        } else {
            debug!("Dropping file header without hunks: {}", patch.target_path());
        }
    }
}

fn is_file_header(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("--- ")
        && lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "))
}

fn header_path(raw: &str) -> Option<String> {
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    if path == "/dev/null" {
        None
    } else {
        Some(normalize_path(path))
    }
}

fn split_git_header(rest: &str) -> (Option<String>, Option<String>) {
    // `a/<path> b/<path>`; paths with spaces are ambiguous, prefer the b/ marker
    match rest.find(" b/") {
        Some(pos) => (
            Some(normalize_path(&rest[..pos])),
            Some(normalize_path(&rest[pos + 1..])),
        ),
        None => {
            let mut parts = rest.split_whitespace();
            let old = parts.next().map(normalize_path);
            let new = parts.next().map(normalize_path).or_else(|| old.clone());
            (old, new)
        }
    }
}

fn apply_extended_header(patch: &mut FilePatch, line: &str) {
    if patch.hunks.is_empty() {
        if line.starts_with("new file mode") {
            patch.old_path = None;
        } else if line.starts_with("deleted file mode") {
            patch.new_path = None;
        } else if let Some(path) = line.strip_prefix("rename from ") {
            patch.old_path = Some(normalize_path(path));
        } else if let Some(path) = line.strip_prefix("rename to ") {
            patch.new_path = Some(normalize_path(path));
        }
    }
}

/// Parse the hunk starting at `start`, returning it and the index of the
/// first line after it. The body runs until a line that cannot belong to a
/// hunk; header counts are not trusted.
fn parse_hunk(lines: &[&str], start: usize) -> (Hunk, usize) {
    let header = lines[start];
    let (old_start, old_len, new_start, new_len) = HUNK_HEADER
        .captures(header)
        .map_or((0, 0, 0, 0), |caps| {
            let num = |idx: usize, default: usize| {
                caps.get(idx)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(default)
            };
            (num(1, 0), num(2, 1), num(3, 0), num(4, 1))
        });

    let mut hunk = Hunk {
        old_start,
        old_len,
        new_start,
        new_len,
        lines: Vec::new(),
        old_missing_newline: false,
        new_missing_newline: false,
    };

    let mut i = start + 1;
    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("@@") || line.starts_with("diff --git ") || is_file_header(lines, i) {
            break;
        }

        if line.is_empty() {
            // Models drop the space of empty context lines; keep blanks only
            // when the hunk continues after them
            let run_end = lines[i..]
                .iter()
                .position(|l| !l.is_empty())
                .map_or(lines.len(), |offset| i + offset);
            let continues = lines.get(run_end).is_some_and(|next| {
                next.starts_with([' ', '-', '+', '\\'])
                    && !next.starts_with("diff --git ")
                    && !is_file_header(lines, run_end)
            });
            if !continues {
                i = run_end;
                break;
            }
            for _ in i..run_end {
                hunk.lines.push(HunkLine::Context(String::new()));
            }
            i = run_end;
            continue;
        }

        match line.as_bytes()[0] {
            b' ' => hunk.lines.push(HunkLine::Context(line[1..].to_string())),
            b'-' => hunk.lines.push(HunkLine::Remove(line[1..].to_string())),
            b'+' => hunk.lines.push(HunkLine::Add(line[1..].to_string())),
            b'\\' => mark_missing_newline(&mut hunk),
            _ => break,
        }
        i += 1;
    }

    hunk.recount();
    (hunk, i)
}

fn mark_missing_newline(hunk: &mut Hunk) {
    match hunk.lines.last() {
        Some(HunkLine::Context(_)) => {
            hunk.old_missing_newline = true;
            hunk.new_missing_newline = true;
        }
        Some(HunkLine::Remove(_)) => hunk.old_missing_newline = true,
        Some(HunkLine::Add(_)) => hunk.new_missing_newline = true,
        None => {}
    }
}
