//! Pattern-based extraction of patches, file blocks, commit messages and
//! change mentions from free-form response text

use super::blocks::{FencedBlock, looks_like_path, outside_lines};
use super::types::{ChangeKind, ProposedChange};
use crate::patch::{FileEdit, Patch, normalize_path, parse_unified_diff_for};

use log::debug;
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::LazyLock;

const MAX_COMMIT_MESSAGES: usize = 5;
const MIN_COMMIT_MESSAGE_LEN: usize = 10;

static FILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:[-*+]\s+|\d+[.)]\s+)?\**(?:file|path|filename)\s*[#:]+\s*\**\s*`?([^\s`*]+)`?")
        .expect("file line pattern is valid")
});

static HEADER_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{1,6}\s+(?:(?:file|path)\s*:\s*)?`?([^\s`]+)`?\s*$")
        .expect("header path pattern is valid")
});

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*+]|\d+[.)])\s+(.+)$").expect("list item pattern is valid")
});

static KNOWN_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([\w./-]+\.(?:py|js|ts|jsx|tsx|java|cpp|c|h|go|rs|php|rb|swift|kt|sh|sql|html|css|md|txt|json|yaml|yml|toml))\b",
    )
    .expect("known file pattern is valid")
});

static VERB_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(modif|chang|updat|add|creat|remov|delet)\w*\b[^\n]*?\bfile\s+["'`]?([\w./-]+\.\w+)"#)
        .expect("verb file pattern is valid")
});

static COMMIT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:[-*]\s+)?\**commit(?:\s+message)?\**\s*:\**\s*(.+)$")
        .expect("commit line pattern is valid")
});

static CONVENTIONAL_COMMIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^\s*(?:[-*]\s+|\d+\.\s+)?[`"]?((?:feat|fix|docs|style|refactor|perf|test|build|ci|chore|revert)(?:\([^)]*\))?!?:\s*\S.*?)[`"]?\s*$"#,
    )
    .expect("conventional commit pattern is valid")
});

static SIMPLE_REPLACE: LazyLock<Regex> = LazyLock::new(|| {
    let quoted = r#"(?:"([^"]*)"|'([^']*)'|`([^`]*)`|(\S+))"#;
    Regex::new(&format!(
        r"(?i)replace:\s*{quoted}\s*(?:→|->)\s*{quoted}(?:\s+in\s+`?([^\s`]+?)`?(?:[.,;:])?(?:\s|$))?"
    ))
    .expect("replace pattern is valid")
});

/// Whether text contains a unified diff
pub fn looks_like_diff(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    lines.iter().any(|l| l.starts_with("diff --git "))
        || lines.first().is_some_and(|l| l.starts_with("@@"))
        || lines
            .windows(2)
            .any(|w| w[0].starts_with("--- ") && w[1].starts_with("+++ "))
}

/// File path named by a `File: path` style line or a header that is a path
pub fn path_from_line(line: &str) -> Option<String> {
    let captured = FILE_LINE
        .captures(line)
        .or_else(|| HEADER_PATH.captures(line))?;
    let raw = clean_path_token(captured.get(1)?.as_str());
    looks_like_path(&raw).then(|| normalize_path(&raw))
}

fn clean_path_token(token: &str) -> String {
    token
        .trim_end_matches(['.', ',', ':', ';', ')', '*'])
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .to_string()
}

/// Split a diff into one `Patch` per file. Text that does not parse is
/// kept whole so validation can report why.
pub fn patches_from_diff(text: &str, hint: Option<&str>) -> Vec<Patch> {
    match parse_unified_diff_for(text, hint) {
        Ok(files) if files.len() == 1 => {
            vec![Patch::unified(
                Some(files[0].target_path().to_string()),
                text.to_string(),
            )]
        }
        Ok(files) => files
            .iter()
            .map(|file| Patch::unified(Some(file.target_path().to_string()), file.to_unified()))
            .collect(),
        Err(e) => {
            debug!("Keeping unparseable diff as-is: {e}");
            vec![Patch::unified(hint.map(normalize_path), text.to_string())]
        }
    }
}

/// Patches from fenced diff blocks, bare diffs and `Replace:` lines
pub fn extract_patches(text: &str, blocks: &[FencedBlock]) -> Vec<Patch> {
    let mut patches = Vec::new();

    for block in blocks {
        let is_diff_lang = block.is_lang(&["diff", "patch", "udiff"]);
        if is_diff_lang || (!block.is_lang(&["json"]) && looks_like_diff(&block.content)) {
            let hint = block
                .path_hint
                .clone()
                .or_else(|| block.preceding.as_deref().and_then(path_from_line));
            patches.extend(patches_from_diff(&block.content, hint.as_deref()));
        }
    }

    let outside = outside_lines(text, blocks);
    for region in bare_diff_regions(&outside) {
        patches.extend(patches_from_diff(&region, None));
    }

    let outside_text = outside
        .iter()
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n");
    for caps in SIMPLE_REPLACE.captures_iter(&outside_text) {
        let old = first_group(&caps, 1..=4);
        let new = first_group(&caps, 5..=8);
        let file = caps.get(9).map(|m| normalize_path(&clean_path_token(m.as_str())));
        if let (Some(old), Some(new)) = (old, new) {
            patches.push(Patch::replace(file, old, new));
        }
    }

    debug!("Extracted {} patches", patches.len());
    patches
}

fn first_group(caps: &Captures<'_>, range: std::ops::RangeInclusive<usize>) -> Option<String> {
    range
        .filter_map(|i| caps.get(i))
        .map(|m| m.as_str().to_string())
        .next()
}

/// Runs of consecutive outside-fence lines that form unified diffs
fn bare_diff_regions(outside: &[(usize, &str)]) -> Vec<String> {
    let mut regions = Vec::new();
    let mut i = 0;

    while i < outside.len() {
        let (index, line) = outside[i];
        let header_pair = line.starts_with("--- ")
            && outside
                .get(i + 1)
                .is_some_and(|(next_index, next)| {
                    *next_index == index + 1 && next.starts_with("+++ ")
                });
        if !(header_pair || line.starts_with("diff --git ")) {
            i += 1;
            continue;
        }

        let mut region = vec![line];
        let mut j = i + 1;
        while j < outside.len() {
            let (next_index, next) = outside[j];
            // A fenced block interrupts the region
            if next_index != outside[j - 1].0 + 1 {
                break;
            }
            if next.is_empty() {
                let resumes = outside.get(j + 1).is_some_and(|(_, after)| {
                    after.starts_with("@@")
                        || after.starts_with("diff --git ")
                        || after.starts_with("--- ")
                        || after.starts_with(' ')
                        || after.starts_with('+')
                });
                if !resumes {
                    break;
                }
            } else if !is_diff_line(next) {
                break;
            }
            region.push(next);
            j += 1;
        }

        let mut text = region.join("\n");
        text.push('\n');
        regions.push(text);
        i = j;
    }
    regions
}

fn is_diff_line(line: &str) -> bool {
    line.starts_with([' ', '+', '-', '@', '\\'])
        || [
            "diff --git ",
            "index ",
            "new file mode",
            "deleted file mode",
            "old mode",
            "new mode",
            "similarity index",
            "rename from",
            "rename to",
        ]
        .iter()
        .any(|prefix| line.starts_with(prefix))
}

/// Whole-file contents: fenced blocks that name a path and are not diffs,
/// JSON or commit messages
pub fn extract_file_edits(blocks: &[FencedBlock]) -> Vec<FileEdit> {
    blocks
        .iter()
        .filter(|block| {
            !block.is_lang(&["diff", "patch", "udiff", "json", "commit", "gitcommit"])
                && !looks_like_diff(&block.content)
        })
        .filter_map(|block| {
            let path = block
                .path_hint
                .clone()
                .or_else(|| block.preceding.as_deref().and_then(path_from_line))?;
            Some(FileEdit::write(path, block.content.clone()))
        })
        .collect()
}

/// Commit messages, in order of appearance by kind: explicit `commit`
/// blocks, `Commit:` lines, then conventional-commit lines. Messages of 10
/// characters or fewer are dropped; at most five are kept.
pub fn extract_commit_messages(
    text: &str,
    blocks: &[FencedBlock],
    mut found: Vec<String>,
) -> Vec<String> {
    for block in blocks.iter().filter(|b| b.is_lang(&["commit", "gitcommit"])) {
        found.push(block.content.trim().to_string());
    }

    let outside_text = outside_lines(text, blocks)
        .iter()
        .map(|(_, line)| *line)
        .collect::<Vec<_>>()
        .join("\n");
    for caps in COMMIT_LINE.captures_iter(&outside_text) {
        if let Some(m) = caps.get(1) {
            found.push(
                m.as_str()
                    .trim()
                    .trim_matches(|c| c == '`' || c == '"' || c == '*')
                    .trim()
                    .to_string(),
            );
        }
    }
    for caps in CONVENTIONAL_COMMIT.captures_iter(&outside_text) {
        if let Some(m) = caps.get(1) {
            found.push(m.as_str().trim().to_string());
        }
    }

    let mut seen = HashSet::new();
    found
        .into_iter()
        .filter(|message| message.chars().count() > MIN_COMMIT_MESSAGE_LEN)
        .filter(|message| seen.insert(message.clone()))
        .take(MAX_COMMIT_MESSAGES)
        .collect()
}

/// Changes mentioned in prose: `File:` lines, list items naming a file, and
/// "modify/add/remove ... file X" sentences. First mention of a path wins.
pub fn extract_text_changes(text: &str) -> Vec<ProposedChange> {
    let mut changes: Vec<ProposedChange> = Vec::new();
    let mut push = |raw: &str, kind: ChangeKind, description: String| {
        let cleaned = clean_path_token(raw);
        if !cleaned.contains('.') || cleaned.contains("://") || !looks_like_path(&cleaned) {
            return;
        }
        let path = normalize_path(&cleaned);
        if changes.iter().any(|c| c.file_path == path) {
            return;
        }
        let description = if description.is_empty() {
            format!("Change detected in {path}")
        } else {
            description
        };
        changes.push(ProposedChange::extracted(path, kind, description));
    };

    for caps in FILE_LINE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push(m.as_str(), ChangeKind::Modify, String::new());
        }
    }

    for caps in LIST_ITEM.captures_iter(text) {
        let Some(item) = caps.get(1) else { continue };
        if let Some(file) = KNOWN_FILE.captures(item.as_str()).and_then(|c| c.get(1)) {
            let description = item.as_str().trim().replace('`', "");
            push(file.as_str(), verb_kind(item.as_str()), description);
        }
    }

    for caps in VERB_FILE.captures_iter(text) {
        if let (Some(verb), Some(file)) = (caps.get(1), caps.get(2)) {
            push(file.as_str(), verb_kind(verb.as_str()), String::new());
        }
    }

    changes
}

fn verb_kind(text: &str) -> ChangeKind {
    let lower = text.to_lowercase();
    let starts = |prefixes: &[&str]| {
        lower
            .split_whitespace()
            .take(3)
            .any(|word| prefixes.iter().any(|p| word.trim_matches('*').starts_with(p)))
    };
    if starts(&["add", "creat", "new"]) {
        ChangeKind::Create
    } else if starts(&["remov", "delet"]) {
        ChangeKind::Delete
    } else if starts(&["renam", "move"]) {
        ChangeKind::Rename
    } else {
        ChangeKind::Modify
    }
}
