//! Parsing of model responses into changes, patches, file edits and commit
//! messages

mod blocks;
mod extract;
mod json;
mod types;

pub use blocks::{FencedBlock, fenced_blocks};
pub use extract::{extract_commit_messages, extract_text_changes, looks_like_diff};
pub use types::{
    ChangeKind, ChangeOrigin, CodeBlock, ContractPatch, Priority, ProposedChange, ResponseContract,
    ResponseFormat, ResponseMetadata, ResponsePayload,
};

use crate::patch::{EditAction, PatchKind, parse_unified_diff_for};

use anyhow::{Context, Result};
use log::debug;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

const SUMMARY_LIMIT: usize = 500;

static JSON_OR_DIFF_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^\s*(?:```|~~~)\s*(?:json|patch|diff)\b").expect("fence pattern is valid")
});

static MARKDOWN_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+?)\s*#*\s*$").expect("header pattern is valid"));

/// Decide how a response is structured
pub fn detect_format(content: &str) -> ResponseFormat {
    let trimmed = content.trim();
    if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        return ResponseFormat::Json;
    }
    if JSON_OR_DIFF_FENCE.is_match(content) {
        return ResponseFormat::Mixed;
    }
    let has_header = fenced_outside(content)
        .iter()
        .any(|(_, line)| MARKDOWN_HEADER.is_match(line));
    if has_header {
        ResponseFormat::Markdown
    } else {
        ResponseFormat::Text
    }
}

fn fenced_outside(content: &str) -> Vec<(usize, &str)> {
    blocks::outside_lines(content, &fenced_blocks(content))
}

/// Parses model responses
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_file(&self, path: &Path) -> Result<ResponsePayload> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response file {}", path.display()))?;
        let mut payload = self.parse_str(&content);
        payload.metadata.source_file = Some(path.display().to_string());
        Ok(payload)
    }

    pub fn parse_str(&self, content: &str) -> ResponsePayload {
        let format = detect_format(content);
        let blocks = fenced_blocks(content);
        debug!("Response format: {format}, {} fenced blocks", blocks.len());

        let mut payload = ResponsePayload {
            format,
            ..ResponsePayload::default()
        };

        match format {
            ResponseFormat::Json => {
                if let Ok(value) = serde_json::from_str(content.trim()) {
                    json::merge_json(&value, &mut payload);
                }
            }
            ResponseFormat::Mixed => {
                for block in &blocks {
                    if block.is_lang(&["json"]) {
                        match serde_json::from_str(&block.content) {
                            Ok(value) => json::merge_json(&value, &mut payload),
                            Err(e) => debug!("Skipping invalid JSON block: {e}"),
                        }
                    } else if !block.is_lang(&["diff", "patch", "udiff"]) {
                        payload.code_blocks.push(CodeBlock {
                            language: block.lang.clone().unwrap_or_else(|| "text".to_string()),
                            content: block.content.clone(),
                        });
                    }
                }
                let extract_changes = payload.changes.is_empty();
                collect_sections(content, &blocks, &mut payload, extract_changes);
            }
            ResponseFormat::Markdown => collect_sections(content, &blocks, &mut payload, true),
            ResponseFormat::Text => {
                payload.changes = extract_text_changes(content);
                payload.summary = truncate_summary(content);
            }
        }

        let structured_commits = std::mem::take(&mut payload.commits);
        payload.commits = if format == ResponseFormat::Json {
            extract_commit_messages("", &[], structured_commits)
        } else {
            extract_commit_messages(content, &blocks, structured_commits)
        };

        let mut edits = json::edits_from_changes(&payload.changes);
        if format != ResponseFormat::Json {
            payload.patches.extend(extract::extract_patches(content, &blocks));
            edits.extend(extract::extract_file_edits(&blocks));
        }
        edits.append(&mut payload.edits);
        payload.edits = edits;

        if payload.changes.is_empty() {
            payload.changes = derive_changes(&payload);
        }
        if payload.summary.is_empty() {
            payload.summary = truncate_summary(content.trim());
        }

        payload.metadata = ResponseMetadata {
            source_file: None,
            parsed_at: chrono::Local::now().to_rfc3339(),
            content_length: content.chars().count(),
        };

        debug!(
            "Parsed {} changes, {} patches, {} file edits, {} commit messages",
            payload.changes.len(),
            payload.patches.len(),
            payload.edits.len(),
            payload.commits.len()
        );
        payload
    }
}

/// Split the response on markdown headers outside code fences and sort the
/// sections into summary, plan, changes and details
fn collect_sections(
    content: &str,
    blocks: &[FencedBlock],
    payload: &mut ResponsePayload,
    extract_changes: bool,
) {
    let lines: Vec<&str> = content.lines().collect();
    let headers: Vec<(usize, String)> = blocks::outside_lines(content, blocks)
        .into_iter()
        .filter_map(|(i, line)| {
            MARKDOWN_HEADER
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| (i, m.as_str().to_string()))
        })
        .collect();

    let preamble_end = headers.first().map_or(lines.len(), |(i, _)| *i);
    let preamble = lines[..preamble_end].join("\n");

    for (n, (start, title)) in headers.iter().enumerate() {
        let end = headers.get(n + 1).map_or(lines.len(), |(i, _)| *i);
        let body = lines[start + 1..end].join("\n").trim().to_string();
        let lower = title.to_lowercase();

        if lower.contains("change") || lower.contains("modif") {
            if extract_changes {
                for change in extract_text_changes(&body) {
                    if !payload.changes.iter().any(|c| c.file_path == change.file_path) {
                        payload.changes.push(change);
                    }
                }
            }
        } else if lower.contains("summary") || lower.contains("overview") {
            if payload.summary.is_empty() {
                payload.summary = body;
            }
        } else if lower.contains("implementation") || lower.contains("plan") {
            if payload.implementation_plan.is_none() {
                payload.implementation_plan = Some(body);
            }
        } else if !body.is_empty() {
            payload.sections.insert(title.clone(), body);
        }
    }

    if payload.summary.is_empty() && !preamble.trim().is_empty() {
        payload.summary = truncate_summary(preamble.trim());
    }
}

/// Changes implied by patches and file edits, for responses that do not
/// list their changes
fn derive_changes(payload: &ResponsePayload) -> Vec<ProposedChange> {
    let mut changes: Vec<ProposedChange> = Vec::new();

    let from_patches = payload.patches.iter().filter_map(|patch| {
        let file = patch.file.clone()?;
        let kind = parse_unified_diff_for(&patch.content, Some(&file))
            .ok()
            .and_then(|files| files.first().map(|f| f.kind()))
            .map_or(ChangeKind::Modify, |kind| match kind {
                PatchKind::Create => ChangeKind::Create,
                PatchKind::Delete => ChangeKind::Delete,
                PatchKind::Rename => ChangeKind::Rename,
                PatchKind::Modify => ChangeKind::Modify,
            });
        Some((file, kind, "Patch"))
    });
    let from_edits = payload.edits.iter().map(|edit| {
        let kind = match edit.action {
            EditAction::Write { .. } => ChangeKind::Modify,
            EditAction::Delete => ChangeKind::Delete,
        };
        (edit.path.clone(), kind, "File content")
    });

    for (file, kind, source) in from_patches.chain(from_edits) {
        if changes.iter().any(|c| c.file_path == file) {
            continue;
        }
        let mut change =
            ProposedChange::extracted(file.clone(), kind, format!("{source} for {file}"));
        change.origin = ChangeOrigin::Derived;
        changes.push(change);
    }
    changes
}

fn truncate_summary(text: &str) -> String {
    if text.chars().count() > SUMMARY_LIMIT {
        let head: String = text.chars().take(SUMMARY_LIMIT).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(r#"  {"changes": []}"#), ResponseFormat::Json);
        assert_eq!(detect_format("[1, 2"), ResponseFormat::Text);
        assert_eq!(
            detect_format("Here:\n```diff\n-a\n+b\n```\n"),
            ResponseFormat::Mixed
        );
        assert_eq!(detect_format("# Plan\nDo it\n"), ResponseFormat::Markdown);
        assert_eq!(
            detect_format("```bash\n# not a header\n```\n"),
            ResponseFormat::Text
        );
    }

    #[test]
    fn test_truncate_summary_is_char_safe() {
        let long = "é".repeat(600);
        let summary = truncate_summary(&long);
        assert_eq!(summary.chars().count(), 503);
        assert!(summary.ends_with("..."));
    }
}
