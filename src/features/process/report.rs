//! Reports written after processing a response

use super::types::{ApplyMethod, ProcessOutcome};
use crate::git::format_commit_result;
use crate::patch::ValidationResult;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const REPORT_FILE: &str = "llm_implementation_report.md";
pub const SUMMARY_FILE: &str = "llm_summary.json";
pub const COMMIT_SCRIPT_FILE: &str = "llm_commit.sh";

#[derive(Serialize)]
struct ValidationSummary<'a> {
    valid: usize,
    invalid: usize,
    results: Vec<&'a ValidationResult>,
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    timestamp: String,
    response_file: Option<&'a str>,
    format: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    summary: &'a str,
    changes: &'a [crate::response::ProposedChange],
    commit_messages: &'a [String],
    validation: ValidationSummary<'a>,
    applied: &'a [super::types::AppliedChange],
    failed: &'a [super::types::FailedChange],
    skipped: &'a [super::types::FailedChange],
    previews: &'a [super::types::PreviewChange],
    branch: Option<&'a str>,
    branch_created: bool,
    rolled_back: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit: Option<&'a crate::git::CommitResult>,
}

/// Write the markdown report, the JSON summary and, when changes were
/// applied but not committed, a commit script
pub fn write_reports(outcome: &ProcessOutcome, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;
    let timestamp = chrono::Local::now().to_rfc3339();
    let mut written = Vec::new();

    let report_path = dir.join(REPORT_FILE);
    fs::write(&report_path, render_report(outcome, &timestamp))
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    written.push(report_path);

    let summary_path = dir.join(SUMMARY_FILE);
    let summary = serde_json::to_string_pretty(&summary_document(outcome, timestamp))
        .context("Failed to serialize processing summary")?;
    fs::write(&summary_path, summary)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;
    written.push(summary_path);

    if needs_commit_script(outcome) {
        let script_path = dir.join(COMMIT_SCRIPT_FILE);
        fs::write(&script_path, render_commit_script(outcome))
            .with_context(|| format!("Failed to write {}", script_path.display()))?;
        make_executable(&script_path)?;
        written.push(script_path);
    }

    Ok(written)
}

fn summary_document(outcome: &ProcessOutcome, timestamp: String) -> SummaryDocument<'_> {
    let payload = &outcome.payload;
    SummaryDocument {
        timestamp,
        response_file: payload.metadata.source_file.as_deref(),
        format: payload.format.to_string(),
        success: outcome.success,
        error: outcome.error.as_deref(),
        summary: &payload.summary,
        changes: &payload.changes,
        commit_messages: &payload.commits,
        validation: ValidationSummary {
            valid: outcome.validation.valid.len(),
            invalid: outcome.validation.invalid.len(),
            results: outcome
                .validation
                .valid
                .iter()
                .chain(&outcome.validation.invalid)
                .collect(),
        },
        applied: &outcome.applied,
        failed: &outcome.failed,
        skipped: &outcome.skipped,
        previews: &outcome.previews,
        branch: outcome.branch.as_deref(),
        branch_created: outcome.branch_created,
        rolled_back: outcome.rolled_back,
        commit: outcome.commit.as_ref(),
    }
}

fn needs_commit_script(outcome: &ProcessOutcome) -> bool {
    !outcome.applied.is_empty()
        && !outcome.payload.commits.is_empty()
        && outcome.commit.is_none()
        && !outcome.rolled_back
}

fn method_label(method: ApplyMethod) -> &'static str {
    match method {
        ApplyMethod::GitApply => "git apply",
        ApplyMethod::Write => "written",
        ApplyMethod::Delete => "deleted",
    }
}

#[allow(clippy::too_many_lines)]
pub fn render_report(outcome: &ProcessOutcome, timestamp: &str) -> String {
    let payload = &outcome.payload;
    let mut out = String::new();

    writeln!(out, "# LLM Implementation Report\n").expect("writing to string should never fail");
    writeln!(out, "- **Generated:** {timestamp}").expect("writing to string should never fail");
    if let Some(source) = &payload.metadata.source_file {
        writeln!(out, "- **Response:** `{source}` ({})", payload.format)
            .expect("writing to string should never fail");
    }
    let status = if outcome.success { "success" } else { "failed" };
    writeln!(out, "- **Status:** {status}").expect("writing to string should never fail");
    if let Some(error) = &outcome.error {
        writeln!(out, "- **Error:** {error}").expect("writing to string should never fail");
    }
    out.push('\n');

    writeln!(out, "## Summary\n").expect("writing to string should never fail");
    if !payload.summary.is_empty() {
        writeln!(out, "{}\n", payload.summary).expect("writing to string should never fail");
    }
    writeln!(out, "| | Count |\n|---|---|").expect("writing to string should never fail");
    writeln!(out, "| Changes requested | {} |", payload.changes.len())
        .expect("writing to string should never fail");
    writeln!(out, "| Patches found | {} |", payload.patches.len())
        .expect("writing to string should never fail");
    writeln!(out, "| File edits found | {} |", payload.edits.len())
        .expect("writing to string should never fail");
    writeln!(out, "| Valid | {} |", outcome.validation.valid.len())
        .expect("writing to string should never fail");
    writeln!(out, "| Invalid | {} |", outcome.validation.invalid.len())
        .expect("writing to string should never fail");
    writeln!(out, "| Applied | {} |", outcome.applied.len())
        .expect("writing to string should never fail");
    writeln!(out, "| Failed | {} |", outcome.failed.len())
        .expect("writing to string should never fail");
    writeln!(out, "| Skipped | {} |\n", outcome.skipped.len())
        .expect("writing to string should never fail");

    if let Some(plan) = &payload.implementation_plan {
        writeln!(out, "## Implementation Plan\n\n{plan}\n")
            .expect("writing to string should never fail");
    }

    if !payload.changes.is_empty() {
        writeln!(out, "## Changes Requested\n").expect("writing to string should never fail");
        for (i, change) in payload.changes.iter().enumerate() {
            writeln!(out, "### {}. `{}`\n", i + 1, change.file_path)
                .expect("writing to string should never fail");
            writeln!(out, "- **Type:** {}", change.change_type)
                .expect("writing to string should never fail");
            writeln!(out, "- **Priority:** {}", change.priority)
                .expect("writing to string should never fail");
            if !change.description.is_empty() {
                writeln!(out, "- **Description:** {}", change.description)
                    .expect("writing to string should never fail");
            }
            out.push('\n');
        }
    }

    if !outcome.validation.invalid.is_empty() {
        writeln!(out, "## Validation Issues\n").expect("writing to string should never fail");
        for result in &outcome.validation.invalid {
            writeln!(
                out,
                "- {} (`{}`): {}",
                result.target,
                result.file,
                result.reason.as_deref().unwrap_or("invalid")
            )
            .expect("writing to string should never fail");
        }
        out.push('\n');
    }

    if !outcome.previews.is_empty() {
        writeln!(out, "## Dry Run\n").expect("writing to string should never fail");
        writeln!(out, "Nothing was written. These changes would be applied:\n")
            .expect("writing to string should never fail");
        for preview in &outcome.previews {
            writeln!(out, "### `{}` ({})\n", preview.file, preview.kind)
                .expect("writing to string should never fail");
            match &preview.diff {
                Some(diff) => {
                    writeln!(out, "```diff\n{diff}```\n")
                        .expect("writing to string should never fail");
                }
                None => {
                    if let Some(lines) = preview.resulting_lines {
                        writeln!(out, "Whole file, {lines} lines.\n")
                            .expect("writing to string should never fail");
                    }
                }
            }
        }
    }

    if !outcome.applied.is_empty() {
        let heading = if outcome.rolled_back {
            "## Applied Then Rolled Back"
        } else {
            "## Applied Changes"
        };
        writeln!(out, "{heading}\n").expect("writing to string should never fail");
        for change in &outcome.applied {
            write!(out, "- `{}` ({}, {})", change.file, change.kind, method_label(change.method))
                .expect("writing to string should never fail");
            if let Some(old) = &change.renamed_from {
                write!(out, " from `{old}`").expect("writing to string should never fail");
            }
            out.push('\n');
        }
        out.push('\n');
    }

    if !outcome.failed.is_empty() {
        writeln!(out, "## Failed Changes\n").expect("writing to string should never fail");
        for failure in &outcome.failed {
            writeln!(out, "- {} (`{}`): {}", failure.target, failure.file, failure.reason)
                .expect("writing to string should never fail");
        }
        out.push('\n');
    }

    if !outcome.skipped.is_empty() {
        writeln!(out, "## Skipped\n").expect("writing to string should never fail");
        for skipped in &outcome.skipped {
            writeln!(out, "- `{}`: {}", skipped.file, skipped.reason)
                .expect("writing to string should never fail");
        }
        out.push('\n');
    }

    if outcome.branch.is_some() || outcome.commit.is_some() || outcome.rolled_back {
        writeln!(out, "## Git\n").expect("writing to string should never fail");
        if let Some(branch) = &outcome.branch {
            let note = match (outcome.branch_created, outcome.rolled_back) {
                (true, true) => " (created, then deleted by rollback)",
                (true, false) => " (created)",
                _ => "",
            };
            writeln!(out, "- **Branch:** `{branch}`{note}")
                .expect("writing to string should never fail");
        }
        if outcome.rolled_back {
            writeln!(out, "- **Rollback:** every touched file was restored")
                .expect("writing to string should never fail");
        }
        if let (Some(commit), Some(message)) = (&outcome.commit, &outcome.commit_message) {
            writeln!(out, "\n```\n{}```", format_commit_result(commit, message))
                .expect("writing to string should never fail");
        }
        out.push('\n');
    }

    if !payload.commits.is_empty() {
        writeln!(out, "## Suggested Commit Messages\n")
            .expect("writing to string should never fail");
        for message in &payload.commits {
            writeln!(out, "- {}", message.lines().next().unwrap_or_default())
                .expect("writing to string should never fail");
        }
        out.push('\n');
    }

    writeln!(out, "## Next Steps\n").expect("writing to string should never fail");
    writeln!(out, "```bash").expect("writing to string should never fail");
    if outcome.applied.is_empty() || outcome.rolled_back {
        writeln!(out, "# Review the validation issues above, then rerun with --apply")
            .expect("writing to string should never fail");
    } else if outcome.commit.is_some() {
        writeln!(out, "git show --stat").expect("writing to string should never fail");
    } else {
        writeln!(out, "git diff").expect("writing to string should never fail");
        if needs_commit_script(outcome) {
            writeln!(out, "sh {COMMIT_SCRIPT_FILE}").expect("writing to string should never fail");
        } else {
            writeln!(out, "git add -A && git commit").expect("writing to string should never fail");
        }
    }
    writeln!(out, "```").expect("writing to string should never fail");
    out
}

/// Single-quote a string for POSIX shells
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

pub fn render_commit_script(outcome: &ProcessOutcome) -> String {
    let mut out = String::new();
    writeln!(out, "#!/bin/sh").expect("writing to string should never fail");
    writeln!(out, "# Commit the changes applied by git-llm")
        .expect("writing to string should never fail");
    writeln!(out, "set -e\n").expect("writing to string should never fail");
    writeln!(out, "cd {}", shell_quote(&outcome.repo_root.display().to_string()))
        .expect("writing to string should never fail");
    if let Some(branch) = &outcome.branch {
        writeln!(out, "git checkout {}", shell_quote(branch))
            .expect("writing to string should never fail");
    }

    let paths: Vec<String> = outcome
        .applied_paths()
        .iter()
        .map(|p| shell_quote(p))
        .collect();
    writeln!(out, "git add -A -- {}", paths.join(" "))
        .expect("writing to string should never fail");

    let mut messages = outcome.payload.commits.iter();
    if let Some(first) = messages.next() {
        writeln!(out, "git commit -m {}", shell_quote(first))
            .expect("writing to string should never fail");
    }
    let alternatives: Vec<&String> = messages.collect();
    if !alternatives.is_empty() {
        writeln!(out, "\n# Alternative messages:").expect("writing to string should never fail");
        for message in alternatives {
            let quoted = shell_quote(message).replace('\n', "\n# ");
            writeln!(out, "# git commit -m {quoted}").expect("writing to string should never fail");
        }
    }
    out
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to make {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::process::types::{AppliedChange, ApplyMethod};
    use crate::patch::{PatchKind, ValidationTarget};

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's $HOME"), r"'it'\''s $HOME'");
    }

    #[test]
    fn test_commit_script_quotes_messages() {
        let mut outcome = ProcessOutcome {
            repo_root: PathBuf::from("/work/repo"),
            branch: Some("llm/fix".to_string()),
            ..ProcessOutcome::default()
        };
        outcome.payload.commits = vec![
            "fix: handle `rm -rf` in user's input".to_string(),
            "fix: second option".to_string(),
        ];
        outcome.applied.push(AppliedChange {
            target: ValidationTarget::Patch(0),
            file: "src/a b.rs".to_string(),
            renamed_from: None,
            kind: PatchKind::Modify,
            method: ApplyMethod::GitApply,
        });

        let script = render_commit_script(&outcome);
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("cd '/work/repo'\n"));
        assert!(script.contains("git checkout 'llm/fix'\n"));
        assert!(script.contains("git add -A -- 'src/a b.rs'\n"));
        assert!(script.contains(r"git commit -m 'fix: handle `rm -rf` in user'\''s input'"));
        assert!(script.contains("# git commit -m 'fix: second option'"));
        assert!(needs_commit_script(&outcome));
    }
}
