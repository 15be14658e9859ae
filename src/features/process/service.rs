use super::report;
use super::types::{
    AUTO_BRANCH, AppliedChange, ApplyMethod, FailedChange, PreviewChange, ProcessOptions,
    ProcessOutcome,
};
use crate::config::Config;
use crate::git::{FileSnapshot, GitRepo, HeadState};
use crate::patch::{PatchKind, PatchValidator, ResolvedChange, ValidationTarget, contained_path};
use crate::response::{ResponseParser, ResponsePayload};

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub const NO_CHANGES: &str = "No changes found";
pub const NO_VALID_PATCHES: &str = "No valid patches";

const BRANCH_SLUG_LIMIT: usize = 30;
const DEFAULT_SLUG: &str = "llm-changes";

/// Parses a response and carries its changes into the repository
pub struct ResponseProcessor {
    options: ProcessOptions,
    config: Config,
}

/// Result of applying one validated change
enum ApplyStep {
    Applied(AppliedChange),
    AlreadyApplied(String),
}

impl ResponseProcessor {
    pub fn new(options: ProcessOptions, config: Config) -> Self {
        Self { options, config }
    }

    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Run the pipeline off the async runtime
    pub async fn process(self) -> Result<ProcessOutcome> {
        tokio::task::spawn_blocking(move || self.run())
            .await
            .context("Processing task failed")?
    }

    /// Parse, validate and, depending on the options, preview or apply
    pub fn run(&self) -> Result<ProcessOutcome> {
        let options = &self.options;
        let repo_arg = options.repo.clone().unwrap_or_else(|| PathBuf::from("."));
        if !repo_arg.is_dir() {
            return Err(anyhow!("Repository path does not exist: {}", repo_arg.display()));
        }

        debug!("Parsing response {}", options.response_file.display());
        let payload = ResponseParser::new().parse_file(&options.response_file)?;
        if !payload.has_changes() {
            warn!("No changes found in response {}", options.response_file.display());
            return Ok(ProcessOutcome::failure(payload, NO_CHANGES));
        }

        let git = GitRepo::open(&repo_arg).ok();
        let root = git
            .as_ref()
            .map_or_else(|| repo_arg.clone(), |repo| repo.repo_path().to_path_buf());
        let report_dir = options.report_dir.clone().unwrap_or_else(|| root.clone());

        let validator = PatchValidator::new(&root);
        let validation = validator.validate_changes(&payload.patches, &payload.edits);
        let mut outcome = ProcessOutcome {
            success: true,
            payload,
            repo_root: root.clone(),
            validation,
            ..ProcessOutcome::default()
        };

        if options.validate_only {
            outcome.success = outcome
                .validation
                .invalid
                .iter()
                .all(|result| result.is_already_applied());
            return self.finish(outcome, &report_dir);
        }

        if outcome.validation.valid.is_empty() {
            warn!("None of the {} changes validated", outcome.validation.total());
            outcome.success = false;
            outcome.error = Some(NO_VALID_PATCHES.to_string());
            return self.finish(outcome, &report_dir);
        }

        if options.dry_run {
            outcome.previews = previews(&outcome);
            outcome.branch = match (&options.create_branch, &git) {
                (Some(requested), Some(repo)) => {
                    Some(self.branch_name(repo, requested, &outcome.payload)?)
                }
                (Some(requested), None) => Some(requested.clone()),
                (None, _) => None,
            };
            return self.finish(outcome, &report_dir);
        }

        let repo = git.ok_or_else(|| anyhow!("Not a git repository: {}", root.display()))?;
        outcome.original_branch = repo.current_branch().ok();

        if !options.apply {
            if let Some(requested) = &options.create_branch {
                let name = self.branch_name(&repo, requested, &outcome.payload)?;
                if let Err(e) = ensure_untouched(&repo, &touched_paths(&outcome)) {
                    outcome.success = false;
                    outcome.error = Some(e.to_string());
                    return self.finish(outcome, &report_dir);
                }
                repo.create_branch(&name, true)?;
                outcome.branch = Some(name);
                outcome.branch_created = true;
            }
            return self.finish(outcome, &report_dir);
        }

        self.apply(&repo, &validator, &mut outcome)?;
        self.finish(outcome, &report_dir)
    }

    fn apply(
        &self,
        repo: &GitRepo,
        validator: &PatchValidator,
        outcome: &mut ProcessOutcome,
    ) -> Result<()> {
        let options = &self.options;
        let touched = touched_paths(outcome);
        let head = repo.head_state()?;

        if let Some(requested) = &options.create_branch {
            let name = self.branch_name(repo, requested, &outcome.payload)?;
            if let Err(e) = ensure_untouched(repo, &touched) {
                outcome.success = false;
                outcome.error = Some(e.to_string());
                return Ok(());
            }
            repo.create_branch(&name, true)?;
            debug!("Working on new branch {name}");
            outcome.branch = Some(name);
            outcome.branch_created = true;
        } else {
            outcome.branch.clone_from(&outcome.original_branch);
        }

        let snapshots = repo.snapshot_paths(&touched)?;
        let targets: Vec<ValidationTarget> =
            outcome.validation.valid.iter().map(|r| r.target).collect();

        for target in targets {
            match apply_one(repo, validator, &outcome.payload, target) {
                Ok(ApplyStep::Applied(change)) => {
                    debug!("Applied {target} to {} via {:?}", change.file, change.method);
                    outcome.applied.push(change);
                }
                Ok(ApplyStep::AlreadyApplied(file)) => {
                    outcome.skipped.push(FailedChange {
                        target,
                        file,
                        reason: "already applied".to_string(),
                    });
                }
                Err(failure) => {
                    warn!("Failed to apply {target} to {}: {}", failure.file, failure.reason);
                    outcome.failed.push(failure);
                    if options.atomic {
                        rollback(repo, &snapshots, &head, created_branch(outcome))?;
                        outcome.rolled_back = true;
                        outcome.success = false;
                        outcome.error =
                            Some("Apply failed, all changes were rolled back".to_string());
                        return Ok(());
                    }
                }
            }
        }

        if outcome.applied.is_empty() {
            if let Some(branch) = created_branch(outcome).map(str::to_string) {
                repo.restore_head(&head)?;
                repo.delete_branch(&branch)?;
                debug!("Removed branch {branch}, nothing was applied");
                outcome.branch.clone_from(&outcome.original_branch);
                outcome.branch_created = false;
            }
            outcome.success = outcome.failed.is_empty();
            if !outcome.success {
                outcome.error = Some("No changes could be applied".to_string());
            }
            return Ok(());
        }

        outcome.success = outcome.failed.is_empty();
        if !outcome.success {
            outcome.error = Some(format!(
                "{} of {} changes failed to apply",
                outcome.failed.len(),
                outcome.failed.len() + outcome.applied.len()
            ));
        }

        if options.commit {
            let message = self.commit_message(outcome);
            let paths = outcome.applied_paths();
            repo.stage_paths(&paths)?;
            match repo.commit(&message, !options.no_verify) {
                Ok(result) => outcome.commit = Some(result),
                Err(e) => {
                    warn!("Commit failed: {e:#}");
                    outcome.success = false;
                    outcome.error = Some(format!("Commit failed: {e:#}"));
                }
            }
            outcome.commit_message = Some(message);
        }
        Ok(())
    }

    fn commit_message(&self, outcome: &ProcessOutcome) -> String {
        self.options
            .commit_message
            .as_ref()
            .filter(|m| !m.trim().is_empty())
            .or_else(|| outcome.payload.commits.first())
            .cloned()
            .unwrap_or_else(|| {
                format!("Apply LLM changes to {} file(s)", outcome.applied_paths().len())
            })
    }

    /// The requested branch name, or one derived from the response for
    /// [`AUTO_BRANCH`], made unique
    fn branch_name(
        &self,
        repo: &GitRepo,
        requested: &str,
        payload: &ResponsePayload,
    ) -> Result<String> {
        if requested != AUTO_BRANCH {
            return Ok(requested.to_string());
        }
        let source = payload
            .changes
            .iter()
            .map(|c| c.description.as_str())
            .find(|d| !d.trim().is_empty())
            .unwrap_or(payload.summary.as_str());
        let base = format!("{}{}", self.config.branch_prefix, branch_slug(source));
        repo.unique_branch_name(&base)
    }

    fn finish(&self, mut outcome: ProcessOutcome, report_dir: &Path) -> Result<ProcessOutcome> {
        outcome.reports = report::write_reports(&outcome, report_dir)?;
        Ok(outcome)
    }
}

fn created_branch(outcome: &ProcessOutcome) -> Option<&str> {
    if outcome.branch_created {
        outcome.branch.as_deref()
    } else {
        None
    }
}

/// Lowercase, runs of other characters collapsed to `-`, at most 30 chars
pub fn branch_slug(text: &str) -> String {
    let mut slug = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.chars().take(BRANCH_SLUG_LIMIT).collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Every path a valid change writes or removes
fn touched_paths(outcome: &ProcessOutcome) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for resolved in outcome.validation.valid.iter().filter_map(|r| r.resolved.as_ref()) {
        for path in std::iter::once(&resolved.path).chain(resolved.renamed_from.as_ref()) {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
    }
    paths
}

/// Refuse to branch off when the response touches files with local changes
fn ensure_untouched(repo: &GitRepo, touched: &[String]) -> Result<()> {
    let dirty: Vec<String> = repo
        .dirty_paths()?
        .into_iter()
        .filter(|path| touched.contains(path))
        .collect();
    if dirty.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "Uncommitted changes in files touched by the response: {}. Commit or stash them first.",
            dirty.join(", ")
        ))
    }
}

fn previews(outcome: &ProcessOutcome) -> Vec<PreviewChange> {
    outcome
        .validation
        .valid
        .iter()
        .filter_map(|result| {
            let resolved = result.resolved.as_ref()?;
            Some(PreviewChange {
                target: result.target,
                file: resolved.path.clone(),
                kind: resolved.kind,
                diff: resolved.diff.as_ref().map(crate::patch::FilePatch::to_unified),
                resulting_lines: resolved.new_content.as_ref().map(|c| c.lines().count()),
            })
        })
        .collect()
}

/// Re-validate against the current tree, so earlier changes to the same
/// file are taken into account, then write
fn apply_one(
    repo: &GitRepo,
    validator: &PatchValidator,
    payload: &ResponsePayload,
    target: ValidationTarget,
) -> Result<ApplyStep, FailedChange> {
    let result = match target {
        ValidationTarget::Patch(i) => payload.patches.get(i).map(|p| validator.validate(p)),
        ValidationTarget::Edit(i) => payload.edits.get(i).map(|e| validator.validate_edit(e)),
    }
    .ok_or_else(|| FailedChange {
        target,
        file: String::new(),
        reason: format!("{target} is missing from the response"),
    })?;

    if result.is_already_applied() {
        return Ok(ApplyStep::AlreadyApplied(result.file));
    }
    let Some(resolved) = result.resolved else {
        return Err(FailedChange {
            target,
            reason: result
                .reason
                .unwrap_or_else(|| "validation failed".to_string()),
            file: result.file,
        });
    };

    let method = write_resolved(repo, &resolved).map_err(|e| FailedChange {
        target,
        file: resolved.path.clone(),
        reason: format!("{e:#}"),
    })?;

    Ok(ApplyStep::Applied(AppliedChange {
        target,
        file: resolved.path,
        renamed_from: resolved.renamed_from,
        kind: resolved.kind,
        method,
    }))
}

/// Apply with `git apply` when there is a diff, falling back to writing the
/// resolved content
fn write_resolved(repo: &GitRepo, change: &ResolvedChange) -> Result<ApplyMethod> {
    // The tree may have changed since validation
    let full = contained_path(repo.repo_path(), &change.path)?;
    let old_full = change
        .renamed_from
        .as_deref()
        .map(|old| contained_path(repo.repo_path(), old))
        .transpose()?;

    if change.kind != PatchKind::Rename
        && let Some(diff) = &change.diff
    {
        let text = diff.to_unified();
        match repo
            .apply_patch_check(&text)
            .and_then(|()| repo.apply_patch(&text))
        {
            Ok(()) => return Ok(ApplyMethod::GitApply),
            Err(e) => debug!("git apply rejected {}, writing content instead: {e:#}", change.path),
        }
    }

    let method = match &change.new_content {
        Some(content) => {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&full, content).with_context(|| format!("Failed to write {}", change.path))?;
            ApplyMethod::Write
        }
        None => {
            fs::remove_file(&full).with_context(|| format!("Failed to delete {}", change.path))?;
            ApplyMethod::Delete
        }
    };

    if let Some(old_full) = old_full
        && old_full.exists()
    {
        fs::remove_file(&old_full)
            .with_context(|| format!("Failed to remove {}", old_full.display()))?;
    }
    Ok(method)
}

/// Put every touched file back and return to the original branch
fn rollback(
    repo: &GitRepo,
    snapshots: &[FileSnapshot],
    head: &HeadState,
    created_branch: Option<&str>,
) -> Result<()> {
    repo.restore_paths(snapshots)
        .context("Rollback could not restore every file")?;
    repo.restore_head(head)?;
    if let Some(branch) = created_branch {
        repo.delete_branch(branch)?;
    }
    debug!("Rolled back {} files", snapshots.len());
    Ok(())
}
