use crate::git::CommitResult;
use crate::patch::{PatchKind, ValidationReport, ValidationTarget};
use crate::response::ResponsePayload;

use serde::Serialize;
use std::path::PathBuf;

/// Branch name that asks for a name derived from the response
pub const AUTO_BRANCH: &str = "auto";

/// Inputs of one `process` run
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProcessOptions {
    pub response_file: PathBuf,
    /// Repository to apply to, the current directory when `None`
    pub repo: Option<PathBuf>,
    pub apply: bool,
    pub dry_run: bool,
    /// Branch to create before applying, or [`AUTO_BRANCH`]
    pub create_branch: Option<String>,
    pub validate_only: bool,
    pub commit: bool,
    pub commit_message: Option<String>,
    /// Roll everything back on the first failure
    pub atomic: bool,
    pub no_verify: bool,
    /// Where reports are written, the repository root when `None`
    pub report_dir: Option<PathBuf>,
}

/// How an applied change reached the work tree
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMethod {
    /// `git apply`
    GitApply,
    /// Resolved content written directly
    Write,
    Delete,
}

#[derive(Serialize, Debug, Clone)]
pub struct AppliedChange {
    pub target: ValidationTarget,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
    pub kind: PatchKind,
    pub method: ApplyMethod,
}

#[derive(Serialize, Debug, Clone)]
pub struct FailedChange {
    pub target: ValidationTarget,
    pub file: String,
    pub reason: String,
}

/// What a dry run would do to one file
#[derive(Serialize, Debug, Clone)]
pub struct PreviewChange {
    pub target: ValidationTarget,
    pub file: String,
    pub kind: PatchKind,
    /// Unified diff with hunks at the positions they matched
    pub diff: Option<String>,
    /// Lines in the file after the change, `None` for deletions
    pub resulting_lines: Option<usize>,
}

/// Result of a `process` run
#[derive(Debug, Clone, Default)]
pub struct ProcessOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub payload: ResponsePayload,
    /// Work tree root the response was validated against
    pub repo_root: PathBuf,
    pub validation: ValidationReport,
    pub previews: Vec<PreviewChange>,
    pub applied: Vec<AppliedChange>,
    pub failed: Vec<FailedChange>,
    /// Valid at validation time but already present when applied
    pub skipped: Vec<FailedChange>,
    pub original_branch: Option<String>,
    pub branch: Option<String>,
    pub branch_created: bool,
    pub commit: Option<CommitResult>,
    pub commit_message: Option<String>,
    pub rolled_back: bool,
    pub reports: Vec<PathBuf>,
}

impl ProcessOutcome {
    pub fn valid_patches(&self) -> usize {
        self.validation.valid.len()
    }

    pub fn failure(payload: ResponsePayload, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            payload,
            ..Self::default()
        }
    }

    /// Paths written or deleted, in application order without duplicates
    pub fn applied_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for change in &self.applied {
            for path in std::iter::once(&change.file).chain(change.renamed_from.as_ref()) {
                if !paths.contains(path) {
                    paths.push(path.clone());
                }
            }
        }
        paths
    }
}
