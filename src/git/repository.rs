use super::apply;
use super::commit::{self, CommitResult};
use super::hooks;

use anyhow::{Context as AnyhowContext, Result, anyhow};
use git2::{BranchType, Oid, Repository, StatusOptions, build::CheckoutBuilder};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Original bytes of a work tree file, `None` when the file did not exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub path: String,
    pub content: Option<Vec<u8>>,
}

/// Where HEAD pointed before the pipeline touched it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// HEAD is a symbolic ref to a local branch (possibly unborn)
    Branch(String),
    /// HEAD points directly at a commit
    Detached(Oid),
}

/// Represents a Git work tree and provides methods for interacting with it.
pub struct GitRepo {
    repo_path: PathBuf,
}

impl GitRepo {
    /// Opens the repository containing `path`.
    ///
    /// The stored path is the root of the work tree, whichever directory inside
    /// the repository was given. Bare repositories are rejected.
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .with_context(|| format!("Not a Git repository: {}", path.display()))?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| anyhow!("Repository at {} has no working directory", path.display()))?;
        Ok(Self {
            repo_path: workdir.to_path_buf(),
        })
    }

    /// Open the repository at the stored path
    pub fn open_repo(&self) -> Result<Repository, git2::Error> {
        Repository::open(&self.repo_path)
    }

    /// Returns the work tree root
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Retrieves the current branch name.
    ///
    /// Fresh repositories without commits report the unborn branch name, and
    /// a detached HEAD reports `HEAD detached`.
    pub fn current_branch(&self) -> Result<String> {
        match self.head_state()? {
            HeadState::Branch(name) => Ok(name),
            HeadState::Detached(_) => Ok("HEAD detached".to_string()),
        }
    }

    /// Short hash of the HEAD commit, `None` in an empty repository
    pub fn head_short_id(&self) -> Option<String> {
        let repo = self.open_repo().ok()?;
        let head = repo.head().ok()?.peel_to_commit().ok()?;
        let id = head.id().to_string();
        Some(id[..id.len().min(7)].to_string())
    }

    /// URL of `origin`, or of the first remote if there is no `origin`
    pub fn remote_url(&self) -> Option<String> {
        let repo = self.open_repo().ok()?;
        if let Ok(remote) = repo.find_remote("origin") {
            return remote.url().map(ToString::to_string);
        }
        let remotes = repo.remotes().ok()?;
        let name = remotes.iter().flatten().next()?;
        let remote = repo.find_remote(name).ok()?;
        remote.url().map(ToString::to_string)
    }

    /// Capture where HEAD points so it can be restored later
    pub fn head_state(&self) -> Result<HeadState> {
        let repo = self.open_repo()?;
        if repo.head_detached().unwrap_or(false) {
            let oid = repo
                .head()?
                .target()
                .ok_or_else(|| anyhow!("Detached HEAD without a target"))?;
            return Ok(HeadState::Detached(oid));
        }

        // Works for unborn branches too, where `repo.head()` fails
        let head_ref = repo.find_reference("HEAD")?;
        let target = head_ref
            .symbolic_target()
            .ok_or_else(|| anyhow!("HEAD is not a symbolic reference"))?;
        let name = target.strip_prefix("refs/heads/").unwrap_or(target);
        debug!("Current branch: {name}");
        Ok(HeadState::Branch(name.to_string()))
    }

    /// Point HEAD back at a previously captured state without touching files
    pub fn restore_head(&self, state: &HeadState) -> Result<()> {
        let repo = self.open_repo()?;
        match state {
            HeadState::Branch(name) => repo.set_head(&format!("refs/heads/{name}"))?,
            HeadState::Detached(oid) => repo.set_head_detached(*oid)?,
        }
        debug!("Restored HEAD to {state:?}");
        Ok(())
    }

    /// Paths with staged, unstaged or untracked changes, relative to the root
    pub fn dirty_paths(&self) -> Result<Vec<String>> {
        let repo = self.open_repo()?;
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);

        let statuses = repo.statuses(Some(&mut options))?;
        let mut paths: Vec<String> = statuses
            .iter()
            .filter(|entry| !entry.status().is_ignored())
            .filter_map(|entry| entry.path().map(ToString::to_string))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Whether the work tree has no changes at all
    pub fn is_clean(&self) -> Result<bool> {
        Ok(self.dirty_paths()?.is_empty())
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool> {
        let repo = self.open_repo()?;
        Ok(repo.find_branch(name, BranchType::Local).is_ok())
    }

    /// First free branch name: `base`, then `base-2`, `base-3`, ...
    pub fn unique_branch_name(&self, base: &str) -> Result<String> {
        if !self.branch_exists(base)? {
            return Ok(base.to_string());
        }
        for n in 2..1000 {
            let candidate = format!("{base}-{n}");
            if !self.branch_exists(&candidate)? {
                return Ok(candidate);
            }
        }
        Err(anyhow!("Could not find a free branch name for '{base}'"))
    }

    /// Create a local branch at HEAD, optionally switching to it.
    ///
    /// In a repository without commits the branch cannot exist yet, so with
    /// `checkout` HEAD is simply pointed at the unborn branch.
    pub fn create_branch(&self, name: &str, checkout: bool) -> Result<()> {
        if git2::Branch::name_is_valid(name).is_ok_and(|valid| !valid) {
            return Err(anyhow!("Invalid branch name: '{name}'"));
        }
        if self.branch_exists(name)? {
            return Err(anyhow!("Branch '{name}' already exists"));
        }

        let repo = self.open_repo()?;
        match repo.head() {
            Ok(head) => {
                let commit = head.peel_to_commit()?;
                repo.branch(name, &commit, false)
                    .with_context(|| format!("Failed to create branch '{name}'"))?;
                debug!("Created branch {name} at {}", commit.id());
                if checkout {
                    self.checkout_branch(name)?;
                }
            }
            Err(_) if checkout => {
                repo.set_head(&format!("refs/heads/{name}"))?;
                debug!("Pointed HEAD at unborn branch {name}");
            }
            Err(e) => return Err(anyhow!("Cannot create branch without commits: {e}")),
        }
        Ok(())
    }

    /// Switch to a local branch, keeping local modifications
    pub fn checkout_branch(&self, name: &str) -> Result<()> {
        let repo = self.open_repo()?;
        let refname = format!("refs/heads/{name}");
        let target = repo
            .revparse_single(&refname)
            .with_context(|| format!("Branch '{name}' not found"))?;

        repo.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))
            .with_context(|| format!("Failed to check out '{name}'"))?;
        repo.set_head(&refname)?;
        debug!("Checked out {name}");
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let repo = self.open_repo()?;
        match repo.find_branch(name, BranchType::Local) {
            Ok(mut branch) => {
                branch
                    .delete()
                    .with_context(|| format!("Failed to delete branch '{name}'"))?;
                debug!("Deleted branch {name}");
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }

    /// Test whether a unified diff applies with `git apply --check`
    pub fn apply_patch_check(&self, patch: &str) -> Result<()> {
        apply::git_apply(&self.repo_path, patch, true)
    }

    /// Apply a unified diff to the work tree with `git apply`
    pub fn apply_patch(&self, patch: &str) -> Result<()> {
        apply::git_apply(&self.repo_path, patch, false)
    }

    /// Stage the given paths; paths missing from disk are staged as deletions
    pub fn stage_paths(&self, paths: &[String]) -> Result<()> {
        let repo = self.open_repo()?;
        let mut index = repo.index()?;
        for path in paths {
            let relative = Path::new(path);
            if self.repo_path.join(relative).exists() {
                index
                    .add_path(relative)
                    .with_context(|| format!("Failed to stage {path}"))?;
            } else {
                index
                    .remove_path(relative)
                    .with_context(|| format!("Failed to stage deletion of {path}"))?;
            }
        }
        index.write()?;
        debug!("Staged {} paths", paths.len());
        Ok(())
    }

    /// Capture the current bytes of each path so they can be restored later
    pub fn snapshot_paths(&self, paths: &[String]) -> Result<Vec<FileSnapshot>> {
        paths
            .iter()
            .map(|path| {
                let full = self.repo_path.join(path);
                let content = if full.is_file() {
                    Some(
                        fs::read(&full)
                            .with_context(|| format!("Failed to snapshot {}", full.display()))?,
                    )
                } else {
                    None
                };
                Ok(FileSnapshot {
                    path: path.clone(),
                    content,
                })
            })
            .collect()
    }

    /// Write snapshots back to disk; files that did not exist are removed.
    ///
    /// Every snapshot is attempted; the first error is returned afterwards.
    pub fn restore_paths(&self, snapshots: &[FileSnapshot]) -> Result<()> {
        let mut first_error = None;
        for snapshot in snapshots {
            let full = self.repo_path.join(&snapshot.path);
            let result = match &snapshot.content {
                Some(bytes) => full
                    .parent()
                    .map_or(Ok(()), fs::create_dir_all)
                    .and_then(|()| fs::write(&full, bytes)),
                None if full.exists() => fs::remove_file(&full),
                None => Ok(()),
            };
            match result {
                Ok(()) => debug!("Restored {}", snapshot.path),
                Err(e) => {
                    debug!("Failed to restore {}: {e}", snapshot.path);
                    first_error.get_or_insert_with(|| {
                        anyhow!("Failed to restore {}: {e}", snapshot.path)
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Executes a Git hook if the repository defines it
    pub fn execute_hook(&self, hook_name: &str) -> Result<()> {
        let repo = self.open_repo()?;
        hooks::execute_hook(&repo, hook_name)
    }

    /// Commit the index, running pre- and post-commit hooks when `verify` is set.
    ///
    /// A failing pre-commit hook aborts the commit; a failing post-commit hook
    /// is only logged.
    pub fn commit(&self, message: &str, verify: bool) -> Result<CommitResult> {
        if verify {
            debug!("Executing pre-commit hook");
            self.execute_hook("pre-commit")?;
        }

        let repo = self.open_repo()?;
        let result = commit::commit(&repo, message)?;

        if verify && let Err(e) = self.execute_hook("post-commit") {
            debug!("Post-commit hook failed: {e}");
        }
        Ok(result)
    }
}
