//! Client-side hooks around commits made by the apply pipeline

use anyhow::{Context as AnyhowContext, Result, anyhow};
use git2::Repository;
use log::debug;
use std::path::PathBuf;
use std::process::Command;

/// Directory holding the hooks, honoring `core.hooksPath`
fn hooks_dir(repo: &Repository) -> PathBuf {
    let configured = repo
        .config()
        .and_then(|config| config.get_path("core.hooksPath"));
    match (configured, repo.workdir()) {
        (Ok(path), Some(workdir)) if path.is_relative() => workdir.join(path),
        (Ok(path), _) => path,
        (Err(_), _) => repo.path().join("hooks"),
    }
}

/// Run `hook_name` if the repository defines it.
///
/// The hook runs from the top of the work tree. Its output is passed through
/// to the terminal; a non-zero exit turns into an error carrying its stderr.
pub fn execute_hook(repo: &Repository, hook_name: &str) -> Result<()> {
    let hook = hooks_dir(repo).join(hook_name);
    if !hook.is_file() {
        debug!("No {hook_name} hook at {}", hook.display());
        return Ok(());
    }
    let workdir = repo
        .workdir()
        .ok_or_else(|| anyhow!("Cannot run {hook_name} in a bare repository"))?;

    debug!("Running {hook_name} hook: {}", hook.display());
    let output = Command::new(&hook)
        .current_dir(workdir)
        .env("GIT_DIR", repo.path())
        .env("GIT_WORK_TREE", workdir)
        .output()
        .with_context(|| format!("Failed to start {hook_name} hook"))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        print!("{stdout}");
    }
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        if !stderr.trim().is_empty() {
            eprint!("{stderr}");
        }
        return Ok(());
    }
    let code = output
        .status
        .code()
        .map_or_else(|| "a signal".to_string(), |c| format!("code {c}"));
    match stderr.trim() {
        "" => Err(anyhow!("{hook_name} hook exited with {code}")),
        detail => Err(anyhow!("{hook_name} hook exited with {code}: {detail}")),
    }
}
