use anyhow::{Context, Result, anyhow};
use log::debug;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::NamedTempFile;

/// Whether a `git` executable can be run
pub fn is_git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

/// Run `git apply` on a patch in the given work tree.
///
/// With `check_only` the patch is only tested (`--check`) and nothing on disk
/// changes. The patch text goes through a temporary file so that large diffs
/// do not hit argument limits.
pub fn git_apply(workdir: &Path, patch: &str, check_only: bool) -> Result<()> {
    let mut file = NamedTempFile::new().context("Failed to create temporary patch file")?;
    file.write_all(patch.as_bytes())
        .context("Failed to write temporary patch file")?;
    if !patch.ends_with('\n') {
        file.write_all(b"\n")
            .context("Failed to write temporary patch file")?;
    }
    file.flush().context("Failed to flush temporary patch file")?;

    let mut command = Command::new("git");
    command.arg("-C").arg(workdir).arg("apply");
    if check_only {
        command.arg("--check");
    }
    command
        .args(["--recount", "--whitespace=nowarn"])
        .arg(file.path());

    debug!("Running {command:?}");
    let out = command
        .output()
        .context("Failed to run git apply; is git installed?")?;

    if out.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&out.stderr);
        Err(anyhow!(
            "git apply{} failed: {}",
            if check_only { " --check" } else { "" },
            stderr.trim()
        ))
    }
}
