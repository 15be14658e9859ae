use anyhow::{Context, Result};
use git2::{Delta, FileMode, Repository, Signature};
use log::debug;
use serde::Serialize;
use std::fmt::Write;

/// Summary of a commit, shaped like `git commit` output
#[derive(Serialize, Debug, Clone)]
pub struct CommitResult {
    pub branch: String,
    pub commit_hash: String,
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
    #[serde(serialize_with = "serialize_new_files")]
    pub new_files: Vec<(String, FileMode)>,
}

fn serialize_new_files<S>(files: &[(String, FileMode)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(files.iter().map(|(path, _)| path))
}

/// Commit the current index on HEAD
pub fn commit(repo: &Repository, message: &str) -> Result<CommitResult> {
    let signature = repo
        .signature()
        .or_else(|_| Signature::now("git-llm", "git-llm@localhost"))
        .context("Failed to build commit signature")?;

    let mut index = repo.index()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(_) => None, // unborn branch, first commit
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let oid = repo
        .commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )
        .context("Failed to create commit")?;
    debug!("Created commit {oid}");

    let parent_tree = match &parent {
        Some(commit) => Some(commit.tree()?),
        None => None,
    };
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    let stats = diff.stats()?;

    let new_files = diff
        .deltas()
        .filter(|delta| delta.status() == Delta::Added)
        .filter_map(|delta| {
            let file = delta.new_file();
            file.path()
                .map(|p| (p.to_string_lossy().into_owned(), file.mode()))
        })
        .collect();

    let branch = repo
        .head()
        .ok()
        .and_then(|h| h.shorthand().map(ToString::to_string))
        .unwrap_or_else(|| "HEAD".to_string());

    let hash = oid.to_string();
    Ok(CommitResult {
        branch,
        commit_hash: hash[..hash.len().min(7)].to_string(),
        files_changed: stats.files_changed(),
        insertions: stats.insertions(),
        deletions: stats.deletions(),
        new_files,
    })
}

fn counted(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Render a commit the way `git commit` reports it
pub fn format_commit_result(result: &CommitResult, message: &str) -> String {
    let subject = message.lines().next().unwrap_or_default();
    let mut output = format!("[{} {}] {subject}\n", result.branch, result.commit_hash);
    writeln!(
        output,
        " {} changed, {}(+), {}(-)",
        counted(result.files_changed, "file"),
        counted(result.insertions, "insertion"),
        counted(result.deletions, "deletion"),
    )
    .expect("writing to string should never fail");
    for (path, mode) in &result.new_files {
        writeln!(output, " create mode {:06o} {path}", u32::from(*mode))
            .expect("writing to string should never fail");
    }
    output
}
