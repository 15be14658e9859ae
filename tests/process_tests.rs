use anyhow::Result;
use gitllm::config::Config;
use gitllm::features::process::{
    NO_CHANGES, NO_VALID_PATCHES, ProcessOptions, ProcessOutcome, ResponseProcessor, report,
};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

#[path = "test_utils.rs"]
mod test_utils;
use test_utils::{
    branch_exists, commit_count, head_branch, lib_rename_fn_diff, read_file, setup_git_repo,
    write_file, write_response,
};

const MAIN_DIFF: &str = "--- a/src/main.rs\n+++ b/src/main.rs\n@@ -1,3 +1,3 @@\n fn main() {\n-    println!(\"Hello\");\n+    println!(\"Hello, world\");\n }\n";

fn json_response(patches: &[(&str, &str)], files: &[(&str, &str)]) -> String {
    json!({
        "summary": "Rename add to sum",
        "changes": [
            {"file_path": "src/lib.rs", "change_type": "modify", "description": "Rename add to sum"}
        ],
        "patches": patches
            .iter()
            .map(|(file, diff)| json!({"file": file, "diff": diff}))
            .collect::<Vec<_>>(),
        "files": files
            .iter()
            .map(|(path, content)| json!({"path": path, "content": content}))
            .collect::<Vec<_>>(),
        "commits": ["refactor: rename add to sum"]
    })
    .to_string()
}

async fn run(
    repo: &Path,
    response: &Path,
    reports: &Path,
    tweak: impl FnOnce(&mut ProcessOptions),
) -> Result<ProcessOutcome> {
    let mut options = ProcessOptions {
        response_file: response.to_path_buf(),
        repo: Some(repo.to_path_buf()),
        report_dir: Some(reports.to_path_buf()),
        ..ProcessOptions::default()
    };
    tweak(&mut options);
    ResponseProcessor::new(options, Config::default()).process().await
}

#[tokio::test]
async fn test_apply_patch_and_new_file_on_current_branch() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let original_branch = head_branch(root);
    let (_response_dir, response) = write_response(
        &json_response(
            &[("src/lib.rs", lib_rename_fn_diff())],
            &[("src/greet.rs", "pub fn greet() {}\n")],
        ),
        "response.json",
    );
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| o.apply = true).await?;

    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(outcome.applied.len(), 2);
    assert!(read_file(root, "src/lib.rs").starts_with("pub fn sum("));
    assert_eq!(read_file(root, "src/greet.rs"), "pub fn greet() {}\n");
    assert_eq!(head_branch(root), original_branch);
    assert!(!outcome.branch_created);
    assert!(outcome.commit.is_none());

    // Applied without committing and a commit message is known
    let rendered = std::fs::read_to_string(reports.path().join(report::REPORT_FILE))?;
    assert!(rendered.starts_with("# LLM Implementation Report"));
    assert!(rendered.contains("- **Status:** success"));
    assert!(rendered.contains("| Applied | 2 |"));
    assert!(reports.path().join(report::SUMMARY_FILE).exists());
    let script = std::fs::read_to_string(reports.path().join(report::COMMIT_SCRIPT_FILE))?;
    assert!(script.contains("refactor: rename add to sum"));
    assert!(script.contains("src/greet.rs"));
    Ok(())
}

#[tokio::test]
async fn test_dry_run_leaves_tree_untouched() -> Result<()> {
    let (repo_dir, git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let text = json_response(&[("src/lib.rs", lib_rename_fn_diff())], &[]);
    let (_response_dir, response) = write_response(&text, "response.json");
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| {
        o.apply = true;
        o.dry_run = true;
        o.create_branch = Some("auto".to_string());
    })
    .await?;

    assert!(outcome.success);
    assert!(outcome.applied.is_empty());
    assert_eq!(outcome.previews.len(), 1);
    assert!(
        outcome.previews[0]
            .diff
            .as_deref()
            .is_some_and(|d| d.contains("+pub fn sum"))
    );
    assert_eq!(outcome.branch.as_deref(), Some("llm/rename-add-to-sum"));
    assert!(!branch_exists(root, "llm/rename-add-to-sum"));
    assert!(read_file(root, "src/lib.rs").starts_with("pub fn add("));
    assert!(git_repo.is_clean()?);
    Ok(())
}

#[tokio::test]
async fn test_validate_only_reports_and_accepts_already_applied() -> Result<()> {
    let (repo_dir, git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let text = json_response(&[("src/lib.rs", lib_rename_fn_diff())], &[]);
    let (_response_dir, response) = write_response(&text, "response.json");
    let reports = TempDir::new()?;

    let first = run(root, &response, reports.path(), |o| o.validate_only = true).await?;
    assert!(first.success);
    assert_eq!(first.validation.valid.len(), 1);
    assert!(git_repo.is_clean()?);

    run(root, &response, reports.path(), |o| o.apply = true).await?;

    let second = run(root, &response, reports.path(), |o| o.validate_only = true).await?;
    assert!(second.success);
    assert!(second.validation.valid.is_empty());
    assert!(second.validation.invalid[0].is_already_applied());

    // Applying again finds nothing left to do
    let again = run(root, &response, reports.path(), |o| o.apply = true).await?;
    assert!(!again.success);
    assert_eq!(again.error.as_deref(), Some(NO_VALID_PATCHES));
    Ok(())
}

#[tokio::test]
async fn test_auto_branch_and_commit() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let original_branch = head_branch(root);
    let text = json_response(&[("src/lib.rs", lib_rename_fn_diff())], &[]);
    let (_response_dir, response) = write_response(&text, "response.json");
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| {
        o.apply = true;
        o.create_branch = Some("auto".to_string());
        o.commit = true;
    })
    .await?;

    assert!(outcome.success, "error: {:?}", outcome.error);
    assert!(outcome.branch_created);
    assert_eq!(outcome.branch.as_deref(), Some("llm/rename-add-to-sum"));
    assert_eq!(head_branch(root), "llm/rename-add-to-sum");
    assert_eq!(outcome.original_branch.as_deref(), Some(original_branch.as_str()));
    assert_eq!(commit_count(root), 2);
    assert_eq!(
        outcome.commit_message.as_deref(),
        Some("refactor: rename add to sum")
    );
    let commit = outcome.commit.as_ref().expect("commit made");
    assert_eq!(commit.files_changed, 1);
    assert!(!reports.path().join(report::COMMIT_SCRIPT_FILE).exists());

    // A second auto branch gets a numeric suffix
    let (_other_dir, other) = write_response(
        &json_response(&[], &[("notes.txt", "remember\n")]),
        "response.json",
    );
    let next = run(root, &other, reports.path(), |o| {
        o.apply = true;
        o.create_branch = Some("auto".to_string());
    })
    .await?;
    assert_eq!(next.branch.as_deref(), Some("llm/rename-add-to-sum-2"));
    Ok(())
}

#[tokio::test]
async fn test_atomic_failure_rolls_everything_back() -> Result<()> {
    let (repo_dir, git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let original_branch = head_branch(root);
    let conflicting = "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,3 +1,3 @@\n-pub fn add(a: i32, b: i32) -> i32 {\n+pub fn plus(a: i32, b: i32) -> i32 {\n     a + b\n }\n";
    let (_response_dir, response) = write_response(
        &json_response(
            &[
                ("src/main.rs", MAIN_DIFF),
                ("src/lib.rs", lib_rename_fn_diff()),
                ("src/lib.rs", conflicting),
            ],
            &[],
        ),
        "response.json",
    );
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| {
        o.apply = true;
        o.atomic = true;
        o.create_branch = Some("feature/rename".to_string());
    })
    .await?;

    // Each patch is valid against the original tree
    assert_eq!(outcome.validation.valid.len(), 3);
    assert!(!outcome.success);
    assert!(outcome.rolled_back);
    assert_eq!(outcome.failed.len(), 1);
    assert!(read_file(root, "src/main.rs").contains("println!(\"Hello\");"));
    assert!(read_file(root, "src/lib.rs").starts_with("pub fn add("));
    assert_eq!(head_branch(root), original_branch);
    assert!(!branch_exists(root, "feature/rename"));
    assert!(git_repo.is_clean()?);
    Ok(())
}

#[tokio::test]
async fn test_non_atomic_failure_keeps_successful_changes() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let conflicting = "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,3 +1,3 @@\n-pub fn add(a: i32, b: i32) -> i32 {\n+pub fn plus(a: i32, b: i32) -> i32 {\n     a + b\n }\n";
    let (_response_dir, response) = write_response(
        &json_response(
            &[("src/lib.rs", lib_rename_fn_diff()), ("src/lib.rs", conflicting)],
            &[],
        ),
        "response.json",
    );
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| o.apply = true).await?;

    assert!(!outcome.success);
    assert!(!outcome.rolled_back);
    assert_eq!(outcome.applied.len(), 1);
    assert_eq!(outcome.failed.len(), 1);
    assert!(read_file(root, "src/lib.rs").starts_with("pub fn sum("));
    Ok(())
}

#[tokio::test]
async fn test_invalid_and_escaping_changes_are_rejected() -> Result<()> {
    let (repo_dir, git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let missing = "--- a/src/missing.rs\n+++ b/src/missing.rs\n@@ -1 +1 @@\n-a\n+b\n";
    let (_response_dir, response) = write_response(
        &json_response(&[("src/missing.rs", missing)], &[("../escape.txt", "owned\n")]),
        "response.json",
    );
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| o.apply = true).await?;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some(NO_VALID_PATCHES));
    assert_eq!(outcome.validation.invalid.len(), 2);
    let reasons: Vec<String> = outcome
        .validation
        .invalid
        .iter()
        .filter_map(|r| r.reason.clone())
        .collect();
    assert!(reasons.iter().any(|r| r.contains("file missing")));
    assert!(reasons.iter().any(|r| r.contains("outside repository")));
    assert!(!root.parent().expect("temp dir has a parent").join("escape.txt").exists());
    assert!(git_repo.is_clean()?);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_changes_through_symlinked_directory_are_rejected() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let outside = TempDir::new()?;
    write_file(outside.path(), "victim.txt", "keep\n");
    std::os::unix::fs::symlink(outside.path(), root.join("link"))?;

    let victim_diff = "--- a/link/victim.txt\n+++ b/link/victim.txt\n@@ -1 +1 @@\n-keep\n+owned\n";
    let (_response_dir, response) = write_response(
        &json_response(
            &[("link/victim.txt", victim_diff)],
            &[("link/evil.txt", "owned\n"), ("link/nested/evil.txt", "owned\n")],
        ),
        "response.json",
    );
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| o.apply = true).await?;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some(NO_VALID_PATCHES));
    assert_eq!(outcome.validation.invalid.len(), 3);
    assert!(
        outcome
            .validation
            .invalid
            .iter()
            .filter_map(|r| r.reason.as_deref())
            .all(|reason| reason.contains("outside repository"))
    );
    assert!(outcome.applied.is_empty());
    assert!(!outside.path().join("evil.txt").exists());
    assert!(!outside.path().join("nested").exists());
    assert_eq!(read_file(outside.path(), "victim.txt"), "keep\n");
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_inside_repository_is_followed() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let root = repo_dir.path();
    std::os::unix::fs::symlink(root.join("src"), root.join("code"))?;
    let (_response_dir, response) = write_response(
        &json_response(&[], &[("code/extra.rs", "pub fn extra() {}\n")]),
        "response.json",
    );
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| o.apply = true).await?;

    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(read_file(root, "src/extra.rs"), "pub fn extra() {}\n");
    Ok(())
}

#[tokio::test]
async fn test_response_without_changes() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let (_response_dir, response) = write_response("Everything looks fine.\n", "response.md");
    let reports = TempDir::new()?;

    let outcome = run(repo_dir.path(), &response, reports.path(), |o| o.apply = true).await?;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some(NO_CHANGES));
    Ok(())
}

#[tokio::test]
async fn test_branch_refused_when_touched_files_are_dirty() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let original_branch = head_branch(root);
    write_file(root, "src/main.rs", "fn main() {\n    println!(\"Hello\");\n}\n// local edit\n");
    let (_response_dir, response) =
        write_response(&json_response(&[("src/main.rs", MAIN_DIFF)], &[]), "response.json");
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| {
        o.apply = true;
        o.create_branch = Some("llm/try".to_string());
    })
    .await?;

    assert!(!outcome.success);
    assert!(
        outcome
            .error
            .as_deref()
            .is_some_and(|e| e.contains("src/main.rs"))
    );
    assert!(!branch_exists(root, "llm/try"));
    assert_eq!(head_branch(root), original_branch);
    assert!(read_file(root, "src/main.rs").ends_with("// local edit\n"));
    Ok(())
}

#[tokio::test]
async fn test_markdown_response_end_to_end() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let response_text = format!(
        "## Summary\n\nGreet the world.\n\n## Changes\n\nFile: src/main.rs\n```diff\n{MAIN_DIFF}```\n\n\
         Commit message: feat: greet the whole world\n"
    );
    let (_response_dir, response) = write_response(&response_text, "response.md");
    let reports = TempDir::new()?;

    let outcome = run(root, &response, reports.path(), |o| {
        o.apply = true;
        o.commit = true;
        o.no_verify = true;
    })
    .await?;

    assert!(outcome.success, "error: {:?}", outcome.error);
    assert!(read_file(root, "src/main.rs").contains("Hello, world"));
    assert_eq!(commit_count(root), 2);
    assert_eq!(
        outcome.commit_message.as_deref(),
        Some("feat: greet the whole world")
    );
    let report = std::fs::read_to_string(reports.path().join(report::REPORT_FILE))?;
    assert!(report.contains("src/main.rs"));
    Ok(())
}
