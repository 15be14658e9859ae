use anyhow::Result;
use gitllm::config::Config;
use gitllm::features::workflow::{PROMPT_FILE, WorkflowOptions, run_workflow};
use serde_json::json;
use tempfile::TempDir;

#[path = "test_utils.rs"]
mod test_utils;
use test_utils::{head_branch, lib_rename_fn_diff, read_file, setup_git_repo, write_response};

fn options(repo: &std::path::Path, output: &std::path::Path) -> WorkflowOptions {
    WorkflowOptions {
        repo: repo.to_path_buf(),
        template: "refactor".to_string(),
        output: output.to_path_buf(),
        response: None,
        apply: false,
        full: false,
        custom_request: None,
    }
}

fn config() -> Config {
    Config {
        count_tokens: false,
        templates_dir: None,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_workflow_without_response_writes_bundle_and_prompt() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let out = TempDir::new()?;

    let outcome = run_workflow(&options(repo_dir.path(), out.path()), &config()).await?;

    assert!(out.path().join("codebase.txt").exists());
    assert!(!out.path().join("documentation.txt").exists());
    assert!(!out.path().join("analysis.json").exists());
    assert_eq!(outcome.prompt_path, out.path().join(PROMPT_FILE));
    assert!(read_file(out.path(), PROMPT_FILE).contains("## Response format"));
    assert!(outcome.process.is_none());
    assert!(outcome.next_steps().iter().any(|s| s.contains("--dry-run")));
    Ok(())
}

#[tokio::test]
async fn test_full_workflow_with_applied_response() -> Result<()> {
    let (repo_dir, _git_repo) = setup_git_repo();
    let root = repo_dir.path();
    let out = TempDir::new()?;
    let response = json!({
        "summary": "Rename add",
        "changes": [{"file_path": "src/lib.rs", "change_type": "modify", "description": "Rename add to sum"}],
        "patches": [{"file": "src/lib.rs", "diff": lib_rename_fn_diff()}]
    })
    .to_string();
    let (_response_dir, response_path) = write_response(&response, "response.json");

    let opts = WorkflowOptions {
        response: Some(response_path),
        apply: true,
        full: true,
        custom_request: Some("Prefer short names".to_string()),
        ..options(root, out.path())
    };
    let outcome = run_workflow(&opts, &config()).await?;

    assert!(out.path().join("documentation.txt").exists());
    assert!(out.path().join("analysis.json").exists());
    assert!(read_file(out.path(), PROMPT_FILE).contains("Prefer short names"));

    let process = outcome.process.as_ref().expect("response processed");
    assert!(process.success, "error: {:?}", process.error);
    assert_eq!(process.branch.as_deref(), Some("llm/rename-add-to-sum"));
    assert_eq!(head_branch(root), "llm/rename-add-to-sum");
    assert!(read_file(root, "src/lib.rs").starts_with("pub fn sum("));
    // Reports land next to the bundle
    assert!(out.path().join("llm_implementation_report.md").exists());
    assert!(outcome.next_steps().iter().any(|s| s.contains("git diff")));
    Ok(())
}

#[tokio::test]
async fn test_unknown_template_fails_before_converting() {
    let (repo_dir, _git_repo) = setup_git_repo();
    let out = TempDir::new().expect("temp dir");
    let opts = WorkflowOptions {
        template: "nonsense".to_string(),
        ..options(repo_dir.path(), &out.path().join("bundle"))
    };

    let result = run_workflow(&opts, &config()).await;
    assert!(result.is_err());
    assert!(!out.path().join("bundle").exists());
}
