#![allow(dead_code)]

use anyhow::Result;
use git2::{Repository, Signature};
use gitllm::git::GitRepo;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write `content` to `relative` under `root`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, content).expect("Failed to write file");
}

pub fn read_file(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).expect("Failed to read file")
}

/// Stage everything and commit it on HEAD
pub fn commit_all(root: &Path, message: &str) -> Result<()> {
    let repo = Repository::open(root)?;
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let signature = Signature::now("Test User", "test@example.com")?;
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    Ok(())
}

/// An initialized repository with a user configured and one commit holding
/// a small Rust project
pub fn setup_git_repo() -> (TempDir, GitRepo) {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let repo = Repository::init(temp_dir.path()).expect("Failed to initialize repository");
    {
        let mut config = repo.config().expect("Failed to open repository config");
        config
            .set_str("user.name", "Test User")
            .expect("Failed to set user.name");
        config
            .set_str("user.email", "test@example.com")
            .expect("Failed to set user.email");
    }

    write_file(temp_dir.path(), "README.md", "# Demo\n\nA demo project.\n");
    write_file(
        temp_dir.path(),
        "Cargo.toml",
        "[package]\nname = \"demo\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
    );
    write_file(
        temp_dir.path(),
        "src/main.rs",
        "fn main() {\n    println!(\"Hello\");\n}\n",
    );
    write_file(
        temp_dir.path(),
        "src/lib.rs",
        "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n",
    );
    commit_all(temp_dir.path(), "Initial commit").expect("Failed to create initial commit");

    let git_repo = GitRepo::open(temp_dir.path()).expect("Failed to open GitRepo");
    (temp_dir, git_repo)
}

/// Write a response file into a separate temporary directory
pub fn write_response(content: &str, name: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let path = dir.path().join(name);
    fs::write(&path, content).expect("Failed to write response");
    (dir, path)
}

/// Name of the branch HEAD points at
pub fn head_branch(root: &Path) -> String {
    let repo = Repository::open(root).expect("Failed to open repository");
    let head = repo.head().expect("HEAD should resolve");
    head.shorthand().unwrap_or("HEAD").to_string()
}

pub fn branch_exists(root: &Path, name: &str) -> bool {
    let repo = Repository::open(root).expect("Failed to open repository");
    repo.find_branch(name, git2::BranchType::Local).is_ok()
}

/// Number of commits reachable from HEAD
pub fn commit_count(root: &Path) -> usize {
    let repo = Repository::open(root).expect("Failed to open repository");
    let mut walk = repo.revwalk().expect("Failed to create revwalk");
    walk.push_head().expect("Failed to push HEAD");
    walk.count()
}

/// A unified diff changing `add` into `sum` in `src/lib.rs`
pub fn lib_rename_fn_diff() -> &'static str {
    "--- a/src/lib.rs\n+++ b/src/lib.rs\n@@ -1,3 +1,3 @@\n-pub fn add(a: i32, b: i32) -> i32 {\n+pub fn sum(a: i32, b: i32) -> i32 {\n     a + b\n }\n"
}
