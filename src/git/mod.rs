// Git module: repository state through git2, patch application through the git CLI

mod apply;
mod commit;
mod hooks;
mod repository;

// Re-export primary types for public use
pub use apply::{git_apply, is_git_available};
pub use commit::{CommitResult, format_commit_result};
pub use repository::{FileSnapshot, GitRepo, HeadState};
