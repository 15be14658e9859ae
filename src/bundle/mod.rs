//! Repository to text bundle conversion

mod converter;
pub mod render;
pub mod sanitizer;
mod tokens;
pub mod walker;

pub use converter::{ConvertOptions, ConvertOutcome, ConvertStats, RepositoryConverter};
pub use sanitizer::{Sanitized, sanitize, sanitize_file};
pub use tokens::{TokenCounter, TokenError};
pub use walker::{RepoFile, RepoWalker, WalkStats};
