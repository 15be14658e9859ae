pub mod analyzer;
pub mod bundle;
pub mod cli;
pub mod commands;
pub mod common;
pub mod config;
pub mod features;
pub mod git;
pub mod logger;
pub mod patch;
pub mod prompts;
pub mod response;
pub mod ui;

// Re-export important structs and functions for easier testing
pub use analyzer::{ProjectAnalysis, ProjectAnalyzer};
pub use bundle::{ConvertOptions, ConvertOutcome, RepositoryConverter};
pub use config::Config;
pub use features::process::{ProcessOptions, ProcessOutcome, ResponseProcessor};
pub use features::workflow::{WorkflowOptions, WorkflowOutcome, run_workflow};
pub use git::GitRepo;
pub use patch::{PatchValidator, ValidationReport};
pub use prompts::{PromptContext, PromptManager};
pub use response::{ResponseParser, ResponsePayload};
