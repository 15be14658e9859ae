//! Carrying a model response into the repository

pub mod report;
mod service;
pub mod types;

pub use service::{NO_CHANGES, NO_VALID_PATCHES, ResponseProcessor, branch_slug};
pub use types::{
    AUTO_BRANCH, AppliedChange, ApplyMethod, FailedChange, PreviewChange, ProcessOptions,
    ProcessOutcome,
};
