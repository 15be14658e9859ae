pub mod process;
pub mod workflow;
