use crate::config::Config;
use crate::features::process::{AUTO_BRANCH, ProcessOptions};

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments shared by `git-llm convert` and `git2llm`
#[derive(Args, Clone, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ConvertArgs {
    /// Repository to convert
    #[arg(default_value = ".", help = "Path to the Git repository")]
    pub repo_path: PathBuf,

    /// Output directory
    #[arg(short, long, help = "Output directory (default: gitllm.outputdir or llm_analysis)")]
    pub output: Option<PathBuf>,

    /// Largest file to include, in MB
    #[arg(long = "max-size", value_name = "MB", help = "Maximum file size in MB")]
    pub max_size: Option<u64>,

    /// Split the codebase bundle above this size, in MB
    #[arg(
        long = "max-bundle-size",
        value_name = "MB",
        help = "Split codebase.txt into parts of at most this many MB"
    )]
    pub max_bundle_size: Option<u64>,

    #[arg(long, conflicts_with = "no_docs", help = "Write documentation.txt")]
    pub include_docs: bool,

    #[arg(long, help = "Leave documentation files out")]
    pub no_docs: bool,

    #[arg(long, help = "Do not redact secrets")]
    pub no_sanitize: bool,

    #[arg(long, help = "Skip token estimates in summary.md")]
    pub no_tokens: bool,
}

impl ConvertArgs {
    /// Overlay the flags that were given onto the configuration
    pub fn apply_to_config(&self, config: &mut Config) -> Result<()> {
        if let Some(size) = self.max_size {
            config.apply("maxfilesize", &size.to_string())?;
        }
        if let Some(size) = self.max_bundle_size {
            config.apply("maxbundlesize", &size.to_string())?;
        }
        if self.include_docs {
            config.include_docs = true;
        }
        if self.no_docs {
            config.include_docs = false;
        }
        if self.no_sanitize {
            config.sanitize = false;
        }
        if self.no_tokens {
            config.count_tokens = false;
        }
        if let Some(output) = &self.output {
            config.apply("outputdir", &output.display().to_string())?;
        }
        Ok(())
    }
}

/// Arguments shared by `git-llm process` and `llm2git`
#[derive(Args, Clone, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProcessArgs {
    /// File holding the model's response
    #[arg(help = "LLM response file (JSON, markdown or text)")]
    pub response_file: PathBuf,

    #[arg(long, default_value = ".", help = "Repository to apply changes to")]
    pub repo: PathBuf,

    #[arg(long, help = "Apply valid patches to the working tree")]
    pub apply: bool,

    #[arg(long, help = "Show what would be applied without writing anything")]
    pub dry_run: bool,

    /// Branch to create first; `auto` derives one from the response.
    /// A name must be attached with `=` so a following response path is not
    /// taken as the branch.
    #[arg(
        long,
        value_name = "NAME",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = AUTO_BRANCH,
        help = "Create and switch to a branch first (`--create-branch=NAME`, bare flag derives a name)"
    )]
    pub create_branch: Option<String>,

    #[arg(long, help = "Only validate patches, never write")]
    pub validate_only: bool,

    #[arg(long, help = "Commit the applied changes")]
    pub commit: bool,

    #[arg(
        long,
        value_name = "MESSAGE",
        help = "Commit message (default: first message in the response)"
    )]
    pub commit_message: Option<String>,

    #[arg(long, help = "Roll back every change if any change fails")]
    pub atomic: bool,

    #[arg(long, help = "Skip pre-commit and post-commit hooks")]
    pub no_verify: bool,

    #[arg(
        long,
        value_name = "DIR",
        help = "Where to write reports (default: repository root)"
    )]
    pub report_dir: Option<PathBuf>,
}

impl ProcessArgs {
    pub fn to_options(&self) -> ProcessOptions {
        ProcessOptions {
            response_file: self.response_file.clone(),
            repo: Some(self.repo.clone()),
            apply: self.apply,
            dry_run: self.dry_run,
            create_branch: self.create_branch.clone(),
            validate_only: self.validate_only,
            commit: self.commit,
            commit_message: self.commit_message.clone(),
            atomic: self.atomic,
            no_verify: self.no_verify,
            report_dir: self.report_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_flags_override_config() {
        let args = ConvertArgs {
            max_size: Some(5),
            no_docs: true,
            no_sanitize: true,
            output: Some(PathBuf::from("out")),
            ..ConvertArgs::default()
        };
        let mut config = Config::default();
        args.apply_to_config(&mut config).expect("flags apply");

        assert_eq!(config.max_file_size_mb, 5);
        assert!(!config.include_docs);
        assert!(!config.sanitize);
        assert!(config.count_tokens);
        assert_eq!(config.output_dir, "out");
    }
}
