//! Convert, prompt and optionally process in one go

use super::process::{AUTO_BRANCH, ProcessOptions, ProcessOutcome, ResponseProcessor};
use crate::bundle::{ConvertOptions, ConvertOutcome, RepositoryConverter};
use crate::config::Config;
use crate::prompts::{PromptContext, PromptManager};

use anyhow::{Context, Result};
use log::debug;
use std::path::PathBuf;

pub const PROMPT_FILE: &str = "prompt.md";

#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub repo: PathBuf,
    pub template: String,
    pub output: PathBuf,
    pub response: Option<PathBuf>,
    pub apply: bool,
    /// Include documentation and write the full analysis
    pub full: bool,
    pub custom_request: Option<String>,
}

#[derive(Debug)]
pub struct WorkflowOutcome {
    pub convert: ConvertOutcome,
    pub prompt_path: PathBuf,
    pub process: Option<ProcessOutcome>,
}

impl WorkflowOutcome {
    /// What the user should do next
    pub fn next_steps(&self) -> Vec<String> {
        let dir = self.convert.output_dir.display();
        match &self.process {
            None => vec![
                format!(
                    "Send {} together with {dir}/codebase.txt to your LLM",
                    self.prompt_path.display()
                ),
                "Save the answer to a file, e.g. response.md".to_string(),
                "Run: git-llm process response.md --dry-run".to_string(),
                "Then: git-llm process response.md --apply --create-branch".to_string(),
            ],
            Some(process) if process.applied.is_empty() => vec![
                "Nothing was applied; read llm_implementation_report.md for the reasons".to_string(),
            ],
            Some(process) if process.commit.is_some() => {
                vec!["Review the commit with: git show --stat".to_string()]
            }
            Some(process) => {
                let mut steps = vec!["Review the changes with: git diff".to_string()];
                if let Some(branch) = &process.branch {
                    steps.push(format!("Changes are on branch {branch}"));
                }
                steps.push("Commit with: git add -A && git commit".to_string());
                steps
            }
        }
    }
}

pub async fn run_workflow(options: &WorkflowOptions, config: &Config) -> Result<WorkflowOutcome> {
    let mut convert_options = ConvertOptions::from_config(config);
    convert_options.include_docs = options.full;
    convert_options.write_analysis = options.full;

    let manager = PromptManager::from_config(config)?;
    // Fail on an unknown template before doing any work
    manager.source(&options.template)?;

    debug!("Workflow step 1: converting {}", options.repo.display());
    let convert = RepositoryConverter::new(&options.repo, &options.output, convert_options)
        .convert()
        .await?;

    debug!("Workflow step 2: rendering the {} prompt", options.template);
    let context = PromptContext::from_analysis(
        &options.repo,
        &convert.analysis,
        options.custom_request.as_deref(),
    )?;
    let prompt = manager.render(&options.template, &context)?;
    let prompt_path = options.output.join(PROMPT_FILE);
    tokio::fs::write(&prompt_path, prompt)
        .await
        .with_context(|| format!("Failed to write {}", prompt_path.display()))?;

    let process = match &options.response {
        Some(response) => {
            debug!("Workflow step 3: processing {}", response.display());
            let process_options = ProcessOptions {
                response_file: response.clone(),
                repo: Some(options.repo.clone()),
                apply: options.apply,
                create_branch: options.apply.then(|| AUTO_BRANCH.to_string()),
                report_dir: Some(options.output.clone()),
                ..ProcessOptions::default()
            };
            Some(
                ResponseProcessor::new(process_options, config.clone())
                    .process()
                    .await?,
            )
        }
        None => None,
    };

    Ok(WorkflowOutcome {
        convert,
        prompt_path,
        process,
    })
}
