use crate::bundle::{ConvertOptions, RepositoryConverter};
use crate::common::{ConvertArgs, ProcessArgs};
use crate::config::{CONFIG_KEYS, Config};
use crate::features::process::{ProcessOutcome, ResponseProcessor};
use crate::features::workflow::{WorkflowOptions, run_workflow};
use crate::git::{format_commit_result, is_git_available};
use crate::log_debug;
use crate::prompts::{PromptContext, PromptManager};
use crate::ui;

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Handle `convert` / `git2llm`
pub async fn handle_convert_command(args: &ConvertArgs) -> Result<()> {
    log_debug!("Handling 'convert' with {args:?}");
    let mut config = Config::load(Some(&args.repo_path))?;
    args.apply_to_config(&mut config)?;

    let output = PathBuf::from(&config.output_dir);
    ui::print_info(&format!(
        "Converting {} into {}",
        args.repo_path.display(),
        output.display()
    ));

    let converter =
        RepositoryConverter::new(&args.repo_path, &output, ConvertOptions::from_config(&config));
    let outcome = converter.convert().await?;
    let stats = &outcome.stats;

    ui::print_success(&format!(
        "Processed {} files ({} skipped)",
        stats.files_processed, stats.files_skipped
    ));
    ui::print_field("Main language", &outcome.analysis.primary_language);
    ui::print_field("Framework", &outcome.analysis.primary_framework);
    if stats.redaction_total > 0 {
        ui::print_warning(&format!("Redacted {} secrets", stats.redaction_total));
    }
    for (file, tokens) in &stats.tokens {
        ui::print_field(&format!("Tokens in {file}"), &tokens.to_string());
    }
    ui::print_newline();
    ui::print_message("Generated files:");
    for file in &outcome.files {
        ui::print_message(&format!("  {}", file.display()));
    }
    Ok(())
}

/// Handle `prompt generate|list|view`
pub fn handle_prompt_command(
    action: &str,
    template: Option<&str>,
    output: Option<&Path>,
    repo: Option<&Path>,
    custom: Option<&str>,
) -> Result<()> {
    log_debug!("Handling 'prompt {action}' with template {template:?}");
    let repo = repo.unwrap_or_else(|| Path::new("."));
    let config = Config::load(Some(repo))?;
    let manager = PromptManager::from_config(&config)?;

    match action {
        "list" => {
            println!("{}", "Available prompt templates:".bright_cyan().bold());
            for info in manager.templates() {
                println!(
                    "  {:<16} {} {}",
                    info.name.green().bold(),
                    info.description,
                    format!("[{}]", info.origin).dimmed()
                );
            }
            Ok(())
        }
        "view" => {
            let name = template.ok_or_else(|| anyhow!("--type is required for 'view'"))?;
            println!("{}", manager.source(name)?);
            Ok(())
        }
        "generate" => {
            let name = template.ok_or_else(|| anyhow!("--type is required for 'generate'"))?;
            // Unknown names fail before the repository is analyzed
            manager.source(name)?;
            let context = PromptContext::for_repository(repo, &config, custom)?;
            let prompt = manager.render(name, &context)?;
            match output {
                Some(path) => {
                    std::fs::write(path, &prompt)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    ui::print_success(&format!("Prompt written to {}", path.display()));
                }
                None => println!("{prompt}"),
            }
            Ok(())
        }
        other => Err(anyhow!("Unknown prompt action '{other}'")),
    }
}

/// Handle `process` / `llm2git`
pub async fn handle_process_command(args: &ProcessArgs) -> Result<()> {
    log_debug!("Handling 'process' with {args:?}");
    if args.commit && !args.apply {
        ui::print_warning("--commit has no effect without --apply");
    }
    if (args.apply || args.create_branch.is_some()) && !args.dry_run && !is_git_available() {
        return Err(anyhow!("The git command line is required to apply patches"));
    }

    let config = Config::load(Some(&args.repo))?;
    ui::print_info(&format!("Processing {}", args.response_file.display()));
    let outcome = ResponseProcessor::new(args.to_options(), config)
        .process()
        .await?;

    print_process_outcome(&outcome);
    if outcome.success {
        Ok(())
    } else {
        Err(anyhow!(
            "{}",
            outcome.error.as_deref().unwrap_or("Processing failed")
        ))
    }
}

fn print_process_outcome(outcome: &ProcessOutcome) {
    let validation = &outcome.validation;
    if !outcome.payload.summary.trim().is_empty() {
        let wrapped = textwrap::wrap(outcome.payload.summary.trim(), 78).join("\n");
        ui::print_bordered_content(&wrapped);
    }
    ui::print_field("Format", &outcome.payload.format.to_string());
    ui::print_field("Changes", &outcome.payload.changes.len().to_string());
    ui::print_field(
        "Valid",
        &format!("{} of {}", validation.valid.len(), validation.total()),
    );
    for result in &validation.invalid {
        ui::print_warning(&format!(
            "{} ({}): {}",
            result.target,
            result.file,
            result.reason.as_deref().unwrap_or("invalid")
        ));
    }

    for preview in &outcome.previews {
        ui::print_message(&format!("Would {} {}", preview.kind, preview.file));
        if let Some(diff) = &preview.diff {
            ui::print_bordered_content(diff);
        }
    }

    for change in &outcome.applied {
        ui::print_success(&format!("Applied {} ({})", change.file, change.kind));
    }
    for failure in &outcome.failed {
        ui::print_error(&format!("Failed {}: {}", failure.file, failure.reason));
    }
    for skipped in &outcome.skipped {
        ui::print_info(&format!("Skipped {}: {}", skipped.file, skipped.reason));
    }
    if outcome.rolled_back {
        ui::print_warning("All changes were rolled back");
    }
    if let Some(branch) = &outcome.branch
        && outcome.branch_created
        && !outcome.rolled_back
    {
        ui::print_field("Branch", branch);
    }
    if let (Some(commit), Some(message)) = (&outcome.commit, &outcome.commit_message) {
        ui::print_message(&format_commit_result(commit, message));
    }
    for report in &outcome.reports {
        ui::print_field("Report", &report.display().to_string());
    }
}

/// Handle `workflow`
pub async fn handle_workflow_command(options: &WorkflowOptions) -> Result<()> {
    log_debug!("Handling 'workflow' with {options:?}");
    let config = Config::load(Some(&options.repo))?;
    let total = if options.response.is_some() { 3 } else { 2 };

    ui::print_step(1, total, "Converting repository");
    let outcome = run_workflow(options, &config).await?;
    ui::print_step(2, total, &format!("Prompt written to {}", outcome.prompt_path.display()));
    if let Some(process) = &outcome.process {
        ui::print_step(3, total, "Processed response");
        print_process_outcome(process);
    }

    ui::print_newline();
    ui::print_message(&"Next steps:".bright_cyan().bold().to_string());
    for (i, step) in outcome.next_steps().iter().enumerate() {
        ui::print_message(&format!("  {}. {step}", i + 1));
    }

    match &outcome.process {
        Some(process) if !process.success => Err(anyhow!(
            "{}",
            process.error.as_deref().unwrap_or("Processing failed")
        )),
        _ => Ok(()),
    }
}

/// Handle `config --list` / `config --set KEY VALUE`
pub fn handle_config_command(list: bool, set: Option<&[String]>) -> Result<()> {
    log_debug!("Handling 'config' with list: {list}, set: {set:?}");
    if let Some([key, value]) = set {
        Config::set_global(key, value)?;
        ui::print_success(&format!("Set gitllm.{} = {value}", key.trim().to_lowercase()));
        return Ok(());
    }
    if set.is_some() {
        return Err(anyhow!("--set takes exactly a KEY and a VALUE"));
    }

    let config = Config::load(None)?;
    if !list {
        ui::print_info("Use --list to show settings or --set KEY VALUE to change one");
    }
    println!("{}", "git-llm configuration:".bright_cyan().bold());
    for (key, value) in config.entries() {
        println!(
            "  {:<14} {:<24} {}",
            key.name.green(),
            value,
            format!("({}; {})", key.description, key.env).dimmed()
        );
    }
    debug_assert_eq!(config.entries().len(), CONFIG_KEYS.len());
    Ok(())
}
