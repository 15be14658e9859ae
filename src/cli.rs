use crate::commands;
use crate::common::{ConvertArgs, ProcessArgs};
use crate::features::workflow::WorkflowOptions;
use crate::log_debug;
use crate::logger;
use crate::ui;
use clap::builder::{Styles, styling::AnsiColor};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum, crate_version};
use std::path::{Path, PathBuf};

pub const LOG_FILE: &str = "git-llm-debug.log";

/// CLI structure defining the available commands and global arguments
#[derive(Parser)]
#[command(
    name = "git-llm",
    author,
    version = crate_version!(),
    about = "git-llm: move a repository into an LLM and the answer back into Git",
    disable_version_flag = true,
    styles = get_styles(),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log debug messages to a file
    #[arg(
        short = 'l',
        long = "log",
        global = true,
        help = "Log debug messages to a file"
    )]
    pub log: bool,

    #[arg(
        long = "log-file",
        global = true,
        help = "Specify a custom log file path"
    )]
    pub log_file: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help = "Suppress non-essential output"
    )]
    pub quiet: bool,

    #[arg(
        short = 'v',
        long = "version",
        global = true,
        help = "Display the version"
    )]
    pub version: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PromptAction {
    Generate,
    List,
    View,
}

impl PromptAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::List => "list",
            Self::View => "view",
        }
    }
}

#[derive(Subcommand)]
#[command(subcommand_negates_reqs = true)]
pub enum Commands {
    /// Convert a repository into LLM-ready text bundles
    #[command(
        about = "Convert a repository into LLM-ready text bundles",
        long_about = "Walk the repository, skip ignored and binary files, redact secrets and write structure.txt, codebase.txt, documentation.txt, metadata.json and summary.md."
    )]
    Convert {
        #[command(flatten)]
        args: ConvertArgs,
    },

    /// Generate, list or view prompt templates
    #[command(about = "Generate, list or view prompt templates")]
    Prompt {
        #[arg(value_enum, help = "What to do")]
        action: PromptAction,

        #[arg(long = "type", value_name = "TEMPLATE", help = "Template name (see `prompt list`)")]
        template: Option<String>,

        #[arg(short, long, help = "Write the generated prompt to this file")]
        output: Option<PathBuf>,

        #[arg(long, help = "Repository to describe in the prompt (default: .)")]
        repo: Option<PathBuf>,

        #[arg(long, value_name = "TEXT", help = "Extra request appended to the prompt")]
        custom: Option<String>,
    },

    /// Validate and apply an LLM response
    #[command(
        about = "Validate and apply an LLM response",
        long_about = "Parse a JSON, markdown or plain-text response, validate every patch against the working tree and optionally apply, branch and commit."
    )]
    Process {
        #[command(flatten)]
        args: ProcessArgs,
    },

    /// Convert, generate a prompt and optionally process a response
    #[command(about = "Run convert, prompt and process in one go")]
    Workflow {
        #[arg(default_value = ".", help = "Path to the Git repository")]
        repo_path: PathBuf,

        #[arg(long = "type", default_value = "code-review", help = "Prompt template")]
        template: String,

        #[arg(short, long, default_value = "llm_analysis", help = "Output directory")]
        output: PathBuf,

        #[arg(long, help = "LLM response to process after generating the prompt")]
        response: Option<PathBuf>,

        #[arg(long, requires = "response", help = "Apply the response on a new branch")]
        apply: bool,

        #[arg(long, help = "Include documentation and write analysis.json")]
        full: bool,

        #[arg(long, value_name = "TEXT", help = "Extra request appended to the prompt")]
        custom: Option<String>,
    },

    /// Show or change configuration
    #[command(
        about = "Show or change configuration",
        long_about = "Show the effective configuration or write a key to the global git config under the gitllm section."
    )]
    Config {
        #[arg(long, help = "List the effective configuration")]
        list: bool,

        #[arg(
            long,
            num_args = 2,
            value_names = ["KEY", "VALUE"],
            help = "Set a key in the global git config"
        )]
        set: Option<Vec<String>>,
    },
}

/// Define custom styles for Clap
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Magenta.on_default().bold())
        .usage(AnsiColor::Cyan.on_default().bold())
        .literal(AnsiColor::Green.on_default().bold())
        .placeholder(AnsiColor::Yellow.on_default())
        .valid(AnsiColor::Blue.on_default().bold())
        .invalid(AnsiColor::Red.on_default().bold())
        .error(AnsiColor::Red.on_default().bold())
}

/// Set up logging and quiet mode from the global flags
pub fn init_globals(log: bool, log_file: Option<&Path>, quiet: bool) -> anyhow::Result<()> {
    if log {
        logger::init(Some(log_file.unwrap_or_else(|| Path::new(LOG_FILE))))?;
    } else {
        logger::init(None)?;
    }
    ui::set_quiet_mode(quiet);
    Ok(())
}

/// Main function to parse arguments and handle the command
pub async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        ui::print_version(crate_version!());
        return Ok(());
    }

    init_globals(cli.log, cli.log_file.as_deref(), cli.quiet)?;

    if let Some(command) = cli.command {
        handle_command(command).await
    } else {
        Cli::command().print_help()?;
        Ok(())
    }
}

pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Convert { args } => commands::handle_convert_command(&args).await,
        Commands::Prompt {
            action,
            template,
            output,
            repo,
            custom,
        } => {
            if action != PromptAction::List && template.is_none() {
                ui::print_error(&format!("--type is required for 'prompt {}'", action.as_str()));
                let mut cmd = Cli::command();
                if let Some(sub) = cmd.find_subcommand_mut("prompt") {
                    sub.print_help()?;
                }
                return Err(anyhow::anyhow!("Missing --type"));
            }
            commands::handle_prompt_command(
                action.as_str(),
                template.as_deref(),
                output.as_deref(),
                repo.as_deref(),
                custom.as_deref(),
            )
        }
        Commands::Process { args } => commands::handle_process_command(&args).await,
        Commands::Workflow {
            repo_path,
            template,
            output,
            response,
            apply,
            full,
            custom,
        } => {
            let options = WorkflowOptions {
                repo: repo_path,
                template,
                output,
                response,
                apply,
                full,
                custom_request: custom,
            };
            commands::handle_workflow_command(&options).await
        }
        Commands::Config { list, set } => {
            log_debug!("Dispatching 'config'");
            commands::handle_config_command(list, set.as_deref())
        }
    }
}
