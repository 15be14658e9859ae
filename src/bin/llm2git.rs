use anyhow::Result;
use clap::Parser;
use gitllm::cli;
use gitllm::commands;
use gitllm::common::ProcessArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "llm2git",
    about = "Validate an LLM response and apply it to a Git repository",
    styles = cli::get_styles()
)]
struct Llm2GitArgs {
    #[command(flatten)]
    process: ProcessArgs,

    #[arg(short = 'l', long = "log", help = "Log debug messages to a file")]
    log: bool,

    #[arg(long = "log-file", help = "Specify a custom log file path")]
    log_file: Option<PathBuf>,

    #[arg(short = 'q', long = "quiet", help = "Suppress non-essential output")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Llm2GitArgs::parse();
    cli::init_globals(args.log, args.log_file.as_deref(), args.quiet)?;

    match commands::handle_process_command(&args.process).await {
        Ok(()) => Ok(()),
        Err(e) => {
            gitllm::ui::print_error(&format!("Error: {e:#}"));
            std::process::exit(1);
        }
    }
}
