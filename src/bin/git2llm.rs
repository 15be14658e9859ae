use anyhow::Result;
use clap::Parser;
use gitllm::cli;
use gitllm::commands;
use gitllm::common::ConvertArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "git2llm",
    about = "Convert a repository into LLM-ready text bundles",
    styles = cli::get_styles()
)]
struct Git2LlmArgs {
    #[command(flatten)]
    convert: ConvertArgs,

    #[arg(short = 'l', long = "log", help = "Log debug messages to a file")]
    log: bool,

    #[arg(long = "log-file", help = "Specify a custom log file path")]
    log_file: Option<PathBuf>,

    #[arg(short = 'q', long = "quiet", help = "Suppress non-essential output")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Git2LlmArgs::parse();
    cli::init_globals(args.log, args.log_file.as_deref(), args.quiet)?;

    match commands::handle_convert_command(&args.convert).await {
        Ok(()) => Ok(()),
        Err(e) => {
            gitllm::ui::print_error(&format!("Error: {e:#}"));
            std::process::exit(1);
        }
    }
}
