use gitllm::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::main().await {
        gitllm::ui::print_error(&format!("Error: {e:#}"));
        std::process::exit(1);
    }
}
