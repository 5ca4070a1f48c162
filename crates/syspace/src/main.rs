use anyhow::Result;
use clap::Parser;

use syspace::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so `--sql` output stays clean on stdout
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level().to_string()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    cli.execute().await
}
