mod migrate;

pub use migrate::{MigrateAction, MigrateCommand};

use anyhow::Result;
use clap::{Parser, Subcommand};

/// SYSPACE - schema migrations for the ShareYourSpace platform
#[derive(Parser)]
#[command(name = "syspace")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage database migrations.
    Migrate(MigrateCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Migrate(cmd) => cmd.execute().await,
        }
    }

    /// Default log filter for this invocation.
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
