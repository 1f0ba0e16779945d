use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use burnshare::commands;
use burnshare::constants::DEFAULT_CONFIG_FILE;

#[derive(Parser)]
#[command(name = "burnshare", version, about = "Self-destructing file sharing")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (default)
    Serve,
    /// Remove expired files once and exit with the number of failures
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            commands::serve::execute(&cli.config).await?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Cleanup => {
            let code = commands::cleanup::execute(&cli.config).await?;
            Ok(ExitCode::from(code))
        },
    }
}
