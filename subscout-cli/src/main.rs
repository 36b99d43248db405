//! Subscout CLI
//!
//! ```text
//! subscout run --output-dir out [--emit-health] [--skip-discovery] ...
//! subscout credentials list [--json]
//! subscout credentials reset <id>
//! subscout history show [--json]
//! ```
//!
//! Exit status is zero for every completed run, including runs that publish
//! no nodes; configuration and output failures exit non-zero.

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;
mod credential_commands;
mod history_commands;
mod run_command;

use cli::{Cli, Commands};
use subscout_core::modules::{config::default_data_dir, logger};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; keys usually come from the environment or the keys file.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    logger::init_logging(&cli.log_level)?;

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run(args) => run_command::run(args, config_path, &data_dir).await,
        Commands::Credentials(cmd) => {
            commands::handle_credential_command(cmd, config_path, &data_dir).await
        }
        Commands::History(cmd) => commands::handle_history_command(cmd, &data_dir).await,
    }
}
