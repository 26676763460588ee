//! Strata CLI - reversible schema migrations for DuckDB

use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, MigrateCommands};
use commands::common::ExitCode;
use commands::{check, down, new, status, unlock, up, verify};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        cli::Commands::Migrate(migrate) => match &migrate.command {
            MigrateCommands::Up(args) => up::execute(args, &cli.global).await,
            MigrateCommands::Down(args) => down::execute(args, &cli.global).await,
            MigrateCommands::Status(args) => status::execute(args, &cli.global).await,
            MigrateCommands::Verify => verify::execute(&cli.global).await,
            MigrateCommands::Check => check::execute(&cli.global).await,
            MigrateCommands::New(args) => new::execute(args, &cli.global).await,
            MigrateCommands::Unlock(args) => unlock::execute(args, &cli.global).await,
        },
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<ExitCode>() {
            Some(ExitCode(code)) => std::process::ExitCode::from(*code as u8),
            None => {
                eprintln!("Error: {err:#}");
                std::process::ExitCode::FAILURE
            }
        },
    }
}
