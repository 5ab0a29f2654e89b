//! CLI command dispatch and handlers.
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod ledger;
pub mod server;
pub mod version;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, Commands, LedgerSubcommand, ServerSubcommand};
use crate::error::SkirmishError;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// `cancel` is fired by the signal handler; only long-running commands
/// observe it.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), SkirmishError> {
    match cli.command {
        Commands::Server(cmd) => match cmd.subcommand {
            ServerSubcommand::Run(args) => server::run(&args, cancel).await,
            ServerSubcommand::Validate(args) => server::validate(&args),
        },
        Commands::Ledger(cmd) => match cmd.subcommand {
            LedgerSubcommand::Verify(args) => ledger::verify(&args),
        },
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}
