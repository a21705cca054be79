//! CLI command-name contract for logging.

use crate::cli::parse::Commands;

/// Command name used in log events (e.g. "run", "ask").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Run { .. } => "run",
        Commands::Ask { .. } => "ask",
        Commands::Diagnose { .. } => "diagnose",
        Commands::Schema => "schema",
        Commands::Config => "config",
    }
}
