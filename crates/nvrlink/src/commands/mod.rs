//! Command dispatch for config-bound commands.

pub mod run;
pub mod targets;

use nvrlink_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that needs the loaded configuration.
pub async fn dispatch(cmd: Command, config: Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run => run::handle(config, global).await,
        Command::Targets => targets::handle(&config),
        // Handled before the config is loaded
        Command::Completions(_) => Ok(()),
    }
}
