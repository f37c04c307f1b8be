//! Command dispatch: bridges CLI args -> service operations -> output formatting.

pub mod config_cmd;
pub mod networks;
pub mod password;
pub mod serve;
pub mod status;
pub mod util;

use wifiman_core::Service;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a one-shot, service-bound command to its handler.
pub async fn dispatch(cmd: Command, service: &Service, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Networks(args) => networks::handle(service, args, global).await,
        Command::Password(args) => password::handle(service, args, global).await,
        Command::Status => {
            status::handle(service, global);
            Ok(())
        }
        // Serve, Config and Completions are handled before dispatch
        Command::Serve(_) | Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
