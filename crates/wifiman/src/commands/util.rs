//! Shared helpers for command handlers.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;

use wifiman_config::{Config, ConfigError};
use wifiman_core::KeySource;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(io::Error::other(e)))
}

/// Read a secret without echo. Empty input is rejected.
pub fn prompt_secret(prompt: &str, field: &str) -> Result<SecretString, CliError> {
    let value = rpassword::prompt_password(prompt)?;
    if value.is_empty() {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "cannot be empty".into(),
        });
    }
    Ok(SecretString::from(value))
}

/// Configured key source. A passphrase missing from the environment is
/// prompted for when stdin is a terminal.
pub fn key_source(cfg: &Config) -> Result<Arc<dyn KeySource>, CliError> {
    match wifiman_config::resolve_key_source(cfg, None) {
        Err(ConfigError::MissingPassphrase { .. }) if io::stdin().is_terminal() => {
            let passphrase = prompt_secret("Vault passphrase: ", "passphrase")?;
            Ok(wifiman_config::resolve_key_source(cfg, Some(passphrase))?)
        }
        other => Ok(other?),
    }
}

/// Spinner on stderr for interactive table output; `None` otherwise.
pub fn spinner(global: &GlobalOpts, message: impl Into<String>) -> Option<ProgressBar> {
    if global.quiet || global.output != OutputFormat::Table || !io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

pub fn finish_spinner(pb: Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
}
