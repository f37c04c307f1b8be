//! Config subcommand handlers.

use std::path::Path;

use dialoguer::{Confirm, Input, Select};

use wifiman_config::{self as config, Config, KeySourceKind};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn save(cfg: &Config, path: &Path) -> Result<(), CliError> {
    config::save_config_to(cfg, path)?;
    Ok(())
}

#[derive(serde::Serialize)]
struct Locations {
    config: String,
    data_dir: String,
    vault: String,
    key: Option<String>,
}

fn locations(cfg: &Config, config_path: &Path) -> Locations {
    let key = match cfg.vault.key_source {
        KeySourceKind::File => Some(config::key_path(cfg)),
        KeySourceKind::Passphrase => Some(config::salt_path(cfg)),
        KeySourceKind::Keyring => None,
    };
    Locations {
        config: config_path.display().to_string(),
        data_dir: config::data_dir(cfg).display().to_string(),
        vault: config::vault_path(cfg).display().to_string(),
        key: key.map(|p| p.display().to_string()),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    args: ConfigArgs,
    cfg: &Config,
    config_path: &Path,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            eprintln!("wifiman configuration");
            eprintln!("   Config path: {}\n", config_path.display());

            if config_path.exists()
                && !Confirm::new()
                    .with_prompt("A config file already exists. Overwrite?")
                    .default(false)
                    .interact()
                    .map_err(prompt_err)?
            {
                return Ok(());
            }

            let mut next = cfg.clone();

            let choices = &[
                "Key file beside the vault (default)",
                "System keyring",
                "Passphrase from the environment",
            ];
            let selection = Select::new()
                .with_prompt("Where should the vault key live?")
                .items(choices)
                .default(0)
                .interact()
                .map_err(prompt_err)?;
            next.vault.key_source = match selection {
                1 => KeySourceKind::Keyring,
                2 => KeySourceKind::Passphrase,
                _ => KeySourceKind::File,
            };
            if next.vault.key_source == KeySourceKind::Passphrase {
                next.vault.passphrase_env = Input::new()
                    .with_prompt("Passphrase environment variable")
                    .default(next.vault.passphrase_env.clone())
                    .interact_text()
                    .map_err(prompt_err)?;
            }

            next.manager.auto_reconnect = Confirm::new()
                .with_prompt("Reconnect to favorite networks automatically in `serve` mode?")
                .default(next.manager.auto_reconnect)
                .interact()
                .map_err(prompt_err)?;

            next.manager.connect_timeout_secs = Input::new()
                .with_prompt("Connect timeout (seconds)")
                .default(next.manager.connect_timeout_secs)
                .interact_text()
                .map_err(prompt_err)?;

            save(&next, config_path)?;
            eprintln!("\n   ✓ Written to {}", config_path.display());
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => {
                    toml::to_string_pretty(cfg).map_err(config::ConfigError::from)?
                }
                format => output::render_single(format, cfg, |_| String::new(), |_| String::new()),
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            let loc = locations(cfg, config_path);
            let out = output::render_single(
                global.output,
                &loc,
                |l| {
                    let mut lines = vec![
                        format!("Config:   {}", l.config),
                        format!("Data dir: {}", l.data_dir),
                        format!("Vault:    {}", l.vault),
                    ];
                    if let Some(key) = &l.key {
                        lines.push(format!("Key:      {key}"));
                    }
                    lines.join("\n")
                },
                |l| l.vault.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
