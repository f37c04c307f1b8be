mod cli;
mod commands;
mod error;
mod output;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wifiman_config::Config;
use wifiman_core::{CredentialStore, ErrorBody, ManagerConfig, Service};

use crate::cli::{Cli, Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    let output = cli.global.output;
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        if matches!(output, OutputFormat::Json | OutputFormat::JsonCompact) {
            print_error_body(&err);
        }
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

/// Logs go to stderr; stdout carries command output and `serve` responses.
fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Machine-readable failure for scripted callers.
fn print_error_body(err: &CliError) {
    if let Some(code) = err.error_code() {
        let body = ErrorBody {
            code,
            message: err.to_string(),
        };
        if let Ok(line) = serde_json::to_string(&serde_json::json!({ "ok": false, "error": body })) {
            println!("{line}");
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let global = &cli.global;

    if let Command::Completions(args) = &cli.command {
        use clap::CommandFactory;
        use clap_complete::generate;

        let mut cmd = Cli::command();
        generate(args.shell, &mut cmd, "wifiman", &mut std::io::stdout());
        return Ok(());
    }

    let config_path = global
        .config
        .clone()
        .unwrap_or_else(wifiman_config::config_path);
    let cfg = wifiman_config::load_config_from(&config_path)?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    match cli.command {
        // Config commands never open the vault
        Command::Config(args) => commands::config_cmd::handle(args, &cfg, &config_path, global),

        Command::Serve(args) => {
            let mut manager = cfg.manager_config();
            manager.auto_reconnect |= args.auto_reconnect;
            if let Some(secs) = args.scan_interval {
                manager.auto_scan_interval = Duration::from_secs(secs);
            }
            apply_overrides(&mut manager, global);
            let service = build_service(&cfg, manager).await?;
            commands::serve::run(service, args.events).await
        }

        cmd => {
            let mut manager = ManagerConfig {
                auto_scan_interval: Duration::ZERO,
                auto_reconnect: false,
                ..cfg.manager_config()
            };
            apply_overrides(&mut manager, global);
            let service = build_service(&cfg, manager).await?;

            tracing::debug!("dispatching command");
            let result = commands::dispatch(cmd, &service, global).await;
            service.shutdown().await;
            result
        }
    }
}

fn apply_overrides(manager: &mut ManagerConfig, global: &GlobalOpts) {
    if let Some(secs) = global.timeout.filter(|s| *s > 0) {
        manager.connect_timeout = Duration::from_secs(secs);
    }
}

/// Open the vault, wire the radio and run the initial scan.
async fn build_service(cfg: &Config, manager: ManagerConfig) -> Result<Service, CliError> {
    let key_source = commands::util::key_source(cfg)?;
    let credentials = CredentialStore::open(key_source, cfg.vault_storage(), &manager).await?;
    let radio = Arc::new(cfg.simulated_radio());
    let service = Service::simulated(manager, radio, Arc::new(credentials));
    service.start().await;
    Ok(service)
}
