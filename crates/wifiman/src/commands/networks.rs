//! Network command handlers.

use std::sync::Arc;

use secrecy::SecretString;
use tabled::Tabled;
use wifiman_core::{NetworkRecord, Service};

use crate::cli::{GlobalOpts, NetworksArgs, NetworksCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct NetworkRow {
    #[tabled(rename = "SSID")]
    ssid: String,
    #[tabled(rename = "Signal")]
    signal: String,
    #[tabled(rename = "Security")]
    security: String,
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "★")]
    favorite: String,
}

impl NetworkRow {
    fn new(n: &NetworkRecord, color: bool) -> Self {
        let mut signal = output::signal_label(n.signal_bars(), n.signal_strength, color);
        if n.is_stale() {
            signal.push_str(&format!(" (missed {})", n.missed_scans));
        }
        Self {
            ssid: n.ssid.clone(),
            signal,
            security: n.security.to_string(),
            channel: n.channel.map(|c| c.to_string()).unwrap_or_default(),
            state: output::state_label(n.connection_state, color),
            favorite: if n.favorite { "★" } else { "" }.into(),
        }
    }
}

fn detail(n: &NetworkRecord) -> String {
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    };
    [
        format!("SSID:           {}", n.ssid),
        format!("Signal:         {} ({} bars)", n.signal_strength, n.signal_bars()),
        format!("Security:       {}", n.security),
        format!("BSSID:          {}", n.bssid.as_deref().unwrap_or("-")),
        format!(
            "Channel:        {}",
            n.channel.map_or_else(|| "-".into(), |c| c.to_string())
        ),
        format!("State:          {}", n.connection_state),
        format!("Favorite:       {}", n.favorite),
        format!("Last seen:      {}", fmt_time(Some(n.last_seen_at))),
        format!("Last connected: {}", fmt_time(n.last_connected_at)),
        format!("Missed scans:   {}", n.missed_scans),
    ]
    .join("\n")
}

fn render_networks(records: &[Arc<NetworkRecord>], global: &GlobalOpts) {
    let color = output::should_color(global.color);
    let out = output::render_list(
        global.output,
        records,
        |n| NetworkRow::new(n, color),
        |n| n.ssid.clone(),
    );
    output::print_output(&out, global.quiet);
}

fn render_network(record: &NetworkRecord, global: &GlobalOpts) {
    let out = output::render_single(global.output, record, detail, |n| n.ssid.clone());
    output::print_output(&out, global.quiet);
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    service: &Service,
    args: NetworksArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        NetworksCommand::Scan => {
            let pb = util::spinner(global, "Scanning…");
            let result = service.scan().await;
            util::finish_spinner(pb);
            let summary = result?;
            tracing::info!(
                observed = summary.observed,
                added = summary.stats.added,
                removed = summary.stats.removed,
                "scan finished"
            );
            render_networks(&service.networks(), global);
            Ok(())
        }

        NetworksCommand::List { favorites } => {
            let records = if favorites {
                service.favorites()
            } else {
                service.networks().to_vec()
            };
            render_networks(&records, global);
            Ok(())
        }

        NetworksCommand::Get { ssid } => {
            let record = service
                .catalog()
                .get(&ssid)
                .ok_or(CliError::UnknownNetwork { ssid })?;
            render_network(&record, global);
            Ok(())
        }

        NetworksCommand::Connect {
            ssid,
            password,
            ask,
        } => {
            let password = if ask {
                Some(util::prompt_secret(
                    &format!("Password for {ssid}: "),
                    "password",
                )?)
            } else {
                password.map(SecretString::from)
            };
            let pb = util::spinner(global, format!("Connecting to {ssid}…"));
            let result = service.connect(&ssid, password).await;
            util::finish_spinner(pb);
            render_network(&result?, global);
            Ok(())
        }

        NetworksCommand::Disconnect { ssid } => {
            let record = service.disconnect(&ssid).await?;
            render_network(&record, global);
            Ok(())
        }

        NetworksCommand::Favorite { ssid, off, toggle } => {
            let favorite = if toggle {
                service.toggle_favorite(&ssid)?
            } else {
                service.set_favorite(&ssid, !off)?;
                !off
            };
            let out = output::render_single(
                global.output,
                &serde_json::json!({ "ssid": ssid, "favorite": favorite }),
                |_| {
                    if favorite {
                        format!("★ {ssid} marked as favorite")
                    } else {
                        format!("{ssid} is no longer a favorite")
                    }
                },
                |_| favorite.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
