//! `wifiman status`.

use wifiman_core::{Service, ServiceStatus};

use crate::cli::GlobalOpts;
use crate::output;

fn detail(s: &ServiceStatus) -> String {
    let vault = &s.credentials;
    let mut lines = vec![
        format!("Connected:      {}", s.connected.as_deref().unwrap_or("-")),
        format!("Link:           {}", s.link_phase),
        format!("Scan:           {}", s.scan_phase),
        format!("Networks:       {} ({} favorite)", s.networks, s.favorites),
        format!("Auto-reconnect: {}", s.auto_reconnect),
        format!(
            "Vault:          {} ({} saved)",
            if vault.available { "available" } else { "unavailable" },
            vault.entries
        ),
        format!("Vault file:     {}", vault.location),
        format!("Key source:     {}", vault.key_source),
    ];
    if let Some(reason) = &vault.reason {
        lines.push(format!("Vault problem:  {reason}"));
    }
    if let Some(failure) = &s.last_scan_failure {
        lines.push(format!("Last scan error: {}", failure.message));
    }
    lines.join("\n")
}

pub fn handle(service: &Service, global: &GlobalOpts) {
    let status = service.status();
    let out = output::render_single(global.output, &status, detail, |s| {
        s.connected.clone().unwrap_or_default()
    });
    output::print_output(&out, global.quiet);
}
