//! Saved-password command handlers.

use secrecy::{ExposeSecret, SecretString};
use tabled::Tabled;
use wifiman_core::{CredentialSummary, Service};

use crate::cli::{GlobalOpts, PasswordArgs, PasswordCommand};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct CredentialRow {
    #[tabled(rename = "SSID")]
    ssid: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&CredentialSummary> for CredentialRow {
    fn from(c: &CredentialSummary) -> Self {
        Self {
            ssid: c.ssid.clone(),
            updated: c.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

pub async fn handle(
    service: &Service,
    args: PasswordArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        PasswordCommand::Save { ssid, password } => {
            let secret = match password {
                Some(p) => SecretString::from(p),
                None => util::prompt_secret(&format!("Password for {ssid}: "), "password")?,
            };
            service.save_password(&ssid, &secret).await?;
            if !global.quiet {
                eprintln!("Saved password for {ssid}");
            }
            Ok(())
        }

        PasswordCommand::Get { ssid } => {
            let secret = service.get_password(&ssid)?;
            let value = serde_json::json!({
                "ssid": ssid,
                "password": secret.as_ref().map(ExposeSecret::expose_secret),
            });
            let shown = secret
                .as_ref()
                .map(|s| s.expose_secret().to_owned())
                .unwrap_or_default();
            let out = output::render_single(
                global.output,
                &value,
                |_| {
                    if secret.is_some() {
                        shown.clone()
                    } else {
                        format!("No password saved for {ssid}")
                    }
                },
                |_| shown.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PasswordCommand::Delete { ssid } => {
            if !util::confirm(&format!("Delete saved password for {ssid}?"), global.yes)? {
                return Ok(());
            }
            service.delete_password(&ssid).await?;
            if !global.quiet {
                eprintln!("Deleted password for {ssid}");
            }
            Ok(())
        }

        PasswordCommand::List => {
            let list = service.list_passwords()?;
            let out = output::render_list(
                global.output,
                &list,
                |c| CredentialRow::from(c),
                |c| c.ssid.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PasswordCommand::Audit => {
            let audit = service.audit_passwords()?;
            let out = output::render_single(
                global.output,
                &audit,
                |a| {
                    let mut lines = vec![format!("Readable: {}", a.readable.len())];
                    if a.corrupt.is_empty() {
                        lines.push("Corrupt:  0".into());
                    } else {
                        lines.push(format!("Corrupt:  {}", a.corrupt.join(", ")));
                    }
                    lines.join("\n")
                },
                |a| a.corrupt.join("\n"),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
