//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use wifiman_config::ConfigError;
use wifiman_core::{CoreError, ErrorCode};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const VAULT: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const RADIO: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Networks ─────────────────────────────────────────────────────
    #[error("Network '{ssid}' is not in the catalog")]
    #[diagnostic(
        code(wifiman::unknown_network),
        help("Run: wifiman networks scan to see networks in range")
    )]
    UnknownNetwork { ssid: String },

    #[error("Network '{ssid}' needs a password")]
    #[diagnostic(
        code(wifiman::password_required),
        help("Pass --password, or --ask to be prompted. It is saved once the connection succeeds.")
    )]
    PasswordRequired { ssid: String },

    #[error("{message}")]
    #[diagnostic(
        code(wifiman::rejected),
        help("Check the password. Update it with: wifiman password save {ssid}")
    )]
    Rejected { ssid: String, message: String },

    #[error("{message}")]
    #[diagnostic(
        code(wifiman::timeout),
        help("Increase the deadline with --timeout or move closer to the access point.")
    )]
    Timeout { message: String },

    #[error("{message}")]
    #[diagnostic(code(wifiman::busy), help("Wait for it to finish, then retry."))]
    Busy { message: String },

    #[error("{message}")]
    #[diagnostic(code(wifiman::radio))]
    Radio { code: ErrorCode, message: String },

    // ── Vault ────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(
        code(wifiman::vault),
        help(
            "The vault key could not be used. Restore the key file or keyring entry,\n\
             or check the passphrase. Run: wifiman config path"
        )
    )]
    Vault { code: ErrorCode, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(wifiman::validation))]
    Validation { field: String, reason: String },

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(wifiman::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Other core failures ──────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(wifiman::failed))]
    Failed { code: ErrorCode, message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(wifiman::config),
        help("Inspect with: wifiman config show")
    )]
    Config(#[from] ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(wifiman::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownNetwork { .. } => exit_code::NOT_FOUND,
            Self::PasswordRequired { .. } | Self::Rejected { .. } => exit_code::AUTH,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Busy { .. } => exit_code::CONFLICT,
            Self::Radio { .. } => exit_code::RADIO,
            Self::Vault { .. } => exit_code::VAULT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Failed { .. } | Self::Config(_) | Self::Io(_) | Self::Json(_) => {
                exit_code::GENERAL
            }
        }
    }

    /// Public service code, when the failure came from the core.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::UnknownNetwork { .. } => Some(ErrorCode::UnknownNetwork),
            Self::PasswordRequired { .. } => Some(ErrorCode::PasswordRequired),
            Self::Rejected { .. } => Some(ErrorCode::ConnectionRejected),
            Self::Timeout { .. } => Some(ErrorCode::ConnectionTimeout),
            Self::Busy { .. } => Some(ErrorCode::AlreadyConnecting),
            Self::Validation { .. } => Some(ErrorCode::InvalidRequest),
            Self::Radio { code, .. } | Self::Vault { code, .. } | Self::Failed { code, .. } => {
                Some(*code)
            }
            Self::NonInteractiveRequiresYes { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_) => None,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            CoreError::UnknownNetwork { ssid } => Self::UnknownNetwork { ssid },
            CoreError::PasswordRequired { ssid } => Self::PasswordRequired { ssid },
            CoreError::ConnectionRejected { ssid, .. } => Self::Rejected { ssid, message },
            CoreError::ConnectionTimeout { .. } => Self::Timeout { message },
            CoreError::AlreadyConnecting { .. } => Self::Busy { message },
            CoreError::ScanFailed { .. } | CoreError::Platform { .. } => {
                Self::Radio { code, message }
            }
            CoreError::EncryptionKeyUnavailable { .. }
            | CoreError::Decryption { .. }
            | CoreError::Encryption { .. }
            | CoreError::StorageIo { .. }
            | CoreError::StorageTimeout { .. } => Self::Vault { code, message },
            CoreError::InvalidRequest { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Cancelled { .. } | CoreError::Internal(_) => Self::Failed { code, message },
        }
    }
}
