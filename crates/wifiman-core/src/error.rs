// ── Core error types ──
//
// Internal failures of the connection manager. Consumers at the service
// boundary never see these directly -- `CoreError::code()` collapses every
// variant onto the stable public `ErrorCode` set.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Unified error type for the core crate.
///
/// Only owned strings and numbers are carried so the error is `Clone`:
/// a coalesced scan or a repeated connect hands the same failure to
/// every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    // ── Discovery ────────────────────────────────────────────────────
    #[error("Scan failed: {reason}")]
    ScanFailed { reason: String },

    // ── Association ──────────────────────────────────────────────────
    #[error("Connection to '{ssid}' timed out after {timeout_ms}ms")]
    ConnectionTimeout { ssid: String, timeout_ms: u64 },

    #[error("Connection to '{ssid}' rejected: {reason}")]
    ConnectionRejected { ssid: String, reason: String },

    #[error("Another connection attempt is in progress (target '{ssid}')")]
    AlreadyConnecting { ssid: String },

    #[error("Network '{ssid}' requires a password and none is stored")]
    PasswordRequired { ssid: String },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Platform error during {operation}: {message}")]
    Platform { operation: String, message: String },

    // ── Catalog ──────────────────────────────────────────────────────
    #[error("Unknown network: {ssid}")]
    UnknownNetwork { ssid: String },

    // ── Credential store ─────────────────────────────────────────────
    #[error("Encryption key unavailable: {reason}")]
    EncryptionKeyUnavailable { reason: String },

    #[error("Credential for '{ssid}' could not be decrypted")]
    Decryption { ssid: String },

    #[error("Encryption failed for '{ssid}'")]
    Encryption { ssid: String },

    #[error("Credential storage I/O failed during {operation}: {message}")]
    StorageIo { operation: String, message: String },

    #[error("Credential storage {operation} timed out after {timeout_ms}ms")]
    StorageTimeout { operation: String, timeout_ms: u64 },

    // ── Requests ─────────────────────────────────────────────────────
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable public code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::ScanFailed { .. } => ErrorCode::ScanFailed,
            Self::ConnectionTimeout { .. } => ErrorCode::ConnectionTimeout,
            Self::ConnectionRejected { .. } => ErrorCode::ConnectionRejected,
            Self::AlreadyConnecting { .. } => ErrorCode::AlreadyConnecting,
            Self::PasswordRequired { .. } => ErrorCode::PasswordRequired,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::Platform { .. } | Self::Internal(_) => ErrorCode::PlatformError,
            Self::UnknownNetwork { .. } => ErrorCode::UnknownNetwork,
            Self::EncryptionKeyUnavailable { .. } => ErrorCode::EncryptionKeyUnavailable,
            Self::Decryption { .. } => ErrorCode::DecryptionError,
            Self::Encryption { .. } => ErrorCode::CredentialStoreUnavailable,
            Self::StorageIo { .. } | Self::StorageTimeout { .. } => ErrorCode::StorageIoError,
            Self::InvalidRequest { .. } => ErrorCode::InvalidRequest,
        }
    }

    /// Transient storage failures are retried once before surfacing.
    /// Integrity failures (`Decryption`, `EncryptionKeyUnavailable`) never are.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageIo { .. } | Self::StorageTimeout { .. })
    }

    pub(crate) fn storage_io(operation: &str, err: &std::io::Error) -> Self {
        Self::StorageIo {
            operation: operation.to_owned(),
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Public error codes carried in every failed service response.
///
/// Presentation layers switch on these instead of matching message text.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ScanFailed,
    ConnectionTimeout,
    ConnectionRejected,
    AlreadyConnecting,
    UnknownNetwork,
    CredentialStoreUnavailable,
    EncryptionKeyUnavailable,
    DecryptionError,
    StorageIoError,
    PasswordRequired,
    Cancelled,
    InvalidRequest,
    PlatformError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_failures_are_not_retryable() {
        let decrypt = CoreError::Decryption { ssid: "Office".into() };
        let key = CoreError::EncryptionKeyUnavailable {
            reason: "missing".into(),
        };
        assert!(!decrypt.is_retryable());
        assert!(!key.is_retryable());
        assert!(
            CoreError::StorageIo {
                operation: "persist".into(),
                message: "disk full".into(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn codes_render_as_screaming_snake_case() {
        assert_eq!(ErrorCode::StorageIoError.to_string(), "STORAGE_IO_ERROR");
        assert_eq!(
            serde_json::to_string(&ErrorCode::AlreadyConnecting).expect("serialize"),
            "\"ALREADY_CONNECTING\""
        );
        assert_eq!(
            "UNKNOWN_NETWORK".parse::<ErrorCode>().expect("parse"),
            ErrorCode::UnknownNetwork
        );
    }

    #[test]
    fn timeout_maps_to_connection_timeout_code() {
        let err = CoreError::ConnectionTimeout {
            ssid: "Cafe".into(),
            timeout_ms: 15_000,
        };
        assert_eq!(err.code(), ErrorCode::ConnectionTimeout);
    }
}
