// ── Credential domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored network secret. `secret` is always ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    pub ssid: String,
    pub secret: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

/// Listing view of a credential -- never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub ssid: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&CredentialEntry> for CredentialSummary {
    fn from(entry: &CredentialEntry) -> Self {
        Self {
            ssid: entry.ssid.clone(),
            updated_at: entry.updated_at,
        }
    }
}

/// Result of decrypting every stored entry once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialAudit {
    pub readable: Vec<CredentialSummary>,
    /// Entries whose ciphertext failed authentication; excluded from `readable`.
    pub corrupt: Vec<String>,
}
