// ── Domain model ──
//
// Canonical types shared by the catalog, scan coordinator, connection
// manager and the service boundary.

pub mod attempt;
pub mod credential;
pub mod network;

pub use attempt::{AttemptId, AttemptState, ConnectionAttempt};
pub use credential::{CredentialAudit, CredentialEntry, CredentialSummary};
pub use network::{ConnectionState, NetworkRecord, RawNetwork, Security, normalize_signal};
