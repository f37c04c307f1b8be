// wifiman-core: Network catalog, scan coordination, connection state machine
// and encrypted credential store behind a single service facade.

pub mod catalog;
pub mod config;
pub mod connection;
pub mod credential;
pub mod error;
pub mod event;
pub mod model;
pub mod platform;
pub mod scan;
pub mod service;

// ── Primary re-exports ──────────────────────────────────────────────
pub use catalog::{MergeStats, NetworkCatalog, NetworkSnapshot, NetworkStream};
pub use config::ManagerConfig;
pub use connection::{ConnectTicket, ConnectionManager, LinkPhase};
pub use credential::{
    CredentialStore, CredentialStoreStatus, EphemeralKeySource, FileKeySource, FileVault,
    KeySource, KeyringKeySource, MemoryVault, PassphraseKeySource, VaultStorage,
};
pub use error::{CoreError, ErrorCode};
pub use event::{EventBus, ServiceEvent};
pub use platform::{Association, Discovery, PlatformError, SimulatedNetwork, SimulatedRadio};
pub use scan::{ScanCoordinator, ScanPhase, ScanReport};
pub use service::{ErrorBody, Password, Request, Response, ScanSummary, Service, ServiceStatus};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AttemptId, AttemptState, ConnectionAttempt, ConnectionState, CredentialAudit,
    CredentialEntry, CredentialSummary, NetworkRecord, RawNetwork, Security,
};
