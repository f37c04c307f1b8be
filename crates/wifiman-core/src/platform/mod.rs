// ── Host platform primitives ──
//
// The core never talks to a driver directly. Discovery and association
// are supplied by the host behind these two traits; the core does not
// branch on which host it is running on.

mod simulated;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use crate::model::RawNetwork;

pub use simulated::{SimulatedNetwork, SimulatedRadio};

/// Failure reported by a platform primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The access point refused us (bad credential, auth failure, out of range).
    #[error("rejected: {0}")]
    Rejected(String),

    /// Driver or OS service failure.
    #[error("driver error: {0}")]
    Driver(String),
}

/// Bounded-time discovery of nearby networks.
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn scan(&self) -> Result<Vec<RawNetwork>, PlatformError>;
}

/// OS-level association with a single network.
#[async_trait]
pub trait Association: Send + Sync {
    /// Join `ssid`. The secret is only borrowed for the duration of the call.
    async fn associate(&self, ssid: &str, secret: Option<&SecretString>)
    -> Result<(), PlatformError>;

    /// Leave whatever network is currently joined.
    async fn dissociate(&self) -> Result<(), PlatformError>;

    /// SSID of the network currently joined, if any.
    async fn current_connection(&self) -> Option<String>;
}
