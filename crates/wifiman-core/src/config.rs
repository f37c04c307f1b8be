// ── Runtime manager configuration ──
//
// Timeouts, scan cadence and policy switches. Built by the config crate
// or the caller and handed in -- core never reads config files.

use std::time::Duration;

/// WPA passphrases top out at 63 characters; enterprise secrets and
/// hex PSKs are longer, so the store accepts a little more.
pub const DEFAULT_MAX_SECRET_LEN: usize = 256;

/// Tuning for every suspending operation plus the catalog/reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Upper bound for a single discovery call.
    pub scan_timeout: Duration,
    /// Deadline for a connect attempt, measured from acceptance.
    pub connect_timeout: Duration,
    /// Upper bound for one credential-store disk operation.
    pub io_timeout: Duration,
    /// Delay before the single internal retry of a transient I/O failure.
    pub io_retry_backoff: Duration,
    /// Periodic scan interval. `Duration::ZERO` disables auto-scan.
    pub auto_scan_interval: Duration,
    /// Consecutive scans a network may be missing before it is dropped.
    pub stale_scan_limit: u32,
    /// Reconnect to a favorite network with a stored credential after scans.
    pub auto_reconnect: bool,
    /// Maximum accepted secret length in bytes.
    pub max_secret_len: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
            io_timeout: Duration::from_secs(2),
            io_retry_backoff: Duration::from_millis(100),
            auto_scan_interval: Duration::from_secs(30),
            stale_scan_limit: 3,
            auto_reconnect: false,
            max_secret_len: DEFAULT_MAX_SECRET_LEN,
        }
    }
}

impl ManagerConfig {
    /// One-shot profile for CLI invocations: no background scanning.
    pub fn oneshot() -> Self {
        Self {
            auto_scan_interval: Duration::ZERO,
            auto_reconnect: false,
            ..Self::default()
        }
    }
}
