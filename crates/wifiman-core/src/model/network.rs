// ── Network domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Advertised security of a wireless network.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Security {
    Open,
    Wep,
    WpaPersonal,
    Wpa2Personal,
    Wpa3Personal,
    Enterprise,
    #[default]
    Unknown,
}

impl Security {
    /// Anything other than an explicitly open network is treated as secured.
    pub fn is_secured(self) -> bool {
        self != Self::Open
    }
}

/// Connection state of a catalog record.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// One access point as reported by the discovery primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNetwork {
    pub ssid: String,
    /// Raw signal in dBm (typically -100 ..= 0).
    pub raw_signal: i32,
    pub security: Security,
    pub bssid: String,
    pub channel: u16,
}

/// Catalog entry for one SSID.
///
/// `favorite` and `last_connected_at` belong to the user and survive
/// rescans; the radio fields are replaced by every scan that observes
/// the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecord {
    pub ssid: String,
    /// Normalized 0-100.
    pub signal_strength: u8,
    pub secured: bool,
    pub security: Security,
    pub bssid: Option<String>,
    pub channel: Option<u16>,
    pub connection_state: ConnectionState,
    pub favorite: bool,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_seen_at: DateTime<Utc>,
    /// Consecutive successful scans that did not observe this SSID.
    pub missed_scans: u32,
}

impl NetworkRecord {
    pub(crate) fn from_raw(raw: &RawNetwork, seen_at: DateTime<Utc>) -> Self {
        Self {
            ssid: raw.ssid.clone(),
            signal_strength: normalize_signal(raw.raw_signal),
            secured: raw.security.is_secured(),
            security: raw.security,
            bssid: Some(raw.bssid.clone()),
            channel: Some(raw.channel),
            connection_state: ConnectionState::Disconnected,
            favorite: false,
            last_connected_at: None,
            last_seen_at: seen_at,
            missed_scans: 0,
        }
    }

    /// Replace the radio-derived fields, keeping user state.
    pub(crate) fn apply_observation(&mut self, raw: &RawNetwork, seen_at: DateTime<Utc>) {
        self.signal_strength = normalize_signal(raw.raw_signal);
        self.secured = raw.security.is_secured();
        self.security = raw.security;
        self.bssid = Some(raw.bssid.clone());
        self.channel = Some(raw.channel);
        self.last_seen_at = seen_at;
        self.missed_scans = 0;
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// Missing from at least the most recent scan.
    pub fn is_stale(&self) -> bool {
        self.missed_scans > 0
    }

    /// Signal as 0-4 bars.
    pub fn signal_bars(&self) -> u8 {
        match self.signal_strength {
            80.. => 4,
            60..=79 => 3,
            40..=59 => 2,
            20..=39 => 1,
            _ => 0,
        }
    }
}

/// Map raw dBm onto the 0-100 scale: `clamp(dbm + 100, 0, 100)`.
pub fn normalize_signal(raw_dbm: i32) -> u8 {
    let scaled = raw_dbm.saturating_add(100).clamp(0, 100);
    u8::try_from(scaled).unwrap_or(0)
}
