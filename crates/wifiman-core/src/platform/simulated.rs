// ── Simulated radio ──
//
// In-process stand-in for a real wireless stack. Backs the CLI (driver
// access is out of scope) and doubles as a deterministic test fixture
// when jitter and latency are zero.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Association, Discovery, PlatformError};
use crate::model::{RawNetwork, Security};

/// One network the simulated radio can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedNetwork {
    pub ssid: String,
    pub signal_dbm: i32,
    #[serde(default)]
    pub security: Security,
    /// Passphrase accepted by the access point. Ignored for open networks.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_bssid")]
    pub bssid: String,
    #[serde(default = "default_channel")]
    pub channel: u16,
}

fn default_bssid() -> String {
    "02:00:00:00:00:01".into()
}

fn default_channel() -> u16 {
    6
}

impl SimulatedNetwork {
    pub fn open(ssid: &str, signal_dbm: i32) -> Self {
        Self {
            ssid: ssid.into(),
            signal_dbm,
            security: Security::Open,
            password: None,
            bssid: default_bssid(),
            channel: default_channel(),
        }
    }

    pub fn secured(ssid: &str, signal_dbm: i32, password: &str) -> Self {
        Self {
            ssid: ssid.into(),
            signal_dbm,
            security: Security::Wpa2Personal,
            password: Some(password.into()),
            bssid: default_bssid(),
            channel: default_channel(),
        }
    }

    fn to_raw(&self, jitter: i32) -> RawNetwork {
        let offset = if jitter > 0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0
        };
        RawNetwork {
            ssid: self.ssid.clone(),
            raw_signal: self.signal_dbm.saturating_add(offset),
            security: self.security,
            bssid: self.bssid.clone(),
            channel: self.channel,
        }
    }
}

/// A fake radio implementing both platform primitives.
pub struct SimulatedRadio {
    networks: Mutex<Vec<SimulatedNetwork>>,
    latency: Duration,
    jitter_dbm: i32,
    joined: Mutex<Option<String>>,
    scans: AtomicUsize,
}

impl SimulatedRadio {
    pub fn new(networks: Vec<SimulatedNetwork>) -> Self {
        Self {
            networks: Mutex::new(networks),
            latency: Duration::ZERO,
            jitter_dbm: 0,
            joined: Mutex::new(None),
            scans: AtomicUsize::new(0),
        }
    }

    /// The neighbourhood shown by the demo UI.
    pub fn demo() -> Self {
        let mut office = SimulatedNetwork::secured("Office_Network", -10, "office-2024");
        office.channel = 36;
        office.security = Security::Wpa3Personal;
        let mut neighbor = SimulatedNetwork::secured("Neighbor_5G", -28, "not-yours");
        neighbor.channel = 149;

        Self::new(vec![
            SimulatedNetwork::secured("Home_WiFi", -15, "home-sweet-home"),
            neighbor,
            SimulatedNetwork::open("Coffee_Shop_Free", -40),
            office,
            SimulatedNetwork::secured("Guest_Network", -60, "welcome"),
            SimulatedNetwork::open("Public_WiFi", -70),
            SimulatedNetwork::secured("Library_WiFi", -45, "quiet-please"),
        ])
        .with_latency(Duration::from_millis(300))
        .with_jitter(5)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Randomize each reported signal by up to ±`dbm` per scan.
    pub fn with_jitter(mut self, dbm: i32) -> Self {
        self.jitter_dbm = dbm.saturating_abs();
        self
    }

    /// Number of discovery calls served so far.
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// The SSID the radio is joined to right now.
    pub fn current_ssid(&self) -> Option<String> {
        lock(&self.joined).clone()
    }

    /// Replace the visible networks (a network "moving out of range").
    pub fn set_networks(&self, networks: Vec<SimulatedNetwork>) {
        *lock(&self.networks) = networks;
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl Discovery for SimulatedRadio {
    async fn scan(&self) -> Result<Vec<RawNetwork>, PlatformError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let jitter = self.jitter_dbm;
        let found: Vec<RawNetwork> = lock(&self.networks)
            .iter()
            .map(|n| n.to_raw(jitter))
            .collect();
        debug!(count = found.len(), "simulated scan complete");
        Ok(found)
    }
}

#[async_trait]
impl Association for SimulatedRadio {
    async fn associate(
        &self,
        ssid: &str,
        secret: Option<&SecretString>,
    ) -> Result<(), PlatformError> {
        self.delay().await;
        let network = lock(&self.networks)
            .iter()
            .find(|n| n.ssid == ssid)
            .cloned()
            .ok_or_else(|| PlatformError::Rejected(format!("'{ssid}' is out of range")))?;

        if network.security.is_secured() {
            let offered = secret.map(ExposeSecret::expose_secret);
            match (offered, network.password.as_deref()) {
                (Some(given), Some(expected)) if given == expected => {}
                _ => return Err(PlatformError::Rejected("authentication failed".into())),
            }
        }

        *lock(&self.joined) = Some(ssid.to_owned());
        Ok(())
    }

    async fn dissociate(&self) -> Result<(), PlatformError> {
        self.delay().await;
        lock(&self.joined).take();
        Ok(())
    }

    async fn current_connection(&self) -> Option<String> {
        lock(&self.joined).clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_wrong_password() {
        let radio = SimulatedRadio::new(vec![SimulatedNetwork::secured("Office", -40, "pw1")]);
        let wrong = SecretString::from("nope".to_string());
        let err = radio.associate("Office", Some(&wrong)).await.unwrap_err();
        assert!(matches!(err, PlatformError::Rejected(_)));
        assert_eq!(radio.current_connection().await, None);
    }

    #[tokio::test]
    async fn extreme_jitter_stays_in_range() {
        let radio = SimulatedRadio::new(vec![SimulatedNetwork::open("Cafe", -50)])
            .with_jitter(i32::MIN);
        let found = radio.scan().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ssid, "Cafe");
    }

    #[tokio::test]
    async fn open_network_needs_no_secret() {
        let radio = SimulatedRadio::new(vec![SimulatedNetwork::open("Cafe", -50)]);
        radio.associate("Cafe", None).await.expect("associate");
        assert_eq!(radio.current_connection().await.as_deref(), Some("Cafe"));
        radio.dissociate().await.expect("dissociate");
        assert_eq!(radio.current_connection().await, None);
    }

    #[tokio::test]
    async fn scan_without_jitter_is_exact() {
        let radio = SimulatedRadio::new(vec![SimulatedNetwork::open("Cafe", -50)]);
        let found = radio.scan().await.expect("scan");
        assert_eq!(found[0].raw_signal, -50);
        assert_eq!(radio.scan_count(), 1);
    }
}
