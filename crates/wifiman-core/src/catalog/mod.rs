// ── Network catalog ──
//
// Single source of truth for `NetworkRecord`s. Records are held by SSID
// key; callers only ever receive immutable `Arc` snapshots. Every mutation
// takes the write lock, edits the map and republishes the full snapshot
// before releasing it, so observers see whole merges or nothing.

mod stream;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{ConnectionState, NetworkRecord, RawNetwork};

pub use stream::{NetworkStream, NetworkWatchStream};

/// Immutable, ordered view of the catalog.
pub type NetworkSnapshot = Arc<Vec<Arc<NetworkRecord>>>;

/// Counts from one `merge`, for logging and scan reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub added: usize,
    pub updated: usize,
    pub stale: usize,
    pub removed: usize,
}

pub struct NetworkCatalog {
    records: Mutex<IndexMap<String, NetworkRecord>>,
    snapshot: watch::Sender<NetworkSnapshot>,
    stale_scan_limit: u32,
}

impl NetworkCatalog {
    /// `stale_scan_limit` is the number of consecutive scans a network may
    /// be missing before it is dropped. Zero is treated as one.
    pub fn new(stale_scan_limit: u32) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            records: Mutex::new(IndexMap::new()),
            snapshot,
            stale_scan_limit: stale_scan_limit.max(1),
        }
    }

    // ── Scan results ─────────────────────────────────────────────────

    /// Fold one scan's results into the catalog.
    ///
    /// Observed SSIDs are created or have their radio fields replaced.
    /// Unobserved records are kept with their last data and a bumped miss
    /// counter; they are removed once the counter reaches the stale limit,
    /// unless currently connected. When several access points share an
    /// SSID the strongest one wins.
    pub fn merge(&self, scan: &[RawNetwork]) -> (NetworkSnapshot, MergeStats) {
        let now = Utc::now();
        let mut strongest: HashMap<&str, &RawNetwork> = HashMap::with_capacity(scan.len());
        for raw in scan.iter().filter(|r| !r.ssid.is_empty()) {
            strongest
                .entry(raw.ssid.as_str())
                .and_modify(|best| {
                    if raw.raw_signal > best.raw_signal {
                        *best = raw;
                    }
                })
                .or_insert(raw);
        }

        let mut stats = MergeStats::default();
        let mut records = self.lock();

        let limit = self.stale_scan_limit;
        records.retain(|ssid, record| {
            if strongest.contains_key(ssid.as_str()) {
                return true;
            }
            record.missed_scans = record.missed_scans.saturating_add(1);
            if record.missed_scans >= limit && !record.is_connected() {
                stats.removed += 1;
                debug!(ssid = %ssid, missed = record.missed_scans, "dropping stale network");
                false
            } else {
                stats.stale += 1;
                true
            }
        });

        for (ssid, raw) in strongest {
            if let Some(record) = records.get_mut(ssid) {
                record.apply_observation(raw, now);
                stats.updated += 1;
            } else {
                records.insert(ssid.to_owned(), NetworkRecord::from_raw(raw, now));
                stats.added += 1;
            }
        }

        let snap = self.publish(&records);
        debug!(?stats, total = snap.len(), "scan merged into catalog");
        (snap, stats)
    }

    // ── User state ───────────────────────────────────────────────────

    pub fn set_favorite(&self, ssid: &str, value: bool) -> Result<(), CoreError> {
        let mut records = self.lock();
        let record = records
            .get_mut(ssid)
            .ok_or_else(|| CoreError::UnknownNetwork { ssid: ssid.to_owned() })?;
        if record.favorite != value {
            record.favorite = value;
            self.publish(&records);
        }
        Ok(())
    }

    /// Flip the favorite flag, returning the new value.
    pub fn toggle_favorite(&self, ssid: &str) -> Result<bool, CoreError> {
        let mut records = self.lock();
        let record = records
            .get_mut(ssid)
            .ok_or_else(|| CoreError::UnknownNetwork { ssid: ssid.to_owned() })?;
        record.favorite = !record.favorite;
        let value = record.favorite;
        self.publish(&records);
        Ok(value)
    }

    // ── Connection state ─────────────────────────────────────────────

    /// Make `ssid` the one connected network: every other record is forced
    /// to `Disconnected` in the same publication. Returns `false` (and
    /// changes nothing) if the SSID is not in the catalog.
    pub fn mark_connected(&self, ssid: &str) -> bool {
        let mut records = self.lock();
        if !records.contains_key(ssid) {
            return false;
        }
        let now = Utc::now();
        for (key, record) in records.iter_mut() {
            if key == ssid {
                record.connection_state = ConnectionState::Connected;
                record.last_connected_at = Some(now);
            } else if record.connection_state == ConnectionState::Connected {
                record.connection_state = ConnectionState::Disconnected;
            }
        }
        self.publish(&records);
        true
    }

    /// Set a non-connected state on one record. `Connected` is routed
    /// through [`mark_connected`](Self::mark_connected) to keep the
    /// single-connection invariant.
    pub fn set_state(&self, ssid: &str, state: ConnectionState) -> bool {
        if state == ConnectionState::Connected {
            return self.mark_connected(ssid);
        }
        let mut records = self.lock();
        let Some(record) = records.get_mut(ssid) else {
            return false;
        };
        if record.connection_state != state {
            record.connection_state = state;
            self.publish(&records);
        }
        true
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, ssid: &str) -> Option<NetworkRecord> {
        self.lock().get(ssid).cloned()
    }

    /// The record currently in `Connected`, if any.
    pub fn connected(&self) -> Option<Arc<NetworkRecord>> {
        self.snapshot().iter().find(|r| r.is_connected()).cloned()
    }

    /// Current snapshot (cheap `Arc` clone), strongest signal first.
    pub fn snapshot(&self) -> NetworkSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn favorites(&self) -> Vec<Arc<NetworkRecord>> {
        self.snapshot()
            .iter()
            .filter(|r| r.favorite)
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> NetworkStream {
        NetworkStream::new(self.snapshot.subscribe())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, NetworkRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rebuild the ordered snapshot from the locked map and broadcast it.
    /// Called with the lock held so publication order matches mutation order.
    fn publish(&self, records: &IndexMap<String, NetworkRecord>) -> NetworkSnapshot {
        let mut values: Vec<Arc<NetworkRecord>> =
            records.values().cloned().map(Arc::new).collect();
        values.sort_by(|a, b| {
            b.signal_strength
                .cmp(&a.signal_strength)
                .then_with(|| a.ssid.cmp(&b.ssid))
        });
        let snap = Arc::new(values);
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|s| *s = Arc::clone(&snap));
        snap
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::Security;

    fn raw(ssid: &str, dbm: i32) -> RawNetwork {
        RawNetwork {
            ssid: ssid.into(),
            raw_signal: dbm,
            security: Security::Wpa2Personal,
            bssid: format!("02:00:00:00:00:{:02x}", ssid.len()),
            channel: 11,
        }
    }

    fn connected_count(catalog: &NetworkCatalog) -> usize {
        catalog.snapshot().iter().filter(|r| r.is_connected()).count()
    }

    #[test]
    fn merge_creates_and_orders_by_signal() {
        let catalog = NetworkCatalog::new(3);
        let (snap, stats) = catalog.merge(&[raw("Weak", -80), raw("Strong", -20)]);
        assert_eq!(stats.added, 2);
        let names: Vec<&str> = snap.iter().map(|r| r.ssid.as_str()).collect();
        assert_eq!(names, vec!["Strong", "Weak"]);
    }

    #[test]
    fn duplicate_ssids_keep_strongest_access_point() {
        let catalog = NetworkCatalog::new(3);
        let mut far = raw("Mesh", -80);
        far.bssid = "02:00:00:00:00:aa".into();
        let mut near = raw("Mesh", -30);
        near.bssid = "02:00:00:00:00:bb".into();

        catalog.merge(&[far, near]);

        let record = catalog.get("Mesh").unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(record.signal_strength, 70);
        assert_eq!(record.bssid.as_deref(), Some("02:00:00:00:00:bb"));
    }

    #[test]
    fn favorite_and_last_connected_survive_rescan() {
        let catalog = NetworkCatalog::new(3);
        catalog.merge(&[raw("Home", -40)]);
        catalog.set_favorite("Home", true).unwrap();
        catalog.mark_connected("Home");
        let connected_at = catalog.get("Home").unwrap().last_connected_at;

        catalog.merge(&[raw("Home", -65)]);

        let record = catalog.get("Home").unwrap();
        assert!(record.favorite);
        assert_eq!(record.last_connected_at, connected_at);
        assert_eq!(record.signal_strength, 35);
    }

    #[test]
    fn missing_favorite_is_kept_until_limit_then_removed() {
        let catalog = NetworkCatalog::new(3);
        catalog.merge(&[raw("Home", -40), raw("Cafe", -50)]);
        catalog.set_favorite("Home", true).unwrap();

        for miss in 1..3 {
            catalog.merge(&[raw("Cafe", -50)]);
            let home = catalog.get("Home").expect("still present");
            assert_eq!(home.missed_scans, miss);
            assert_eq!(home.signal_strength, 60, "stale data retained");
            assert!(home.is_stale());
        }

        let (snap, stats) = catalog.merge(&[raw("Cafe", -50)]);
        assert_eq!(stats.removed, 1);
        assert!(snap.iter().all(|r| r.ssid != "Home"));
    }

    #[test]
    fn reappearing_network_resets_miss_counter() {
        let catalog = NetworkCatalog::new(3);
        catalog.merge(&[raw("Home", -40)]);
        catalog.merge(&[]);
        catalog.merge(&[]);
        catalog.merge(&[raw("Home", -45)]);
        assert_eq!(catalog.get("Home").unwrap().missed_scans, 0);
        catalog.merge(&[]);
        catalog.merge(&[]);
        assert!(catalog.get("Home").is_some());
    }

    #[test]
    fn connected_network_is_never_pruned() {
        let catalog = NetworkCatalog::new(1);
        catalog.merge(&[raw("Home", -40)]);
        catalog.mark_connected("Home");
        catalog.merge(&[]);
        catalog.merge(&[]);
        assert!(catalog.get("Home").is_some());
    }

    #[test]
    fn mark_connected_enforces_single_connection() {
        let catalog = NetworkCatalog::new(3);
        catalog.merge(&[raw("A", -40), raw("B", -50), raw("C", -60)]);

        assert!(catalog.mark_connected("A"));
        assert!(catalog.mark_connected("B"));
        assert!(catalog.set_state("C", ConnectionState::Connected));

        assert_eq!(connected_count(&catalog), 1);
        assert_eq!(catalog.connected().unwrap().ssid, "C");
        assert_eq!(
            catalog.get("A").unwrap().connection_state,
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn mark_connected_on_unknown_ssid_changes_nothing() {
        let catalog = NetworkCatalog::new(3);
        catalog.merge(&[raw("A", -40)]);
        catalog.mark_connected("A");
        assert!(!catalog.mark_connected("Ghost"));
        assert_eq!(catalog.connected().unwrap().ssid, "A");
    }

    #[test]
    fn set_favorite_unknown_network_fails() {
        let catalog = NetworkCatalog::new(3);
        let err = catalog.set_favorite("Ghost", true).unwrap_err();
        assert_eq!(err, CoreError::UnknownNetwork { ssid: "Ghost".into() });
    }

    #[test]
    fn toggle_favorite_flips() {
        let catalog = NetworkCatalog::new(3);
        catalog.merge(&[raw("A", -40)]);
        assert!(catalog.toggle_favorite("A").unwrap());
        assert_eq!(catalog.favorites().len(), 1);
        assert!(!catalog.toggle_favorite("A").unwrap());
        assert!(catalog.favorites().is_empty());
    }

    #[test]
    fn snapshots_are_isolated_from_later_mutation() {
        let catalog = NetworkCatalog::new(3);
        catalog.merge(&[raw("A", -40)]);
        let before = catalog.snapshot();
        catalog.mark_connected("A");
        assert_eq!(before[0].connection_state, ConnectionState::Disconnected);
        assert_eq!(catalog.snapshot()[0].connection_state, ConnectionState::Connected);
    }

    #[test]
    fn every_published_snapshot_has_at_most_one_connected() {
        let catalog = Arc::new(NetworkCatalog::new(3));
        catalog.merge(&[raw("A", -40), raw("B", -50), raw("C", -60), raw("D", -70)]);
        let mut rx = catalog.snapshot.subscribe();

        let writer = {
            let catalog = Arc::clone(&catalog);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let target = ["A", "B", "C", "D"][i % 4];
                    catalog.mark_connected(target);
                    catalog.merge(&[raw("A", -40), raw("B", -50), raw("C", -60), raw("D", -70)]);
                }
            })
        };

        for _ in 0..500 {
            let snap = rx.borrow_and_update().clone();
            assert!(snap.iter().filter(|r| r.is_connected()).count() <= 1);
        }
        writer.join().unwrap();
        assert_eq!(connected_count(&catalog), 1);
    }
}
