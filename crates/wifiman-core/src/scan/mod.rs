// ── Scan coordinator ──
//
// Drives discovery and folds results into the catalog. At most one
// discovery call is in flight: later requests join it and receive the
// same shared result. A failed scan never touches the catalog.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde::Serialize;
use strum::{Display, EnumString};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{MergeStats, NetworkCatalog, NetworkSnapshot};
use crate::error::CoreError;
use crate::event::{EventBus, ServiceEvent};
use crate::platform::Discovery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Scanning,
}

/// Result of one successful discovery cycle.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Catalog snapshot published by this scan's merge.
    pub networks: NetworkSnapshot,
    /// Raw entries returned by discovery, before de-duplication.
    pub observed: usize,
    pub stats: MergeStats,
    pub completed_at: DateTime<Utc>,
}

/// Most recent scan failure, kept for status output. The catalog keeps
/// showing the last good results meanwhile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanFailure {
    pub at: DateTime<Utc>,
    pub message: String,
}

pub type ScanOutcome = Result<Arc<ScanReport>, CoreError>;
type SharedScan = Shared<BoxFuture<'static, ScanOutcome>>;

struct InFlight {
    generation: u64,
    future: SharedScan,
    cancel: CancellationToken,
}

struct ScanInner {
    discovery: Arc<dyn Discovery>,
    catalog: Arc<NetworkCatalog>,
    events: EventBus,
    phase: watch::Sender<ScanPhase>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
    last_failure: Mutex<Option<ScanFailure>>,
    timeout: Duration,
    cancel: CancellationToken,
}

/// Cheaply cloneable handle; clones share one coordinator.
#[derive(Clone)]
pub struct ScanCoordinator {
    inner: Arc<ScanInner>,
}

impl ScanCoordinator {
    /// `cancel` is the owner's shutdown token; every scan runs under a
    /// child of it.
    pub fn new(
        discovery: Arc<dyn Discovery>,
        catalog: Arc<NetworkCatalog>,
        events: EventBus,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (phase, _) = watch::channel(ScanPhase::Idle);
        Self {
            inner: Arc::new(ScanInner {
                discovery,
                catalog,
                events,
                phase,
                in_flight: Mutex::new(None),
                generation: AtomicU64::new(0),
                last_failure: Mutex::new(None),
                timeout,
                cancel,
            }),
        }
    }

    /// Run a scan, or join the one already in flight.
    ///
    /// The join happens at call time, not on first poll. Must be called
    /// from within a Tokio runtime. Dropping the returned future does not
    /// abort the scan for other waiters.
    pub fn scan(&self) -> impl Future<Output = ScanOutcome> + Send + 'static {
        self.join_or_start()
    }

    /// Abort the in-flight scan, if any. Its waiters get `Cancelled` and
    /// the catalog is left as it was.
    pub fn cancel_in_flight(&self) -> bool {
        match lock(&self.inner.in_flight).as_ref() {
            Some(flight) => {
                flight.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        *self.inner.phase.borrow()
    }

    pub fn is_scanning(&self) -> bool {
        self.phase() == ScanPhase::Scanning
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ScanPhase> {
        self.inner.phase.subscribe()
    }

    pub fn last_failure(&self) -> Option<ScanFailure> {
        lock(&self.inner.last_failure).clone()
    }

    pub fn catalog(&self) -> &Arc<NetworkCatalog> {
        &self.inner.catalog
    }

    fn join_or_start(&self) -> SharedScan {
        let mut slot = lock(&self.inner.in_flight);
        if let Some(flight) = slot.as_ref() {
            debug!(generation = flight.generation, "joining in-flight scan");
            return flight.future.clone();
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = self.inner.cancel.child_token();
        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let outcome = inner.run(token).await;
            inner.finish(generation);
            outcome
        });

        let future = async move {
            task.await
                .unwrap_or_else(|e| Err(CoreError::Internal(format!("scan task failed: {e}"))))
        }
        .boxed()
        .shared();

        *slot = Some(InFlight {
            generation,
            future: future.clone(),
            cancel,
        });
        self.inner.phase.send_replace(ScanPhase::Scanning);
        future
    }
}

impl ScanInner {
    async fn run(&self, cancel: CancellationToken) -> ScanOutcome {
        self.events.emit(ServiceEvent::ScanStarted);
        let started = Instant::now();

        let raw = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CoreError::Cancelled {
                operation: "scan".into(),
            }),
            result = tokio::time::timeout(self.timeout, self.discovery.scan()) => match result {
                Ok(Ok(raw)) => Ok(raw),
                Ok(Err(e)) => Err(CoreError::ScanFailed { reason: e.to_string() }),
                Err(_) => Err(CoreError::ScanFailed {
                    reason: format!("discovery timed out after {}ms", self.timeout.as_millis()),
                }),
            },
        };

        match raw {
            Ok(raw) => {
                let (networks, stats) = self.catalog.merge(&raw);
                *lock(&self.last_failure) = None;
                info!(
                    observed = raw.len(),
                    total = networks.len(),
                    added = stats.added,
                    removed = stats.removed,
                    elapsed_ms = started.elapsed().as_millis(),
                    "scan completed"
                );
                self.events.emit(ServiceEvent::ScanCompleted {
                    observed: raw.len(),
                    added: stats.added,
                    removed: stats.removed,
                    total: networks.len(),
                });
                Ok(Arc::new(ScanReport {
                    networks,
                    observed: raw.len(),
                    stats,
                    completed_at: Utc::now(),
                }))
            }
            Err(e) => {
                warn!(error = %e, "scan failed, keeping last good catalog");
                *lock(&self.last_failure) = Some(ScanFailure {
                    at: Utc::now(),
                    message: e.to_string(),
                });
                self.events.emit(ServiceEvent::ScanFailed {
                    error: e.code(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Clear the in-flight slot if it still belongs to `generation`.
    fn finish(&self, generation: u64) {
        let mut slot = lock(&self.in_flight);
        if slot.as_ref().is_some_and(|f| f.generation == generation) {
            *slot = None;
            self.phase.send_replace(ScanPhase::Idle);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Periodic scanning. Ticks that land while a scan is in flight are
/// skipped, not queued.
pub async fn auto_scan_task(scanner: ScanCoordinator, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if scanner.is_scanning() {
                    debug!("auto-scan tick skipped, scan already in flight");
                    continue;
                }
                if let Err(e) = scanner.scan().await {
                    warn!(error = %e, "periodic scan failed");
                }
            }
        }
    }
    debug!("auto-scan task stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::model::{RawNetwork, Security};
    use crate::platform::PlatformError;

    /// Discovery that blocks until released and counts its calls.
    #[derive(Default)]
    struct GatedDiscovery {
        calls: AtomicUsize,
        gate: Notify,
        fail: bool,
    }

    #[async_trait]
    impl Discovery for GatedDiscovery {
        async fn scan(&self) -> Result<Vec<RawNetwork>, PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            if self.fail {
                return Err(PlatformError::Driver("radio off".into()));
            }
            Ok(vec![RawNetwork {
                ssid: "Cafe".into(),
                raw_signal: -40,
                security: Security::Open,
                bssid: "02:00:00:00:00:01".into(),
                channel: 6,
            }])
        }
    }

    fn coordinator(discovery: Arc<GatedDiscovery>) -> ScanCoordinator {
        ScanCoordinator::new(
            discovery,
            Arc::new(NetworkCatalog::new(3)),
            EventBus::new(),
            Duration::from_secs(10),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn concurrent_scans_share_one_discovery_call() {
        let discovery = Arc::new(GatedDiscovery::default());
        let scanner = coordinator(Arc::clone(&discovery));

        let a = tokio::spawn({
            let s = scanner.clone();
            async move { s.scan().await }
        });
        let b = tokio::spawn({
            let s = scanner.clone();
            async move { s.scan().await }
        });
        while discovery.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(scanner.is_scanning());
        let c = scanner.scan();
        discovery.gate.notify_waiters();

        let (a, b, c) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap(), c.await.unwrap());
        assert_eq!(discovery.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &c));
        assert_eq!(a.networks.len(), 1);
        assert_eq!(scanner.phase(), ScanPhase::Idle);
    }

    #[tokio::test]
    async fn scan_stays_pending_until_discovery_returns() {
        let discovery = Arc::new(GatedDiscovery::default());
        let scanner = coordinator(Arc::clone(&discovery));

        let mut scan = tokio_test::task::spawn(scanner.scan());
        while discovery.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio_test::assert_pending!(scan.poll());

        discovery.gate.notify_waiters();
        let report = scan.await.unwrap();
        assert_eq!(report.observed, 1);
    }

    #[tokio::test]
    async fn failed_scan_keeps_previous_catalog() {
        let ok = Arc::new(GatedDiscovery::default());
        let catalog = Arc::new(NetworkCatalog::new(3));
        let good = ScanCoordinator::new(
            ok.clone(),
            Arc::clone(&catalog),
            EventBus::new(),
            Duration::from_secs(10),
            CancellationToken::new(),
        );
        let pending = tokio::spawn({
            let s = good.clone();
            async move { s.scan().await }
        });
        while ok.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        ok.gate.notify_waiters();
        pending.await.unwrap().unwrap();
        let before = catalog.snapshot();

        let failing = Arc::new(GatedDiscovery {
            fail: true,
            ..GatedDiscovery::default()
        });
        let bad = ScanCoordinator::new(
            failing.clone(),
            Arc::clone(&catalog),
            EventBus::new(),
            Duration::from_secs(10),
            CancellationToken::new(),
        );
        let pending = tokio::spawn({
            let s = bad.clone();
            async move { s.scan().await }
        });
        while failing.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        failing.gate.notify_waiters();
        let err = pending.await.unwrap().unwrap_err();

        assert!(matches!(err, CoreError::ScanFailed { .. }));
        assert!(Arc::ptr_eq(&before, &catalog.snapshot()));
        assert!(bad.last_failure().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_discovery_times_out_as_scan_failed() {
        let discovery = Arc::new(GatedDiscovery::default());
        let scanner = coordinator(discovery);
        let err = scanner.scan().await.unwrap_err();
        assert!(matches!(err, CoreError::ScanFailed { .. }));
        assert!(scanner.catalog().is_empty());
        assert!(!scanner.is_scanning());
    }

    #[tokio::test]
    async fn cancel_in_flight_leaves_catalog_untouched() {
        let discovery = Arc::new(GatedDiscovery::default());
        let scanner = coordinator(Arc::clone(&discovery));
        let pending = tokio::spawn({
            let s = scanner.clone();
            async move { s.scan().await }
        });
        while discovery.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert!(scanner.cancel_in_flight());
        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::Cancelled);
        assert!(scanner.catalog().is_empty());
    }

    #[tokio::test]
    async fn scan_emits_start_and_completion() {
        let discovery = Arc::new(GatedDiscovery::default());
        let events = EventBus::new();
        let mut rx = events.subscribe();
        let scanner = ScanCoordinator::new(
            discovery.clone(),
            Arc::new(NetworkCatalog::new(3)),
            events,
            Duration::from_secs(10),
            CancellationToken::new(),
        );
        let pending = tokio::spawn({
            let s = scanner.clone();
            async move { s.scan().await }
        });
        while discovery.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        discovery.gate.notify_waiters();
        pending.await.unwrap().unwrap();

        assert_eq!(rx.recv().await.unwrap(), ServiceEvent::ScanStarted);
        assert!(matches!(
            rx.recv().await.unwrap(),
            ServiceEvent::ScanCompleted { observed: 1, total: 1, .. }
        ));
    }
}
