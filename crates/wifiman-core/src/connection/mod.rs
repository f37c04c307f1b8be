// ── Connection manager ──
//
// Owns the single live connect attempt. A request for a different SSID
// while one is pending is refused; a repeat for the same SSID joins the
// pending attempt. The attempt runs in its own task bounded by a deadline
// fixed at acceptance, and only a successful association ever marks a
// record `Connected`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use strum::{Display, EnumString};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::NetworkCatalog;
use crate::credential::CredentialStore;
use crate::error::CoreError;
use crate::event::{EventBus, ServiceEvent};
use crate::model::{AttemptState, ConnectionAttempt, ConnectionState, NetworkRecord};
use crate::platform::{Association, PlatformError};

/// Link-level view across all networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkPhase {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

pub type ConnectOutcome = Result<(), CoreError>;
type SharedConnect = Shared<BoxFuture<'static, ConnectOutcome>>;

/// Handle to an accepted (or joined) connect attempt.
pub struct ConnectTicket {
    attempt: ConnectionAttempt,
    joined: bool,
    outcome: SharedConnect,
}

impl ConnectTicket {
    pub fn attempt(&self) -> &ConnectionAttempt {
        &self.attempt
    }

    /// `true` when this request joined an attempt that was already pending.
    pub fn joined(&self) -> bool {
        self.joined
    }

    /// Wait for the attempt to resolve.
    pub async fn wait(self) -> ConnectOutcome {
        self.outcome.await
    }
}

struct LiveAttempt {
    attempt: ConnectionAttempt,
    cancel: CancellationToken,
    outcome: SharedConnect,
}

/// Secret handed to the association primitive, and whether it should be
/// stored once the association succeeds.
struct ResolvedSecret {
    secret: Option<SecretString>,
    save: bool,
}

struct ConnInner {
    association: Arc<dyn Association>,
    catalog: Arc<NetworkCatalog>,
    credentials: Arc<CredentialStore>,
    events: EventBus,
    live: Mutex<Option<LiveAttempt>>,
    last_attempt: Mutex<Option<ConnectionAttempt>>,
    link: watch::Sender<LinkPhase>,
    connect_timeout: Duration,
    auto_reconnect: bool,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ConnInner>,
}

impl ConnectionManager {
    pub fn new(
        association: Arc<dyn Association>,
        catalog: Arc<NetworkCatalog>,
        credentials: Arc<CredentialStore>,
        events: EventBus,
        connect_timeout: Duration,
        auto_reconnect: bool,
        cancel: CancellationToken,
    ) -> Self {
        let (link, _) = watch::channel(LinkPhase::Idle);
        Self {
            inner: Arc::new(ConnInner {
                association,
                catalog,
                credentials,
                events,
                live: Mutex::new(None),
                last_attempt: Mutex::new(None),
                link,
                connect_timeout,
                auto_reconnect,
                cancel,
            }),
        }
    }

    // ── Connect ──────────────────────────────────────────────────────

    /// Connect and wait for the outcome.
    pub async fn connect(&self, ssid: &str, password: Option<SecretString>) -> ConnectOutcome {
        self.begin_connect(ssid, password)?.wait().await
    }

    /// Accept a connect request without waiting for it to resolve.
    ///
    /// Fails synchronously with `AlreadyConnecting` (another SSID is
    /// pending), `UnknownNetwork`, or `PasswordRequired` (secured network,
    /// nothing supplied and nothing stored). None of these touch the
    /// catalog. Connecting to the network that is already connected
    /// succeeds immediately.
    pub fn begin_connect(
        &self,
        ssid: &str,
        password: Option<SecretString>,
    ) -> Result<ConnectTicket, CoreError> {
        let inner = &self.inner;
        let mut live = lock(&inner.live);

        if let Some(current) = live.as_ref() {
            if current.attempt.ssid == ssid {
                debug!(ssid = %ssid, attempt = %current.attempt.id, "joining pending attempt");
                return Ok(ConnectTicket {
                    attempt: current.attempt.clone(),
                    joined: true,
                    outcome: current.outcome.clone(),
                });
            }
            return Err(CoreError::AlreadyConnecting {
                ssid: current.attempt.ssid.clone(),
            });
        }
        if *inner.link.borrow() == LinkPhase::Disconnecting {
            return Err(CoreError::AlreadyConnecting { ssid: ssid.to_owned() });
        }

        let record = inner
            .catalog
            .get(ssid)
            .ok_or_else(|| CoreError::UnknownNetwork { ssid: ssid.to_owned() })?;

        if record.is_connected() {
            debug!(ssid = %ssid, "already connected");
            let mut attempt = ConnectionAttempt::new(ssid, Duration::ZERO);
            attempt.state = AttemptState::Succeeded;
            return Ok(ConnectTicket {
                attempt,
                joined: false,
                outcome: futures_util::future::ready(Ok(())).boxed().shared(),
            });
        }

        let secret = inner.resolve_secret(&record, password)?;
        let attempt = ConnectionAttempt::new(ssid, inner.connect_timeout);
        let deadline = Instant::now() + inner.connect_timeout;
        let cancel = inner.cancel.child_token();
        let prior = record.connection_state;

        inner.catalog.set_state(ssid, ConnectionState::Connecting);
        inner.link.send_replace(LinkPhase::Connecting);

        let task = tokio::spawn(Arc::clone(inner).drive(
            attempt.clone(),
            prior,
            secret,
            deadline,
            cancel.clone(),
        ));
        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(CoreError::Internal(format!("connect task failed: {e}"))))
        }
        .boxed()
        .shared();

        *live = Some(LiveAttempt {
            attempt: attempt.clone(),
            cancel,
            outcome: outcome.clone(),
        });
        drop(live);

        info!(ssid = %ssid, attempt = %attempt.id, secured = record.secured, "connect attempt started");
        inner.events.emit(ServiceEvent::AttemptStarted {
            attempt: attempt.clone(),
        });
        Ok(ConnectTicket {
            attempt,
            joined: false,
            outcome,
        })
    }

    /// Cancel the live attempt. Its record returns to the state it had
    /// before the attempt. Returns the attempt that was cancelled.
    pub fn cancel(&self) -> Option<ConnectionAttempt> {
        let live = lock(&self.inner.live);
        let current = live.as_ref()?;
        current.cancel.cancel();
        Some(current.attempt.clone())
    }

    // ── Disconnect ───────────────────────────────────────────────────

    /// Leave `ssid`. A no-op success when it is not connected; a pending
    /// attempt for it is cancelled. An attempt that associated before the
    /// cancellation could take effect is dissociated like any other
    /// connection. Stored credentials are kept.
    pub async fn disconnect(&self, ssid: &str) -> Result<(), CoreError> {
        let inner = &self.inner;
        let pending = {
            let live = lock(&inner.live);
            match live.as_ref() {
                Some(current) if current.attempt.ssid == ssid => {
                    current.cancel.cancel();
                    Some(current.outcome.clone())
                }
                Some(current) => {
                    return Err(CoreError::AlreadyConnecting {
                        ssid: current.attempt.ssid.clone(),
                    });
                }
                None => None,
            }
        };
        // Whatever the attempt resolved to, the record now reflects the
        // host; a connection that slipped through is torn down below.
        if let Some(outcome) = pending {
            let resolved = outcome.await;
            debug!(ssid = %ssid, ok = resolved.is_ok(), "pending attempt resolved before disconnect");
        }

        let record = inner
            .catalog
            .get(ssid)
            .ok_or_else(|| CoreError::UnknownNetwork { ssid: ssid.to_owned() })?;
        match record.connection_state {
            ConnectionState::Connected => {}
            ConnectionState::Failed => {
                inner.catalog.set_state(ssid, ConnectionState::Disconnected);
                return Ok(());
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => return Ok(()),
        }

        {
            let _live = lock(&inner.live);
            if *inner.link.borrow() == LinkPhase::Disconnecting {
                return Ok(());
            }
            inner.link.send_replace(LinkPhase::Disconnecting);
        }

        let result = match tokio::time::timeout(inner.connect_timeout, inner.association.dissociate())
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(platform_error("dissociate", &e)),
            Err(_) => Err(CoreError::Platform {
                operation: "dissociate".into(),
                message: format!("timed out after {}ms", inner.connect_timeout.as_millis()),
            }),
        };

        match result {
            Ok(()) => {
                inner.catalog.set_state(ssid, ConnectionState::Disconnected);
                inner.link.send_replace(LinkPhase::Idle);
                info!(ssid = %ssid, "disconnected");
                inner.events.emit(ServiceEvent::Disconnected { ssid: ssid.to_owned() });
                Ok(())
            }
            Err(e) => {
                warn!(ssid = %ssid, error = %e, "disconnect failed");
                inner.link.send_replace(LinkPhase::Connected);
                Err(e)
            }
        }
    }

    // ── Platform sync ────────────────────────────────────────────────

    /// Align the catalog with the network the host is actually joined to.
    /// Returns that SSID when the host reports one.
    pub async fn sync_with_platform(&self) -> Option<String> {
        let current = self.inner.reconcile().await;
        if let Some(ssid) = &current {
            info!(ssid = %ssid, "host reports an existing connection");
        }
        current
    }

    // ── Auto-reconnect ───────────────────────────────────────────────

    /// Called once per completed scan. Starts at most one connect to the
    /// strongest eligible favorite: secured, seen in the latest scan, with
    /// a stored credential. Does nothing while any network is connected
    /// or an attempt is live.
    pub fn on_scan_completed(&self) -> Option<ConnectTicket> {
        let inner = &self.inner;
        if !inner.auto_reconnect || self.live_attempt().is_some() {
            return None;
        }
        let snapshot = inner.catalog.snapshot();
        if snapshot.iter().any(|r| r.is_connected()) {
            return None;
        }
        let candidate = snapshot.iter().find(|r| {
            r.favorite && r.secured && !r.is_stale() && inner.credentials.contains(&r.ssid)
        })?;

        match self.begin_connect(&candidate.ssid, None) {
            Ok(ticket) => {
                info!(ssid = %candidate.ssid, "auto-reconnect started");
                Some(ticket)
            }
            Err(e) => {
                debug!(ssid = %candidate.ssid, error = %e, "auto-reconnect skipped");
                None
            }
        }
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn live_attempt(&self) -> Option<ConnectionAttempt> {
        lock(&self.inner.live).as_ref().map(|l| l.attempt.clone())
    }

    /// The most recently resolved attempt.
    pub fn last_attempt(&self) -> Option<ConnectionAttempt> {
        lock(&self.inner.last_attempt).clone()
    }

    pub fn link_phase(&self) -> LinkPhase {
        *self.inner.link.borrow()
    }

    pub fn subscribe_link(&self) -> watch::Receiver<LinkPhase> {
        self.inner.link.subscribe()
    }

    pub fn auto_reconnect(&self) -> bool {
        self.inner.auto_reconnect
    }
}

impl ConnInner {
    fn resolve_secret(
        &self,
        record: &NetworkRecord,
        password: Option<SecretString>,
    ) -> Result<ResolvedSecret, CoreError> {
        if !record.secured {
            return Ok(ResolvedSecret {
                secret: None,
                save: false,
            });
        }
        if let Some(password) = password.filter(|p| !p.expose_secret().is_empty()) {
            return Ok(ResolvedSecret {
                secret: Some(password),
                save: true,
            });
        }
        match self.credentials.get(&record.ssid)? {
            Some(stored) => Ok(ResolvedSecret {
                secret: Some(stored),
                save: false,
            }),
            None => Err(CoreError::PasswordRequired {
                ssid: record.ssid.clone(),
            }),
        }
    }

    async fn drive(
        self: Arc<Self>,
        mut attempt: ConnectionAttempt,
        prior: ConnectionState,
        secret: ResolvedSecret,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> ConnectOutcome {
        let ssid = attempt.ssid.clone();

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(CoreError::Cancelled {
                operation: format!("connect to '{ssid}'"),
            }),
            () = tokio::time::sleep_until(deadline) => Err(CoreError::ConnectionTimeout {
                ssid: ssid.clone(),
                timeout_ms: u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            joined = self.association.associate(&ssid, secret.secret.as_ref()) => {
                joined.map_err(|e| match e {
                    PlatformError::Rejected(reason) => CoreError::ConnectionRejected {
                        ssid: ssid.clone(),
                        reason,
                    },
                    PlatformError::Driver(_) => platform_error("associate", &e),
                })
            }
        };

        attempt.state = match &result {
            Ok(()) => {
                if secret.save {
                    self.save_secret(&ssid, secret.secret.as_ref()).await;
                }
                if !self.catalog.mark_connected(&ssid) {
                    warn!(ssid = %ssid, "connected network vanished from the catalog");
                }
                AttemptState::Succeeded
            }
            Err(e) => {
                let (state, record_state) = match e {
                    CoreError::ConnectionRejected { .. } => {
                        (AttemptState::Failed, ConnectionState::Disconnected)
                    }
                    CoreError::ConnectionTimeout { .. } => (AttemptState::TimedOut, prior),
                    CoreError::Cancelled { .. } => (AttemptState::Cancelled, prior),
                    _ => (AttemptState::Failed, prior),
                };
                self.catalog.set_state(&ssid, record_state);
                self.reconcile().await;
                state
            }
        };

        self.finish(&attempt, &result);
        result
    }

    async fn save_secret(&self, ssid: &str, secret: Option<&SecretString>) {
        let Some(secret) = secret else { return };
        match self.credentials.put(ssid, secret).await {
            Ok(()) => self.events.emit(ServiceEvent::CredentialSaved {
                ssid: ssid.to_owned(),
            }),
            Err(e) => warn!(ssid = %ssid, error = %e, "connected but could not store credential"),
        }
    }

    /// Release the live slot, record the attempt and announce it.
    fn finish(&self, attempt: &ConnectionAttempt, result: &ConnectOutcome) {
        {
            let mut live = lock(&self.live);
            if live.as_ref().is_some_and(|l| l.attempt.id == attempt.id) {
                *live = None;
            }
            let phase = if self.catalog.connected().is_some() {
                LinkPhase::Connected
            } else {
                LinkPhase::Idle
            };
            self.link.send_replace(phase);
        }
        *lock(&self.last_attempt) = Some(attempt.clone());

        match result {
            Ok(()) => info!(ssid = %attempt.ssid, attempt = %attempt.id, "connected"),
            Err(e) => warn!(
                ssid = %attempt.ssid,
                attempt = %attempt.id,
                state = %attempt.state,
                error = %e,
                "connect attempt failed"
            ),
        }
        self.events.emit(ServiceEvent::resolved(attempt.clone(), result));
    }

    /// Mirror the host's current association into the catalog.
    async fn reconcile(&self) -> Option<String> {
        let current = tokio::time::timeout(self.connect_timeout, self.association.current_connection())
            .await
            .ok()
            .flatten();
        match &current {
            Some(ssid) => {
                if !self.catalog.mark_connected(ssid) {
                    debug!(ssid = %ssid, "host connection not in catalog yet");
                }
            }
            None => {
                if let Some(stale) = self.catalog.connected() {
                    self.catalog.set_state(&stale.ssid, ConnectionState::Disconnected);
                }
            }
        }
        let phase = if self.catalog.connected().is_some() {
            LinkPhase::Connected
        } else {
            LinkPhase::Idle
        };
        if lock(&self.live).is_none() {
            self.link.send_replace(phase);
        }
        current
    }
}

fn platform_error(operation: &str, err: &PlatformError) -> CoreError {
    CoreError::Platform {
        operation: operation.to_owned(),
        message: err.to_string(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drive auto-reconnect from scan completions: one candidate per
/// `ScanCompleted`, never more.
pub async fn reconnect_task(
    manager: ConnectionManager,
    mut events: broadcast::Receiver<ServiceEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(ServiceEvent::ScanCompleted { .. }) => {
                    manager.on_scan_completed();
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "reconnect task lagged behind events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    debug!("reconnect task stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::ManagerConfig;
    use crate::credential::{EphemeralKeySource, MemoryVault, VaultFile, VaultStorage};
    use crate::model::{RawNetwork, Security};

    /// Association that never completes.
    struct Hanging;

    #[async_trait]
    impl Association for Hanging {
        async fn associate(&self, _: &str, _: Option<&SecretString>) -> Result<(), PlatformError> {
            std::future::pending().await
        }
        async fn dissociate(&self) -> Result<(), PlatformError> {
            Ok(())
        }
        async fn current_connection(&self) -> Option<String> {
            None
        }
    }

    /// Accepts only `accept` as a password; remembers the joined SSID.
    #[derive(Default)]
    struct Checking {
        accept: String,
        joined: Mutex<Option<String>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Association for Checking {
        async fn associate(&self, ssid: &str, secret: Option<&SecretString>) -> Result<(), PlatformError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if let Some(secret) = secret {
                if secret.expose_secret() != self.accept {
                    return Err(PlatformError::Rejected("authentication failed".into()));
                }
            }
            *lock(&self.joined) = Some(ssid.to_owned());
            Ok(())
        }
        async fn dissociate(&self) -> Result<(), PlatformError> {
            lock(&self.joined).take();
            Ok(())
        }
        async fn current_connection(&self) -> Option<String> {
            lock(&self.joined).clone()
        }
    }

    fn raw(ssid: &str, dbm: i32, security: Security) -> RawNetwork {
        RawNetwork {
            ssid: ssid.into(),
            raw_signal: dbm,
            security,
            bssid: "02:00:00:00:00:01".into(),
            channel: 6,
        }
    }

    /// Vault whose writes take a while to become durable.
    #[derive(Default)]
    struct SlowVault(MemoryVault);

    impl VaultStorage for SlowVault {
        fn load(&self) -> std::io::Result<Option<VaultFile>> {
            self.0.load()
        }
        fn persist(&self, vault: &VaultFile) -> std::io::Result<()> {
            std::thread::sleep(Duration::from_millis(200));
            self.0.persist(vault)
        }
        fn describe(&self) -> String {
            "slow".into()
        }
    }

    async fn manager(association: Arc<dyn Association>, auto_reconnect: bool) -> ConnectionManager {
        let credentials = CredentialStore::in_memory(&ManagerConfig::oneshot())
            .await
            .unwrap();
        manager_with(association, auto_reconnect, credentials)
    }

    fn manager_with(
        association: Arc<dyn Association>,
        auto_reconnect: bool,
        credentials: CredentialStore,
    ) -> ConnectionManager {
        let catalog = Arc::new(NetworkCatalog::new(3));
        catalog.merge(&[
            raw("Cafe", -40, Security::Open),
            raw("Office", -30, Security::Wpa2Personal),
            raw("Home", -50, Security::Wpa2Personal),
        ]);
        ConnectionManager::new(
            association,
            catalog,
            Arc::new(credentials),
            EventBus::new(),
            Duration::from_secs(15),
            auto_reconnect,
            CancellationToken::new(),
        )
    }

    fn pw(s: &str) -> Option<SecretString> {
        Some(SecretString::from(s.to_owned()))
    }

    fn state(m: &ConnectionManager, ssid: &str) -> ConnectionState {
        m.inner.catalog.get(ssid).unwrap().connection_state
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_association_times_out_at_deadline() {
        let m = manager(Arc::new(Hanging), false).await;
        let started = Instant::now();

        let err = m.connect("Cafe", None).await.unwrap_err();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15), "resolved early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(15_010), "resolved late: {elapsed:?}");
        assert!(matches!(err, CoreError::ConnectionTimeout { timeout_ms: 15_000, .. }));
        assert_eq!(state(&m, "Cafe"), ConnectionState::Disconnected);
        assert_eq!(m.last_attempt().unwrap().state, AttemptState::TimedOut);
        assert!(m.live_attempt().is_none());
    }

    #[tokio::test]
    async fn different_ssid_while_pending_is_refused() {
        let m = manager(Arc::new(Hanging), false).await;
        let ticket = m.begin_connect("Cafe", None).unwrap();

        let err = m.begin_connect("Office", pw("x")).err().unwrap();
        assert_eq!(err, CoreError::AlreadyConnecting { ssid: "Cafe".into() });

        let again = m.begin_connect("Cafe", None).unwrap();
        assert!(again.joined());
        assert_eq!(again.attempt().id, ticket.attempt().id);

        assert_eq!(m.cancel().unwrap().ssid, "Cafe");
        assert!(matches!(ticket.wait().await, Err(CoreError::Cancelled { .. })));
        assert!(matches!(again.wait().await, Err(CoreError::Cancelled { .. })));
        assert_eq!(state(&m, "Cafe"), ConnectionState::Disconnected);
        assert_eq!(m.last_attempt().unwrap().state, AttemptState::Cancelled);
    }

    #[tokio::test]
    async fn open_network_connects_without_storing_anything() {
        let m = manager(Arc::new(Checking::default()), false).await;
        m.connect("Cafe", pw("ignored")).await.unwrap();
        assert_eq!(state(&m, "Cafe"), ConnectionState::Connected);
        assert!(m.inner.credentials.is_empty());
        assert_eq!(m.link_phase(), LinkPhase::Connected);
    }

    #[tokio::test]
    async fn supplied_password_is_stored_then_reused() {
        let assoc = Arc::new(Checking {
            accept: "pw1".into(),
            ..Checking::default()
        });
        let m = manager(assoc, false).await;

        m.connect("Office", pw("pw1")).await.unwrap();
        assert!(m.inner.credentials.contains("Office"));
        m.disconnect("Office").await.unwrap();
        assert_eq!(state(&m, "Office"), ConnectionState::Disconnected);

        m.connect("Office", None).await.unwrap();
        assert_eq!(state(&m, "Office"), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn secured_network_without_password_needs_one() {
        let m = manager(Arc::new(Checking::default()), false).await;
        let err = m.connect("Office", None).await.unwrap_err();
        assert_eq!(err, CoreError::PasswordRequired { ssid: "Office".into() });
        assert_eq!(state(&m, "Office"), ConnectionState::Disconnected);
        assert!(m.last_attempt().is_none());
    }

    #[tokio::test]
    async fn rejected_password_is_not_stored_and_not_connected() {
        let assoc = Arc::new(Checking {
            accept: "right".into(),
            ..Checking::default()
        });
        let m = manager(assoc, false).await;
        let err = m.connect("Office", pw("wrong")).await.unwrap_err();

        assert!(matches!(err, CoreError::ConnectionRejected { .. }));
        assert_eq!(state(&m, "Office"), ConnectionState::Disconnected);
        assert_eq!(m.last_attempt().unwrap().state, AttemptState::Failed);
        assert!(!m.inner.credentials.contains("Office"));
        assert!(m.inner.catalog.connected().is_none());

        m.disconnect("Office").await.unwrap();
        assert_eq!(state(&m, "Office"), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_after_association_won_the_race_still_leaves() {
        let assoc = Arc::new(Checking {
            accept: "pw1".into(),
            ..Checking::default()
        });
        let credentials = CredentialStore::open(
            Arc::new(EphemeralKeySource::new()),
            Arc::new(SlowVault::default()),
            &ManagerConfig::oneshot(),
        )
        .await
        .unwrap();
        let m = manager_with(assoc.clone(), false, credentials);

        let ticket = m.begin_connect("Office", pw("pw1")).unwrap();
        // Associated; the attempt is now storing the password.
        while lock(&assoc.joined).is_none() {
            tokio::task::yield_now().await;
        }
        m.disconnect("Office").await.unwrap();

        assert_eq!(ticket.wait().await, Ok(()));
        assert_eq!(state(&m, "Office"), ConnectionState::Disconnected);
        assert!(lock(&assoc.joined).is_none(), "host must be dissociated");
        assert!(m.inner.catalog.connected().is_none());
        assert_eq!(m.link_phase(), LinkPhase::Idle);
        assert!(m.inner.credentials.contains("Office"), "credentials are kept");
    }

    #[tokio::test]
    async fn switching_networks_keeps_one_connected() {
        let assoc = Arc::new(Checking {
            accept: "pw".into(),
            ..Checking::default()
        });
        let m = manager(assoc, false).await;
        m.connect("Cafe", None).await.unwrap();
        m.connect("Office", pw("pw")).await.unwrap();

        assert_eq!(state(&m, "Cafe"), ConnectionState::Disconnected);
        assert_eq!(state(&m, "Office"), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn disconnect_when_not_connected_is_noop() {
        let assoc = Arc::new(Checking::default());
        let m = manager(assoc.clone(), false).await;
        m.disconnect("Cafe").await.unwrap();
        m.disconnect("Cafe").await.unwrap();
        assert!(matches!(
            m.disconnect("Ghost").await,
            Err(CoreError::UnknownNetwork { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_network_is_rejected_up_front() {
        let m = manager(Arc::new(Checking::default()), false).await;
        let err = m.connect("Ghost", None).await.unwrap_err();
        assert_eq!(err, CoreError::UnknownNetwork { ssid: "Ghost".into() });
    }

    #[tokio::test]
    async fn auto_reconnect_picks_one_stored_favorite() {
        let assoc = Arc::new(Checking {
            accept: "pw".into(),
            ..Checking::default()
        });
        let m = manager(assoc.clone(), true).await;
        let creds = Arc::clone(&m.inner.credentials);
        creds.put("Home", &SecretString::from("pw".to_owned())).await.unwrap();
        creds.put("Office", &SecretString::from("pw".to_owned())).await.unwrap();
        m.inner.catalog.set_favorite("Home", true).unwrap();
        m.inner.catalog.set_favorite("Office", true).unwrap();

        let ticket = m.on_scan_completed().unwrap();
        assert_eq!(ticket.attempt().ssid, "Office", "strongest favorite first");
        assert!(m.on_scan_completed().is_none(), "attempt already live");
        ticket.wait().await.unwrap();

        assert!(m.on_scan_completed().is_none(), "already connected");
        assert_eq!(assoc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn auto_reconnect_disabled_does_nothing() {
        let m = manager(Arc::new(Checking::default()), false).await;
        m.inner.catalog.set_favorite("Cafe", true).unwrap();
        assert!(m.on_scan_completed().is_none());
    }

    #[tokio::test]
    async fn sync_marks_host_connection() {
        let assoc = Arc::new(Checking::default());
        *lock(&assoc.joined) = Some("Home".into());
        let m = manager(assoc, false).await;
        assert_eq!(m.sync_with_platform().await.as_deref(), Some("Home"));
        assert_eq!(state(&m, "Home"), ConnectionState::Connected);
        assert_eq!(m.link_phase(), LinkPhase::Connected);
    }
}
