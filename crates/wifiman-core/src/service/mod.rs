// ── Service facade ──
//
// Single entry point for presentation layers. Wires the catalog, scan
// coordinator, connection manager and credential store together, owns
// the background tasks, and translates `Request`s into calls on them.

mod protocol;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{MergeStats, NetworkCatalog, NetworkSnapshot, NetworkStream};
use crate::config::ManagerConfig;
use crate::connection::{ConnectTicket, ConnectionManager, LinkPhase, reconnect_task};
use crate::credential::{CredentialStore, CredentialStoreStatus};
use crate::error::CoreError;
use crate::event::{EventBus, ServiceEvent};
use crate::model::{ConnectionAttempt, CredentialAudit, CredentialSummary, NetworkRecord};
use crate::platform::{Association, Discovery, SimulatedRadio};
use crate::scan::{ScanCoordinator, ScanFailure, ScanPhase, auto_scan_task};

pub use protocol::{ErrorBody, Password, Request, Response};

/// Point-in-time view of the whole manager.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub scan_phase: ScanPhase,
    pub link_phase: LinkPhase,
    pub connected: Option<String>,
    pub networks: usize,
    pub favorites: usize,
    pub live_attempt: Option<ConnectionAttempt>,
    pub last_attempt: Option<ConnectionAttempt>,
    pub last_scan_failure: Option<ScanFailure>,
    pub auto_reconnect: bool,
    pub credentials: CredentialStoreStatus,
}

/// What `scan` hands back across the boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub networks: Vec<NetworkRecord>,
    pub observed: usize,
    pub stats: MergeStats,
    pub completed_at: DateTime<Utc>,
}

/// The connection manager service.
///
/// Cheaply cloneable. Construct with [`new`](Self::new), then
/// [`start`](Self::start) to run the initial scan and the background
/// tasks; [`shutdown`](Self::shutdown) stops them.
#[derive(Clone)]
pub struct Service {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: ManagerConfig,
    catalog: Arc<NetworkCatalog>,
    credentials: Arc<CredentialStore>,
    scanner: ScanCoordinator,
    connections: ConnectionManager,
    events: EventBus,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Service {
    pub fn new(
        config: ManagerConfig,
        discovery: Arc<dyn Discovery>,
        association: Arc<dyn Association>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        let catalog = Arc::new(NetworkCatalog::new(config.stale_scan_limit));
        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let scanner = ScanCoordinator::new(
            discovery,
            Arc::clone(&catalog),
            events.clone(),
            config.scan_timeout,
            cancel.clone(),
        );
        let connections = ConnectionManager::new(
            association,
            Arc::clone(&catalog),
            Arc::clone(&credentials),
            events.clone(),
            config.connect_timeout,
            config.auto_reconnect,
            cancel.clone(),
        );

        Self {
            inner: Arc::new(ServiceInner {
                config,
                catalog,
                credentials,
                scanner,
                connections,
                events,
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Both primitives backed by one simulated radio.
    pub fn simulated(
        config: ManagerConfig,
        radio: Arc<SimulatedRadio>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self::new(config, radio.clone(), radio, credentials)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Initial scan, reconcile with the host's current connection, then
    /// spawn auto-scan and auto-reconnect as configured. A failed initial
    /// scan is logged, not fatal.
    pub async fn start(&self) {
        let inner = &self.inner;
        let mut handles = inner.task_handles.lock().await;

        // Subscribe before the first scan so its completion is not missed.
        if inner.config.auto_reconnect {
            let rx = inner.events.subscribe();
            handles.push(tokio::spawn(reconnect_task(
                inner.connections.clone(),
                rx,
                inner.cancel.clone(),
            )));
        }

        if let Err(e) = inner.scanner.scan().await {
            warn!(error = %e, "initial scan failed");
        }
        inner.connections.sync_with_platform().await;

        let every = inner.config.auto_scan_interval;
        if !every.is_zero() {
            handles.push(tokio::spawn(auto_scan_task(
                inner.scanner.clone(),
                every,
                inner.cancel.clone(),
            )));
        }

        info!(
            networks = inner.catalog.len(),
            auto_scan_secs = every.as_secs(),
            auto_reconnect = inner.config.auto_reconnect,
            "service started"
        );
    }

    /// Cancel in-flight work and join the background tasks.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("service stopped");
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Arc<NetworkCatalog> {
        &self.inner.catalog
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.inner.credentials
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.inner.connections
    }

    pub fn events(&self) -> broadcast::Receiver<ServiceEvent> {
        self.inner.events.subscribe()
    }

    pub fn subscribe_networks(&self) -> NetworkStream {
        self.inner.catalog.subscribe()
    }

    // ── Networks ─────────────────────────────────────────────────────

    pub async fn scan(&self) -> Result<ScanSummary, CoreError> {
        let report = self.inner.scanner.scan().await?;
        Ok(ScanSummary {
            networks: unshare(&report.networks),
            observed: report.observed,
            stats: report.stats,
            completed_at: report.completed_at,
        })
    }

    pub fn networks(&self) -> NetworkSnapshot {
        self.inner.catalog.snapshot()
    }

    pub fn favorites(&self) -> Vec<Arc<NetworkRecord>> {
        self.inner.catalog.favorites()
    }

    pub fn toggle_favorite(&self, ssid: &str) -> Result<bool, CoreError> {
        let favorite = self.inner.catalog.toggle_favorite(ssid)?;
        self.favorite_changed(ssid, favorite);
        Ok(favorite)
    }

    pub fn set_favorite(&self, ssid: &str, favorite: bool) -> Result<(), CoreError> {
        self.inner.catalog.set_favorite(ssid, favorite)?;
        self.favorite_changed(ssid, favorite);
        Ok(())
    }

    // ── Connections ──────────────────────────────────────────────────

    /// Connect and wait for the outcome. The same outcome is also
    /// published as `AttemptResolved`.
    pub async fn connect(
        &self,
        ssid: &str,
        password: Option<SecretString>,
    ) -> Result<NetworkRecord, CoreError> {
        self.inner.connections.connect(ssid, password).await?;
        self.record(ssid)
    }

    /// Accept a connect request and return immediately.
    pub fn begin_connect(
        &self,
        ssid: &str,
        password: Option<SecretString>,
    ) -> Result<ConnectTicket, CoreError> {
        self.inner.connections.begin_connect(ssid, password)
    }

    pub async fn disconnect(&self, ssid: &str) -> Result<NetworkRecord, CoreError> {
        self.inner.connections.disconnect(ssid).await?;
        self.record(ssid)
    }

    pub fn cancel_connect(&self) -> Option<ConnectionAttempt> {
        self.inner.connections.cancel()
    }

    // ── Credentials ──────────────────────────────────────────────────

    pub async fn save_password(&self, ssid: &str, password: &SecretString) -> Result<(), CoreError> {
        self.inner.credentials.put(ssid, password).await?;
        self.inner.events.emit(ServiceEvent::CredentialSaved {
            ssid: ssid.to_owned(),
        });
        Ok(())
    }

    pub fn get_password(&self, ssid: &str) -> Result<Option<SecretString>, CoreError> {
        self.inner.credentials.get(ssid)
    }

    pub async fn delete_password(&self, ssid: &str) -> Result<(), CoreError> {
        let existed = self.inner.credentials.contains(ssid);
        self.inner.credentials.delete(ssid).await?;
        if existed {
            self.inner.events.emit(ServiceEvent::CredentialDeleted {
                ssid: ssid.to_owned(),
            });
        }
        Ok(())
    }

    pub fn list_passwords(&self) -> Result<Vec<CredentialSummary>, CoreError> {
        self.inner.credentials.list_all()
    }

    pub fn audit_passwords(&self) -> Result<CredentialAudit, CoreError> {
        self.inner.credentials.audit()
    }

    // ── Status ───────────────────────────────────────────────────────

    pub fn status(&self) -> ServiceStatus {
        let inner = &self.inner;
        let snapshot = inner.catalog.snapshot();
        ServiceStatus {
            scan_phase: inner.scanner.phase(),
            link_phase: inner.connections.link_phase(),
            connected: snapshot
                .iter()
                .find(|r| r.is_connected())
                .map(|r| r.ssid.clone()),
            networks: snapshot.len(),
            favorites: snapshot.iter().filter(|r| r.favorite).count(),
            live_attempt: inner.connections.live_attempt(),
            last_attempt: inner.connections.last_attempt(),
            last_scan_failure: inner.scanner.last_failure(),
            auto_reconnect: inner.connections.auto_reconnect(),
            credentials: inner.credentials.status(),
        }
    }

    // ── Request dispatch ─────────────────────────────────────────────

    /// Run one request. Every failure is mapped onto a public `ErrorCode`.
    pub async fn execute(&self, request: Request) -> Response {
        let command = request.name();
        debug!(command, "executing request");
        match self.dispatch(request).await {
            Ok(data) => Response::success(data),
            Err(e) => {
                debug!(command, code = %e.code(), error = %e, "request failed");
                Response::failure(&e)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<serde_json::Value, CoreError> {
        match request {
            Request::Scan => to_value(&self.scan().await?),
            Request::ListNetworks { favorites_only } => {
                let networks = if favorites_only {
                    self.favorites()
                } else {
                    self.networks().to_vec()
                };
                to_value(&networks)
            }
            Request::Connect { ssid, password } => {
                let record = self
                    .connect(&ssid, password.map(Password::into_secret))
                    .await?;
                to_value(&record)
            }
            Request::Disconnect { ssid } => to_value(&self.disconnect(&ssid).await?),
            Request::CancelConnect => Ok(json!({ "cancelled": self.cancel_connect() })),
            Request::ToggleFavorite { ssid } => {
                let favorite = self.toggle_favorite(&ssid)?;
                Ok(json!({ "ssid": ssid, "favorite": favorite }))
            }
            Request::SetFavorite { ssid, favorite } => {
                self.set_favorite(&ssid, favorite)?;
                Ok(json!({ "ssid": ssid, "favorite": favorite }))
            }
            Request::SavePassword { ssid, password } => {
                self.save_password(&ssid, &password.into_secret()).await?;
                Ok(json!({ "ssid": ssid }))
            }
            Request::GetPassword { ssid } => {
                let password = self.get_password(&ssid)?;
                Ok(json!({
                    "ssid": ssid,
                    "password": password.as_ref().map(ExposeSecret::expose_secret),
                }))
            }
            Request::DeletePassword { ssid } => {
                self.delete_password(&ssid).await?;
                Ok(json!({ "ssid": ssid }))
            }
            Request::ListPasswords => to_value(&self.list_passwords()?),
            Request::AuditPasswords => to_value(&self.audit_passwords()?),
            Request::Status => to_value(&self.status()),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn record(&self, ssid: &str) -> Result<NetworkRecord, CoreError> {
        self.inner
            .catalog
            .get(ssid)
            .ok_or_else(|| CoreError::UnknownNetwork { ssid: ssid.to_owned() })
    }

    fn favorite_changed(&self, ssid: &str, favorite: bool) {
        self.inner.events.emit(ServiceEvent::FavoriteChanged {
            ssid: ssid.to_owned(),
            favorite,
        });
    }
}

fn unshare(snapshot: &NetworkSnapshot) -> Vec<NetworkRecord> {
    snapshot.iter().map(|r| NetworkRecord::clone(r)).collect()
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Internal(format!("serialize response: {e}")))
}
