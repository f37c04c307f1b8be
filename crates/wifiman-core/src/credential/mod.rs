// ── Credential store ──
//
// Encrypted, SSID-keyed persistence of network secrets.
//
// Readers go through an in-memory `DashMap` of ciphertexts and never wait
// on disk. Writers serialize on one async lock, write the full vault image
// durably, and only then publish the change to the map, so a `get` after a
// successful `put` always observes the new value.
//
// A blocking write that outlives the I/O timeout keeps running on the
// blocking pool. Its handle stays under the writer lock and the next write
// waits for it first, so an older image can never land after a newer one.

mod cipher;
mod key;
mod vault;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::CoreError;
use crate::model::{CredentialAudit, CredentialEntry, CredentialSummary};

pub use cipher::{KEY_LEN, MasterKey, SecretCipher};
pub use key::{
    EphemeralKeySource, FileKeySource, KeySource, KeyringKeySource, PassphraseKeySource,
};
pub use vault::{FileVault, MemoryVault, SealedRecord, VAULT_VERSION, VaultFile, VaultStorage};

/// Associated data for the key-check marker. Not a valid SSID (SSIDs
/// are at most 32 bytes), so it can never collide with an entry.
const KEY_CHECK_AAD: &str = "wifiman/key-check/v1/not-an-ssid-marker";
const KEY_CHECK_PLAINTEXT: &[u8] = b"wifiman";

enum KeyState {
    Ready(Arc<SecretCipher>),
    Unavailable(String),
}

/// Outcome of resolving the key against a vault image.
struct KeyResolution {
    state: KeyState,
    /// Marker to write with the next persist, when freshly created.
    key_check: Option<Vec<u8>>,
}

/// Availability summary for status output. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStoreStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub entries: usize,
    pub key_source: String,
    pub location: String,
}

/// Bounded, retry-once execution of blocking storage calls.
#[derive(Debug, Clone, Copy)]
struct IoPolicy {
    timeout: Duration,
    backoff: Duration,
}

impl IoPolicy {
    async fn run<T, F>(self, operation: &'static str, f: F) -> Result<T, CoreError>
    where
        F: Fn() -> io::Result<T> + Clone + Send + 'static,
        T: Send + 'static,
    {
        match self.attempt(operation, f.clone()).await {
            Err(e) if e.is_retryable() => {
                warn!(operation, error = %e, "credential storage failed, retrying once");
                tokio::time::sleep(self.backoff).await;
                self.attempt(operation, f).await
            }
            other => other,
        }
    }

    async fn attempt<T, F>(self, operation: &'static str, f: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => settle(operation, joined),
            Err(_) => Err(self.timed_out(operation)),
        }
    }

    fn timed_out(self, operation: &str) -> CoreError {
        CoreError::StorageTimeout {
            operation: operation.to_owned(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

fn settle<T>(
    operation: &str,
    joined: Result<io::Result<T>, tokio::task::JoinError>,
) -> Result<T, CoreError> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(CoreError::storage_io(operation, &e)),
        Err(join) => Err(CoreError::Internal(format!("{operation} task failed: {join}"))),
    }
}

/// State owned by whoever holds the writer lock.
struct Writer {
    /// Key-check marker written alongside the entries.
    key_check: Option<Vec<u8>>,
    /// A persist that timed out but is still running on the blocking pool.
    in_flight: Option<JoinHandle<io::Result<()>>>,
}

pub struct CredentialStore {
    key: ArcSwap<KeyState>,
    key_source: Arc<dyn KeySource>,
    storage: Arc<dyn VaultStorage>,
    entries: DashMap<String, CredentialEntry>,
    /// Serializes every vault write.
    writer: Mutex<Writer>,
    io: IoPolicy,
    max_secret_len: usize,
}

impl CredentialStore {
    /// Load the vault and resolve the encryption key.
    ///
    /// A vault that cannot be read is an error. A key that cannot be
    /// resolved is not: the store opens in the unavailable state, every
    /// operation fails with `EncryptionKeyUnavailable`, and
    /// [`reload_key`](Self::reload_key) can recover it later.
    pub async fn open(
        key_source: Arc<dyn KeySource>,
        storage: Arc<dyn VaultStorage>,
        config: &ManagerConfig,
    ) -> Result<Self, CoreError> {
        let io = IoPolicy {
            timeout: config.io_timeout,
            backoff: config.io_retry_backoff,
        };
        let loader = Arc::clone(&storage);
        let image = io
            .run("load", move || loader.load())
            .await?
            .unwrap_or_default();

        let resolution = resolve_blocking(Arc::clone(&key_source), &image).await;
        if let KeyState::Unavailable(reason) = &resolution.state {
            warn!(key_source = %key_source.describe(), %reason, "credential store opened without a usable key");
        }

        let key_check = resolution.key_check.or(image.key_check);
        let entries: DashMap<String, CredentialEntry> = image
            .entries
            .into_iter()
            .map(|(ssid, sealed)| {
                let entry = CredentialEntry {
                    ssid: ssid.clone(),
                    secret: sealed.ciphertext,
                    updated_at: sealed.updated_at,
                };
                (ssid, entry)
            })
            .collect();

        info!(
            entries = entries.len(),
            vault = %storage.describe(),
            key_source = %key_source.describe(),
            "credential store opened"
        );

        Ok(Self {
            key: ArcSwap::from_pointee(resolution.state),
            key_source,
            storage,
            entries,
            writer: Mutex::new(Writer {
                key_check,
                in_flight: None,
            }),
            io,
            max_secret_len: config.max_secret_len,
        })
    }

    /// Volatile store with a process-lifetime key.
    pub async fn in_memory(config: &ManagerConfig) -> Result<Self, CoreError> {
        Self::open(
            Arc::new(EphemeralKeySource::new()),
            Arc::new(MemoryVault::new()),
            config,
        )
        .await
    }

    // ── Contract ─────────────────────────────────────────────────────

    /// Encrypt and upsert. Returns only after the write is durable.
    pub async fn put(&self, ssid: &str, secret: &SecretString) -> Result<(), CoreError> {
        validate_ssid(ssid)?;
        let len = secret.expose_secret().len();
        if len == 0 {
            return Err(CoreError::invalid("secret must not be empty"));
        }
        if len > self.max_secret_len {
            return Err(CoreError::invalid(format!(
                "secret is {len} bytes, limit is {}",
                self.max_secret_len
            )));
        }

        let mut writer = self.writer.lock().await;
        let cipher = self.cipher()?;
        let entry = CredentialEntry {
            ssid: ssid.to_owned(),
            secret: cipher.seal(ssid, secret.expose_secret().as_bytes())?,
            updated_at: Utc::now(),
        };

        let mut image = self.image(writer.key_check.clone());
        image.entries.insert(
            ssid.to_owned(),
            SealedRecord {
                ciphertext: entry.secret.clone(),
                updated_at: entry.updated_at,
            },
        );
        self.write(&mut writer, image).await?;
        self.entries.insert(ssid.to_owned(), entry);
        drop(writer);

        debug!(ssid = %ssid, "credential saved");
        Ok(())
    }

    /// Decrypt the stored secret, if any.
    pub fn get(&self, ssid: &str) -> Result<Option<SecretString>, CoreError> {
        let cipher = self.cipher()?;
        let Some(entry) = self.entries.get(ssid) else {
            return Ok(None);
        };
        cipher.open(ssid, &entry.secret).map(Some).inspect_err(|_| {
            warn!(ssid = %ssid, "stored credential failed authentication");
        })
    }

    /// Remove a credential. Deleting an absent entry succeeds without
    /// touching the disk.
    pub async fn delete(&self, ssid: &str) -> Result<(), CoreError> {
        self.cipher()?;
        let mut writer = self.writer.lock().await;
        if !self.entries.contains_key(ssid) {
            return Ok(());
        }
        let mut image = self.image(writer.key_check.clone());
        image.entries.remove(ssid);
        self.write(&mut writer, image).await?;
        self.entries.remove(ssid);
        drop(writer);

        debug!(ssid = %ssid, "credential deleted");
        Ok(())
    }

    /// SSIDs and timestamps, sorted by SSID. Never decrypts.
    pub fn list_all(&self) -> Result<Vec<CredentialSummary>, CoreError> {
        self.cipher()?;
        let mut list: Vec<CredentialSummary> = self
            .entries
            .iter()
            .map(|e| CredentialSummary::from(e.value()))
            .collect();
        list.sort_by(|a, b| a.ssid.cmp(&b.ssid));
        Ok(list)
    }

    /// Try to decrypt every entry once. Corrupt entries are reported
    /// separately and never abort the listing.
    pub fn audit(&self) -> Result<CredentialAudit, CoreError> {
        let cipher = self.cipher()?;
        let mut audit = CredentialAudit::default();
        for entry in self.entries.iter() {
            match cipher.open(entry.key(), &entry.secret) {
                Ok(_) => audit.readable.push(CredentialSummary::from(entry.value())),
                Err(_) => audit.corrupt.push(entry.key().clone()),
            }
        }
        audit.readable.sort_by(|a, b| a.ssid.cmp(&b.ssid));
        audit.corrupt.sort();
        if !audit.corrupt.is_empty() {
            warn!(corrupt = ?audit.corrupt, "credential audit found unreadable entries");
        }
        Ok(audit)
    }

    // ── Key lifecycle ────────────────────────────────────────────────

    /// Re-read the key from its source. Succeeds when the store is usable
    /// afterwards.
    pub async fn reload_key(&self) -> Result<(), CoreError> {
        let mut writer = self.writer.lock().await;
        let image = VaultFile {
            key_check: writer.key_check.clone(),
            entries: self
                .entries
                .iter()
                .map(|e| (e.key().clone(), sealed(e.value())))
                .collect(),
            ..VaultFile::default()
        };
        let resolution = resolve_blocking(Arc::clone(&self.key_source), &image).await;
        if let Some(check) = resolution.key_check {
            writer.key_check = Some(check);
        }
        let result = match &resolution.state {
            KeyState::Ready(_) => {
                info!(key_source = %self.key_source.describe(), "encryption key loaded");
                Ok(())
            }
            KeyState::Unavailable(reason) => Err(CoreError::EncryptionKeyUnavailable {
                reason: reason.clone(),
            }),
        };
        self.key.store(Arc::new(resolution.state));
        result
    }

    // ── Inspection ───────────────────────────────────────────────────

    /// Cheap check without decrypting, used by auto-reconnect.
    pub fn contains(&self, ssid: &str) -> bool {
        self.is_available() && self.entries.contains_key(ssid)
    }

    pub fn is_available(&self) -> bool {
        matches!(**self.key.load(), KeyState::Ready(_))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status(&self) -> CredentialStoreStatus {
        let reason = match &**self.key.load() {
            KeyState::Ready(_) => None,
            KeyState::Unavailable(reason) => Some(reason.clone()),
        };
        CredentialStoreStatus {
            available: reason.is_none(),
            reason,
            entries: self.entries.len(),
            key_source: self.key_source.describe(),
            location: self.storage.describe(),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn cipher(&self) -> Result<Arc<SecretCipher>, CoreError> {
        match &**self.key.load() {
            KeyState::Ready(cipher) => Ok(Arc::clone(cipher)),
            KeyState::Unavailable(reason) => Err(CoreError::EncryptionKeyUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    /// Full vault image from the committed in-memory entries.
    fn image(&self, key_check: Option<Vec<u8>>) -> VaultFile {
        VaultFile {
            key_check,
            entries: self
                .entries
                .iter()
                .map(|e| (e.key().clone(), sealed(e.value())))
                .collect(),
            ..VaultFile::default()
        }
    }

    /// Persist a full image, retrying a transient failure once.
    async fn write(&self, writer: &mut Writer, image: VaultFile) -> Result<(), CoreError> {
        let image = Arc::new(image);
        match self.write_once(writer, &image).await {
            Err(e) if e.is_retryable() => {
                warn!(operation = "persist", error = %e, "credential storage failed, retrying once");
                tokio::time::sleep(self.io.backoff).await;
                self.write_once(writer, &image).await
            }
            other => other,
        }
    }

    async fn write_once(&self, writer: &mut Writer, image: &Arc<VaultFile>) -> Result<(), CoreError> {
        if let Some(mut earlier) = writer.in_flight.take() {
            match tokio::time::timeout(self.io.timeout, &mut earlier).await {
                Ok(joined) => {
                    if let Err(e) = settle("persist", joined) {
                        debug!(error = %e, "timed-out vault write finished with an error");
                    }
                }
                Err(_) => {
                    writer.in_flight = Some(earlier);
                    return Err(self.io.timed_out("persist"));
                }
            }
        }

        let storage = Arc::clone(&self.storage);
        let image = Arc::clone(image);
        let mut task = tokio::task::spawn_blocking(move || storage.persist(&image));
        match tokio::time::timeout(self.io.timeout, &mut task).await {
            Ok(joined) => settle("persist", joined),
            Err(_) => {
                writer.in_flight = Some(task);
                Err(self.io.timed_out("persist"))
            }
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("entries", &self.entries.len())
            .field("available", &self.is_available())
            .field("key_source", &self.key_source.describe())
            .finish_non_exhaustive()
    }
}

fn sealed(entry: &CredentialEntry) -> SealedRecord {
    SealedRecord {
        ciphertext: entry.secret.clone(),
        updated_at: entry.updated_at,
    }
}

fn validate_ssid(ssid: &str) -> Result<(), CoreError> {
    if ssid.is_empty() {
        return Err(CoreError::invalid("SSID must not be empty"));
    }
    if ssid.len() > 32 {
        return Err(CoreError::invalid(format!(
            "SSID is {} bytes, limit is 32",
            ssid.len()
        )));
    }
    Ok(())
}

/// Key resolution touches files, the keychain or Argon2, so it runs on
/// the blocking pool.
async fn resolve_blocking(source: Arc<dyn KeySource>, image: &VaultFile) -> KeyResolution {
    let key_check = image.key_check.clone();
    let has_entries = !image.entries.is_empty();
    tokio::task::spawn_blocking(move || resolve_key(source.as_ref(), key_check, has_entries))
        .await
        .unwrap_or_else(|join| KeyResolution {
            state: KeyState::Unavailable(format!("key resolution failed: {join}")),
            key_check: None,
        })
}

fn resolve_key(
    source: &dyn KeySource,
    key_check: Option<Vec<u8>>,
    has_entries: bool,
) -> KeyResolution {
    let unavailable = |reason: String| KeyResolution {
        state: KeyState::Unavailable(reason),
        key_check: None,
    };

    let (key, created) = match source.load() {
        Ok(Some(key)) => (key, false),
        Ok(None) if has_entries => {
            return unavailable(format!(
                "no key at {} but the vault holds encrypted credentials",
                source.describe()
            ));
        }
        Ok(None) => match source.create() {
            Ok(key) => (key, true),
            Err(e) => return unavailable(e.to_string()),
        },
        Err(e) => return unavailable(e.to_string()),
    };

    let cipher = SecretCipher::new(key);
    let mismatched = !created
        && key_check
            .as_deref()
            .is_some_and(|check| cipher.open(KEY_CHECK_AAD, check).is_err());
    if mismatched {
        return unavailable(format!(
            "key at {} does not match the vault",
            source.describe()
        ));
    }

    let fresh_check = if key_check.is_none() || created {
        cipher.seal(KEY_CHECK_AAD, KEY_CHECK_PLAINTEXT).ok()
    } else {
        None
    };
    KeyResolution {
        state: KeyState::Ready(Arc::new(cipher)),
        key_check: fresh_check,
    }
}
