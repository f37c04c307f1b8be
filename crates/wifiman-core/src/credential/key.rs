// ── Encryption key sources ──
//
// Where the process-wide key lives. The key artifact is always stored
// apart from the vault it protects: a separate file, the OS keychain,
// or nothing at all when derived from a passphrase (only the salt is
// persisted).

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use argon2::Argon2;
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::cipher::MasterKey;
use crate::error::CoreError;

const SALT_LEN: usize = 16;

/// Supplier of the process-wide `MasterKey`.
///
/// `load` must not create anything: the store decides whether creating a
/// fresh key is safe (it is not while the vault still holds entries).
pub trait KeySource: Send + Sync {
    /// The existing key, or `None` if no key artifact exists yet.
    fn load(&self) -> Result<Option<MasterKey>, CoreError>;

    /// Create and persist a new key artifact.
    fn create(&self) -> Result<MasterKey, CoreError>;

    /// Human-readable location, for logs and status output.
    fn describe(&self) -> String;
}

fn unavailable(reason: impl Into<String>) -> CoreError {
    CoreError::EncryptionKeyUnavailable {
        reason: reason.into(),
    }
}

/// Write `bytes` to a new owner-only file and flush it to disk.
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn read_if_exists(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match File::open(path) {
        Ok(mut file) => {
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            Ok(Some(bytes))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

// ── File ────────────────────────────────────────────────────────────

/// Random 32-byte key in its own owner-only file.
#[derive(Debug, Clone)]
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl KeySource for FileKeySource {
    fn load(&self) -> Result<Option<MasterKey>, CoreError> {
        let mut bytes = read_if_exists(&self.path).map_err(|e| {
            unavailable(format!("cannot read key file {}: {e}", self.path.display()))
        })?;
        let key = bytes.as_deref().map(MasterKey::from_slice).transpose();
        if let Some(b) = bytes.as_mut() {
            secrecy::zeroize::Zeroize::zeroize(b);
        }
        key
    }

    fn create(&self) -> Result<MasterKey, CoreError> {
        let key = MasterKey::generate();
        write_private(&self.path, key.bytes()).map_err(|e| {
            unavailable(format!("cannot write key file {}: {e}", self.path.display()))
        })?;
        info!(path = %self.path.display(), "created new encryption key file");
        Ok(key)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

// ── OS keychain ─────────────────────────────────────────────────────

/// Key held by the platform credential manager.
#[derive(Debug, Clone)]
pub struct KeyringKeySource {
    service: String,
    account: String,
}

impl KeyringKeySource {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, CoreError> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| unavailable(format!("keyring unavailable: {e}")))
    }
}

impl KeySource for KeyringKeySource {
    fn load(&self) -> Result<Option<MasterKey>, CoreError> {
        match self.entry()?.get_secret() {
            Ok(mut material) => {
                let key = MasterKey::from_slice(&material);
                secrecy::zeroize::Zeroize::zeroize(&mut material);
                key.map(Some)
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(unavailable(format!("keyring read failed: {e}"))),
        }
    }

    fn create(&self) -> Result<MasterKey, CoreError> {
        let key = MasterKey::generate();
        self.entry()?
            .set_secret(key.bytes())
            .map_err(|e| unavailable(format!("keyring write failed: {e}")))?;
        info!(service = %self.service, account = %self.account, "stored new encryption key in keyring");
        Ok(key)
    }

    fn describe(&self) -> String {
        format!("keyring:{}/{}", self.service, self.account)
    }
}

// ── Ephemeral ───────────────────────────────────────────────────────

/// Key that lives only as long as the process. Pairs with `MemoryVault`
/// for tests and throwaway sessions.
#[derive(Debug)]
pub struct EphemeralKeySource {
    key: MasterKey,
}

impl EphemeralKeySource {
    pub fn new() -> Self {
        Self {
            key: MasterKey::generate(),
        }
    }
}

impl Default for EphemeralKeySource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for EphemeralKeySource {
    fn load(&self) -> Result<Option<MasterKey>, CoreError> {
        MasterKey::from_slice(self.key.bytes()).map(Some)
    }

    fn create(&self) -> Result<MasterKey, CoreError> {
        MasterKey::from_slice(self.key.bytes())
    }

    fn describe(&self) -> String {
        "ephemeral".into()
    }
}

// ── Passphrase ──────────────────────────────────────────────────────

/// Argon2id-derived key. Only the random salt is persisted.
pub struct PassphraseKeySource {
    passphrase: SecretString,
    salt_path: PathBuf,
}

impl PassphraseKeySource {
    pub fn new(passphrase: SecretString, salt_path: impl Into<PathBuf>) -> Self {
        Self {
            passphrase,
            salt_path: salt_path.into(),
        }
    }

    fn derive(&self, salt: &[u8]) -> Result<MasterKey, CoreError> {
        MasterKey::try_from_fn(|out| {
            Argon2::default()
                .hash_password_into(self.passphrase.expose_secret().as_bytes(), salt, out)
                .map_err(|e| unavailable(format!("key derivation failed: {e}")))
        })
    }
}

impl std::fmt::Debug for PassphraseKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseKeySource")
            .field("salt_path", &self.salt_path)
            .finish_non_exhaustive()
    }
}

impl KeySource for PassphraseKeySource {
    fn load(&self) -> Result<Option<MasterKey>, CoreError> {
        let salt = read_if_exists(&self.salt_path).map_err(|e| {
            unavailable(format!("cannot read salt {}: {e}", self.salt_path.display()))
        })?;
        match salt {
            Some(salt) if salt.len() == SALT_LEN => self.derive(&salt).map(Some),
            Some(salt) => Err(unavailable(format!(
                "salt file is {} bytes, expected {SALT_LEN}",
                salt.len()
            ))),
            None => Ok(None),
        }
    }

    fn create(&self) -> Result<MasterKey, CoreError> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        write_private(&self.salt_path, &salt).map_err(|e| {
            unavailable(format!("cannot write salt {}: {e}", self.salt_path.display()))
        })?;
        debug!(path = %self.salt_path.display(), "created key derivation salt");
        self.derive(&salt)
    }

    fn describe(&self) -> String {
        format!("passphrase:{}", self.salt_path.display())
    }
}
