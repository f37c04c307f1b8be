// ── Vault persistence ──
//
// On-disk image of the credential store. Only ciphertext is ever written.
// The file is replaced atomically (temp file, fsync, rename) so a crash
// leaves either the old image or the new one.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const VAULT_VERSION: u32 = 1;

/// One sealed credential as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedRecord {
    pub ciphertext: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

/// Serialized vault image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultFile {
    pub version: u32,
    /// A known value sealed under the current key; lets the store tell a
    /// wrong key apart from a corrupt entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_check: Option<Vec<u8>>,
    #[serde(default)]
    pub entries: BTreeMap<String, SealedRecord>,
}

impl Default for VaultFile {
    fn default() -> Self {
        Self {
            version: VAULT_VERSION,
            key_check: None,
            entries: BTreeMap::new(),
        }
    }
}

/// Blocking persistence backend. Calls run on the blocking pool, bounded
/// by the store's I/O timeout.
pub trait VaultStorage: Send + Sync + 'static {
    /// The stored image, or `None` if nothing was ever written.
    fn load(&self) -> io::Result<Option<VaultFile>>;

    /// Replace the stored image.
    fn persist(&self, vault: &VaultFile) -> io::Result<()>;

    fn describe(&self) -> String;
}

// ── File ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FileVault {
    path: PathBuf,
}

impl FileVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A fresh sibling name per write, so no two writers share a temp file.
    fn temp_path(&self) -> PathBuf {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        self.path.with_file_name(name)
    }
}

impl VaultStorage for FileVault {
    fn load(&self) -> io::Result<Option<VaultFile>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let vault: VaultFile = serde_json::from_slice(&bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if vault.version > VAULT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported vault version {}", vault.version),
            ));
        }
        Ok(Some(vault))
    }

    fn persist(&self, vault: &VaultFile) -> io::Result<()> {
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(vault)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let tmp = self.temp_path();
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let written = options.open(&tmp).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        #[cfg(unix)]
        {
            if let Some(parent) = parent {
                File::open(parent)?.sync_all()?;
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ── In-memory ───────────────────────────────────────────────────────

/// Volatile storage for tests and the simulated backend. Can be told to
/// fail the next few writes to exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryVault {
    image: Mutex<Option<VaultFile>>,
    failures: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(image: VaultFile) -> Self {
        Self {
            image: Mutex::new(Some(image)),
            ..Self::default()
        }
    }

    /// The next `n` calls to `persist` fail with an I/O error.
    pub fn fail_next_persists(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn image(&self) -> Option<VaultFile> {
        self.image
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl VaultStorage for MemoryVault {
    fn load(&self) -> io::Result<Option<VaultFile>> {
        Ok(self.image())
    }

    fn persist(&self, vault: &VaultFile) -> io::Result<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(io::Error::other("injected write failure"));
        }
        *self.image.lock().unwrap_or_else(PoisonError::into_inner) = Some(vault.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
