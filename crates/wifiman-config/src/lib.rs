//! Shared configuration for wifiman.
//!
//! TOML config file, `WIFIMAN_*` environment overrides, data-directory
//! layout, encryption-key source resolution, and translation to
//! `wifiman_core::ManagerConfig`. The CLI layers its flags on top.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

use wifiman_core::{
    FileKeySource, FileVault, KeySource, KeyringKeySource, ManagerConfig, PassphraseKeySource,
    SimulatedNetwork, SimulatedRadio, VaultStorage,
};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "WIFIMAN_CONFIG";

const VAULT_FILE: &str = "vault.json";
const KEY_FILE: &str = "master.key";
const SALT_FILE: &str = "vault.salt";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("passphrase key source selected but ${var} is not set")]
    MissingPassphrase { var: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerSection,

    #[serde(default)]
    pub vault: VaultSection,

    #[serde(default)]
    pub simulated: SimulatedSection,
}

/// Timeouts and policy, in file-friendly units.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerSection {
    pub scan_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub io_timeout_ms: u64,
    pub io_retry_backoff_ms: u64,
    /// Zero disables periodic scanning.
    pub auto_scan_interval_secs: u64,
    pub stale_scan_limit: u32,
    pub auto_reconnect: bool,
    pub max_secret_len: usize,
}

impl Default for ManagerSection {
    fn default() -> Self {
        let d = ManagerConfig::default();
        Self {
            scan_timeout_secs: d.scan_timeout.as_secs(),
            connect_timeout_secs: d.connect_timeout.as_secs(),
            io_timeout_ms: millis(d.io_timeout),
            io_retry_backoff_ms: millis(d.io_retry_backoff),
            auto_scan_interval_secs: d.auto_scan_interval.as_secs(),
            stale_scan_limit: d.stale_scan_limit,
            auto_reconnect: d.auto_reconnect,
            max_secret_len: d.max_secret_len,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Where the encryption key lives.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeySourceKind {
    /// Random key in `master.key` beside the vault.
    #[default]
    File,
    /// OS keychain entry.
    Keyring,
    /// Derived from a passphrase read from the environment.
    Passphrase,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct VaultSection {
    /// Overrides the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub key_source: KeySourceKind,
    pub keyring_service: String,
    pub keyring_account: String,
    /// Environment variable holding the passphrase.
    pub passphrase_env: String,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            data_dir: None,
            key_source: KeySourceKind::File,
            keyring_service: "wifiman".into(),
            keyring_account: "vault-key".into(),
            passphrase_env: "WIFIMAN_PASSPHRASE".into(),
        }
    }
}

/// Fixture for the simulated radio. An empty network list means the
/// built-in demo neighbourhood.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulatedSection {
    pub latency_ms: u64,
    pub jitter_dbm: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<SimulatedNetwork>,
}

impl Default for SimulatedSection {
    fn default() -> Self {
        Self {
            latency_ms: 300,
            jitter_dbm: 5,
            networks: Vec::new(),
        }
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "wifiman", "wifiman")
}

fn home_fallback(leaf: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(leaf);
    p.push("wifiman");
    p
}

/// Resolve the config file path: `$WIFIMAN_CONFIG`, else the platform
/// config directory.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory holding the vault, key file and salt.
pub fn data_dir(cfg: &Config) -> PathBuf {
    if let Some(dir) = &cfg.vault.data_dir {
        return dir.clone();
    }
    project_dirs().map_or_else(
        || home_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

pub fn vault_path(cfg: &Config) -> PathBuf {
    data_dir(cfg).join(VAULT_FILE)
}

pub fn key_path(cfg: &Config) -> PathBuf {
    data_dir(cfg).join(KEY_FILE)
}

pub fn salt_path(cfg: &Config) -> PathBuf {
    data_dir(cfg).join(SALT_FILE)
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, still layering `WIFIMAN_*` overrides.
/// Nested keys use a double underscore: `WIFIMAN_MANAGER__AUTO_RECONNECT=true`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("WIFIMAN_")
                .ignore(&["CONFIG", "PASSPHRASE"])
                .split("__"),
        );

    let config: Config = figment.extract()?;
    validate(&config)?;
    Ok(config)
}

/// Load config, returning a default if it can't be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let m = &cfg.manager;
    if m.scan_timeout_secs == 0 {
        return Err(invalid("manager.scan_timeout_secs", "must be greater than zero"));
    }
    if m.connect_timeout_secs == 0 {
        return Err(invalid("manager.connect_timeout_secs", "must be greater than zero"));
    }
    if m.io_timeout_ms == 0 {
        return Err(invalid("manager.io_timeout_ms", "must be greater than zero"));
    }
    if m.stale_scan_limit == 0 {
        return Err(invalid("manager.stale_scan_limit", "must be at least 1"));
    }
    if !(1..=4096).contains(&m.max_secret_len) {
        return Err(invalid("manager.max_secret_len", "must be between 1 and 4096"));
    }
    if cfg.simulated.networks.iter().any(|n| n.ssid.is_empty()) {
        return Err(invalid("simulated.networks", "every network needs an ssid"));
    }
    Ok(())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    /// Runtime tuning for the core.
    pub fn manager_config(&self) -> ManagerConfig {
        let m = &self.manager;
        ManagerConfig {
            scan_timeout: Duration::from_secs(m.scan_timeout_secs),
            connect_timeout: Duration::from_secs(m.connect_timeout_secs),
            io_timeout: Duration::from_millis(m.io_timeout_ms),
            io_retry_backoff: Duration::from_millis(m.io_retry_backoff_ms),
            auto_scan_interval: Duration::from_secs(m.auto_scan_interval_secs),
            stale_scan_limit: m.stale_scan_limit,
            auto_reconnect: m.auto_reconnect,
            max_secret_len: m.max_secret_len,
        }
    }

    pub fn vault_storage(&self) -> Arc<dyn VaultStorage> {
        Arc::new(FileVault::new(vault_path(self)))
    }

    /// Radio fixture described by `[simulated]`.
    pub fn simulated_radio(&self) -> SimulatedRadio {
        let s = &self.simulated;
        let radio = if s.networks.is_empty() {
            SimulatedRadio::demo()
        } else {
            SimulatedRadio::new(s.networks.clone())
        };
        radio
            .with_latency(Duration::from_millis(s.latency_ms))
            .with_jitter(s.jitter_dbm)
    }
}

// ── Key source resolution ───────────────────────────────────────────

/// Build the configured key source. For `passphrase`, an explicit
/// passphrase wins over the environment variable.
pub fn resolve_key_source(
    cfg: &Config,
    passphrase: Option<SecretString>,
) -> Result<Arc<dyn KeySource>, ConfigError> {
    let vault = &cfg.vault;
    match vault.key_source {
        KeySourceKind::File => Ok(Arc::new(FileKeySource::new(key_path(cfg)))),
        KeySourceKind::Keyring => Ok(Arc::new(KeyringKeySource::new(
            vault.keyring_service.clone(),
            vault.keyring_account.clone(),
        ))),
        KeySourceKind::Passphrase => {
            let secret = passphrase
                .or_else(|| {
                    std::env::var(&vault.passphrase_env)
                        .ok()
                        .filter(|p| !p.is_empty())
                        .map(SecretString::from)
                })
                .ok_or_else(|| ConfigError::MissingPassphrase {
                    var: vault.passphrase_env.clone(),
                })?;
            Ok(Arc::new(PassphraseKeySource::new(secret, salt_path(cfg))))
        }
    }
}
