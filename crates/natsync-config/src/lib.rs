//! Configuration for natsync.
//!
//! A flat TOML file layered with `MIKROTIK_*` environment variables, plus a
//! password chain (env var, OS keyring, plaintext file). The loaded
//! [`Settings`] implements [`natsync_core::ConfigProvider`], so it plugs
//! straight into `LifecycleHooks`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use natsync_core::ConfigProvider;
use natsync_core::config::keys;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "MIKROTIK_";
const KEYRING_SERVICE: &str = "natsync";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown setting '{0}'")]
    UnknownKey(String),

    #[error("keyring needs both 'ip' and 'user' to be set")]
    NoKeyringAccount,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config ─────────────────────────────────────────────────────

/// On-disk configuration. Every field is optional; an empty file means
/// the integration is off.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Router address (IP or hostname).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Plaintext password. Prefer the keyring or `MIKROTIK_PASS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,

    /// Inbound interface for created rules (router default `ether1`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,

    /// API port (default 8728).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<f64>,

    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<f64>,

    /// `auto`, `plain` or `challenge`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_method: Option<String>,
}

impl Config {
    /// String value of one setting, as core expects it.
    pub fn value(&self, key: &str) -> Option<String> {
        match key {
            keys::IP => self.ip.clone(),
            keys::USER => self.user.clone(),
            keys::PASS => self.pass.clone(),
            keys::INTERFACE => self.interface.clone(),
            keys::PORT => self.port.map(|p| p.to_string()),
            keys::CONNECT_TIMEOUT => self.connect_timeout.map(|s| s.to_string()),
            keys::READ_TIMEOUT => self.read_timeout.map(|s| s.to_string()),
            keys::LOGIN_METHOD => self.login_method.clone(),
            _ => None,
        }
    }

    /// Set one setting from its string form, validating typed fields.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Validation {
            field: key.to_owned(),
            reason: format!("{reason}, got '{value}'"),
        };
        let owned = Some(value.to_owned());
        match key {
            keys::IP => self.ip = owned,
            keys::USER => self.user = owned,
            keys::PASS => self.pass = owned,
            keys::INTERFACE => self.interface = owned,
            keys::PORT => {
                self.port = Some(
                    value
                        .parse()
                        .ok()
                        .filter(|p| *p != 0)
                        .ok_or_else(|| invalid("expected a port number"))?,
                );
            }
            keys::CONNECT_TIMEOUT | keys::READ_TIMEOUT => {
                let secs: f64 = value
                    .parse()
                    .ok()
                    .filter(|s: &f64| Duration::try_from_secs_f64(*s).is_ok_and(|d| !d.is_zero()))
                    .ok_or_else(|| invalid("expected a positive number of seconds"))?;
                if key == keys::CONNECT_TIMEOUT {
                    self.connect_timeout = Some(secs);
                } else {
                    self.read_timeout = Some(secs);
                }
            }
            keys::LOGIN_METHOD => {
                if !matches!(value, "auto" | "plain" | "challenge") {
                    return Err(invalid("expected auto, plain or challenge"));
                }
                self.login_method = owned;
            }
            other => return Err(ConfigError::UnknownKey(other.to_owned())),
        }
        Ok(())
    }

    /// Keyring account the password is stored under: `user@ip`.
    pub fn keyring_account(&self) -> Option<String> {
        Some(format!("{}@{}", self.user.as_deref()?, self.ip.as_deref()?))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "natsync", "natsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("natsync");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Where the effective password came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordSource {
    Env,
    Keyring,
    File,
    Missing,
}

impl std::fmt::Display for PasswordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Env => "environment",
            Self::Keyring => "keyring",
            Self::File => "config file",
            Self::Missing => "not set",
        })
    }
}

/// Loaded configuration with the password resolved.
#[derive(Debug, Clone)]
pub struct Settings {
    pub path: PathBuf,
    pub config: Config,
    password: Option<SecretString>,
    password_source: PasswordSource,
}

impl Settings {
    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn password_source(&self) -> PasswordSource {
        self.password_source
    }
}

impl ConfigProvider for Settings {
    fn get(&self, key: &str) -> Option<String> {
        if key == keys::PASS {
            return self.password.as_ref().map(|p| p.expose_secret().to_owned());
        }
        self.config.value(key)
    }
}

/// Builds [`Settings`] from file, environment and keyring.
#[derive(Debug, Clone)]
pub struct Loader {
    path: PathBuf,
    env_prefix: String,
    keyring: bool,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            path: config_path(),
            env_prefix: ENV_PREFIX.into(),
            keyring: true,
        }
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn keyring(mut self, enabled: bool) -> Self {
        self.keyring = enabled;
        self
    }

    #[must_use]
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load file + environment. A missing file is an empty config.
    ///
    /// The password is kept out of figment: env values that look numeric
    /// would otherwise fail to deserialize as a string.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&self.path))
            .merge(Env::prefixed(&self.env_prefix).ignore(&[keys::PASS]));
        let config: Config = figment.extract()?;

        let (password, password_source) = self.resolve_password(&config);
        debug!(path = %self.path.display(), source = %password_source, "configuration loaded");

        Ok(Settings {
            path: self.path.clone(),
            config,
            password,
            password_source,
        })
    }

    fn resolve_password(&self, config: &Config) -> (Option<SecretString>, PasswordSource) {
        // 1. Env var
        if let Ok(pw) = std::env::var(format!("{}PASS", self.env_prefix)) {
            if !pw.is_empty() {
                return (Some(SecretString::from(pw)), PasswordSource::Env);
            }
        }

        // 2. Keyring
        if self.keyring {
            if let Some(account) = config.keyring_account() {
                if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &account) {
                    if let Ok(pw) = entry.get_password() {
                        return (Some(SecretString::from(pw)), PasswordSource::Keyring);
                    }
                }
            }
        }

        // 3. Plaintext in config
        match &config.pass {
            Some(pw) if !pw.is_empty() => (Some(SecretString::from(pw.clone())), PasswordSource::File),
            _ => (None, PasswordSource::Missing),
        }
    }
}

// ── Saving ──────────────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Read the file alone (no environment), for editing and saving back.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    Ok(Figment::new().merge(Toml::file(path)).extract()?)
}

/// Store the router password in the OS keyring under `user@ip`.
pub fn store_password(cfg: &Config, password: &SecretString) -> Result<(), ConfigError> {
    let account = cfg.keyring_account().ok_or(ConfigError::NoKeyringAccount)?;
    let entry = keyring::Entry::new(KEYRING_SERVICE, &account)?;
    entry.set_password(password.expose_secret())?;
    debug!(%account, "password stored in keyring");
    Ok(())
}
