// ── Router connection settings ──
//
// Core never reads files or keyrings itself. It asks a `ConfigProvider`
// for string values by key and turns them into `RouterSettings`; where the
// values come from is the hosting application's business.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use natsync_api::{DEFAULT_PORT, LoginMethod, SessionOptions};
use secrecy::SecretString;

use crate::error::CoreError;

pub const DEFAULT_INTERFACE: &str = "ether1";

/// Setting keys understood by [`RouterSettings::resolve`].
pub mod keys {
    pub const IP: &str = "ip";
    pub const USER: &str = "user";
    pub const PASS: &str = "pass";
    pub const INTERFACE: &str = "interface";
    pub const PORT: &str = "port";
    pub const CONNECT_TIMEOUT: &str = "connect_timeout";
    pub const READ_TIMEOUT: &str = "read_timeout";
    pub const LOGIN_METHOD: &str = "login_method";

    pub const ALL: &[&str] = &[
        IP,
        USER,
        PASS,
        INTERFACE,
        PORT,
        CONNECT_TIMEOUT,
        READ_TIMEOUT,
        LOGIN_METHOD,
    ];
}

// ── Provider capability ──────────────────────────────────────────────

/// Read-only source of configuration values.
pub trait ConfigProvider {
    fn get(&self, key: &str) -> Option<String>;
}

impl<P: ConfigProvider + ?Sized> ConfigProvider for &P {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProvider for std::sync::Arc<P> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

impl ConfigProvider for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl ConfigProvider for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }
}

/// Reads `MIKROTIK_<KEY>` environment variables (`MIKROTIK_IP`, ...).
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: String,
}

impl EnvProvider {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::with_prefix("MIKROTIK_")
    }
}

impl ConfigProvider for EnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(format!("{}{}", self.prefix, key.to_ascii_uppercase())).ok()
    }
}

// ── Resolved settings ────────────────────────────────────────────────

/// Everything needed to open a session and build rules.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// `host:port` of the API service.
    pub address: String,
    pub username: String,
    pub password: SecretString,
    /// Inbound interface written into every created rule.
    pub interface: String,
    pub session: SessionOptions,
}

impl RouterSettings {
    /// Build settings from a provider.
    ///
    /// Returns `Ok(None)` when the address or credentials are missing (the
    /// integration is simply not configured). Present-but-invalid optional
    /// values are a [`CoreError::Config`].
    pub fn resolve<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Option<Self>, CoreError> {
        let value = |key: &str| provider.get(key).filter(|v| !v.trim().is_empty());

        let (Some(ip), Some(username), Some(password)) =
            (value(keys::IP), value(keys::USER), value(keys::PASS))
        else {
            return Ok(None);
        };

        let port = match value(keys::PORT) {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_PORT,
        };

        let mut session = SessionOptions::default();
        if let Some(raw) = value(keys::CONNECT_TIMEOUT) {
            session.connect_timeout = parse_secs(keys::CONNECT_TIMEOUT, &raw)?;
        }
        if let Some(raw) = value(keys::READ_TIMEOUT) {
            session.read_timeout = parse_secs(keys::READ_TIMEOUT, &raw)?;
        }
        if let Some(raw) = value(keys::LOGIN_METHOD) {
            session.login_method = raw.trim().parse::<LoginMethod>().map_err(|_| {
                CoreError::config(format!(
                    "{} must be auto, plain or challenge, got {raw:?}",
                    keys::LOGIN_METHOD
                ))
            })?;
        }

        Ok(Some(Self {
            address: join_address(ip.trim(), port),
            username,
            password: SecretString::from(password),
            interface: value(keys::INTERFACE).unwrap_or_else(|| DEFAULT_INTERFACE.to_owned()),
            session,
        }))
    }
}

fn parse_port(raw: &str) -> Result<u16, CoreError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(CoreError::config(format!(
            "{} must be a number between 1 and 65535, got {raw:?}",
            keys::PORT
        ))),
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, CoreError> {
    match raw.trim().parse::<f64>().map(Duration::try_from_secs_f64) {
        Ok(Ok(secs)) if !secs.is_zero() => Ok(secs),
        _ => Err(CoreError::config(format!(
            "{key} must be a positive number of seconds, got {raw:?}"
        ))),
    }
}

/// `10.0.0.1` + 8728 -> `10.0.0.1:8728`; IPv6 gets brackets. A value that
/// already names a port (`router.lan:8729`) is used as is.
fn join_address(ip: &str, port: u16) -> String {
    if let Ok(addr) = ip.parse::<IpAddr>() {
        return SocketAddr::new(addr, port).to_string();
    }
    if ip.parse::<SocketAddr>().is_ok() || ip.contains(':') {
        return ip.to_owned();
    }
    format!("{ip}:{port}")
}
