// Domain entities handed in by the hosting application.
//
// These are plain values: the reconciler never stores them and never
// reads anything back from them beyond what is listed here.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An IP + port pair a game server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Allocation {
    pub address: IpAddr,
    pub port: u16,
}

impl Allocation {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SocketAddr::new(self.address, self.port).fmt(f)
    }
}

impl FromStr for Allocation {
    type Err = std::net::AddrParseError;

    /// Parses `10.0.0.5:25565` or `[fd00::5]:25565`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: SocketAddr = s.parse()?;
        Ok(Self::new(addr.ip(), addr.port()))
    }
}

/// A hosted game server. Only the identity and its allocations matter here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub uuid: String,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
}

impl Server {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            allocations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_allocations(mut self, allocations: impl IntoIterator<Item = Allocation>) -> Self {
        self.allocations.extend(allocations);
        self
    }
}

/// Direction of a lifecycle event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LifecycleAction {
    Add,
    Remove,
}
