//! Resolved backend address

use std::fmt;
use std::net::{AddrParseError, SocketAddr};
use std::str::FromStr;

/// A single resolved backend endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerAddress(SocketAddr);

impl ServerAddress {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Underlying socket address
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for ServerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for ServerAddress {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
