//! RAN peer model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registry-assigned peer handle. Stable for the lifetime of the peer and
/// never reused within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerProtocol {
    #[default]
    Cbsp,
}

impl PeerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerProtocol::Cbsp => "cbsp",
        }
    }
}

impl fmt::Display for PeerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a connection from an address no configured peer matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPeerPolicy {
    Accept,
    #[default]
    Reject,
}

impl UnknownPeerPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnknownPeerPolicy::Accept => "accept",
            UnknownPeerPolicy::Reject => "reject",
        }
    }
}

impl fmt::Display for UnknownPeerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnknownPeerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(UnknownPeerPolicy::Accept),
            "reject" => Ok(UnknownPeerPolicy::Reject),
            other => Err(format!("unknown-peers must be accept or reject, got '{other}'")),
        }
    }
}

/// A RAN peer (BSC/RNC) we broadcast to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    /// Unique among named peers. Peers accepted from an unknown source have
    /// no name.
    pub name: Option<String>,
    pub remote_host: Option<String>,
    /// `None` matches the peer by IP only.
    pub remote_port: Option<u16>,
    pub proto: PeerProtocol,
}

impl Peer {
    /// Whether a connection from `host:port` belongs to this peer.
    pub fn matches_addr(&self, host: &str, port: u16) -> bool {
        let Some(own) = self.remote_host.as_deref() else {
            return false;
        };
        if !own.eq_ignore_ascii_case(host) {
            return false;
        }
        match self.remote_port {
            None => true,
            Some(p) => p == port,
        }
    }

    /// Name for logs and listings.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }
}
