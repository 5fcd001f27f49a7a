//! Peer registry. Owned by the owner thread; never shared for mutation.

use cbc_core::config::{CbcConfig, PeerConfig};
use cbc_core::{Peer, PeerId, PeerProtocol, UnknownPeerPolicy};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    #[error("peer '{0}' already exists")]
    DuplicateName(String),
}

/// Result of an inbound connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contact {
    /// Address matches a configured peer.
    Known(PeerId),
    /// Unknown address, admitted as a new unnamed peer.
    Accepted(PeerId),
    Rejected,
}

impl Contact {
    pub fn peer(&self) -> Option<PeerId> {
        match self {
            Contact::Known(id) | Contact::Accepted(id) => Some(*id),
            Contact::Rejected => None,
        }
    }
}

#[derive(Debug)]
pub struct PeerRegistry {
    /// Insertion order is listing order.
    peers: Vec<Peer>,
    next_id: u64,
    policy: UnknownPeerPolicy,
}

impl PeerRegistry {
    pub fn new(policy: UnknownPeerPolicy) -> Self {
        Self {
            peers: Vec::new(),
            next_id: 1,
            policy,
        }
    }

    pub fn from_config(config: &CbcConfig) -> Result<Self, PeerError> {
        let mut registry = Self::new(config.cbc.unknown_peers);
        for peer in &config.peers {
            registry.add(peer)?;
        }
        Ok(registry)
    }

    pub fn policy(&self) -> UnknownPeerPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: UnknownPeerPolicy) {
        self.policy = policy;
    }

    pub fn by_name(&self, name: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.name.as_deref() == Some(name))
    }

    pub fn by_id(&self, id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// First peer matching `host:port`, in insertion order.
    pub fn by_addr(&self, host: &str, port: u16) -> Option<&Peer> {
        self.peers.iter().find(|p| p.matches_addr(host, port))
    }

    /// Create an empty peer. Named peers must be unique.
    pub fn create(&mut self, name: Option<&str>, proto: PeerProtocol) -> Result<&mut Peer, PeerError> {
        if let Some(name) = name {
            if self.by_name(name).is_some() {
                return Err(PeerError::DuplicateName(name.to_string()));
            }
        }
        let id = PeerId(self.next_id);
        self.next_id += 1;
        self.peers.push(Peer {
            id,
            name: name.map(str::to_string),
            remote_host: None,
            remote_port: None,
            proto,
        });
        let idx = self.peers.len() - 1;
        Ok(&mut self.peers[idx])
    }

    /// Create a peer from its configuration block.
    pub fn add(&mut self, config: &PeerConfig) -> Result<PeerId, PeerError> {
        let peer = self.create(Some(&config.name), config.protocol)?;
        peer.remote_host = config.remote_ip.clone();
        peer.remote_port = config.remote_port;
        Ok(peer.id)
    }

    /// Remove a peer by name. Detaching its session and per-message state is
    /// the caller's job.
    pub fn remove(&mut self, name: &str) -> Option<Peer> {
        let idx = self.peers.iter().position(|p| p.name.as_deref() == Some(name))?;
        Some(self.peers.remove(idx))
    }

    /// Remove a peer by id. Unnamed peers can only be removed this way.
    pub fn remove_by_id(&mut self, id: PeerId) -> Option<Peer> {
        let idx = self.peers.iter().position(|p| p.id == id)?;
        Some(self.peers.remove(idx))
    }

    /// Classify an inbound connection from `host:port` and apply the
    /// unknown-peer policy.
    pub fn contact(&mut self, host: &str, port: u16) -> Contact {
        if let Some(peer) = self.by_addr(host, port) {
            return Contact::Known(peer.id);
        }
        match self.policy {
            UnknownPeerPolicy::Reject => Contact::Rejected,
            UnknownPeerPolicy::Accept => {
                let id = PeerId(self.next_id);
                self.next_id += 1;
                self.peers.push(Peer {
                    id,
                    name: None,
                    remote_host: Some(host.to_string()),
                    remote_port: Some(port),
                    proto: PeerProtocol::Cbsp,
                });
                Contact::Accepted(id)
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.peers.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
