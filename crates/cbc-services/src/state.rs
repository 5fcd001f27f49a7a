//! The owner thread's context object.

use cbc_core::config::{CbcConfig, PeerConfig};

use crate::message_registry::MessageRegistry;
use crate::peer_registry::{PeerError, PeerRegistry};

/// Everything the owner thread mutates. Built once at startup and moved onto
/// the owner thread; nothing else holds a reference.
#[derive(Debug)]
pub struct CbcState {
    pub peers: PeerRegistry,
    pub messages: MessageRegistry,
}

impl CbcState {
    pub fn new(peers: PeerRegistry) -> Self {
        Self {
            peers,
            messages: MessageRegistry::new(),
        }
    }

    pub fn from_config(config: &CbcConfig) -> Result<Self, PeerError> {
        Ok(Self::new(PeerRegistry::from_config(config)?))
    }

    /// `base` with its peer list and policy replaced by the live ones.
    /// Unnamed peers (admitted from unknown sources) are not persisted.
    pub fn to_config(&self, base: &CbcConfig) -> CbcConfig {
        let mut config = base.clone();
        config.cbc.unknown_peers = self.peers.policy();
        config.peers = self
            .peers
            .iter()
            .filter_map(|p| {
                Some(PeerConfig {
                    name: p.name.clone()?,
                    remote_ip: p.remote_host.clone(),
                    remote_port: p.remote_port,
                    protocol: p.proto,
                })
            })
            .collect();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc_core::{PeerProtocol, UnknownPeerPolicy};

    #[test]
    fn config_roundtrip_skips_unnamed_peers() {
        let mut base = CbcConfig::default();
        base.cbc.unknown_peers = UnknownPeerPolicy::Accept;
        base.peers.push(PeerConfig {
            name: "bsc".into(),
            remote_ip: Some("10.0.0.1".into()),
            remote_port: None,
            protocol: PeerProtocol::Cbsp,
        });
        let mut state = CbcState::from_config(&base).unwrap();
        state.peers.contact("192.0.2.1", 1234);
        assert_eq!(state.peers.len(), 2);

        let out = state.to_config(&base);
        assert_eq!(out, base);
    }
}
