//! Shell-style rendering of the live configuration, in the layout operators
//! know from `show running-config`.

use std::fmt::Write;

use crate::peer_registry::PeerRegistry;

pub fn render_running_config(peers: &PeerRegistry) -> String {
    let mut out = String::new();
    // writeln! into a String cannot fail
    let _ = writeln!(out, "cbc");
    let _ = writeln!(out, " unknown-peers {}", peers.policy());
    for peer in peers.iter() {
        let Some(name) = peer.name.as_deref() else {
            continue;
        };
        let _ = writeln!(out, " peer {name}");
        let _ = writeln!(out, "  protocol {}", peer.proto);
        match peer.remote_port {
            Some(port) => {
                let _ = writeln!(out, "  remote-port {port}");
            }
            None => {
                let _ = writeln!(out, "  no remote-port");
            }
        }
        if let Some(host) = peer.remote_host.as_deref() {
            let _ = writeln!(out, "  remote-ip {host}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc_core::config::PeerConfig;
    use cbc_core::{PeerProtocol, UnknownPeerPolicy};

    #[test]
    fn renders_policy_and_named_peers() {
        let mut peers = PeerRegistry::new(UnknownPeerPolicy::Accept);
        peers
            .add(&PeerConfig {
                name: "bsc1".into(),
                remote_ip: Some("10.0.0.1".into()),
                remote_port: Some(48049),
                protocol: PeerProtocol::Cbsp,
            })
            .unwrap();
        peers
            .add(&PeerConfig {
                name: "bsc2".into(),
                remote_ip: Some("10.0.0.2".into()),
                remote_port: None,
                protocol: PeerProtocol::Cbsp,
            })
            .unwrap();
        peers.contact("192.0.2.1", 1);

        let expected = "\
cbc
 unknown-peers accept
 peer bsc1
  protocol cbsp
  remote-port 48049
  remote-ip 10.0.0.1
 peer bsc2
  protocol cbsp
  no remote-port
  remote-ip 10.0.0.2
";
        assert_eq!(render_running_config(&peers), expected);
    }

    #[test]
    fn empty_registry_renders_policy_only() {
        let peers = PeerRegistry::new(UnknownPeerPolicy::Reject);
        assert_eq!(render_running_config(&peers), "cbc\n unknown-peers reject\n");
    }
}
