//! cbc-core: message and peer model, configuration, and character set helpers.
//! All other CBC crates depend on this one.

pub mod charset;
pub mod config;
pub mod message;
pub mod peer;

pub use message::{
    CbcMessage, CbsPayload, Category, EtwsPayload, GeoScope, MessageError, Scope, SmscbMessage,
    SmscbPayload,
};
pub use peer::{Peer, PeerId, PeerProtocol, UnknownPeerPolicy};
