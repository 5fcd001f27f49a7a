//! cbc-services: registries, the operation bridge and the owner thread that
//! applies operations, plus the broadcast state machine and RAN session link.

pub mod bridge;
pub mod dispatcher;
pub mod fsm;
pub mod listing;
pub mod message_registry;
pub mod owner;
pub mod peer_registry;
pub mod running_config;
pub mod session;
pub mod state;

pub use bridge::{Bridge, BridgeError, EnqueueFailure, OpOutcome, OpRequest, Operation};
pub use owner::{spawn_owner, OwnerHandle};
pub use state::CbcState;
