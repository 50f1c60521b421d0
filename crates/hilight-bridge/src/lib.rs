//! Relay bridge: one supervised WebSocket connection per account, inbound
//! message handling and buffered reply delivery.

pub mod backoff;
pub mod connection;
pub mod error;
pub mod handler;
pub mod reply;
pub mod routing;
pub mod send;
pub mod state;
pub mod supervisor;
pub mod url;

/// Collaborator interfaces, re-exported for implementors.
pub mod collab {
    pub use hilight_core::collab::*;
}

pub use connection::{ReadyState, RelayConnection};
pub use error::BridgeError;
pub use handler::{Collaborators, InboundHandler};
pub use reply::ReplyPipeline;
pub use routing::{DefaultFinalizer, DefaultRouter};
pub use send::send_envelope;
pub use state::{AccountSnapshot, Phase, SupervisorState};
pub use supervisor::{Supervisor, SupervisorHandle};
