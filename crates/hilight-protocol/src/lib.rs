//! HiLight relay wire protocol.
//!
//! Every frame in both directions is a JSON text frame shaped
//! `{ "context": "...", "action": "...", "payload": {...} }`.

pub mod actions;
pub mod envelope;
pub mod error;

pub use envelope::{
    decode, ConnectedPayload, Envelope, ErrorPayload, Inbound, InboundEnvelope, MsgPayload,
    Outbound, OutboundEnvelope, PingPayload, PongPayload, ReplyPayload, TypingPayload, ValidMsg,
};
pub use error::{MsgRejection, ProtocolError};
