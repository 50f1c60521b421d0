use thiserror::Error;

/// A frame that could not be decoded into a known envelope shape.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON frame: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("frame is not an envelope object")]
    NotAnEnvelope,

    #[error("invalid payload for action {action}: {source}")]
    InvalidPayload {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a decoded `msg` payload was rejected before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MsgRejection {
    #[error("msg payload missing userId")]
    MissingUserId,

    #[error("msg payload missing text")]
    EmptyText,
}
