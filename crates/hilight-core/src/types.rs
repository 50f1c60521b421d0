use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-attempt connection identifier substituted into the relay URL.
///
/// Random UUIDv4, never reused across attempts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    Direct,
    Group,
}

/// The remote party a conversation is held with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub kind: PeerKind,
    pub id: String,
}

impl Peer {
    pub fn direct(id: impl Into<String>) -> Self {
        Self {
            kind: PeerKind::Direct,
            id: id.into(),
        }
    }
}

/// Result of routing an inbound message to an agent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub agent_id: String,
    pub account_id: String,
    pub session_key: String,
}

/// Canonical processing context handed to the reply engine and session store.
///
/// Field names follow the host's inbound-context convention on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundContext {
    pub body: String,
    pub body_for_agent: String,
    pub from: String,
    pub to: String,
    pub provider: String,
    pub account_id: String,
    pub chat_type: ChatType,
    pub session_key: String,
    pub is_groupchat: bool,
    pub sender_name: String,
    /// Epoch millis when the context was finalised.
    #[serde(default)]
    pub timestamp: i64,
}
