use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Structured session key for relay conversations.
///
/// Each direct peer on each channel gets its own session with the routed
/// agent: `agent:{agent_id}:{channel}:{peer_kind}:{peer_id}`.
///
/// `peer_id` is last and may itself contain colons.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub agent_id: String,
    pub channel: String,
    pub peer_kind: String,
    pub peer_id: String,
}

impl SessionKey {
    pub fn new(
        agent_id: impl Into<String>,
        channel: impl Into<String>,
        peer_kind: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            channel: channel.into(),
            peer_kind: peer_kind.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Return the canonical wire-format string.
    pub fn format(&self) -> String {
        format!(
            "agent:{}:{}:{}:{}",
            self.agent_id, self.channel, self.peer_kind, self.peer_id
        )
    }

    /// Parse a wire-format key string back into a `SessionKey`.
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("agent:")
            .ok_or_else(|| SessionError::InvalidKey(format!("missing 'agent:' prefix: {s}")))?;

        let mut parts = rest.splitn(4, ':');
        let (Some(agent_id), Some(channel), Some(peer_kind), Some(peer_id)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(SessionError::InvalidKey(format!(
                "expected agent:<agent>:<channel>:<kind>:<peer>: {s}"
            )));
        };

        if [agent_id, channel, peer_kind, peer_id]
            .iter()
            .any(|part| part.is_empty())
        {
            return Err(SessionError::InvalidKey(format!(
                "key components must not be empty: {s}"
            )));
        }

        Ok(Self::new(agent_id, channel, peer_kind, peer_id))
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}

/// A persisted conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSession {
    /// UUIDv7 primary key, time-sortable.
    pub id: String,
    pub session_key: String,
    pub account_id: String,
    pub peer_id: String,
    /// Display name from the most recent inbound turn.
    pub sender_name: String,
    pub message_count: u32,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// RFC3339 timestamp of the last inbound turn.
    pub updated_at: String,
}

/// One recorded inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundTurn {
    pub id: String,
    pub session_key: String,
    pub provider: String,
    pub body: String,
    /// Full canonical context as JSON.
    pub context: serde_json::Value,
    pub received_at: String,
}
