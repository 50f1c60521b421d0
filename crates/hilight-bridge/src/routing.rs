//! Default routing and context finalisation used by the gateway.

use hilight_core::collab::{ContextFinalizer, RouteResolver};
use hilight_core::types::{InboundContext, Peer, PeerKind, Route};
use hilight_sessions::SessionKey;

/// Routes every peer to one configured agent, one session per peer.
pub struct DefaultRouter {
    agent_id: String,
}

impl DefaultRouter {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }
}

impl RouteResolver for DefaultRouter {
    fn resolve_route(&self, channel: &str, account_id: &str, peer: &Peer) -> Route {
        let kind = match peer.kind {
            PeerKind::Direct => "direct",
            PeerKind::Group => "group",
        };
        Route {
            agent_id: self.agent_id.clone(),
            account_id: account_id.to_string(),
            session_key: SessionKey::new(&self.agent_id, channel, kind, &peer.id).format(),
        }
    }
}

/// Fills defaults the draft context may lack and stamps the receive time.
pub struct DefaultFinalizer;

impl ContextFinalizer for DefaultFinalizer {
    fn finalize_inbound(&self, mut draft: InboundContext) -> InboundContext {
        if draft.body_for_agent.is_empty() {
            draft.body_for_agent = draft.body.clone();
        }
        if draft.sender_name.trim().is_empty() {
            draft.sender_name = draft.from.clone();
        }
        if draft.timestamp == 0 {
            draft.timestamp = chrono::Utc::now().timestamp_millis();
        }
        draft
    }
}
