//! Collaborator interfaces the bridge consumes.
//!
//! The bridge never reaches for a global runtime: routing, context
//! finalisation, session persistence and reply generation are injected at
//! construction time as trait objects, so every supervisor and handler can be
//! built and tested in isolation.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{InboundContext, Peer, Route};

/// Maps an inbound peer to the agent session that should handle it.
pub trait RouteResolver: Send + Sync {
    fn resolve_route(&self, channel: &str, account_id: &str, peer: &Peer) -> Route;
}

/// Normalises a raw inbound context into the canonical form the engine sees.
pub trait ContextFinalizer: Send + Sync {
    fn finalize_inbound(&self, draft: InboundContext) -> InboundContext;
}

/// Persists inbound turns. Failures are reported, never fatal to the reply.
#[async_trait]
pub trait SessionRecorder: Send + Sync {
    /// Location of the session store for `agent_id`.
    fn resolve_store_path(&self, agent_id: &str) -> String;

    async fn record_inbound_session(
        &self,
        store_path: &str,
        session_key: &str,
        ctx: &InboundContext,
    ) -> Result<()>;
}

/// Marks where a fragment sits in the generated stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// Intermediate output; more may follow.
    Block,
    /// Tool progress or other side-band output.
    Tool,
    /// The terminal fragment of the reply.
    Final,
}

/// Output sink driven by a [`ReplyEngine`].
///
/// Callbacks never fail from the engine's point of view; delivery problems
/// are handled (and logged) by the sink itself.
pub trait ReplySink: Send + Sync {
    /// Generation started; the sink may show a typing indicator.
    fn on_start(&self);

    /// One piece of generated output, delivered in order.
    fn on_fragment(&self, text: &str, kind: FragmentKind);
}

/// The reply-generation engine.
#[async_trait]
pub trait ReplyEngine: Send + Sync {
    /// Stable lowercase identifier used in logs (e.g. `"echo"`).
    fn name(&self) -> &str;

    /// Generate a reply for `ctx`, streaming output into `sink`.
    ///
    /// Returning `Err` makes the bridge report a dispatch failure to the peer.
    async fn generate(&self, ctx: &InboundContext, sink: &dyn ReplySink) -> Result<()>;
}
