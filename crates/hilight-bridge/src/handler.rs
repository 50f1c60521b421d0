use std::sync::Arc;

use tracing::{debug, error, info, warn};

use hilight_core::account::ResolvedAccount;
use hilight_core::collab::{ContextFinalizer, ReplyEngine, RouteResolver, SessionRecorder};
use hilight_core::config::CHANNEL_ID;
use hilight_core::error::HilightError;
use hilight_core::types::{ChatType, InboundContext, Peer};
use hilight_protocol::{decode, Inbound, InboundEnvelope, Outbound, OutboundEnvelope};

use crate::connection::RelayConnection;
use crate::reply::ReplyPipeline;
use crate::send::send_envelope;

/// Services the handler drives for every accepted message.
#[derive(Clone)]
pub struct Collaborators {
    pub router: Arc<dyn RouteResolver>,
    pub finalizer: Arc<dyn ContextFinalizer>,
    pub sessions: Arc<dyn SessionRecorder>,
    pub engine: Arc<dyn ReplyEngine>,
}

/// Turns inbound `msg` envelopes into one engine run and one reply.
#[derive(Clone)]
pub struct InboundHandler {
    account: Arc<ResolvedAccount>,
    collab: Collaborators,
}

impl InboundHandler {
    pub fn new(account: Arc<ResolvedAccount>, collab: Collaborators) -> Self {
        Self { account, collab }
    }

    /// Decode and handle one raw text frame.
    pub async fn handle_raw(&self, conn: &RelayConnection, raw: &str) {
        match decode(raw) {
            Ok(envelope) => self.handle_envelope(conn, envelope).await,
            Err(e) => {
                let preview: String = raw.chars().take(200).collect();
                warn!(error = %e, raw = %preview, "failed to parse message");
            }
        }
    }

    pub async fn handle_envelope(&self, conn: &RelayConnection, envelope: InboundEnvelope) {
        let context = envelope.context_or_default();
        let payload = match envelope.message {
            Inbound::Msg(payload) => payload,
            Inbound::Pong(_) => {
                debug!("ignoring action: pong");
                return;
            }
            Inbound::Unknown { action } => {
                debug!(action = %action, "ignoring action");
                return;
            }
        };

        let msg = match payload.validate() {
            Ok(msg) => msg,
            Err(rejection) => {
                warn!(reason = %rejection, "msg payload rejected");
                return;
            }
        };

        if !self.account.allows_sender(&msg.user_id) {
            info!(
                account_id = %self.account.account_id,
                user_id = %msg.user_id,
                "sender not in allow_from, dropping"
            );
            return;
        }

        info!(user_id = %msg.user_id, context = %context, "msg received");

        let route = self.collab.router.resolve_route(
            CHANNEL_ID,
            &self.account.account_id,
            &Peer::direct(&msg.user_id),
        );

        let ctx = self.collab.finalizer.finalize_inbound(InboundContext {
            body: msg.text.clone(),
            body_for_agent: msg.text.clone(),
            from: msg.user_id.clone(),
            to: CHANNEL_ID.to_string(),
            provider: CHANNEL_ID.to_string(),
            account_id: route.account_id.clone(),
            chat_type: ChatType::Direct,
            session_key: route.session_key.clone(),
            is_groupchat: false,
            sender_name: msg.sender_name.clone(),
            timestamp: 0,
        });

        let session_key = if ctx.session_key.is_empty() {
            route.session_key.as_str()
        } else {
            ctx.session_key.as_str()
        };
        let store_path = self.collab.sessions.resolve_store_path(&route.agent_id);
        if let Err(e) = self
            .collab
            .sessions
            .record_inbound_session(&store_path, session_key, &ctx)
            .await
        {
            error!(error = %e, session_key, "failed to record inbound session");
        }

        let pipeline = Arc::new(ReplyPipeline::new(conn.clone(), &msg.user_id, &context));
        let _idle = pipeline.idle_on_drop();

        if let Err(e) = self.collab.engine.generate(&ctx, &*pipeline).await {
            let failure = HilightError::Dispatch(e.to_string());
            error!(engine = self.collab.engine.name(), error = %failure, "dispatch error");
            let env = OutboundEnvelope::new(
                &context,
                Outbound::error(&msg.user_id, failure.code(), e.to_string()),
            );
            send_envelope(conn, &env, "error");
        }
    }
}
