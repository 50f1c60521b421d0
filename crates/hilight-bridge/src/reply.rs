use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error};

use hilight_core::collab::{FragmentKind, ReplySink};
use hilight_protocol::{Outbound, OutboundEnvelope};

use crate::connection::RelayConnection;
use crate::send::send_envelope;

#[derive(Debug, Default)]
struct ReplyBuffer {
    fragments: Vec<String>,
    final_seen: bool,
    sent: bool,
}

/// Buffers streamed output for one inbound message and emits it as a single
/// `reply` envelope.
///
/// The reply goes out when a `Final` fragment arrives, or when the handler
/// idles the pipeline after generation, whichever comes first. It is never
/// sent twice.
pub struct ReplyPipeline {
    conn: RelayConnection,
    user_id: String,
    context: String,
    buffer: Mutex<ReplyBuffer>,
}

impl ReplyPipeline {
    pub fn new(conn: RelayConnection, user_id: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            conn,
            user_id: user_id.into(),
            context: context.into(),
            buffer: Mutex::new(ReplyBuffer::default()),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, ReplyBuffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send the buffered reply if there is one and it has not gone out yet.
    ///
    /// Returns `true` if this call sent the reply. The buffer is only marked
    /// sent when the transport accepted the frame.
    pub fn flush(&self) -> bool {
        let mut buf = self.buffer();
        if buf.sent || (!buf.final_seen && buf.fragments.is_empty()) {
            return false;
        }

        let text = buf.fragments.concat();
        let env = OutboundEnvelope::new(&self.context, Outbound::reply(&self.user_id, &text));
        if send_envelope(&self.conn, &env, "reply") {
            buf.sent = true;
            buf.fragments.clear();
            debug!(user_id = %self.user_id, len = text.len(), "sent buffered reply");
            true
        } else {
            error!(user_id = %self.user_id, len = text.len(), "failed to send reply");
            false
        }
    }

    /// Generation finished (successfully or not).
    pub fn idle(&self) {
        self.flush();
    }

    pub fn is_sent(&self) -> bool {
        self.buffer().sent
    }

    /// Guard that idles the pipeline when dropped.
    pub fn idle_on_drop(self: &Arc<Self>) -> IdleGuard {
        IdleGuard(Arc::clone(self))
    }
}

impl ReplySink for ReplyPipeline {
    fn on_start(&self) {
        let env = OutboundEnvelope::new(&self.context, Outbound::typing(&self.user_id));
        send_envelope(&self.conn, &env, "typing");
    }

    fn on_fragment(&self, text: &str, kind: FragmentKind) {
        {
            let mut buf = self.buffer();
            if !text.is_empty() {
                buf.fragments.push(text.to_string());
            }
            if kind != FragmentKind::Final {
                debug!(kind = ?kind, len = text.len(), "buffering chunk");
                return;
            }
            buf.final_seen = true;
        }
        self.flush();
    }
}

/// Calls [`ReplyPipeline::idle`] exactly once, on drop.
pub struct IdleGuard(Arc<ReplyPipeline>);

impl Drop for IdleGuard {
    fn drop(&mut self) {
        self.0.idle();
    }
}
