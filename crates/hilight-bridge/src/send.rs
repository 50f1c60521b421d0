use tracing::{debug, error, trace, warn};

use hilight_protocol::OutboundEnvelope;

use crate::connection::RelayConnection;

/// Serialize and queue one envelope on `conn`.
///
/// Returns `true` when the frame was accepted by the writer queue. That is
/// a local queue result, not a remote acknowledgement: failures are logged
/// and the frame is lost.
pub fn send_envelope(conn: &RelayConnection, envelope: &OutboundEnvelope, tag: &str) -> bool {
    let action = envelope.action();
    let heartbeat = envelope.is_heartbeat();

    let raw = match envelope.encode() {
        Ok(raw) => raw,
        Err(e) => {
            error!(action, tag, error = %e, "failed to encode envelope");
            return false;
        }
    };

    if heartbeat {
        trace!(action, tag, conn_id = %conn.id(), "ws send");
    } else {
        debug!(action, tag, conn_id = %conn.id(), payload = %raw, "ws send start");
    }

    if !conn.is_open() {
        if heartbeat {
            trace!(action, tag, state = ?conn.ready_state(), "ws send skipped (socket not open)");
        } else {
            warn!(action, tag, state = ?conn.ready_state(), payload = %raw, "ws send skipped (socket not open)");
        }
        return false;
    }

    match conn.try_send_text(raw) {
        Ok(()) => true,
        Err(e) => {
            if heartbeat {
                trace!(action, tag, error = %e, "ws send failed");
            } else {
                error!(action, tag, error = %e, "ws send failed");
            }
            false
        }
    }
}
