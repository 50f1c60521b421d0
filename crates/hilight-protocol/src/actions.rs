// Well-known envelope actions understood by the relay server.

// inbound (relay -> bridge)
pub const MSG: &str = "msg";
pub const PONG: &str = "pong";

// outbound (bridge -> relay)
pub const CONNECTED: &str = "connected";
pub const PING: &str = "ping";
pub const TYPING: &str = "typing";
pub const REPLY: &str = "reply";
pub const ERROR: &str = "error";

/// Heartbeat-class actions are logged at reduced verbosity.
pub fn is_heartbeat(action: &str) -> bool {
    action == PING || action == PONG
}
