use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Close codes the relay uses to reject credentials.
pub const AUTH_FAILURE_CLOSE_CODES: [u16; 3] = [401, 4001, 4401];

/// Errors that can occur on a relay connection.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The account cannot be started (no URL, disabled, ...).
    #[error("account {account_id} is not runnable: {reason}")]
    NotRunnable { account_id: String, reason: String },

    /// The connect URL or handshake request could not be built.
    #[error("invalid connect request: {0}")]
    InvalidRequest(String),

    /// Transport-level failure (handshake, read, write).
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The outbound queue is full or the writer is gone.
    #[error("send failed: {0}")]
    SendFailed(String),
}

impl BridgeError {
    /// Whether this failure means the relay rejected our credentials.
    ///
    /// Auth failures are terminal: the supervisor stops instead of
    /// reconnecting.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            BridgeError::WebSocket(tungstenite::Error::Http(response)) => {
                response.status().as_u16() == 401
            }
            BridgeError::WebSocket(e) => reason_mentions_auth(&e.to_string()),
            _ => false,
        }
    }
}

/// Classify a close code and reason.
pub fn is_auth_close(code: Option<u16>, reason: &str) -> bool {
    code.is_some_and(|c| AUTH_FAILURE_CLOSE_CODES.contains(&c)) || reason_mentions_auth(reason)
}

fn reason_mentions_auth(reason: &str) -> bool {
    let lower = reason.to_ascii_lowercase();
    lower.contains("401") || lower.contains("unauthorized")
}
