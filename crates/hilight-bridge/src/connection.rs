use std::fmt::Display;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use hilight_core::types::ConnectionId;

use crate::error::BridgeError;

/// Frames queued per connection before `try_send` starts failing.
pub const OUTBOUND_QUEUE: usize = 256;

/// Socket lifecycle as seen by senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Cloneable handle to one live relay socket.
///
/// Writes are queued to a dedicated writer task that owns the socket sink,
/// so callers never block and never hold a lock across `.await`.
#[derive(Clone)]
pub struct RelayConnection {
    id: ConnectionId,
    state: Arc<AtomicU8>,
    tx: mpsc::Sender<Message>,
}

impl RelayConnection {
    /// Create a handle in the `Connecting` state plus the receiving end of its
    /// outbound queue.
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Self {
            id,
            state: Arc::new(AtomicU8::new(ReadyState::Connecting as u8)),
            tx,
        };
        (conn, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_ready_state(&self, state: ReadyState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.ready_state() == ReadyState::Open
    }

    /// Queue a text frame without waiting.
    pub fn try_send_text(&self, text: String) -> Result<(), BridgeError> {
        self.tx
            .try_send(Message::Text(text.into()))
            .map_err(|e| BridgeError::SendFailed(e.to_string()))
    }

    /// Start the closing handshake with `code` and `reason`.
    ///
    /// Further sends are refused once this returns.
    pub fn close(&self, code: u16, reason: &str) {
        if matches!(self.ready_state(), ReadyState::Closing | ReadyState::Closed) {
            return;
        }
        self.set_ready_state(ReadyState::Closing);
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        if let Err(e) = self.tx.try_send(Message::Close(Some(frame))) {
            debug!(conn_id = %self.id, error = %e, "close frame not queued");
        }
    }
}

/// Spawn the task that drains `rx` into `sink`.
///
/// The task exits after writing a close frame, on the first write error, or
/// when every [`RelayConnection`] clone has been dropped.
pub fn spawn_writer<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Message>,
    conn: RelayConnection,
) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    let conn_id = conn.id().clone();
    let state = Arc::clone(&conn.state);
    drop(conn);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = sink.send(msg).await {
                warn!(conn_id = %conn_id, error = %e, "socket write failed");
                state.store(ReadyState::Closed as u8, Ordering::Release);
                return;
            }
            if closing {
                break;
            }
        }
        let _ = sink.close().await;
        debug!(conn_id = %conn_id, "writer stopped");
    })
}
