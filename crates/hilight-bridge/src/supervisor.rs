use std::sync::{Arc, Mutex, RwLock};

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use hilight_core::account::ResolvedAccount;
use hilight_core::config::PLUGIN_ID;
use hilight_core::types::ConnectionId;
use hilight_protocol::{decode, Outbound, OutboundEnvelope};

use crate::connection::{spawn_writer, ReadyState, RelayConnection, OUTBOUND_QUEUE};
use crate::error::BridgeError;
use crate::handler::{Collaborators, InboundHandler};
use crate::send::send_envelope;
use crate::state::{AccountSnapshot, CloseAction, CloseInfo, Phase, SupervisorState, TickAction};
use crate::url::resolve_connect_url;

type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code sent when the relay stops answering pings.
pub const PONG_TIMEOUT_CODE: u16 = 4000;
const NORMAL_CLOSE_CODE: u16 = 1000;
const ABNORMAL_CLOSE_CODE: u16 = 1006;
const NO_STATUS_CODE: u16 = 1005;

/// Owns the full lifecycle of one account's relay connection.
pub struct Supervisor {
    account: Arc<ResolvedAccount>,
    url_template: String,
    handler: InboundHandler,
    cancel: CancellationToken,
}

impl Supervisor {
    /// Build a supervisor for `account`, cancelled together with `parent`.
    pub fn new(
        account: ResolvedAccount,
        collab: Collaborators,
        parent: &CancellationToken,
    ) -> Result<Self, BridgeError> {
        if !account.enabled {
            return Err(BridgeError::NotRunnable {
                account_id: account.account_id,
                reason: "account is disabled".to_string(),
            });
        }
        let Some(url_template) = account.ws_url.clone() else {
            return Err(BridgeError::NotRunnable {
                reason: account.unconfigured_reason().to_string(),
                account_id: account.account_id,
            });
        };

        let account = Arc::new(account);
        Ok(Self {
            handler: InboundHandler::new(Arc::clone(&account), collab),
            account,
            url_template,
            cancel: parent.child_token(),
        })
    }

    /// Spawn the supervisor task.
    pub fn start(self) -> SupervisorHandle {
        let account_id = self.account.account_id.clone();
        let (done_tx, done_rx) = watch::channel(None);
        let snapshot = Arc::new(RwLock::new(AccountSnapshot::new(&account_id)));
        let stop_reason = Arc::new(Mutex::new(None));

        let runner = Runner {
            state: SupervisorState::new(&self.account),
            account: self.account,
            url_template: self.url_template,
            handler: self.handler,
            cancel: self.cancel.clone(),
            snapshot: Arc::clone(&snapshot),
            stop_reason: Arc::clone(&stop_reason),
            done_tx,
        };
        let span = info_span!("supervisor", account_id = %account_id);
        tokio::spawn(runner.run().instrument(span));

        SupervisorHandle {
            account_id,
            cancel: self.cancel,
            stop_reason,
            snapshot,
            done: done_rx,
        }
    }
}

/// Control and status handle for a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    account_id: String,
    cancel: CancellationToken,
    stop_reason: Arc<Mutex<Option<String>>>,
    snapshot: Arc<RwLock<AccountSnapshot>>,
    done: watch::Receiver<Option<String>>,
}

impl SupervisorHandle {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Request a permanent stop. Idempotent; the first reason wins.
    pub fn stop(&self, reason: &str) {
        record_stop_reason(&self.stop_reason, reason);
        self.cancel.cancel();
    }

    /// Resolves once the supervisor has stopped for good, with the reason.
    pub async fn stopped(&self) -> String {
        let mut done = self.done.clone();
        let reason = match done.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone().unwrap_or_default(),
            Err(_) => "supervisor task ended".to_string(),
        };
        reason
    }

    pub fn is_stopped(&self) -> bool {
        self.done.borrow().is_some()
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

fn record_stop_reason(slot: &Mutex<Option<String>>, reason: &str) {
    let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.is_none() {
        *slot = Some(reason.to_string());
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// State owned by the supervisor task. Nothing here is shared except the
/// snapshot and the stop-reason slot.
struct Runner {
    account: Arc<ResolvedAccount>,
    url_template: String,
    handler: InboundHandler,
    cancel: CancellationToken,
    state: SupervisorState,
    snapshot: Arc<RwLock<AccountSnapshot>>,
    stop_reason: Arc<Mutex<Option<String>>>,
    done_tx: watch::Sender<Option<String>>,
}

impl Runner {
    async fn run(mut self) {
        self.publish(|s| {
            s.running = true;
            s.last_start_at = Some(now_rfc3339());
        });

        if self.cancel.is_cancelled() {
            record_stop_reason(&self.stop_reason, "already aborted");
            self.state.mark_stopped();
        }

        let cancel = self.cancel.clone();
        loop {
            if cancel.is_cancelled() {
                self.state.mark_stopped();
            }
            if !self.state.begin_connect() {
                break;
            }
            self.publish(|_| {});

            let close = self.connect_once().await;
            match self.state.on_close(&close) {
                CloseAction::Resolve => {
                    info!("connection closed (supervisor stopped)");
                    break;
                }
                CloseAction::Terminal => {
                    error!(
                        code = ?close.code,
                        reason = %close.reason,
                        "auth failed, stop reconnecting. Check auth_token for this account"
                    );
                    record_stop_reason(&self.stop_reason, "auth failed (401), stop reconnecting");
                    self.publish(|s| s.last_error = Some(format!("auth failed: {}", close.reason)));
                    break;
                }
                CloseAction::Reconnect { attempt, delay } => {
                    warn!(code = ?close.code, reason = %close.reason, "connection closed, reconnecting");
                    info!(delay_ms = delay.as_millis() as u64, attempt, "reconnecting");
                    self.publish(|s| s.last_error = Some(close.reason.clone()));

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.state.mark_stopped();
                            break;
                        }
                        _ = sleep(delay) => {}
                    }
                }
            }
        }

        self.finish();
    }

    /// One connection attempt, from handshake to close.
    async fn connect_once(&mut self) -> CloseInfo {
        let conn_id = ConnectionId::new();
        let url = resolve_connect_url(&self.url_template, &conn_id);
        info!(
            url = %url,
            attempt = self.state.reconnect_attempts() + 1,
            "connecting"
        );

        let cancel = self.cancel.clone();
        let opened = tokio::select! {
            _ = cancel.cancelled() => {
                self.state.mark_stopped();
                return CloseInfo::new(None, "stopped before connect");
            }
            res = open_socket(&url, self.account.auth_token.as_deref()) => res,
        };

        match opened {
            Ok(socket) => {
                info!(url = %url, "connected");
                self.drive(socket, conn_id).await
            }
            Err(e) => {
                error!(error = %e, "connection error");
                CloseInfo {
                    code: None,
                    reason: e.to_string(),
                    auth_rejected: e.is_auth_failure(),
                }
            }
        }
    }

    /// Pump one open socket until it closes or the supervisor stops.
    async fn drive(&mut self, socket: RelaySocket, conn_id: ConnectionId) -> CloseInfo {
        let (sink, mut stream) = socket.split();
        let (conn, rx) = RelayConnection::new(conn_id, OUTBOUND_QUEUE);
        let writer = spawn_writer(sink, rx, conn.clone());
        conn.set_ready_state(ReadyState::Open);

        self.state.on_open();
        self.publish(|_| {});

        let connected = OutboundEnvelope::system(Outbound::connected(
            PLUGIN_ID,
            self.account.account_id.clone(),
        ));
        send_envelope(&conn, &connected, "connected");

        let period = self.account.heartbeat_interval();
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cancel = self.cancel.clone();
        let mut closed_locally = false;
        let close = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.state.mark_stopped();
                    info!("stopping supervisor, closing connection");
                    conn.close(NORMAL_CLOSE_CODE, "supervisor stopped");
                    closed_locally = true;
                    break CloseInfo::new(Some(NORMAL_CLOSE_CODE), "supervisor stopped");
                }

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.on_text(&conn, text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.on_text(&conn, text),
                        Err(_) => warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(f) => CloseInfo::new(Some(u16::from(f.code)), f.reason.as_str()),
                            None => CloseInfo::new(Some(NO_STATUS_CODE), ""),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let e = BridgeError::from(e);
                        error!(error = %e, "connection error");
                        break CloseInfo {
                            code: Some(ABNORMAL_CLOSE_CODE),
                            reason: e.to_string(),
                            auth_rejected: e.is_auth_failure(),
                        };
                    }
                    None => break CloseInfo::new(Some(ABNORMAL_CLOSE_CODE), "connection lost"),
                },

                _ = heartbeat.tick() => match self.state.on_heartbeat_tick() {
                    TickAction::SendPing { missed } => {
                        let ping = OutboundEnvelope::system(Outbound::ping(
                            chrono::Utc::now().timestamp_millis(),
                        ));
                        send_envelope(&conn, &ping, &format!("heartbeat-{missed}"));
                    }
                    TickAction::ForceClose { missed } => {
                        warn!(missed, "missed pongs, connection seems dead. Reconnecting");
                        conn.close(PONG_TIMEOUT_CODE, "pong timeout");
                        closed_locally = true;
                        break CloseInfo::new(Some(PONG_TIMEOUT_CODE), "pong timeout");
                    }
                },
            }
        };

        // A locally initiated close lets the writer flush the close frame.
        if !closed_locally {
            writer.abort();
        }
        conn.set_ready_state(ReadyState::Closed);
        close
    }

    fn on_text(&mut self, conn: &RelayConnection, raw: &str) {
        trace!(len = raw.len(), "received frame");
        match decode(raw) {
            Ok(envelope) if envelope.is_pong() => {
                self.state.on_pong();
                debug!("pong received, connection healthy");
                self.publish(|_| {});
            }
            Ok(envelope) => {
                let handler = self.handler.clone();
                let conn = conn.clone();
                tokio::spawn(
                    async move { handler.handle_envelope(&conn, envelope).await }
                        .in_current_span(),
                );
            }
            Err(e) => {
                let preview: String = raw.chars().take(200).collect();
                warn!(error = %e, raw = %preview, "failed to parse message");
            }
        }
    }

    fn publish(&self, update: impl FnOnce(&mut AccountSnapshot)) {
        let mut snap = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        snap.phase = self.state.phase();
        snap.reconnect_attempts = self.state.reconnect_attempts();
        update(&mut snap);
    }

    fn finish(self) {
        let reason = self
            .stop_reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or_else(|| "gateway shutdown".to_string());

        self.publish(|s| {
            s.phase = Phase::Stopped;
            s.running = false;
            s.last_stop_at = Some(now_rfc3339());
        });
        info!(reason = %reason, "supervisor stopped");
        self.done_tx.send_replace(Some(reason));
    }
}

/// Open the WebSocket, sending the account token verbatim as `Authorization`.
async fn open_socket(url: &str, auth_token: Option<&str>) -> Result<RelaySocket, BridgeError> {
    let mut request = url.into_client_request()?;
    if let Some(token) = auth_token {
        let value =
            HeaderValue::from_str(token).map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    let (socket, _response) = connect_async(request).await?;
    Ok(socket)
}
