// End-to-end supervisor behaviour against a local relay.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use hilight_bridge::{Collaborators, DefaultFinalizer, DefaultRouter, Phase, Supervisor};
use hilight_core::config::{AccountConfig, HilightConfig};
use hilight_core::resolve_account;
use hilight_engine::EchoEngine;
use hilight_sessions::SessionStore;

#[derive(Clone, Copy)]
enum Behavior {
    /// Answer pings, send one msg after `connected`.
    Chatty,
    /// Never answer pings.
    Silent,
    /// Close right after `connected` with the given code.
    CloseWith(u16, &'static str),
    /// Reject the upgrade with HTTP 401.
    Reject401,
}

#[derive(Debug)]
enum Event {
    Accepted { uri: String, auth: Option<String> },
    Frame(Value),
    Closed(Option<u16>),
}

async fn spawn_relay(behavior: Behavior) -> (u16, mpsc::UnboundedReceiver<Event>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move { serve(stream, behavior, tx).await });
        }
    });
    (port, rx)
}

async fn serve(stream: tokio::net::TcpStream, behavior: Behavior, tx: mpsc::UnboundedSender<Event>) {
    let seen = Arc::new(Mutex::new(None));
    let seen_cb = Arc::clone(&seen);
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let auth = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        *seen_cb.lock().unwrap() = Some((req.uri().to_string(), auth));
        if matches!(behavior, Behavior::Reject401) {
            let mut err = ErrorResponse::new(Some("unauthorized".into()));
            *err.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(err);
        }
        Ok(resp)
    };

    let accepted = tokio_tungstenite::accept_hdr_async(stream, callback).await;
    if let Some((uri, auth)) = seen.lock().unwrap().take() {
        let _ = tx.send(Event::Accepted { uri, auth });
    }
    let Ok(mut ws) = accepted else {
        return;
    };

    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            Message::Text(text) => {
                let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                let _ = tx.send(Event::Frame(frame.clone()));
                match (behavior, frame["action"].as_str()) {
                    (Behavior::Chatty, Some("connected")) => {
                        let msg = json!({
                            "context": "conv-1",
                            "action": "msg",
                            "payload": { "userId": "u-1", "userName": "Tester", "text": "hi there" }
                        });
                        let _ = ws.send(Message::Text(msg.to_string().into())).await;
                    }
                    (Behavior::Chatty, Some("ping")) => {
                        let pong = json!({ "context": "", "action": "pong", "payload": { "ts": frame["payload"]["ts"] } });
                        let _ = ws.send(Message::Text(pong.to_string().into())).await;
                    }
                    (Behavior::CloseWith(code, reason), Some("connected")) => {
                        let _ = ws
                            .close(Some(CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.to_string().into(),
                            }))
                            .await;
                    }
                    _ => {}
                }
            }
            Message::Close(frame) => {
                let _ = tx.send(Event::Closed(frame.map(|f| u16::from(f.code))));
                break;
            }
            _ => {}
        }
    }
}

fn supervisor(
    ws_url: String,
    heartbeat_ms: u64,
    parent: &CancellationToken,
    dir: &tempfile::TempDir,
) -> Supervisor {
    let mut cfg = HilightConfig::default();
    cfg.accounts.insert(
        "default".into(),
        AccountConfig {
            ws_url: Some(ws_url),
            auth_token: Some("Bearer secret".into()),
            reconnect_interval_ms: Some(1_000),
            heartbeat_interval_ms: Some(heartbeat_ms),
            ..Default::default()
        },
    );
    let template = dir.path().join("{agentId}.db");
    let collab = Collaborators {
        router: Arc::new(DefaultRouter::new("main")),
        finalizer: Arc::new(DefaultFinalizer),
        sessions: Arc::new(SessionStore::new(template.to_string_lossy().to_string())),
        engine: Arc::new(EchoEngine),
    };
    Supervisor::new(resolve_account(&cfg, None), collab, parent).unwrap()
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("relay event timed out")
        .expect("relay gone")
}

async fn next_frame(rx: &mut mpsc::UnboundedReceiver<Event>, action: &str) -> Value {
    loop {
        if let Event::Frame(frame) = next_event(rx).await {
            if frame["action"] == action {
                return frame;
            }
        }
    }
}

async fn next_accept(rx: &mut mpsc::UnboundedReceiver<Event>) -> (String, Option<String>) {
    loop {
        if let Event::Accepted { uri, auth } = next_event(rx).await {
            return (uri, auth);
        }
    }
}

#[tokio::test]
async fn connects_announces_and_replies() {
    let (port, mut rx) = spawn_relay(Behavior::Chatty).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws/{{UUIDD}}?v=1"), 30_000, &root, &dir).start();

    let (uri, auth) = next_accept(&mut rx).await;
    assert!(uri.starts_with("/ws/"), "{uri}");
    assert!(uri.ends_with("?v=1"), "{uri}");
    assert!(!uri.contains("{UUIDD}"));
    assert_eq!(auth.as_deref(), Some("Bearer secret"));

    let connected = next_frame(&mut rx, "connected").await;
    assert_eq!(connected["context"], "");
    assert_eq!(connected["payload"], json!({ "pluginId": "hi-light", "accountId": "default" }));

    let typing = next_frame(&mut rx, "typing").await;
    assert_eq!(typing["payload"]["userId"], "u-1");

    let reply = next_frame(&mut rx, "reply").await;
    assert_eq!(reply["context"], "conv-1");
    assert_eq!(reply["payload"]["text"], "hi there");
    assert_eq!(reply["payload"]["done"], true);

    assert_eq!(handle.snapshot().phase, Phase::Open);
    handle.stop("test finished");
    assert_eq!(handle.stopped().await, "test finished");
    assert!(!handle.snapshot().running);

    let store = SessionStore::new(dir.path().join("{agentId}.db").to_string_lossy().to_string());
    let path = store.store_path_for("main");
    let session = store.get(&path, "agent:main:hi-light:direct:u-1").unwrap().unwrap();
    assert_eq!(session.message_count, 1);
    assert_eq!(session.sender_name, "Tester");
}

#[tokio::test]
async fn appends_connection_id_without_placeholder() {
    let (port, mut rx) = spawn_relay(Behavior::Chatty).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/relay/"), 30_000, &root, &dir).start();

    let (uri, _) = next_accept(&mut rx).await;
    let id = uri.strip_prefix("/relay/").expect("id appended as path segment");
    assert_eq!(id.len(), 36);
    assert!(!id.contains('/'));

    handle.stop("done");
    handle.stopped().await;
}

#[tokio::test]
async fn auth_close_code_stops_without_reconnect() {
    let (port, mut rx) = spawn_relay(Behavior::CloseWith(4401, "bad token")).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws"), 30_000, &root, &dir).start();

    let reason = tokio::time::timeout(Duration::from_secs(5), handle.stopped())
        .await
        .unwrap();
    assert_eq!(reason, "auth failed (401), stop reconnecting");
    assert_eq!(handle.snapshot().phase, Phase::Stopped);

    // Past the 1s reconnect delay, no second connection arrives.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let mut accepts = 0;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, Event::Accepted { .. }) {
            accepts += 1;
        }
    }
    assert_eq!(accepts, 1);
}

#[tokio::test]
async fn http_401_upgrade_is_terminal() {
    let (port, _rx) = spawn_relay(Behavior::Reject401).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws"), 30_000, &root, &dir).start();

    let reason = tokio::time::timeout(Duration::from_secs(5), handle.stopped())
        .await
        .unwrap();
    assert_eq!(reason, "auth failed (401), stop reconnecting");
    assert!(handle.snapshot().last_error.is_some());
}

#[tokio::test]
async fn transient_close_reconnects() {
    let (port, mut rx) = spawn_relay(Behavior::CloseWith(1011, "server restart")).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws"), 30_000, &root, &dir).start();

    let (first, _) = next_accept(&mut rx).await;
    let (second, _) = next_accept(&mut rx).await;
    assert_ne!(first, second, "each attempt uses a fresh connection id");
    assert!(!handle.is_stopped());

    handle.stop("done");
    handle.stopped().await;
}

#[tokio::test]
async fn missed_pongs_force_close_and_reconnect() {
    let (port, mut rx) = spawn_relay(Behavior::Silent).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws"), 50, &root, &dir).start();

    next_accept(&mut rx).await;
    let mut pings = 0;
    let close_code = loop {
        match next_event(&mut rx).await {
            Event::Frame(f) if f["action"] == "ping" => pings += 1,
            Event::Closed(code) => break code,
            _ => {}
        }
    };
    assert_eq!(pings, 2);
    assert_eq!(close_code, Some(4000));

    next_accept(&mut rx).await;
    assert!(!handle.is_stopped());

    handle.stop("done");
    handle.stopped().await;
}

#[tokio::test]
async fn answered_pings_keep_connection_open() {
    let (port, mut rx) = spawn_relay(Behavior::Chatty).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws"), 50, &root, &dir).start();

    next_accept(&mut rx).await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    let mut pings = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            Event::Frame(f) if f["action"] == "ping" => pings += 1,
            Event::Closed(code) => panic!("unexpected close {code:?}"),
            Event::Accepted { .. } => panic!("unexpected reconnect"),
            _ => {}
        }
    }
    assert!(pings >= 3, "only {pings} pings");
    let snap = handle.snapshot();
    assert_eq!(snap.phase, Phase::Open);
    assert_eq!(snap.reconnect_attempts, 0);

    handle.stop("done");
    handle.stopped().await;
}

#[tokio::test]
async fn stop_is_idempotent_and_resolves_once() {
    let (port, mut rx) = spawn_relay(Behavior::Chatty).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws"), 30_000, &root, &dir).start();
    next_frame(&mut rx, "connected").await;

    let other = handle.clone();
    handle.stop("first");
    other.stop("second");
    handle.stop("third");

    assert_eq!(handle.stopped().await, "first");
    assert_eq!(other.stopped().await, "first");
    assert!(handle.is_stopped());
}

#[tokio::test]
async fn parent_cancellation_stops_supervisor() {
    let (port, mut rx) = spawn_relay(Behavior::Chatty).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws"), 30_000, &root, &dir).start();
    next_frame(&mut rx, "connected").await;

    root.cancel();
    assert_eq!(handle.stopped().await, "gateway shutdown");
}

#[tokio::test]
async fn already_cancelled_never_connects() {
    let (port, mut rx) = spawn_relay(Behavior::Chatty).await;
    let dir = tempfile::tempdir().unwrap();
    let root = CancellationToken::new();
    root.cancel();
    let handle = supervisor(format!("ws://127.0.0.1:{port}/ws"), 30_000, &root, &dir).start();

    assert_eq!(handle.stopped().await, "already aborted");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err());
}
