//! Local relay for manual testing.
//!
//! Sends a test `msg` as soon as a bridge announces itself, answers every
//! `ping` with a `pong` and logs what the bridge sends back.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
    Router,
};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use hilight_protocol::actions;

#[derive(Debug, Parser)]
#[command(name = "relay-test-server", version)]
struct Args {
    #[arg(long, default_value_t = 9100)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_test_server=info,tower_http=debug".into()),
        )
        .init();

    // Any path upgrades, so the per-attempt connection id can be appended.
    let router = Router::new()
        .fallback(ws_handler)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("relay test server listening on ws://127.0.0.1:{}", args.port);
    axum::serve(listener, router).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, headers: HeaderMap) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("(none)")
        .to_string();
    ws.on_upgrade(move |socket| run_connection(socket, auth))
}

async fn run_connection(socket: WebSocket, auth: String) {
    info!(auth = %auth, "client connected");
    let (mut tx, mut rx) = socket.split();

    while let Some(msg) = rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                info!(code = ?frame.map(|f| f.code), "client disconnected");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "socket error");
                return;
            }
        };

        let Some(reply) = respond(text.as_str()) else {
            continue;
        };
        if tx.send(Message::Text(reply.to_string().into())).await.is_err() {
            break;
        }
    }
    info!("client disconnected");
}

/// Log one frame from the bridge and build the relay's answer, if any.
fn respond(raw: &str) -> Option<Value> {
    let Ok(envelope) = serde_json::from_str::<Value>(raw) else {
        info!(raw, "non-JSON frame");
        return None;
    };
    let context = envelope["context"].as_str().unwrap_or_default();
    let payload = &envelope["payload"];

    match envelope["action"].as_str().unwrap_or_default() {
        actions::CONNECTED => {
            info!(plugin_id = %payload["pluginId"], account_id = %payload["accountId"], "plugin connected");
            Some(json!({
                "context": "test-conv-001",
                "action": actions::MSG,
                "payload": {
                    "userId": "test-user-001",
                    "userName": "Test User",
                    "text": "Which model are you?"
                }
            }))
        }
        actions::PING => {
            info!(ts = %payload["ts"], "ping");
            Some(json!({ "context": "", "action": actions::PONG, "payload": { "ts": payload["ts"] } }))
        }
        actions::TYPING => {
            info!(user_id = %payload["userId"], "agent is typing");
            None
        }
        actions::REPLY => {
            info!(context, text = %payload["text"], "agent reply");
            None
        }
        actions::ERROR => {
            error!(code = %payload["code"], message = %payload["message"], "agent error");
            None
        }
        other => {
            info!(action = other, raw, "unknown action");
            None
        }
    }
}
