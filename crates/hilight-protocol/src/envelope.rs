use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions;
use crate::error::{MsgRejection, ProtocolError};

/// Context used for inbound messages that arrive without one.
pub const DEFAULT_CONTEXT: &str = "default";

/// Raw wire envelope.
/// Wire: `{ "context": "conv-1", "action": "reply", "payload": {...} }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub payload: T,
}

// ── Outbound payloads (bridge -> relay) ──────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub plugin_id: String,
    pub account_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: String,
}

/// Complete agent reply, sent once after generation finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyPayload {
    pub user_id: String,
    pub text: String,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub user_id: String,
    pub code: String,
    pub message: String,
}

/// Closed set of frames the bridge emits.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Connected(ConnectedPayload),
    Ping(PingPayload),
    Typing(TypingPayload),
    Reply(ReplyPayload),
    Error(ErrorPayload),
}

impl Outbound {
    pub fn connected(plugin_id: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self::Connected(ConnectedPayload {
            plugin_id: plugin_id.into(),
            account_id: account_id.into(),
        })
    }

    pub fn ping(ts: i64) -> Self {
        Self::Ping(PingPayload { ts })
    }

    pub fn typing(user_id: impl Into<String>) -> Self {
        Self::Typing(TypingPayload {
            user_id: user_id.into(),
        })
    }

    pub fn reply(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Reply(ReplyPayload {
            user_id: user_id.into(),
            text: text.into(),
            done: true,
        })
    }

    pub fn error(
        user_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Error(ErrorPayload {
            user_id: user_id.into(),
            code: code.into(),
            message: message.into(),
        })
    }

    pub fn action(&self) -> &'static str {
        match self {
            Outbound::Connected(_) => actions::CONNECTED,
            Outbound::Ping(_) => actions::PING,
            Outbound::Typing(_) => actions::TYPING,
            Outbound::Reply(_) => actions::REPLY,
            Outbound::Error(_) => actions::ERROR,
        }
    }
}

/// An outbound frame bound to its conversation context.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEnvelope {
    pub context: String,
    pub message: Outbound,
}

impl OutboundEnvelope {
    pub fn new(context: impl Into<String>, message: Outbound) -> Self {
        Self {
            context: context.into(),
            message,
        }
    }

    /// Connection/heartbeat frames carry an empty context.
    pub fn system(message: Outbound) -> Self {
        Self::new("", message)
    }

    pub fn action(&self) -> &'static str {
        self.message.action()
    }

    pub fn is_heartbeat(&self) -> bool {
        actions::is_heartbeat(self.action())
    }

    /// Serialize to the JSON text frame sent on the socket.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let context = self.context.as_str();
        let action = self.action();
        match &self.message {
            Outbound::Connected(p) => encode_with(context, action, p),
            Outbound::Ping(p) => encode_with(context, action, p),
            Outbound::Typing(p) => encode_with(context, action, p),
            Outbound::Reply(p) => encode_with(context, action, p),
            Outbound::Error(p) => encode_with(context, action, p),
        }
    }
}

fn encode_with<T: Serialize>(context: &str, action: &str, payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
        context: context.to_string(),
        action: action.to_string(),
        payload,
    })
}

// ── Inbound payloads (relay -> bridge) ───────────────────────────────

/// `msg` payload as received. Fields stay loosely typed so validation can
/// coerce numeric user ids and report precise rejections.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgPayload {
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub user_name: Option<Value>,
    #[serde(default)]
    pub text: Option<Value>,
}

/// A `msg` payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidMsg {
    pub user_id: String,
    /// Display name; falls back to `user_id` when absent or blank.
    pub sender_name: String,
    /// Original text (untrimmed), guaranteed non-blank.
    pub text: String,
}

impl MsgPayload {
    /// Coerce and validate the payload.
    ///
    /// `userId` may be a string or a number and must be non-empty after
    /// trimming; `text` must contain non-whitespace characters.
    pub fn validate(&self) -> Result<ValidMsg, MsgRejection> {
        let user_id = match &self.user_id {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => number_to_id(n),
            _ => String::new(),
        };
        if user_id.is_empty() {
            return Err(MsgRejection::MissingUserId);
        }

        let text = match &self.text {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };
        if text.trim().is_empty() {
            return Err(MsgRejection::EmptyText);
        }

        let sender_name = match &self.user_name {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => user_id.clone(),
        };

        Ok(ValidMsg {
            user_id,
            sender_name,
            text,
        })
    }
}

/// Render a numeric id the way the relay's JavaScript peers stringify it,
/// so `42` and `42.0` name the same user.
fn number_to_id(n: &serde_json::Number) -> String {
    if let Some(v) = n.as_u64() {
        return v.to_string();
    }
    if let Some(v) = n.as_i64() {
        return v.to_string();
    }
    match n.as_f64() {
        Some(f) if f == 0.0 => "0".to_string(),
        Some(f) if f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        Some(f) => f.to_string(),
        None => n.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PongPayload {
    #[serde(default)]
    pub ts: Option<i64>,
}

/// Closed set of frames the bridge understands, with a safe fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Msg(MsgPayload),
    Pong(PongPayload),
    /// Any other action; ignored by the bridge.
    Unknown { action: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    pub context: String,
    pub message: Inbound,
}

impl InboundEnvelope {
    /// Conversation context, trimmed, defaulting to `"default"` when blank.
    pub fn context_or_default(&self) -> String {
        let trimmed = self.context.trim();
        if trimmed.is_empty() {
            DEFAULT_CONTEXT.to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn is_pong(&self) -> bool {
        matches!(self.message, Inbound::Pong(_))
    }
}

/// Decode one inbound text frame.
///
/// `pong` frames are recognised by action alone; a malformed pong payload
/// still counts as a heartbeat reply.
pub fn decode(raw: &str) -> Result<InboundEnvelope, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(ProtocolError::InvalidJson)?;
    let Value::Object(mut map) = value else {
        return Err(ProtocolError::NotAnEnvelope);
    };

    let context = match map.remove("context") {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let action = match map.remove("action") {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    let payload = map.remove("payload").unwrap_or(Value::Null);

    let message = match action.as_str() {
        actions::MSG => {
            let payload = if payload.is_null() {
                MsgPayload::default()
            } else {
                serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload {
                    action: action.clone(),
                    source,
                })?
            };
            Inbound::Msg(payload)
        }
        actions::PONG => Inbound::Pong(serde_json::from_value(payload).unwrap_or_default()),
        _ => Inbound::Unknown { action },
    };

    Ok(InboundEnvelope { context, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(payload: Value) -> MsgPayload {
        serde_json::from_value(payload).unwrap()
    }

    #[test]
    fn numeric_user_id_is_coerced() {
        let valid = msg(json!({"userId": 42, "text": "ping"})).validate().unwrap();
        assert_eq!(valid.user_id, "42");
        assert_eq!(valid.sender_name, "42");
    }

    #[test]
    fn float_user_id_matches_integer() {
        let valid = msg(json!({"userId": 42.0, "text": "hi"})).validate().unwrap();
        assert_eq!(valid.user_id, "42");

        let valid = msg(json!({"userId": -7.0, "text": "hi"})).validate().unwrap();
        assert_eq!(valid.user_id, "-7");

        let valid = msg(json!({"userId": 1.5, "text": "hi"})).validate().unwrap();
        assert_eq!(valid.user_id, "1.5");
    }

    #[test]
    fn user_id_is_trimmed() {
        let valid = msg(json!({"userId": "  u-1 ", "text": "hi"})).validate().unwrap();
        assert_eq!(valid.user_id, "u-1");
    }

    #[test]
    fn blank_text_is_rejected() {
        let err = msg(json!({"userId": "u-1", "text": "   "})).validate().unwrap_err();
        assert_eq!(err, MsgRejection::EmptyText);
    }

    #[test]
    fn non_string_text_is_rejected() {
        let err = msg(json!({"userId": "u-1", "text": 12})).validate().unwrap_err();
        assert_eq!(err, MsgRejection::EmptyText);
    }

    #[test]
    fn missing_or_blank_user_id_is_rejected() {
        assert_eq!(
            msg(json!({"text": "hi"})).validate().unwrap_err(),
            MsgRejection::MissingUserId
        );
        assert_eq!(
            msg(json!({"userId": "  ", "text": "hi"})).validate().unwrap_err(),
            MsgRejection::MissingUserId
        );
        assert_eq!(
            msg(json!({"userId": true, "text": "hi"})).validate().unwrap_err(),
            MsgRejection::MissingUserId
        );
    }

    #[test]
    fn sender_name_prefers_trimmed_user_name() {
        let valid = msg(json!({"userId": "u-1", "userName": " Alice ", "text": "hi"}))
            .validate()
            .unwrap();
        assert_eq!(valid.sender_name, "Alice");

        let valid = msg(json!({"userId": "u-1", "userName": "  ", "text": "hi"}))
            .validate()
            .unwrap();
        assert_eq!(valid.sender_name, "u-1");
    }

    #[test]
    fn text_is_kept_verbatim() {
        let valid = msg(json!({"userId": "u", "text": "  spaced  "})).validate().unwrap();
        assert_eq!(valid.text, "  spaced  ");
    }

    #[test]
    fn context_defaults_when_blank() {
        let env = decode(r#"{"context":"  ","action":"pong","payload":{}}"#).unwrap();
        assert_eq!(env.context_or_default(), "default");
        let env = decode(r#"{"context":" conv-1 ","action":"pong","payload":{}}"#).unwrap();
        assert_eq!(env.context_or_default(), "conv-1");
    }

    #[test]
    fn malformed_pong_payload_still_counts() {
        let env = decode(r#"{"context":"","action":"pong","payload":"bogus"}"#).unwrap();
        assert!(env.is_pong());
    }

    #[test]
    fn non_object_msg_payload_is_an_error() {
        let err = decode(r#"{"context":"c","action":"msg","payload":[1,2]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    }

    #[test]
    fn non_object_frame_is_an_error() {
        assert!(matches!(decode("[1]").unwrap_err(), ProtocolError::NotAnEnvelope));
        assert!(matches!(decode("not json").unwrap_err(), ProtocolError::InvalidJson(_)));
    }
}
