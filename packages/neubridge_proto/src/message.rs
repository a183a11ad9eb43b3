//! JSON messages exchanged with a window process.
//!
//! Inbound (window → host, on the host's listening socket):
//! - announce: `{command: "announceSelf", NL_PORT, NL_TOKEN, name}`
//! - request:  `{id, method, data, token}`
//!
//! Outbound (host → window, on the socket the host opens to the window):
//! - request:  `{id, method, data, accessToken}`
//! - events ride on the `events.broadcast` method as `{event, data}`
//!
//! Responses use `{id, data, error?}` in both directions, where `data` may
//! wrap the value as `{returnValue}`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ProtoError;
use crate::token::{ChildToken, HostToken};

pub const ANNOUNCE_COMMAND: &str = "announceSelf";
pub const EVENTS_BROADCAST_METHOD: &str = "events.broadcast";

pub const REGISTER_PARENT_EVENT: &str = "buntralinoRegisterParent";
pub const EVAL_EVENT: &str = "buntralinoEval";
pub const NAVIGATE_EVENT: &str = "buntralinoNavigate";
pub const RELOAD_EVENT: &str = "buntralinoReload";

/// Inbound method a window uses to report the outcome of an eval.
pub const EVAL_RESULT_METHOD: &str = "buntralinoEvalResult";

pub const INVALID_TOKEN: &str = "Invalid token";

/// Parse one inbound frame. Any JSON value is accepted here; shape checks
/// happen per message kind.
pub fn parse_frame(text: &str) -> Result<Value, ProtoError> {
    Ok(serde_json::from_str(text)?)
}

pub fn is_announce(frame: &Value) -> bool {
    frame.get("command").and_then(Value::as_str) == Some(ANNOUNCE_COMMAND)
}

/// A validated `announceSelf` handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announce {
    pub port: u16,
    pub token: ChildToken,
    pub name: String,
}

impl Announce {
    /// Validate the announce fields. Absent, null, zero, and empty values all
    /// count as missing.
    pub fn from_value(frame: &Value) -> Result<Self, ProtoError> {
        let port = match frame.get("NL_PORT") {
            Some(Value::Number(n)) if n.as_u64() != Some(0) => n
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| ProtoError::InvalidAnnounceField(format!("NL_PORT {n}")))?,
            Some(Value::String(s)) if !s.is_empty() => s
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| ProtoError::InvalidAnnounceField(format!("NL_PORT {s:?}")))?,
            _ => return Err(ProtoError::MissingAnnounceField("NL_PORT")),
        };

        let token = match frame.get("NL_TOKEN").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => ChildToken::parse(s)?,
            _ => return Err(ProtoError::MissingAnnounceField("NL_TOKEN")),
        };

        let name = match frame.get("name").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => return Err(ProtoError::MissingAnnounceField("name")),
        };

        Ok(Self { port, token, name })
    }
}

/// A request a window sends to the host.
///
/// `method` and `token` stay raw JSON: a value of the wrong type is treated
/// as absent rather than failing the whole frame.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundRequest {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<Value>,
    #[serde(default, alias = "payload")]
    pub data: Value,
    #[serde(default)]
    pub token: Option<Value>,
}

impl InboundRequest {
    pub fn from_value(frame: Value) -> Result<Self, ProtoError> {
        serde_json::from_value(frame).map_err(ProtoError::InvalidFrame)
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_ref().and_then(Value::as_str)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().and_then(Value::as_str)
    }
}

/// The `token` of a raw frame, if it is a string.
pub fn frame_token(frame: &Value) -> Option<&str> {
    frame.get("token").and_then(Value::as_str)
}

/// A call the host makes into a window.
#[derive(Debug, Serialize)]
pub struct OutboundRequest<'a> {
    pub id: &'a str,
    pub method: &'a str,
    pub data: &'a Value,
    #[serde(rename = "accessToken")]
    pub access_token: &'a str,
}

/// A response as it comes back from a window.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl Response {
    /// The correlation id, if it is a string.
    pub fn id(&self) -> Option<&str> {
        self.id.as_ref().and_then(Value::as_str)
    }

    /// `Ok(returnValue)` (or the whole `data` when it carries none), or the
    /// error message when `error` is set.
    pub fn into_outcome(self) -> Result<Value, String> {
        if let Some(message) = self.error.as_ref().and_then(error_message) {
            return Err(message);
        }
        let data = self.data.unwrap_or(Value::Null);
        match data.get("returnValue") {
            Some(value) if !value.is_null() => Ok(value.clone()),
            _ => Ok(data),
        }
    }
}

/// Render a wire `error` value as a message. Falsy values mean no error.
fn error_message(error: &Value) -> Option<String> {
    match error {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            let message = map.get("message").and_then(Value::as_str);
            let code = map.get("code").and_then(Value::as_str);
            Some(match (code, message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (None, Some(message)) => message.to_string(),
                _ => error.to_string(),
            })
        }
        other => Some(other.to_string()),
    }
}

/// `{id, data: {returnValue}}`
pub fn result_reply(id: &Value, value: Value) -> Value {
    json!({ "id": id, "data": { "returnValue": value } })
}

/// `{id, error}`
pub fn error_reply(id: &Value, message: &str) -> Value {
    json!({ "id": id, "error": message })
}

/// `{error: "Invalid token"}`
pub fn invalid_token_reply() -> Value {
    json!({ "error": INVALID_TOKEN })
}

/// Payload of the `events.broadcast` method.
#[derive(Debug, Serialize)]
pub struct EventEnvelope<'a> {
    pub event: &'a str,
    pub data: &'a Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterParent {
    pub token: HostToken,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalDispatch {
    pub js: String,
    #[serde(rename = "requestId")]
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Navigate {
    pub url: String,
}

/// Data of an inbound `buntralinoEvalResult` request.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalResult {
    #[serde(rename = "requestId")]
    pub request_id: String,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<Value>,
}

impl EvalResult {
    pub fn into_outcome(self) -> Result<Value, String> {
        match self.error.as_ref().and_then(error_message) {
            Some(message) => Err(message),
            None => Ok(self.result),
        }
    }
}
