//! WebSocket message types: envelope and commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Server-side message stamped now.
    #[must_use]
    pub fn server(id: String, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Error reply carrying `code` and `message`.
    #[must_use]
    pub fn error(id: String, code: u16, message: &str) -> Self {
        Self::server(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client pipeline event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands a client can send in a `command` message payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Receive events of the given types. `["*"]` subscribes to all.
    Subscribe {
        /// Event type labels, e.g. `tokens_burned`.
        event_types: Vec<String>,
    },
    /// Stop receiving events of the given types.
    Unsubscribe {
        /// Event type labels; `"*"` clears everything.
        event_types: Vec<String>,
    },
    /// List current subscriptions.
    ListSubscriptions,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn command_parses_from_payload() {
        let raw = r#"{"id":"1","type":"command","timestamp":"2025-01-01T00:00:00Z",
            "payload":{"command":"subscribe","event_types":["tokens_burned"]}}"#;
        let Ok(msg) = serde_json::from_str::<WsMessage>(raw) else {
            panic!("envelope did not parse");
        };
        assert_eq!(msg.msg_type, WsMessageType::Command);
        let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
            panic!("command did not parse");
        };
        assert_eq!(
            command,
            WsCommand::Subscribe {
                event_types: vec!["tokens_burned".to_string()]
            }
        );
    }

    #[test]
    fn error_envelope_shape() {
        let Ok(json) = serde_json::to_value(WsMessage::error("7".into(), 400, "malformed JSON"))
        else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("type"), Some(&serde_json::json!("error")));
        assert_eq!(
            json.pointer("/payload/code"),
            Some(&serde_json::json!(400))
        );
    }
}
