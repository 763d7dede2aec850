//! WebSocket connection loop.
//!
//! Reads subscription commands from the client and forwards matching
//! pipeline events from the event bus.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::PipelineEvent;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and answers each one.
/// - Forwards subscribed events from the [`broadcast::Receiver`].
pub async fn run_connection(socket: WebSocket, mut event_rx: broadcast::Receiver<PipelineEvent>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &mut subs);
                        if let Some(json) = encode(&reply)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !subs.matches(&event) {
                            continue;
                        }
                        let msg = WsMessage::server(
                            uuid::Uuid::new_v4().to_string(),
                            WsMessageType::Event,
                            serde_json::to_value(&event).unwrap_or_default(),
                        );
                        if let Some(json) = encode(&msg)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

fn encode(msg: &WsMessage) -> Option<String> {
    serde_json::to_string(msg).ok()
}

/// Applies one client message and returns the reply.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON");
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "only command messages are accepted");
    }
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command");
    };

    let payload = match command {
        WsCommand::Subscribe { event_types } => {
            let names: Vec<&str> = event_types.iter().map(String::as_str).collect();
            let unknown = subs.subscribe(&names);
            serde_json::json!({
                "subscribed": subs.event_types(),
                "wildcard": subs.is_subscribed_all(),
                "unknown": unknown,
            })
        }
        WsCommand::Unsubscribe { event_types } => {
            let names: Vec<&str> = event_types.iter().map(String::as_str).collect();
            subs.unsubscribe(&names);
            serde_json::json!({
                "subscribed": subs.event_types(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::ListSubscriptions => serde_json::json!({
            "subscribed": subs.event_types(),
            "wildcard": subs.is_subscribed_all(),
            "available": PipelineEvent::EVENT_TYPES,
        }),
    };
    WsMessage::server(msg.id, WsMessageType::Response, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(payload: &str) -> String {
        format!(
            r#"{{"id":"c1","type":"command","timestamp":"2025-01-01T00:00:00Z","payload":{payload}}}"#
        )
    }

    #[test]
    fn subscribe_reply_lists_types_and_unknowns() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message(
            &command(r#"{"command":"subscribe","event_types":["tokens_burned","nope"]}"#),
            &mut subs,
        );
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.id, "c1");
        assert_eq!(
            reply.payload.get("subscribed"),
            Some(&serde_json::json!(["tokens_burned"]))
        );
        assert_eq!(reply.payload.get("unknown"), Some(&serde_json::json!(["nope"])));
    }

    #[test]
    fn malformed_and_unknown_commands_are_errors() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message("{not json", &mut subs);
        assert_eq!(reply.msg_type, WsMessageType::Error);

        let reply = handle_text_message(&command(r#"{"command":"swap"}"#), &mut subs);
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(reply.payload.get("code"), Some(&serde_json::json!(404)));
    }
}
