//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single operator connection,
//! applying subscription commands and forwarding filtered domain events.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{DomainEvent, ProviderId};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and applies them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(socket: WebSocket, mut event_rx: broadcast::Receiver<DomainEvent>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &mut subs);
                        if let Some(json) = encode(&reply)
                            && ws_tx.send(Message::text(json)).await.is_err() {
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
                        if !subs.matches(event.provider_id()) {
                            continue;
                        }
                        let Ok(payload) = serde_json::to_value(&event) else {
                            continue;
                        };
                        let msg = WsMessage::new(Uuid::new_v4().to_string(), WsMessageType::Event, payload);
                        if let Some(json) = encode(&msg)
                            && ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "operator feed lagged behind event bus");
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

/// Applies one client message and builds the reply.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON");
    };
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command");
    };

    match command {
        WsCommand::Subscribe { provider_ids } => {
            let (ids, wildcard) = parse_targets(&provider_ids);
            subs.subscribe(&ids, wildcard);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                }),
            )
        }
        WsCommand::Unsubscribe { provider_ids } => {
            let (ids, wildcard) = parse_targets(&provider_ids);
            subs.unsubscribe(&ids, wildcard);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "unsubscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "remaining_count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                }),
            )
        }
    }
}

/// Splits targets into provider ids and the wildcard flag; junk is skipped.
fn parse_targets(raw: &[String]) -> (Vec<ProviderId>, bool) {
    let mut ids = Vec::new();
    let mut wildcard = false;
    for target in raw {
        if target == "*" {
            wildcard = true;
        } else if let Ok(uuid) = target.parse::<Uuid>() {
            ids.push(ProviderId::from_uuid(uuid));
        }
    }
    (ids, wildcard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_command_updates_filter() {
        let mut subs = SubscriptionManager::new();
        let provider = ProviderId::new();
        let text = format!(
            r#"{{"id":"a","type":"command","payload":{{"command":"subscribe","provider_ids":["{provider}","junk"]}}}}"#
        );
        let reply = handle_text_message(&text, &mut subs);
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.id, "a");
        assert!(subs.matches(Some(provider)));
        assert_eq!(subs.count(), 1);
    }

    #[test]
    fn garbage_gets_an_error_reply() {
        let mut subs = SubscriptionManager::new();
        assert_eq!(
            handle_text_message("{", &mut subs).msg_type,
            WsMessageType::Error
        );
        let unknown = r#"{"id":"b","type":"command","payload":{"command":"pause"}}"#;
        let reply = handle_text_message(unknown, &mut subs);
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(reply.id, "b");
    }

    #[test]
    fn wildcard_target_is_recognised() {
        let (ids, wildcard) = parse_targets(&["*".to_string()]);
        assert!(ids.is_empty());
        assert!(wildcard);
    }
}
