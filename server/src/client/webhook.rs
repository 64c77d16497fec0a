//! Gateway webhook payloads
//!
//! Inbound messages are pushed by the gateway rather than polled. Only
//! `messages.upsert` deliveries carrying text from someone else are turned
//! into events; everything else is acknowledged and dropped.

use serde_json::Value;

use super::types::ClientEvent;

/// Event name used for inbound messages (`MESSAGES_UPSERT` in some setups)
const MESSAGES_UPSERT: &str = "messages.upsert";

pub fn event_name(payload: &Value) -> String {
    payload["event"]
        .as_str()
        .unwrap_or_default()
        .to_ascii_lowercase()
        .replace('_', ".")
}

/// Instance the delivery belongs to, when the gateway says
pub fn instance_name(payload: &Value) -> Option<&str> {
    payload["instance"].as_str()
}

/// Extract `MessageReceived` events from a webhook delivery
pub fn inbound_messages(payload: &Value) -> Vec<ClientEvent> {
    if event_name(payload) != MESSAGES_UPSERT {
        return Vec::new();
    }

    let data = &payload["data"];
    let messages: Vec<&Value> = match data.as_array() {
        Some(items) => items.iter().collect(),
        None => vec![data],
    };

    messages
        .into_iter()
        .filter_map(|msg| {
            let key = &msg["key"];
            if key["fromMe"].as_bool().unwrap_or(false) {
                return None;
            }
            let text = msg["message"]["conversation"]
                .as_str()
                .or_else(|| msg["message"]["extendedTextMessage"]["text"].as_str())
                .filter(|t| !t.is_empty())?;
            let from = key["remoteJid"].as_str().filter(|j| !j.is_empty())?;
            Some(ClientEvent::MessageReceived {
                from: from.to_string(),
                text: text.to_string(),
            })
        })
        .collect()
}
