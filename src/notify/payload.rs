// src/notify/payload.rs
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::compose::ComposedMessage;

/// Where messages go: the endpoint URL and the id placed into each payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub push_url: String,
    pub id: String,
    /// Payload key for `id`, e.g. `group_id`.
    pub id_field: String,
}

impl Destination {
    pub fn new(
        push_url: impl Into<String>,
        id: impl Into<String>,
        id_field: impl Into<String>,
    ) -> Self {
        Self {
            push_url: push_url.into(),
            id: id.into(),
            id_field: id_field.into(),
        }
    }
}

/// One queued dispatch. Discarded after its single attempt.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub destination: Arc<Destination>,
    pub message: ComposedMessage,
}

impl DeliveryJob {
    pub fn new(destination: Arc<Destination>, message: ComposedMessage) -> Self {
        Self {
            destination,
            message,
        }
    }

    /// Keep-alive text message, unrelated to feed content.
    pub fn heartbeat(destination: Arc<Destination>, text: &str) -> Self {
        Self::new(destination, ComposedMessage::text(text))
    }

    pub fn payload(&self) -> Value {
        build_payload(&self.destination, &self.message)
    }
}

/// `{ <id_field>: id, "message": [ {type, data}, … ] }`
pub fn build_payload(dest: &Destination, msg: &ComposedMessage) -> Value {
    let mut body = Map::new();
    body.insert(dest.id_field.clone(), Value::String(dest.id.clone()));
    body.insert(
        "message".to_string(),
        serde_json::to_value(&msg.segments).unwrap_or_else(|_| Value::Array(Vec::new())),
    );
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_uses_configured_id_field() {
        let dest = Destination::new("http://x", "123", "group_id");
        let v = build_payload(&dest, &ComposedMessage::text("hello"));
        assert_eq!(
            v,
            json!({
                "group_id": "123",
                "message": [{"type": "text", "data": {"text": "hello"}}]
            })
        );
    }

    #[test]
    fn heartbeat_is_a_single_text_segment() {
        let dest = Arc::new(Destination::new("http://x", "9", "destination_id"));
        let job = DeliveryJob::heartbeat(dest, "Keep alive test");
        assert_eq!(job.payload()["destination_id"], "9");
        assert_eq!(job.payload()["message"][0]["data"]["text"], "Keep alive test");
    }
}
