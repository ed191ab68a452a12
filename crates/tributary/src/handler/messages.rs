use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use super::HandlerError;
use super::walk::{RecordMapper, strip_null_values, timestamp_field};

/// Mailbox messages, newest first. Supports break by timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagesMapper;

impl MessagesMapper {
    pub const ID: &'static str = "messages";
    pub const RECORD_TYPE: &'static str = "inbox.message";
}

impl RecordMapper for MessagesMapper {
    fn handler_id(&self) -> &'static str {
        Self::ID
    }

    fn record_type(&self) -> &'static str {
        Self::RECORD_TYPE
    }

    fn resource(&self) -> &'static str {
        "messages"
    }

    fn supports_timestamp_break(&self) -> bool {
        true
    }

    fn occurred_at(&self, item: &Value) -> Option<DateTime<FixedOffset>> {
        timestamp_field(item, &["received_at", "date", "sent_at"])
    }

    fn payload(&self, native_id: &str, item: Value) -> Result<Value, HandlerError> {
        let Value::Object(mut raw) = item else {
            return Err(HandlerError::transform(Some(native_id), "message is not an object"));
        };

        let mut message = Map::new();
        message.insert("id".to_string(), Value::String(native_id.to_string()));
        for field in ["thread_id", "from", "to", "cc", "subject", "snippet", "labels"] {
            if let Some(value) = raw.remove(field) {
                message.insert(field.to_string(), value);
            }
        }
        if let Some(at) = self.occurred_at(&Value::Object(raw.clone())) {
            message.insert("received_at".to_string(), Value::String(at.to_rfc3339()));
        }
        if let Some(body) = raw.remove("body").or_else(|| raw.remove("text")) {
            message.insert("body".to_string(), body);
        }

        Ok(strip_null_values(Value::Object(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_keeps_envelope_fields() {
        let payload = MessagesMapper
            .payload(
                "m1",
                json!({
                    "id": "m1",
                    "from": "bob@example.com",
                    "subject": "Lunch?",
                    "date": "2026-03-01T12:00:00Z",
                    "text": "Noon works",
                    "cc": null,
                }),
            )
            .unwrap();

        assert_eq!(payload["from"], "bob@example.com");
        assert_eq!(payload["subject"], "Lunch?");
        assert_eq!(payload["body"], "Noon works");
        assert_eq!(payload["received_at"], "2026-03-01T12:00:00+00:00");
        assert!(payload.get("cc").is_none());
    }

    #[test]
    fn occurred_at_prefers_received_at() {
        let at = MessagesMapper
            .occurred_at(&json!({
                "received_at": "2026-03-02T00:00:00Z",
                "date": "2026-03-01T00:00:00Z",
            }))
            .unwrap();
        assert_eq!(at.to_rfc3339(), "2026-03-02T00:00:00+00:00");
    }
}
