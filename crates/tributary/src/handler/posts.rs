use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

use super::HandlerError;
use super::walk::{RecordMapper, strip_null_values, timestamp_field};

/// Social feed posts, newest first. Supports break by timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostsMapper;

impl PostsMapper {
    pub const ID: &'static str = "posts";
    pub const RECORD_TYPE: &'static str = "social.post";
}

impl RecordMapper for PostsMapper {
    fn handler_id(&self) -> &'static str {
        Self::ID
    }

    fn record_type(&self) -> &'static str {
        Self::RECORD_TYPE
    }

    fn resource(&self) -> &'static str {
        "posts"
    }

    fn supports_timestamp_break(&self) -> bool {
        true
    }

    fn occurred_at(&self, item: &Value) -> Option<DateTime<FixedOffset>> {
        timestamp_field(item, &["created_at", "published_at"])
    }

    fn payload(&self, native_id: &str, item: Value) -> Result<Value, HandlerError> {
        let Value::Object(mut raw) = item else {
            return Err(HandlerError::transform(Some(native_id), "post is not an object"));
        };

        let mut post = Map::new();
        post.insert("id".to_string(), Value::String(native_id.to_string()));
        for field in ["author", "url", "created_at", "in_reply_to_id", "visibility"] {
            if let Some(value) = raw.remove(field) {
                post.insert(field.to_string(), value);
            }
        }

        let text = raw
            .remove("content")
            .or_else(|| raw.remove("text"))
            .unwrap_or(Value::Null);
        post.insert("text".to_string(), text);

        if let Some(media) = raw.remove("media_attachments").or_else(|| raw.remove("media")) {
            post.insert("media".to_string(), media);
        }

        if !raw.is_empty() {
            post.insert("extra".to_string(), Value::Object(raw));
        }

        Ok(strip_null_values(Value::Object(post)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_normalizes_text_and_keeps_extras() {
        let payload = PostsMapper
            .payload(
                "42",
                json!({
                    "id": 42,
                    "content": "<p>hello</p>",
                    "author": {"handle": "@alice"},
                    "created_at": "2026-01-02T03:04:05Z",
                    "favourites_count": 3,
                    "spoiler_text": null,
                }),
            )
            .unwrap();

        assert_eq!(payload["id"], "42");
        assert_eq!(payload["text"], "<p>hello</p>");
        assert_eq!(payload["author"]["handle"], "@alice");
        assert_eq!(payload["extra"]["favourites_count"], 3);
        assert!(payload["extra"].get("spoiler_text").is_none());
    }

    #[test]
    fn payload_rejects_non_objects() {
        let err = PostsMapper.payload("1", json!("just a string")).unwrap_err();
        assert!(matches!(err, HandlerError::Transform { .. }));
    }

    #[test]
    fn occurred_at_reads_created_at() {
        let at = PostsMapper
            .occurred_at(&json!({"created_at": "2026-01-02T03:04:05+01:00"}))
            .unwrap();
        assert_eq!(at.to_rfc3339(), "2026-01-02T03:04:05+01:00");
        assert!(PostsMapper.occurred_at(&json!({})).is_none());
    }
}
