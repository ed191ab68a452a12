use chrono::{DateTime, FixedOffset};
use serde_json::{Value, json};

use super::HandlerError;
use super::walk::{RecordMapper, strip_null_values, timestamp_field};

/// Address book entries. Contacts are never cut off by age.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactsMapper;

impl ContactsMapper {
    pub const ID: &'static str = "contacts";
    pub const RECORD_TYPE: &'static str = "social.contact";
}

impl RecordMapper for ContactsMapper {
    fn handler_id(&self) -> &'static str {
        Self::ID
    }

    fn record_type(&self) -> &'static str {
        Self::RECORD_TYPE
    }

    fn resource(&self) -> &'static str {
        "contacts"
    }

    fn occurred_at(&self, item: &Value) -> Option<DateTime<FixedOffset>> {
        timestamp_field(item, &["updated_at", "created_at"])
    }

    fn payload(&self, native_id: &str, item: Value) -> Result<Value, HandlerError> {
        let name = ["display_name", "name", "username"]
            .iter()
            .find_map(|field| item.get(*field).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| HandlerError::transform(Some(native_id), "contact has no name"))?;

        Ok(strip_null_values(json!({
            "id": native_id,
            "name": name,
            "handle": item.get("username").or_else(|| item.get("acct")),
            "emails": item.get("emails"),
            "phones": item.get("phones"),
            "avatar": item.get("avatar"),
        })))
    }
}
