//! Data-type handlers.
//!
//! A handler owns one logical record type of one source. Each call to
//! [`DataHandler::fetch_page`] requests a single page, converts the raw items
//! into [`NormalizedRecord`]s and returns the advanced position. Handlers keep
//! no state between calls other than their settings.

mod contacts;
mod messages;
mod posts;
mod registry;
mod walk;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::entity::sync_position::SyncPosition;
use crate::entity::synced_record::NormalizedRecord;
use crate::source::{SourceClient, SourceError};

pub use contacts::ContactsMapper;
pub use messages::MessagesMapper;
pub use posts::PostsMapper;
pub use registry::{HandlerFactory, HandlerRegistry};
pub use walk::{
    PagedHandler, RecordMapper, native_id_field, strip_null_values, timestamp_field, walk_page,
};

/// Page size used when neither the handler config nor the sync options set one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Errors a handler reports back to the sync loop.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Authentication failed. Fatal for the whole connection.
    #[error("Credentials expired or revoked")]
    CredentialExpired,

    /// The source is throttling us. Local to this handler.
    #[error("Rate limit exceeded")]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    /// A raw item could not be converted.
    #[error("Failed to transform item {}: {message}", .native_id.as_deref().unwrap_or("<unknown>"))]
    Transform {
        native_id: Option<String>,
        message: String,
    },

    /// The handler's configuration entry is unusable.
    #[error("Invalid handler configuration: {message}")]
    InvalidConfig { message: String },

    /// Any other source failure, unmodified.
    #[error(transparent)]
    Source(SourceError),
}

impl HandlerError {
    pub fn transform(native_id: Option<&str>, message: impl Into<String>) -> Self {
        Self::Transform {
            native_id: native_id.map(str::to_string),
            message: message.into(),
        }
    }
}

impl From<SourceError> for HandlerError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::CredentialExpired => Self::CredentialExpired,
            SourceError::RateLimited { reset_at } => Self::RateLimited { reset_at },
            other => Self::Source(other),
        }
    }
}

/// The result of one [`DataHandler::fetch_page`] call.
#[derive(Debug, Clone)]
pub struct HandlerPage {
    pub records: Vec<NormalizedRecord>,
    /// The position to persist once `records` are applied.
    pub position: SyncPosition,
}

/// One record type of one source.
#[async_trait]
pub trait DataHandler: Send + Sync {
    /// Handler identifier, unique within its source.
    fn id(&self) -> &str;

    /// Fetch one page starting at `position` and return the records plus the next position.
    async fn fetch_page(
        &self,
        api: &dyn SourceClient,
        position: SyncPosition,
    ) -> Result<HandlerPage, HandlerError>;
}

/// Per-connection handler settings, parsed from the handler's config JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSettings {
    pub page_size: u32,
    /// Stop walking at items older than this many days (break by timestamp).
    pub max_age_days: Option<i64>,
    /// Override of the handler's default resource path.
    pub resource: Option<String>,
    /// Extra query parameters sent with every page request.
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawSettings {
    page_size: Option<u32>,
    max_age_days: Option<i64>,
    resource: Option<String>,
    params: BTreeMap<String, String>,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_age_days: None,
            resource: None,
            params: BTreeMap::new(),
        }
    }
}

impl HandlerSettings {
    /// Parse a handler config entry. `null` yields the defaults.
    pub fn from_config(config: &Value, default_page_size: u32) -> Result<Self, HandlerError> {
        let raw: RawSettings = if config.is_null() {
            RawSettings::default()
        } else {
            serde_json::from_value(config.clone()).map_err(|e| HandlerError::InvalidConfig {
                message: e.to_string(),
            })?
        };

        let page_size = raw.page_size.unwrap_or(default_page_size);
        if page_size == 0 {
            return Err(HandlerError::InvalidConfig {
                message: "page_size must be greater than zero".to_string(),
            });
        }
        if let Some(days) = raw.max_age_days
            && days < 0
        {
            return Err(HandlerError::InvalidConfig {
                message: "max_age_days must not be negative".to_string(),
            });
        }

        Ok(Self {
            page_size,
            max_age_days: raw.max_age_days,
            resource: raw.resource,
            params: raw.params,
        })
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_max_age_days(mut self, days: Option<i64>) -> Self {
        self.max_age_days = days;
        self
    }

    /// Oldest timestamp still worth ingesting.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_age_days.map(|days| now - Duration::days(days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_source_error_maps_auth_and_throttling() {
        assert!(matches!(
            HandlerError::from(SourceError::CredentialExpired),
            HandlerError::CredentialExpired
        ));
        assert!(matches!(
            HandlerError::from(SourceError::RateLimited { reset_at: None }),
            HandlerError::RateLimited { reset_at: None }
        ));
        match HandlerError::from(SourceError::api(500, "boom")) {
            HandlerError::Source(SourceError::Api { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_transform_error_message() {
        let err = HandlerError::transform(Some("42"), "missing field");
        assert_eq!(err.to_string(), "Failed to transform item 42: missing field");
        let err = HandlerError::transform(None, "not an object");
        assert!(err.to_string().contains("<unknown>"));
    }

    #[test]
    fn test_settings_defaults_from_null() {
        let settings = HandlerSettings::from_config(&Value::Null, 25).unwrap();
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.max_age_days, None);
        assert!(settings.params.is_empty());
    }

    #[test]
    fn test_settings_parse_all_fields() {
        let settings = HandlerSettings::from_config(
            &json!({
                "page_size": 10,
                "max_age_days": 30,
                "resource": "timelines/home",
                "params": {"exclude_replies": "true"}
            }),
            50,
        )
        .unwrap();
        assert_eq!(settings.page_size, 10);
        assert_eq!(settings.max_age_days, Some(30));
        assert_eq!(settings.resource.as_deref(), Some("timelines/home"));
        assert_eq!(settings.params["exclude_replies"], "true");
    }

    #[test]
    fn test_settings_reject_invalid_values() {
        assert!(matches!(
            HandlerSettings::from_config(&json!({"page_size": 0}), 50),
            Err(HandlerError::InvalidConfig { .. })
        ));
        assert!(matches!(
            HandlerSettings::from_config(&json!({"max_age_days": -1}), 50),
            Err(HandlerError::InvalidConfig { .. })
        ));
        assert!(matches!(
            HandlerSettings::from_config(&json!({"pagesize": 10}), 50),
            Err(HandlerError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_settings_cutoff() {
        let now = Utc::now();
        let settings = HandlerSettings::default().with_max_age_days(Some(7));
        assert_eq!(settings.cutoff(now), Some(now - Duration::days(7)));
        assert_eq!(HandlerSettings::default().cutoff(now), None);
    }
}
