//! Connection entity - one authenticated link to one account on one source.
//!
//! Connections are keyed by `"{source}:{account_id}"`, which makes the
//! (source, account) pair unique by construction.

use std::fmt;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sync_status::SyncStatus;

/// Connection model.
///
/// `Debug` is implemented by hand so credential material never reaches a log line.
#[derive(Clone, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// `"{source}:{account_id}"`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Source identifier (e.g. "mastodon", "gmail").
    pub source: String,
    /// Account identifier on the source.
    pub account_id: String,

    /// Display profile (name, avatar, identifiers).
    #[sea_orm(column_type = "Json")]
    pub profile: Json,

    /// Opaque credential material handed to the credential provider.
    #[sea_orm(column_type = "Json")]
    #[serde(skip_serializing)]
    pub credentials: Json,

    /// Current sync status.
    pub sync_status: SyncStatus,

    /// Minimum number of seconds between non-forced syncs. `None` syncs on every trigger.
    pub sync_frequency_secs: Option<i64>,

    /// Ordered handler configuration entries (see [`HandlerConfig`]).
    #[sea_orm(column_type = "Json")]
    pub handlers: Json,

    /// Free-form configuration for the source itself.
    #[sea_orm(column_type = "Json")]
    pub source_config: Json,

    /// When the last sync run finished without a connection-fatal error.
    pub last_sync_at: Option<DateTimeWithTimeZone>,

    /// User-readable reason for the current error state.
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// A connection has many sync positions.
    #[sea_orm(has_many = "super::sync_position::Entity")]
    SyncPositions,
}

impl Related<super::sync_position::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncPositions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("account_id", &self.account_id)
            .field("profile", &self.profile)
            .field("credentials", &"<redacted>")
            .field("sync_status", &self.sync_status)
            .field("sync_frequency_secs", &self.sync_frequency_secs)
            .field("handlers", &self.handlers)
            .field("source_config", &self.source_config)
            .field("last_sync_at", &self.last_sync_at)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// One entry of a connection's ordered handler list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Handler identifier within the source's handler registry.
    pub handler_id: String,
    /// Disabled handlers are skipped by the orchestrator.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Handler-specific configuration.
    #[serde(default)]
    pub config: Json,
}

fn default_enabled() -> bool {
    true
}

impl HandlerConfig {
    /// An enabled handler with empty configuration.
    pub fn enabled(handler_id: impl Into<String>) -> Self {
        Self {
            handler_id: handler_id.into(),
            enabled: true,
            config: Json::Null,
        }
    }

    /// Attach handler-specific configuration.
    #[must_use]
    pub fn with_config(mut self, config: Json) -> Self {
        self.config = config;
        self
    }
}

impl Model {
    /// Build the connection identifier for a (source, account) pair.
    pub fn make_id(source: &str, account_id: &str) -> String {
        format!("{}:{}", source, account_id)
    }

    /// Parse the stored handler list.
    ///
    /// Malformed entries are skipped with a warning rather than failing the whole connection.
    pub fn handler_configs(&self) -> Vec<HandlerConfig> {
        let Some(entries) = self.handlers.as_array() else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(connection_id = %self.id, error = %e, "Skipping malformed handler entry");
                    None
                }
            })
            .collect()
    }

    /// Handler entries that are enabled, in configuration order.
    pub fn enabled_handlers(&self) -> Vec<HandlerConfig> {
        self.handler_configs()
            .into_iter()
            .filter(|h| h.enabled)
            .collect()
    }

    /// Whether a non-forced sync should run now, per the frequency policy.
    pub fn is_due(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        match (self.sync_frequency_secs, self.last_sync_at) {
            (Some(secs), Some(last)) => {
                now.signed_duration_since(last) >= chrono::Duration::seconds(secs)
            }
            _ => true,
        }
    }
}

/// Serialize a handler list into its stored JSON form.
pub fn handlers_to_json(handlers: &[HandlerConfig]) -> Json {
    serde_json::to_value(handlers).unwrap_or_else(|_| Json::Array(Vec::new()))
}
