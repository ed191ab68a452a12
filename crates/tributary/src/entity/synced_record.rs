//! SyncedRecord entity - normalized records written by the sync loop.
//!
//! The primary key is derived from `(connection, record_type, native_id)`.
//! Re-fetching a record through the same connection lands on the same row and
//! the insert becomes a no-op. Two record types, or two accounts on one
//! source, never share a row even when their native ids coincide.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Namespace for deterministic record ids.
pub const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_3c2a_9b4e_4f7a_8c21_5e0d_b7a4_1c93);

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "synced_records")]
pub struct Model {
    /// Deterministic id, see [`stable_id`].
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Connection that produced this record.
    pub connection_id: String,
    /// Handler that produced this record.
    pub handler_id: String,
    pub source: String,
    /// The record's id on the source.
    pub native_id: String,
    /// Record-type discriminator (e.g. "social.post").
    pub record_type: String,

    /// Source payload as fetched.
    #[sea_orm(column_type = "Json")]
    pub payload: Json,

    /// When the record happened on the source, if known.
    pub occurred_at: Option<DateTimeWithTimeZone>,
    pub inserted_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Deterministic record id for a native record fetched through a connection.
pub fn stable_id(connection_id: &str, record_type: &str, native_id: &str) -> Uuid {
    Uuid::new_v5(
        &RECORD_NAMESPACE,
        format!("{}\n{}\n{}", connection_id, record_type, native_id).as_bytes(),
    )
}

/// A record produced by a handler, before the sync loop stamps ownership on it.
///
/// It has no id yet: the id depends on the connection, which only the sync
/// loop knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub source: String,
    pub native_id: String,
    pub record_type: String,
    pub payload: Json,
    pub occurred_at: Option<chrono::DateTime<chrono::FixedOffset>>,
}

impl NormalizedRecord {
    pub fn new(
        source: &str,
        native_id: impl Into<String>,
        record_type: &str,
        payload: Json,
    ) -> Self {
        let native_id = native_id.into();
        Self {
            source: source.to_string(),
            native_id,
            record_type: record_type.to_string(),
            payload,
            occurred_at: None,
        }
    }

    #[must_use]
    pub fn with_occurred_at(mut self, at: Option<chrono::DateTime<chrono::FixedOffset>>) -> Self {
        self.occurred_at = at;
        self
    }

    /// The id this record gets when stored for `connection_id`.
    pub fn id_for(&self, connection_id: &str) -> Uuid {
        stable_id(connection_id, &self.record_type, &self.native_id)
    }

    /// Convert into an active model owned by `connection_id`/`handler_id`.
    pub fn into_active_model(
        self,
        connection_id: &str,
        handler_id: &str,
        inserted_at: DateTimeWithTimeZone,
    ) -> ActiveModel {
        use sea_orm::ActiveValue::Set;

        ActiveModel {
            id: Set(self.id_for(connection_id)),
            connection_id: Set(connection_id.to_string()),
            handler_id: Set(handler_id.to_string()),
            source: Set(self.source),
            native_id: Set(self.native_id),
            record_type: Set(self.record_type),
            payload: Set(self.payload),
            occurred_at: Set(self.occurred_at),
            inserted_at: Set(inserted_at),
        }
    }
}
