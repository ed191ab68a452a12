//! SyncPosition entity - the durable cursor for one handler of one connection.
//!
//! There are exactly two positions per (connection, handler): one
//! [`PositionKind::Forward`] position that walks from the newest records down
//! to the previous run's break id, and one [`PositionKind::Backfill`] position
//! that walks historical pages until the source runs out.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Which direction a position walks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum PositionKind {
    /// New data since the last completed run.
    #[sea_orm(string_value = "forward")]
    Forward,
    /// Older historical data not yet ingested.
    #[sea_orm(string_value = "backfill")]
    Backfill,
}

impl std::fmt::Display for PositionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionKind::Forward => write!(f, "forward"),
            PositionKind::Backfill => write!(f, "backfill"),
        }
    }
}

impl std::str::FromStr for PositionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forward" => Ok(PositionKind::Forward),
            "backfill" => Ok(PositionKind::Backfill),
            _ => Err(format!("Unknown position kind: {}", s)),
        }
    }
}

/// Whether a position still has work to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "stopped")]
    Stopped,
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionStatus::Active => write!(f, "active"),
            PositionStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// SyncPosition model.
///
/// Invariant: a `Stopped` position never carries `this_ref`. An `Active`
/// position without `this_ref` starts from the first page.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_positions")]
pub struct Model {
    /// `"{connection_id}:{handler_id}:{kind}"`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning connection.
    pub connection_id: String,
    /// Handler this position belongs to.
    pub handler_id: String,
    pub kind: PositionKind,
    pub status: PositionStatus,

    /// Opaque page cursor for the next fetch.
    #[sea_orm(column_type = "Text", nullable)]
    pub this_ref: Option<String>,
    /// Native id where the walk stops (the newest id of the last completed run).
    #[sea_orm(column_type = "Text", nullable)]
    pub break_id: Option<String>,
    /// Native id that becomes `break_id` once the current run completes.
    #[sea_orm(column_type = "Text", nullable)]
    pub future_break_id: Option<String>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::connection::Entity",
        from = "Column::ConnectionId",
        to = "super::connection::Column::Id"
    )]
    Connection,
}

impl Related<super::connection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Connection.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Alias used throughout the sync engine.
pub type SyncPosition = Model;

impl Model {
    /// Build the position identifier.
    pub fn make_id(connection_id: &str, handler_id: &str, kind: PositionKind) -> String {
        format!("{}:{}:{}", connection_id, handler_id, kind)
    }

    /// A fresh position: active, no cursors. Not persisted until a page succeeds.
    pub fn new(connection_id: &str, handler_id: &str, kind: PositionKind) -> Self {
        Self {
            id: Self::make_id(connection_id, handler_id, kind),
            connection_id: connection_id.to_string(),
            handler_id: handler_id.to_string(),
            kind,
            status: PositionStatus::Active,
            this_ref: None,
            break_id: None,
            future_break_id: None,
            updated_at: chrono::Utc::now().fixed_offset(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Whether this position is active and mid-walk.
    pub fn has_cursor(&self) -> bool {
        self.is_active() && self.this_ref.is_some()
    }

    /// Whether this position has never fetched a page.
    pub fn is_untouched(&self) -> bool {
        self.is_active()
            && self.this_ref.is_none()
            && self.break_id.is_none()
            && self.future_break_id.is_none()
    }

    /// Re-activate a stopped position so the next walk starts from the top.
    ///
    /// An active position is left alone so an interrupted walk resumes.
    pub fn rearm(&mut self) {
        if self.status == PositionStatus::Stopped {
            self.status = PositionStatus::Active;
            self.this_ref = None;
        }
    }

    /// Record the first native id seen in this run.
    ///
    /// The current break id is never captured: the future break id is either
    /// unset or newer than the break id.
    pub fn note_first_item(&mut self, native_id: &str) {
        if self.future_break_id.is_none() && self.break_id.as_deref() != Some(native_id) {
            self.future_break_id = Some(native_id.to_string());
        }
    }

    /// Continue the walk at `next_ref`.
    pub fn advance(&mut self, next_ref: String) {
        self.status = PositionStatus::Active;
        self.this_ref = Some(next_ref);
    }

    /// Complete the run: stop, drop the cursor, graduate the future break id.
    ///
    /// A run that saw no items keeps the previous break id.
    pub fn finalize(&mut self) {
        self.status = PositionStatus::Stopped;
        self.this_ref = None;
        if let Some(future) = self.future_break_id.take() {
            self.break_id = Some(future);
        }
    }

    /// Stop without touching break ids (the source has nothing left).
    pub fn exhaust(&mut self) {
        self.status = PositionStatus::Stopped;
        self.this_ref = None;
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().fixed_offset();
    }
}
