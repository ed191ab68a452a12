//! Common re-exports for convenient entity usage.

pub use super::connection::{
    ActiveModel as ConnectionActiveModel, Column as ConnectionColumn, Entity as Connection,
    HandlerConfig, Model as ConnectionModel,
};
pub use super::sync_log::{
    ActiveModel as SyncLogActiveModel, Column as SyncLogColumn, Entity as SyncLog, LogKind,
    LogLevel, SyncLogEntry,
};
pub use super::sync_position::{
    ActiveModel as SyncPositionActiveModel, Column as SyncPositionColumn,
    Entity as SyncPositionEntity, PositionKind, PositionStatus, SyncPosition,
};
pub use super::sync_status::SyncStatus;
pub use super::synced_record::{
    ActiveModel as SyncedRecordActiveModel, Column as SyncedRecordColumn,
    Entity as SyncedRecord, Model as SyncedRecordModel, NormalizedRecord, stable_id,
};
