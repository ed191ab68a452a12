use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tokio::sync::broadcast;

use crate::entity::sync_log::{ActiveModel, Column, Entity as SyncLog, LogKind, LogLevel, SyncLogEntry};

use super::errors::Result;

/// Capacity of the live-tail channel. Slow subscribers miss older entries.
const BROADCAST_CAPACITY: usize = 256;

/// A log entry before it is assigned an id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogEntry {
    pub level: LogLevel,
    pub kind: Option<LogKind>,
    pub connection_id: String,
    pub source: String,
    pub account_id: String,
    pub handler_id: Option<String>,
    pub message: String,
}

/// Optional filters for [`LogSink::latest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub connection_id: Option<String>,
    pub handler_id: Option<String>,
    pub limit: u64,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self {
            connection_id: None,
            handler_id: None,
            limit: 50,
        }
    }
}

/// Append-only sync log with a broadcast feed for live tailing.
#[derive(Clone)]
pub struct LogSink {
    db: Arc<DatabaseConnection>,
    tx: broadcast::Sender<SyncLogEntry>,
}

impl LogSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { db, tx }
    }

    /// Persist an entry and publish it to live subscribers.
    pub async fn append(&self, entry: NewLogEntry) -> Result<SyncLogEntry> {
        let model = ActiveModel {
            level: Set(entry.level),
            kind: Set(entry.kind),
            connection_id: Set(entry.connection_id),
            source: Set(entry.source),
            account_id: Set(entry.account_id),
            handler_id: Set(entry.handler_id),
            message: Set(entry.message),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        let saved = model.insert(self.db.as_ref()).await?;

        // No subscribers is not an error.
        let _ = self.tx.send(saved.clone());
        Ok(saved)
    }

    /// Subscribe to entries appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncLogEntry> {
        self.tx.subscribe()
    }

    /// Newest entries first.
    pub async fn latest(&self, filter: &LogFilter) -> Result<Vec<SyncLogEntry>> {
        let mut query = SyncLog::find();
        if let Some(connection_id) = &filter.connection_id {
            query = query.filter(Column::ConnectionId.eq(connection_id.as_str()));
        }
        if let Some(handler_id) = &filter.handler_id {
            query = query.filter(Column::HandlerId.eq(handler_id.as_str()));
        }

        Ok(query
            .order_by_desc(Column::Id)
            .limit(filter.limit)
            .all(self.db.as_ref())
            .await?)
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}
