use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    sea_query::{Expr, OnConflict},
};

use crate::entity::connection::{ActiveModel, Column, Entity as Connection, Model};
use crate::entity::sync_status::SyncStatus;

use super::errors::{Result, StoreError};

/// Optional filters for [`find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub source: Option<String>,
    pub account_id: Option<String>,
}

impl ConnectionFilter {
    pub fn new(source: Option<&str>, account_id: Option<&str>) -> Self {
        Self {
            source: source.map(str::to_string),
            account_id: account_id.map(str::to_string),
        }
    }

    /// Whether a connection passes this filter.
    pub fn matches(&self, connection: &Model) -> bool {
        self.source.as_deref().is_none_or(|s| s == connection.source)
            && self
                .account_id
                .as_deref()
                .is_none_or(|a| a == connection.account_id)
    }
}

/// Find a connection by id.
pub async fn get<C: ConnectionTrait>(db: &C, id: &str) -> Result<Option<Model>> {
    Ok(Connection::find_by_id(id.to_string()).one(db).await?)
}

/// Find connections matching a filter, ordered by (source, account).
pub async fn find<C: ConnectionTrait>(db: &C, filter: &ConnectionFilter) -> Result<Vec<Model>> {
    let mut query = Connection::find();
    if let Some(source) = &filter.source {
        query = query.filter(Column::Source.eq(source.as_str()));
    }
    if let Some(account_id) = &filter.account_id {
        query = query.filter(Column::AccountId.eq(account_id.as_str()));
    }

    Ok(query
        .order_by_asc(Column::Source)
        .order_by_asc(Column::AccountId)
        .all(db)
        .await?)
}

/// Insert or replace a connection, keyed by id.
///
/// `created_at` is preserved for existing rows; `updated_at` is refreshed.
pub async fn save<C: ConnectionTrait>(db: &C, connection: Model) -> Result<Model> {
    let id = connection.id.clone();
    let now = Utc::now().fixed_offset();

    let model = ActiveModel {
        id: Set(connection.id),
        source: Set(connection.source),
        account_id: Set(connection.account_id),
        profile: Set(connection.profile),
        credentials: Set(connection.credentials),
        sync_status: Set(connection.sync_status),
        sync_frequency_secs: Set(connection.sync_frequency_secs),
        handlers: Set(connection.handlers),
        source_config: Set(connection.source_config),
        last_sync_at: Set(connection.last_sync_at),
        last_error: Set(connection.last_error),
        created_at: Set(connection.created_at),
        updated_at: Set(now),
    };

    Connection::insert(model)
        .on_conflict(
            OnConflict::column(Column::Id)
                .update_columns([
                    Column::Profile,
                    Column::Credentials,
                    Column::SyncStatus,
                    Column::SyncFrequencySecs,
                    Column::Handlers,
                    Column::SourceConfig,
                    Column::LastSyncAt,
                    Column::LastError,
                    Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;

    get(db, &id)
        .await?
        .ok_or_else(|| StoreError::connection_not_found(&id))
}

/// Delete a connection. Returns the number of rows deleted (0 or 1).
pub async fn delete<C: ConnectionTrait>(db: &C, id: &str) -> Result<u64> {
    let result = Connection::delete_by_id(id.to_string()).exec(db).await?;
    Ok(result.rows_affected)
}

/// Atomically claim a connection for a sync run.
///
/// Moves the status to `SyncActive` only if it is currently `Connected`
/// (or, with `force`, anything but `Paused`). Returns whether this caller
/// won the claim.
pub async fn try_begin_sync<C: ConnectionTrait>(db: &C, id: &str, force: bool) -> Result<bool> {
    let mut query = Connection::update_many()
        .col_expr(Column::SyncStatus, Expr::value(SyncStatus::SyncActive))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(Column::Id.eq(id));

    query = if force {
        query.filter(Column::SyncStatus.ne(SyncStatus::Paused))
    } else {
        query.filter(Column::SyncStatus.eq(SyncStatus::Connected))
    };

    let result = query.exec(db).await?;
    Ok(result.rows_affected == 1)
}

/// Record the outcome of a sync run on the connection row.
///
/// Only applies while the row is still `SyncActive`, so a pause issued
/// during the run is kept.
pub async fn finish_sync<C: ConnectionTrait>(
    db: &C,
    id: &str,
    status: SyncStatus,
    last_error: Option<String>,
    synced_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let mut query = Connection::update_many()
        .col_expr(Column::SyncStatus, Expr::value(status))
        .col_expr(Column::LastError, Expr::value(last_error))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(Column::Id.eq(id))
        .filter(Column::SyncStatus.eq(SyncStatus::SyncActive));

    if let Some(at) = synced_at {
        query = query.col_expr(Column::LastSyncAt, Expr::value(at.fixed_offset()));
    }

    query.exec(db).await?;
    Ok(())
}

/// Replace the stored credential material.
pub async fn update_credentials<C: ConnectionTrait>(
    db: &C,
    id: &str,
    credentials: serde_json::Value,
) -> Result<()> {
    let result = Connection::update_many()
        .col_expr(Column::Credentials, Expr::value(credentials))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
        .filter(Column::Id.eq(id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(StoreError::connection_not_found(id));
    }
    Ok(())
}
