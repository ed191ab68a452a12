use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::OnConflict,
};
use uuid::Uuid;

use crate::entity::synced_record::{ActiveModel, Column, Entity as SyncedRecord, Model};

use super::errors::Result;

/// Outcome of a single idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyPresent,
}

/// Counts from applying one page of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub inserted: u64,
    pub already_present: u64,
}

impl ApplyStats {
    pub fn total(&self) -> u64 {
        self.inserted + self.already_present
    }
}

impl std::ops::AddAssign for ApplyStats {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.already_present += rhs.already_present;
    }
}

/// Optional filters for [`find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub connection_id: Option<String>,
    pub handler_id: Option<String>,
    pub record_type: Option<String>,
    pub limit: Option<u64>,
}

fn skip_existing() -> OnConflict {
    OnConflict::column(Column::Id).do_nothing().to_owned()
}

/// Insert a record unless one with the same id already exists.
pub async fn insert<C: ConnectionTrait>(db: &C, record: ActiveModel) -> Result<InsertOutcome> {
    let rows = SyncedRecord::insert(record)
        .on_conflict(skip_existing())
        .exec_without_returning(db)
        .await?;

    Ok(if rows == 0 {
        InsertOutcome::AlreadyPresent
    } else {
        InsertOutcome::Inserted
    })
}

/// Insert a page of records in one statement, skipping ids that already exist.
pub async fn insert_page<C: ConnectionTrait>(db: &C, records: Vec<ActiveModel>) -> Result<ApplyStats> {
    if records.is_empty() {
        return Ok(ApplyStats::default());
    }

    let total = records.len() as u64;
    let inserted = SyncedRecord::insert_many(records)
        .on_conflict(skip_existing())
        .exec_without_returning(db)
        .await?;

    Ok(ApplyStats {
        inserted,
        already_present: total.saturating_sub(inserted),
    })
}

/// Find records, newest first.
pub async fn find<C: ConnectionTrait>(db: &C, filter: &RecordFilter) -> Result<Vec<Model>> {
    let mut query = SyncedRecord::find();
    if let Some(connection_id) = &filter.connection_id {
        query = query.filter(Column::ConnectionId.eq(connection_id.as_str()));
    }
    if let Some(handler_id) = &filter.handler_id {
        query = query.filter(Column::HandlerId.eq(handler_id.as_str()));
    }
    if let Some(record_type) = &filter.record_type {
        query = query.filter(Column::RecordType.eq(record_type.as_str()));
    }

    Ok(query
        .order_by_desc(Column::InsertedAt)
        .order_by_asc(Column::NativeId)
        .limit(filter.limit)
        .all(db)
        .await?)
}

/// Delete one record by id.
pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64> {
    let result = SyncedRecord::delete_by_id(id).exec(db).await?;
    Ok(result.rows_affected)
}

/// Delete every record produced by a connection.
pub async fn delete_by_connection<C: ConnectionTrait>(db: &C, connection_id: &str) -> Result<u64> {
    let result = SyncedRecord::delete_many()
        .filter(Column::ConnectionId.eq(connection_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Count records produced by a connection.
pub async fn count_by_connection<C: ConnectionTrait>(db: &C, connection_id: &str) -> Result<u64> {
    use sea_orm::PaginatorTrait;

    Ok(SyncedRecord::find()
        .filter(Column::ConnectionId.eq(connection_id))
        .count(db)
        .await?)
}
