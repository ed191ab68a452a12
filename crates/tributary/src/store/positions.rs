use chrono::Utc;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait, sea_query::OnConflict,
};

use crate::entity::sync_position::{
    ActiveModel, Column, Entity as SyncPositionEntity, PositionKind, SyncPosition,
};

use super::errors::Result;

/// Find a position by id.
pub async fn get<C: ConnectionTrait>(db: &C, id: &str) -> Result<Option<SyncPosition>> {
    Ok(SyncPositionEntity::find_by_id(id.to_string()).one(db).await?)
}

/// Load the position for a tuple, or a fresh one if none has been saved yet.
///
/// A fresh position is not written to the store.
pub async fn load_or_default<C: ConnectionTrait>(
    db: &C,
    connection_id: &str,
    handler_id: &str,
    kind: PositionKind,
) -> Result<SyncPosition> {
    let id = SyncPosition::make_id(connection_id, handler_id, kind);
    Ok(get(db, &id)
        .await?
        .unwrap_or_else(|| SyncPosition::new(connection_id, handler_id, kind)))
}

fn to_active_model(position: &SyncPosition) -> ActiveModel {
    ActiveModel {
        id: Set(position.id.clone()),
        connection_id: Set(position.connection_id.clone()),
        handler_id: Set(position.handler_id.clone()),
        kind: Set(position.kind),
        status: Set(position.status),
        this_ref: Set(position.this_ref.clone()),
        break_id: Set(position.break_id.clone()),
        future_break_id: Set(position.future_break_id.clone()),
        updated_at: Set(Utc::now().fixed_offset()),
    }
}

fn upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::Id)
        .update_columns([
            Column::Status,
            Column::ThisRef,
            Column::BreakId,
            Column::FutureBreakId,
            Column::UpdatedAt,
        ])
        .to_owned()
}

/// Upsert a position by id.
pub async fn save<C: ConnectionTrait>(db: &C, position: &SyncPosition) -> Result<()> {
    SyncPositionEntity::insert(to_active_model(position))
        .on_conflict(upsert_on_conflict())
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Upsert several positions in one transaction.
pub async fn save_all(db: &DatabaseConnection, positions: &[&SyncPosition]) -> Result<()> {
    let txn = db.begin().await?;
    for position in positions {
        save(&txn, position).await?;
    }
    txn.commit().await?;
    Ok(())
}

/// All positions of a connection, ordered by (handler, kind).
pub async fn find_by_connection<C: ConnectionTrait>(
    db: &C,
    connection_id: &str,
) -> Result<Vec<SyncPosition>> {
    Ok(SyncPositionEntity::find()
        .filter(Column::ConnectionId.eq(connection_id))
        .order_by_asc(Column::HandlerId)
        .order_by_asc(Column::Kind)
        .all(db)
        .await?)
}

/// Delete every position of a connection.
pub async fn delete_by_connection<C: ConnectionTrait>(db: &C, connection_id: &str) -> Result<u64> {
    let result = SyncPositionEntity::delete_many()
        .filter(Column::ConnectionId.eq(connection_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

#[cfg(test)]
pub(crate) fn build_upsert_sql(position: &SyncPosition) -> String {
    use sea_orm::QueryTrait;

    SyncPositionEntity::insert(to_active_model(position))
        .on_conflict(upsert_on_conflict())
        .build(sea_orm::DatabaseBackend::Sqlite)
        .to_string()
}
