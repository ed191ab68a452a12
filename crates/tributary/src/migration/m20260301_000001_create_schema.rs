//! Initial migration to create the per-user sync schema.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_connections(manager).await?;
        self.create_sync_positions(manager).await?;
        self.create_synced_records(manager).await?;
        self.create_sync_logs(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncLogs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncedRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SyncPositions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Connections::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_connections(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connections::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Connections::Source).string().not_null())
                    .col(ColumnDef::new(Connections::AccountId).string().not_null())
                    .col(
                        ColumnDef::new(Connections::Profile)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(Connections::Credentials)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(Connections::SyncStatus)
                            .string()
                            .not_null()
                            .default("connected"),
                    )
                    .col(
                        ColumnDef::new(Connections::SyncFrequencySecs)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connections::Handlers)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    .col(
                        ColumnDef::new(Connections::SourceConfig)
                            .json()
                            .not_null()
                            .default(Expr::cust("'{}'")),
                    )
                    .col(
                        ColumnDef::new(Connections::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Connections::LastError).text().null())
                    .col(
                        ColumnDef::new(Connections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One connection per (source, account)
        manager
            .create_index(
                Index::create()
                    .name("idx_connections_source_account")
                    .table(Connections::Table)
                    .col(Connections::Source)
                    .col(Connections::AccountId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_positions(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncPositions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncPositions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SyncPositions::ConnectionId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncPositions::HandlerId).string().not_null())
                    .col(ColumnDef::new(SyncPositions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(SyncPositions::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(SyncPositions::ThisRef).text().null())
                    .col(ColumnDef::new(SyncPositions::BreakId).text().null())
                    .col(ColumnDef::new(SyncPositions::FutureBreakId).text().null())
                    .col(
                        ColumnDef::new(SyncPositions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_positions_tuple")
                    .table(SyncPositions::Table)
                    .col(SyncPositions::ConnectionId)
                    .col(SyncPositions::HandlerId)
                    .col(SyncPositions::Kind)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_synced_records(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncedRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncedRecords::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SyncedRecords::ConnectionId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncedRecords::HandlerId).string().not_null())
                    .col(ColumnDef::new(SyncedRecords::Source).string().not_null())
                    .col(ColumnDef::new(SyncedRecords::NativeId).string().not_null())
                    .col(ColumnDef::new(SyncedRecords::RecordType).string().not_null())
                    .col(ColumnDef::new(SyncedRecords::Payload).json().not_null())
                    .col(
                        ColumnDef::new(SyncedRecords::OccurredAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncedRecords::InsertedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_synced_records_connection")
                    .table(SyncedRecords::Table)
                    .col(SyncedRecords::ConnectionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_synced_records_type")
                    .table(SyncedRecords::Table)
                    .col(SyncedRecords::RecordType)
                    .col((SyncedRecords::InsertedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_logs(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncLogs::Level).string().not_null())
                    .col(ColumnDef::new(SyncLogs::Kind).string().null())
                    .col(ColumnDef::new(SyncLogs::ConnectionId).string().not_null())
                    .col(ColumnDef::new(SyncLogs::Source).string().not_null())
                    .col(ColumnDef::new(SyncLogs::AccountId).string().not_null())
                    .col(ColumnDef::new(SyncLogs::HandlerId).string().null())
                    .col(ColumnDef::new(SyncLogs::Message).text().not_null())
                    .col(
                        ColumnDef::new(SyncLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_sync_logs_connection")
                    .table(SyncLogs::Table)
                    .col(SyncLogs::ConnectionId)
                    .col(SyncLogs::Id)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
#[sea_orm(iden = "connections")]
enum Connections {
    Table,
    Id,
    Source,
    AccountId,
    Profile,
    Credentials,
    SyncStatus,
    SyncFrequencySecs,
    Handlers,
    SourceConfig,
    LastSyncAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_positions")]
enum SyncPositions {
    Table,
    Id,
    ConnectionId,
    HandlerId,
    Kind,
    Status,
    ThisRef,
    BreakId,
    FutureBreakId,
    UpdatedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "synced_records")]
enum SyncedRecords {
    Table,
    Id,
    ConnectionId,
    HandlerId,
    Source,
    NativeId,
    RecordType,
    Payload,
    OccurredAt,
    InsertedAt,
}

#[derive(DeriveIden)]
#[sea_orm(iden = "sync_logs")]
enum SyncLogs {
    Table,
    Id,
    Level,
    Kind,
    ConnectionId,
    Source,
    AccountId,
    HandlerId,
    Message,
    CreatedAt,
}
