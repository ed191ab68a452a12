//! SyncLog entity - append-only error and status trail of sync runs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    #[sea_orm(string_value = "info")]
    Info,
    #[sea_orm(string_value = "warn")]
    Warn,
    #[sea_orm(string_value = "error")]
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// What kind of failure an entry describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    #[sea_orm(string_value = "credential_expired")]
    CredentialExpired,
    #[sea_orm(string_value = "rate_limited")]
    RateLimited,
    #[sea_orm(string_value = "store_failure")]
    StoreFailure,
    #[sea_orm(string_value = "transform")]
    Transform,
    #[sea_orm(string_value = "source")]
    Source,
    #[sea_orm(string_value = "configuration")]
    Configuration,
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogKind::CredentialExpired => "credential_expired",
            LogKind::RateLimited => "rate_limited",
            LogKind::StoreFailure => "store_failure",
            LogKind::Transform => "transform",
            LogKind::Source => "source",
            LogKind::Configuration => "configuration",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub level: LogLevel,
    pub kind: Option<LogKind>,

    pub connection_id: String,
    pub source: String,
    pub account_id: String,
    /// `None` for connection-level entries.
    pub handler_id: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Alias used by the log sink.
pub type SyncLogEntry = Model;
