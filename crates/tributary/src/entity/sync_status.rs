//! Connection sync status.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a connection, as seen by the sync engine.
///
/// ```text
/// Connected ──► SyncActive ──► Connected
///                    └───────► Error      (credentials expired, reconnect required)
/// Paused                                  (user-set, never synced)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Idle and eligible for sync.
    #[sea_orm(string_value = "connected")]
    Connected,
    /// A sync run currently owns this connection.
    #[sea_orm(string_value = "sync_active")]
    SyncActive,
    /// Paused by the user.
    #[sea_orm(string_value = "paused")]
    Paused,
    /// The source rejected the stored credentials; the user must reconnect.
    #[sea_orm(string_value = "error")]
    Error,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Connected => write!(f, "connected"),
            SyncStatus::SyncActive => write!(f, "sync_active"),
            SyncStatus::Paused => write!(f, "paused"),
            SyncStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connected" => Ok(SyncStatus::Connected),
            "sync_active" | "syncing" => Ok(SyncStatus::SyncActive),
            "paused" => Ok(SyncStatus::Paused),
            "error" => Ok(SyncStatus::Error),
            _ => Err(format!("Unknown sync status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn test_display_round_trips_through_from_str() {
        for status in SyncStatus::iter() {
            assert_eq!(status.to_string().parse::<SyncStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_from_str_accepts_alias() {
        assert_eq!(
            "syncing".parse::<SyncStatus>().unwrap(),
            SyncStatus::SyncActive
        );
        assert!("bogus".parse::<SyncStatus>().is_err());
    }
}
