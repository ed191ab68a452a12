//! Persistence for connections, sync positions, synced records and logs.
//!
//! All operations are free functions over any sea-orm [`ConnectionTrait`],
//! so they work the same against a pooled connection and inside a
//! transaction.
//!
//! [`ConnectionTrait`]: sea_orm::ConnectionTrait

pub mod connections;
mod errors;
pub mod logs;
pub mod positions;
pub mod records;

pub use connections::ConnectionFilter;
pub use errors::{Result, StoreError};
pub use logs::{LogFilter, LogSink, NewLogEntry};
pub use records::{ApplyStats, InsertOutcome, RecordFilter};

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::DbErr;

    use crate::entity::sync_position::{PositionKind, SyncPosition};

    #[test]
    fn test_store_error_from_db_err() {
        let err: StoreError = DbErr::RecordNotFound("x".to_string()).into();
        assert!(err.to_string().contains("Database error"));
    }

    #[test]
    fn test_connection_not_found_message() {
        let err = StoreError::connection_not_found("gmail:bob");
        assert!(err.to_string().contains("gmail:bob"));
    }

    #[test]
    fn test_connection_filter_matches() {
        let filter = ConnectionFilter::new(Some("gmail"), None);
        let now = chrono::Utc::now().fixed_offset();
        let conn = crate::entity::connection::Model {
            id: "gmail:bob".to_string(),
            source: "gmail".to_string(),
            account_id: "bob".to_string(),
            profile: serde_json::json!({}),
            credentials: serde_json::json!({}),
            sync_status: crate::entity::sync_status::SyncStatus::Connected,
            sync_frequency_secs: None,
            handlers: serde_json::json!([]),
            source_config: serde_json::json!({}),
            last_sync_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        assert!(filter.matches(&conn));
        assert!(!ConnectionFilter::new(Some("gmail"), Some("carol")).matches(&conn));
        assert!(ConnectionFilter::default().matches(&conn));
    }

    #[test]
    fn test_position_upsert_updates_cursor_columns() {
        let position = SyncPosition::new("gmail:bob", "messages", PositionKind::Forward);
        let sql = positions::build_upsert_sql(&position);
        assert!(sql.contains("ON CONFLICT"), "missing ON CONFLICT: {}", sql);
        assert!(sql.contains("DO UPDATE"), "missing DO UPDATE: {}", sql);
        assert!(sql.contains("\"this_ref\""), "missing this_ref: {}", sql);
        assert!(sql.contains("\"future_break_id\""), "missing future_break_id: {}", sql);
    }

    #[test]
    fn test_apply_stats_accumulate() {
        let mut total = ApplyStats::default();
        total += ApplyStats {
            inserted: 3,
            already_present: 1,
        };
        total += ApplyStats {
            inserted: 2,
            already_present: 0,
        };
        assert_eq!(total.inserted, 5);
        assert_eq!(total.total(), 6);
    }
}

#[cfg(all(test, feature = "sqlite", feature = "migrate"))]
mod db_tests {
    use std::sync::Arc;

    use chrono::Utc;
    use sea_orm::DatabaseConnection;
    use serde_json::json;

    use super::*;
    use crate::connect_and_migrate;
    use crate::entity::connection::Model as Connection;
    use crate::entity::sync_log::{LogKind, LogLevel};
    use crate::entity::sync_position::{PositionKind, PositionStatus, SyncPosition};
    use crate::entity::sync_status::SyncStatus;
    use crate::entity::synced_record::{ActiveModel as RecordActiveModel, NormalizedRecord};

    async fn setup_db() -> DatabaseConnection {
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("test db should migrate")
    }

    fn connection(source: &str, account: &str, status: SyncStatus) -> Connection {
        let now = Utc::now().fixed_offset();
        Connection {
            id: Connection::make_id(source, account),
            source: source.to_string(),
            account_id: account.to_string(),
            profile: json!({"name": account}),
            credentials: json!({"access_token": "t"}),
            sync_status: status,
            sync_frequency_secs: None,
            handlers: json!([{"handler_id": "posts"}]),
            source_config: json!({}),
            last_sync_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(native_id: &str) -> RecordActiveModel {
        NormalizedRecord::new("mastodon", native_id, "social.post", json!({"id": native_id}))
            .into_active_model("mastodon:alice", "posts", Utc::now().fixed_offset())
    }

    #[tokio::test]
    async fn test_connection_save_is_upsert() {
        let db = setup_db().await;
        let mut conn = connection("mastodon", "alice", SyncStatus::Connected);
        connections::save(&db, conn.clone()).await.unwrap();

        conn.profile = json!({"name": "Alice Updated"});
        let saved = connections::save(&db, conn).await.unwrap();
        assert_eq!(saved.profile["name"], "Alice Updated");

        let all = connections::find(&db, &ConnectionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_find_filters() {
        let db = setup_db().await;
        for (source, account) in [("mastodon", "alice"), ("mastodon", "bob"), ("gmail", "alice")] {
            connections::save(&db, connection(source, account, SyncStatus::Connected))
                .await
                .unwrap();
        }

        let mastodon = connections::find(&db, &ConnectionFilter::new(Some("mastodon"), None))
            .await
            .unwrap();
        assert_eq!(mastodon.len(), 2);

        let alice = connections::find(&db, &ConnectionFilter::new(None, Some("alice")))
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].source, "gmail");
    }

    #[tokio::test]
    async fn test_try_begin_sync_is_exclusive() {
        let db = setup_db().await;
        let conn = connections::save(&db, connection("mastodon", "alice", SyncStatus::Connected))
            .await
            .unwrap();

        assert!(connections::try_begin_sync(&db, &conn.id, false).await.unwrap());
        assert!(!connections::try_begin_sync(&db, &conn.id, false).await.unwrap());

        let stored = connections::get(&db, &conn.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::SyncActive);
    }

    #[tokio::test]
    async fn test_try_begin_sync_force_skips_only_paused() {
        let db = setup_db().await;
        let errored = connections::save(&db, connection("mastodon", "alice", SyncStatus::Error))
            .await
            .unwrap();
        let paused = connections::save(&db, connection("gmail", "alice", SyncStatus::Paused))
            .await
            .unwrap();

        assert!(!connections::try_begin_sync(&db, &errored.id, false).await.unwrap());
        assert!(connections::try_begin_sync(&db, &errored.id, true).await.unwrap());
        assert!(!connections::try_begin_sync(&db, &paused.id, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_finish_sync_records_error() {
        let db = setup_db().await;
        let conn = connections::save(&db, connection("mastodon", "alice", SyncStatus::SyncActive))
            .await
            .unwrap();

        connections::finish_sync(
            &db,
            &conn.id,
            SyncStatus::Error,
            Some("reconnect required".to_string()),
            None,
        )
        .await
        .unwrap();

        let stored = connections::get(&db, &conn.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Error);
        assert_eq!(stored.last_error.as_deref(), Some("reconnect required"));
        assert!(stored.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_finish_sync_keeps_pause_set_during_run() {
        let db = setup_db().await;
        let conn = connections::save(&db, connection("mastodon", "alice", SyncStatus::Paused))
            .await
            .unwrap();

        connections::finish_sync(&db, &conn.id, SyncStatus::Connected, None, Some(chrono::Utc::now()))
            .await
            .unwrap();

        let stored = connections::get(&db, &conn.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Paused);
        assert!(stored.last_sync_at.is_none());
    }

    #[tokio::test]
    async fn test_update_credentials_unknown_connection() {
        let db = setup_db().await;
        let err = connections::update_credentials(&db, "nope:nobody", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConnectionNotFound(ref id) if id == "nope:nobody"));
    }

    #[tokio::test]
    async fn test_position_load_or_default_is_not_persisted() {
        let db = setup_db().await;
        let pos = positions::load_or_default(&db, "mastodon:alice", "posts", PositionKind::Forward)
            .await
            .unwrap();
        assert!(pos.is_untouched());
        assert!(positions::get(&db, &pos.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_position_save_upserts_single_row() {
        let db = setup_db().await;
        let mut pos = SyncPosition::new("mastodon:alice", "posts", PositionKind::Backfill);
        pos.advance("cursor-1".to_string());
        positions::save(&db, &pos).await.unwrap();

        pos.advance("cursor-2".to_string());
        positions::save(&db, &pos).await.unwrap();

        let all = positions::find_by_connection(&db, "mastodon:alice").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].this_ref.as_deref(), Some("cursor-2"));
        assert_eq!(all[0].status, PositionStatus::Active);
    }

    #[tokio::test]
    async fn test_position_save_all_and_delete_by_connection() {
        let db = setup_db().await;
        let mut forward = SyncPosition::new("mastodon:alice", "posts", PositionKind::Forward);
        forward.note_first_item("10");
        forward.finalize();
        let mut backfill = SyncPosition::new("mastodon:alice", "posts", PositionKind::Backfill);
        backfill.advance("c1".to_string());
        let other = SyncPosition::new("gmail:alice", "messages", PositionKind::Forward);

        positions::save_all(&db, &[&forward, &backfill, &other]).await.unwrap();
        assert_eq!(
            positions::find_by_connection(&db, "mastodon:alice").await.unwrap().len(),
            2
        );

        let deleted = positions::delete_by_connection(&db, "mastodon:alice").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(positions::get(&db, &other.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_insert_reports_already_present() {
        let db = setup_db().await;
        assert_eq!(
            records::insert(&db, record("1")).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            records::insert(&db, record("1")).await.unwrap(),
            InsertOutcome::AlreadyPresent
        );
    }

    #[tokio::test]
    async fn test_record_insert_page_skips_existing() {
        let db = setup_db().await;
        records::insert(&db, record("2")).await.unwrap();

        let stats = records::insert_page(&db, vec![record("1"), record("2"), record("3")])
            .await
            .unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.already_present, 1);

        let empty = records::insert_page(&db, Vec::new()).await.unwrap();
        assert_eq!(empty, ApplyStats::default());

        assert_eq!(
            records::count_by_connection(&db, "mastodon:alice").await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_record_find_and_delete() {
        let db = setup_db().await;
        records::insert_page(&db, vec![record("1"), record("2")]).await.unwrap();

        let found = records::find(
            &db,
            &RecordFilter {
                record_type: Some("social.post".to_string()),
                limit: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);

        let removed = records::delete(&db, found[0].id).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(records::delete_by_connection(&db, "mastodon:alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_log_sink_appends_and_broadcasts() {
        let db = Arc::new(setup_db().await);
        let sink = LogSink::new(Arc::clone(&db));
        let mut rx = sink.subscribe();

        for (handler, message) in [("posts", "first"), ("contacts", "second")] {
            sink.append(NewLogEntry {
                level: LogLevel::Warn,
                kind: Some(LogKind::RateLimited),
                connection_id: "mastodon:alice".to_string(),
                source: "mastodon".to_string(),
                account_id: "alice".to_string(),
                handler_id: Some(handler.to_string()),
                message: message.to_string(),
            })
            .await
            .unwrap();
        }

        let live = rx.recv().await.unwrap();
        assert_eq!(live.message, "first");

        let latest = sink.latest(&LogFilter::default()).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].message, "second");

        let posts_only = sink
            .latest(&LogFilter {
                handler_id: Some("posts".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(posts_only.len(), 1);
        assert_eq!(posts_only[0].kind, Some(LogKind::RateLimited));
    }
}
