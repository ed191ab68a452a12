//! Connection lifecycle operations exposed by the sync manager.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

mod common;

use std::sync::Arc;

use common::{ACCOUNT, CONNECTION_ID, Feed, SOURCE, connect, manager};
use serde_json::json;
use tributary::SyncManager;
use tributary::entity::connection::HandlerConfig;
use tributary::entity::sync_log::LogKind;
use tributary::entity::sync_position::PositionKind;
use tributary::entity::sync_status::SyncStatus;
use tributary::source::SourceRegistry;
use tributary::store::RecordFilter;
use tributary::sync::SyncError;

#[tokio::test]
async fn connect_enables_all_registered_handlers_by_default() {
    let feed = Feed::new();
    let manager = manager(&feed).await;

    let connection = manager
        .connect(SOURCE, ACCOUNT, json!({}), json!({"access_token": "x"}), None)
        .await
        .unwrap();

    assert_eq!(connection.id, CONNECTION_ID);
    assert_eq!(connection.sync_status, SyncStatus::Connected);
    let handlers: Vec<String> = connection
        .enabled_handlers()
        .into_iter()
        .map(|h| h.handler_id)
        .collect();
    assert_eq!(handlers, vec!["posts", "messages", "contacts"]);
}

#[tokio::test]
async fn connect_rejects_unknown_source_and_handler() {
    let feed = Feed::new();
    let manager = manager(&feed).await;

    let err = manager
        .connect("myspace", ACCOUNT, json!({}), json!({}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownSource { .. }));

    let err = manager
        .connect(
            SOURCE,
            ACCOUNT,
            json!({}),
            json!({}),
            Some(vec![HandlerConfig::enabled("photos")]),
        )
        .await
        .unwrap_err();
    match err {
        SyncError::UnknownHandler { handler_id, .. } => assert_eq!(handler_id, "photos"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn reconnecting_existing_account_keeps_settings() {
    let feed = Feed::new();
    let manager = manager(&feed).await;
    connect(&manager, &["posts"]).await;
    manager
        .update_source_config(CONNECTION_ID, json!({"base_url": "https://social.example"}))
        .await
        .unwrap();

    let connection = manager
        .connect(SOURCE, ACCOUNT, json!({"display_name": "Al"}), json!({"access_token": "new"}), None)
        .await
        .unwrap();

    assert_eq!(connection.profile["display_name"], "Al");
    assert_eq!(connection.credentials["access_token"], "new");
    assert_eq!(connection.source_config["base_url"], "https://social.example");
    assert_eq!(connection.enabled_handlers().len(), 1);
}

#[tokio::test]
async fn get_connections_filters_and_sees_lifecycle_changes() {
    let feed = Feed::new();
    let manager = manager(&feed).await;
    connect(&manager, &["posts"]).await;
    manager
        .connect(SOURCE, "bob", json!({}), json!({}), None)
        .await
        .unwrap();

    assert_eq!(manager.get_connections(None, None).await.unwrap().len(), 2);
    let bob = manager.get_connections(Some(SOURCE), Some("bob")).await.unwrap();
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].account_id, "bob");
    assert!(manager.get_connections(Some("gmail"), None).await.unwrap().is_empty());

    manager.pause("social:bob").await.unwrap();
    let bob = manager.get_connections(None, Some("bob")).await.unwrap();
    assert_eq!(bob[0].sync_status, SyncStatus::Paused);
}

#[tokio::test]
async fn update_handlers_validates_ids() {
    let feed = Feed::new();
    let manager = manager(&feed).await;
    connect(&manager, &["posts"]).await;

    let connection = manager
        .update_handlers(
            CONNECTION_ID,
            vec![
                HandlerConfig::enabled("contacts"),
                HandlerConfig {
                    enabled: false,
                    ..HandlerConfig::enabled("posts")
                },
            ],
        )
        .await
        .unwrap();
    let enabled: Vec<String> = connection
        .enabled_handlers()
        .into_iter()
        .map(|h| h.handler_id)
        .collect();
    assert_eq!(enabled, vec!["contacts"]);

    let err = manager
        .update_handlers(CONNECTION_ID, vec![HandlerConfig::enabled("photos")])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnknownHandler { .. }));
}

#[tokio::test]
async fn invalid_handler_config_is_logged_and_skipped() {
    let feed = Feed::new();
    feed.set_posts((1..=3).rev());
    feed.set_contacts(&["Bob"]);
    let manager = manager(&feed).await;
    connect(&manager, &["posts"]).await;
    manager
        .update_handlers(
            CONNECTION_ID,
            vec![
                HandlerConfig::enabled("posts").with_config(json!({"page_size": 0})),
                HandlerConfig::enabled("contacts"),
            ],
        )
        .await
        .unwrap();

    let report = manager.sync(None, None, false).await.unwrap();

    let handlers = &report.results[0].handlers;
    assert!(!handlers[0].outcome.is_success());
    assert_eq!(handlers[1].inserted, 1);
    assert_eq!(report.connections[0].sync_status, SyncStatus::Connected);
    let logs = manager
        .latest_logs(Some(CONNECTION_ID), Some("posts"), 5)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
}

#[tokio::test]
async fn unknown_connection_operations_fail() {
    let feed = Feed::new();
    let manager = manager(&feed).await;

    assert!(matches!(
        manager.pause("social:nobody").await.unwrap_err(),
        SyncError::ConnectionNotFound { .. }
    ));
    assert!(matches!(
        manager.disconnect("social:nobody", false).await.unwrap_err(),
        SyncError::ConnectionNotFound { .. }
    ));
    assert!(manager.get_connection("social:nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn sync_frequency_must_be_positive() {
    let feed = Feed::new();
    let manager = manager(&feed).await;
    connect(&manager, &["posts"]).await;

    assert!(matches!(
        manager
            .update_sync_frequency(CONNECTION_ID, Some(0))
            .await
            .unwrap_err(),
        SyncError::InvalidInput { .. }
    ));
    let connection = manager
        .update_sync_frequency(CONNECTION_ID, None)
        .await
        .unwrap();
    assert_eq!(connection.sync_frequency_secs, None);
}

#[tokio::test]
async fn disconnect_removes_positions_and_optionally_records() {
    let feed = Feed::new();
    feed.set_posts((1..=5).rev());
    let manager = manager(&feed).await;
    connect(&manager, &["posts"]).await;
    manager.sync(None, None, false).await.unwrap();
    assert_eq!(manager.positions(CONNECTION_ID).await.unwrap().len(), 2);

    let summary = manager.disconnect(CONNECTION_ID, false).await.unwrap();

    assert_eq!(summary.positions, 2);
    assert_eq!(summary.records, 0);
    assert!(manager.get_connection(CONNECTION_ID).await.unwrap().is_none());
    assert!(
        manager
            .get_sync_position(CONNECTION_ID, "posts", PositionKind::Forward)
            .await
            .unwrap()
            .is_none()
    );
    // Records survive a plain disconnect.
    assert_eq!(manager.records(&RecordFilter::default()).await.unwrap().len(), 5);

    connect(&manager, &["posts"]).await;
    let summary = manager.disconnect(CONNECTION_ID, true).await.unwrap();
    assert_eq!(summary.records, 5);
    assert!(manager.records(&RecordFilter::default()).await.unwrap().is_empty());
}

fn records_of(connection_id: &str) -> RecordFilter {
    RecordFilter {
        connection_id: Some(connection_id.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn purging_one_account_keeps_records_of_another() {
    let feed = Feed::new();
    feed.set_posts((1..=3).rev());
    let manager = manager(&feed).await;
    for account in ["alice", "bob"] {
        manager
            .connect(
                SOURCE,
                account,
                json!({}),
                json!({"access_token": account}),
                Some(vec![HandlerConfig::enabled("posts")]),
            )
            .await
            .unwrap();
    }
    manager.sync(None, None, false).await.unwrap();
    assert_eq!(manager.records(&records_of("social:alice")).await.unwrap().len(), 3);
    assert_eq!(manager.records(&records_of("social:bob")).await.unwrap().len(), 3);

    let summary = manager.disconnect("social:alice", true).await.unwrap();
    assert_eq!(summary.records, 3);

    let report = manager.sync(None, None, true).await.unwrap();
    assert_eq!(report.inserted(), 0);
    assert_eq!(manager.records(&records_of("social:bob")).await.unwrap().len(), 3);
    assert_eq!(manager.records(&RecordFilter::default()).await.unwrap().len(), 3);
}

#[tokio::test]
async fn unregistered_source_is_logged_and_connection_stays_connected() {
    let feed = Feed::new();
    feed.set_posts((1..=3).rev());
    let db = common::setup_db().await;
    let registered = SyncManager::new("alice", Arc::clone(&db), common::registry(&feed));
    connect(&registered, &["posts"]).await;

    let unregistered = SyncManager::new("alice", Arc::clone(&db), Arc::new(SourceRegistry::new()));
    let report = unregistered.sync(None, None, false).await.unwrap();

    assert_eq!(report.results[0].error.as_deref(), Some("Unknown source 'social'"));
    let connection = &report.connections[0];
    assert_eq!(connection.sync_status, SyncStatus::Connected);
    assert_eq!(connection.last_error.as_deref(), Some("Unknown source 'social'"));
    assert!(connection.last_sync_at.is_none());
    assert!(feed.requests().is_empty());

    let logs = unregistered
        .latest_logs(Some(CONNECTION_ID), None, 10)
        .await
        .unwrap();
    assert_eq!(logs[0].kind, Some(LogKind::Configuration));

    // Registering the source again is enough; no reconnect needed.
    let report = registered.sync(None, None, false).await.unwrap();
    assert_eq!(report.inserted(), 3);
    assert!(report.connections[0].last_error.is_none());
}

#[tokio::test]
async fn log_sink_broadcasts_new_entries() {
    let feed = Feed::new();
    feed.fail_once("posts", None, common::Failure::RateLimited);
    let manager = manager(&feed).await;
    connect(&manager, &["posts"]).await;
    let mut rx = manager.subscribe_logs();

    manager.sync(None, None, false).await.unwrap();

    let entry = rx.try_recv().expect("log entry broadcast");
    assert_eq!(entry.handler_id.as_deref(), Some("posts"));
    assert_eq!(entry.connection_id, CONNECTION_ID);
}

#[tokio::test]
async fn get_provider_returns_registered_source() {
    let feed = Feed::new();
    let manager = manager(&feed).await;

    let provider = manager.get_provider(SOURCE).expect("registered source");
    assert_eq!(provider.handlers.ids(), vec!["posts", "messages", "contacts"]);
    assert!(manager.get_provider("gmail").is_none());
}
