//! Background scheduler against real sessions.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{Feed, connect, manager};
use tributary::store::RecordFilter;
use tributary::sync::{BackgroundScheduler, SchedulerConfig};

#[tokio::test]
async fn tick_syncs_due_sessions_once_per_interval() {
    let feed = Feed::new();
    feed.set_posts((1..=4).rev());
    let manager = Arc::new(manager(&feed).await);
    connect(&manager, &["posts"]).await;

    let scheduler = BackgroundScheduler::new(SchedulerConfig {
        enabled: true,
        tick: Duration::from_secs(60),
        interval: Duration::from_secs(3600),
    });
    scheduler.register(Arc::clone(&manager));

    let handles = scheduler.tick();
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(manager.records(&RecordFilter::default()).await.unwrap().len(), 4);

    // Not due again until the interval passes.
    assert!(scheduler.tick().is_empty());
}

#[tokio::test]
async fn deregistered_sessions_are_not_synced() {
    let feed = Feed::new();
    let manager = Arc::new(manager(&feed).await);
    let scheduler = BackgroundScheduler::new(SchedulerConfig::default());

    scheduler.register(Arc::clone(&manager));
    assert_eq!(scheduler.registered_users(), vec!["alice"]);
    assert!(scheduler.deregister("alice"));
    assert!(!scheduler.deregister("alice"));

    assert!(scheduler.tick().is_empty());
}

#[tokio::test]
async fn disabled_scheduler_does_not_spawn() {
    let scheduler = Arc::new(BackgroundScheduler::new(SchedulerConfig {
        enabled: false,
        ..SchedulerConfig::default()
    }));

    assert!(
        scheduler
            .spawn(Arc::new(AtomicBool::new(false)))
            .is_none()
    );
}

#[tokio::test]
async fn spawned_loop_syncs_and_stops_on_shutdown() {
    let feed = Feed::new();
    feed.set_posts((1..=2).rev());
    let manager = Arc::new(manager(&feed).await);
    connect(&manager, &["posts"]).await;

    let scheduler = Arc::new(BackgroundScheduler::new(SchedulerConfig {
        enabled: true,
        tick: Duration::from_millis(20),
        interval: Duration::from_secs(3600),
    }));
    scheduler.register(Arc::clone(&manager));

    let shutdown = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&scheduler)
        .spawn(Arc::clone(&shutdown))
        .expect("scheduler enabled");

    let synced = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let records = manager.records(&RecordFilter::default()).await.unwrap();
            if records.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(synced.is_ok(), "background sync never ran");

    shutdown.store(true, Ordering::Relaxed);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    // Only the first tick was due.
    assert_eq!(feed.requests_for("posts"), 1);
}
