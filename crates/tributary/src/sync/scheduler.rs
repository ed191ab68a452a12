//! Periodic background syncing for every registered user.
//!
//! One timer drives all sessions. Each tick fires `sync()` for every session
//! whose next eligible time has passed and does not wait for it; a run that
//! is still going when the next one fires is turned away by the connection
//! status claim, not by the scheduler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};

use super::manager::SyncManager;

/// How often the scheduler checks for due sessions.
pub const DEFAULT_TICK: Duration = Duration::from_secs(60);

/// Minimum time between two background syncs of one user.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// When false, [`BackgroundScheduler::spawn`] does nothing.
    pub enabled: bool,
    pub tick: Duration,
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick: DEFAULT_TICK,
            interval: DEFAULT_INTERVAL,
        }
    }
}

struct ScheduledSession {
    manager: Arc<SyncManager>,
    next_sync_at: Instant,
}

/// Process-wide map of user id to sync session.
pub struct BackgroundScheduler {
    config: SchedulerConfig,
    sessions: Mutex<HashMap<String, ScheduledSession>>,
}

impl std::fmt::Debug for BackgroundScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundScheduler")
            .field("config", &self.config)
            .field("users", &self.registered_users())
            .finish()
    }
}

impl BackgroundScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ScheduledSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add (or replace) a user's session. It is due on the next tick.
    pub fn register(&self, manager: Arc<SyncManager>) {
        let user_id = manager.user_id().to_string();
        tracing::info!(user = %user_id, "Registered for background sync");
        self.lock().insert(
            user_id,
            ScheduledSession {
                manager,
                next_sync_at: Instant::now(),
            },
        );
    }

    /// Remove a user's session. Returns whether one was registered.
    pub fn deregister(&self, user_id: &str) -> bool {
        let removed = self.lock().remove(user_id).is_some();
        if removed {
            tracing::info!(user = %user_id, "Deregistered from background sync");
        }
        removed
    }

    /// Registered user ids, sorted.
    pub fn registered_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.lock().keys().cloned().collect();
        users.sort();
        users
    }

    /// Fire a sync for every due session without waiting for it.
    ///
    /// Returns the handles of the spawned runs.
    pub fn tick(&self) -> Vec<JoinHandle<()>> {
        let now = Instant::now();
        let due: Vec<Arc<SyncManager>> = {
            let mut sessions = self.lock();
            sessions
                .values_mut()
                .filter(|session| session.next_sync_at <= now)
                .map(|session| {
                    session.next_sync_at = now + self.config.interval;
                    Arc::clone(&session.manager)
                })
                .collect()
        };

        if !due.is_empty() {
            tracing::debug!(sessions = due.len(), "Scheduler tick");
        }

        due.into_iter()
            .map(|manager| {
                tokio::spawn(async move {
                    match manager.sync(None, None, false).await {
                        Ok(report) => tracing::debug!(
                            user = %manager.user_id(),
                            connections = report.results.len(),
                            inserted = report.inserted(),
                            "Background sync finished"
                        ),
                        Err(e) => tracing::error!(
                            user = %manager.user_id(),
                            error = %e,
                            "Background sync failed"
                        ),
                    }
                })
            })
            .collect()
    }

    /// Run the tick loop until `shutdown` is set, then wait for the runs it
    /// started.
    ///
    /// Returns `None` when the scheduler is disabled.
    pub fn spawn(self: Arc<Self>, shutdown: Arc<AtomicBool>) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            tracing::info!("Background sync disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            let mut ticker = interval(self.config.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(
                tick_secs = self.config.tick.as_secs(),
                interval_secs = self.config.interval.as_secs(),
                "Background scheduler started"
            );

            let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
            loop {
                ticker.tick().await;
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                in_flight.retain(|handle| !handle.is_finished());
                in_flight.extend(self.tick());
            }

            if !in_flight.is_empty() {
                tracing::info!(runs = in_flight.len(), "Waiting for running syncs");
            }
            for handle in in_flight {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Background sync task failed");
                }
            }

            tracing::info!("Background scheduler stopped");
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    use crate::entity::connection;
    use crate::source::SourceRegistry;

    fn mock_manager(user_id: &str) -> Arc<SyncManager> {
        // Each sync reads the connection list twice.
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([
                Vec::<connection::Model>::new(),
                Vec::new(),
                Vec::new(),
                Vec::new(),
            ])
            .into_connection();
        Arc::new(SyncManager::new(
            user_id,
            Arc::new(db),
            Arc::new(SourceRegistry::new()),
        ))
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            enabled: true,
            tick: Duration::from_secs(60),
            interval: Duration::from_secs(900),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_is_due_again_after_interval() {
        let scheduler = BackgroundScheduler::new(config());
        scheduler.register(mock_manager("alice"));

        assert_eq!(scheduler.tick().len(), 1);
        assert!(scheduler.tick().is_empty());

        tokio::time::advance(Duration::from_secs(899)).await;
        assert!(scheduler.tick().is_empty());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(scheduler.tick().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_are_scheduled_independently() {
        let scheduler = BackgroundScheduler::new(config());
        scheduler.register(mock_manager("alice"));
        assert_eq!(scheduler.tick().len(), 1);

        tokio::time::advance(Duration::from_secs(300)).await;
        scheduler.register(mock_manager("bob"));
        assert_eq!(scheduler.tick().len(), 1);

        tokio::time::advance(Duration::from_secs(600)).await;
        // alice is due, bob is not.
        assert_eq!(scheduler.tick().len(), 1);
        assert_eq!(scheduler.registered_users(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_register_replaces_existing_session() {
        let scheduler = BackgroundScheduler::new(config());
        scheduler.register(mock_manager("alice"));
        scheduler.register(mock_manager("alice"));

        assert_eq!(scheduler.registered_users(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_disabled_scheduler_returns_no_handle() {
        let scheduler = Arc::new(BackgroundScheduler::new(SchedulerConfig {
            enabled: false,
            ..config()
        }));
        assert!(scheduler.spawn(Arc::new(AtomicBool::new(false))).is_none());
    }
}
