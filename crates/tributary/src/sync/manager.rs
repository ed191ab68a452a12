//! Per-user entry point into the sync engine.
//!
//! A [`SyncManager`] owns one user's database and the process-wide
//! [`SourceRegistry`]. It answers connection and position queries, applies
//! lifecycle changes, and runs [`ConnectionOrchestrator`]s on request. It
//! never decides when to sync; that is the scheduler's (or the caller's) job.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde_json::Value;
use tokio::sync::{Mutex, Semaphore, broadcast};

use crate::entity::connection::{HandlerConfig, Model as ConnectionModel, handlers_to_json};
use crate::entity::sync_log::SyncLogEntry;
use crate::entity::sync_position::{PositionKind, SyncPosition};
use crate::entity::sync_status::SyncStatus;
use crate::entity::synced_record::Model as SyncedRecordModel;
use crate::source::{SourceDefinition, SourceRegistry};
use crate::store::{
    ConnectionFilter, LogFilter, LogSink, RecordFilter, StoreError, connections, positions, records,
};

use super::errors::{Result, SyncError};
use super::orchestrator::ConnectionOrchestrator;
use super::progress::ProgressCallback;
use super::types::{ConnectionSyncResult, SyncOptions, SyncReport};

/// What [`SyncManager::disconnect`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisconnectSummary {
    pub positions: u64,
    pub records: u64,
}

/// One user's sync session.
pub struct SyncManager {
    user_id: String,
    db: Arc<DatabaseConnection>,
    sources: Arc<SourceRegistry>,
    logs: LogSink,
    options: SyncOptions,
    on_progress: Option<Arc<ProgressCallback>>,
    /// Full unfiltered connection list, loaded on first use.
    cache: Mutex<Option<Vec<ConnectionModel>>>,
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("user_id", &self.user_id)
            .field("sources", &self.sources.ids())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl SyncManager {
    pub fn new(
        user_id: impl Into<String>,
        db: Arc<DatabaseConnection>,
        sources: Arc<SourceRegistry>,
    ) -> Self {
        let logs = LogSink::new(Arc::clone(&db));
        Self {
            user_id: user_id.into(),
            db,
            sources,
            logs,
            options: SyncOptions::default(),
            on_progress: None,
            cache: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(Arc::new(on_progress));
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }

    /// Subscribe to log entries as they are written.
    pub fn subscribe_logs(&self) -> broadcast::Receiver<SyncLogEntry> {
        self.logs.subscribe()
    }

    fn orchestrator(&self) -> ConnectionOrchestrator {
        ConnectionOrchestrator::new(
            Arc::clone(&self.db),
            Arc::clone(&self.sources),
            self.logs.clone(),
            self.options.clone(),
            self.on_progress.clone(),
        )
    }

    /// Connections matching `source`/`account`, ordered by (source, account).
    ///
    /// The unfiltered list is cached for the lifetime of the manager and
    /// dropped by every lifecycle change made through it.
    pub async fn get_connections(
        &self,
        source: Option<&str>,
        account_id: Option<&str>,
    ) -> Result<Vec<ConnectionModel>> {
        let filter = ConnectionFilter::new(source, account_id);
        let mut cache = self.cache.lock().await;

        if cache.is_none() {
            let loaded = connections::find(self.db.as_ref(), &ConnectionFilter::default()).await?;
            tracing::debug!(user = %self.user_id, count = loaded.len(), "Loaded connections");
            *cache = Some(loaded);
        }

        Ok(cache
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    /// Drop the cached connection list.
    pub async fn invalidate_cache(&self) {
        *self.cache.lock().await = None;
    }

    /// Read a connection directly from the store.
    pub async fn get_connection(&self, connection_id: &str) -> Result<Option<ConnectionModel>> {
        Ok(connections::get(self.db.as_ref(), connection_id).await?)
    }

    async fn require_connection(&self, connection_id: &str) -> Result<ConnectionModel> {
        self.get_connection(connection_id)
            .await?
            .ok_or_else(|| SyncError::connection_not_found(connection_id))
    }

    /// The registered definition of a source.
    pub fn get_provider(&self, source_id: &str) -> Option<&SourceDefinition> {
        self.sources.get(source_id)
    }

    /// A stored position, if the handler has ever applied a page.
    pub async fn get_sync_position(
        &self,
        connection_id: &str,
        handler_id: &str,
        kind: PositionKind,
    ) -> Result<Option<SyncPosition>> {
        let id = SyncPosition::make_id(connection_id, handler_id, kind);
        Ok(positions::get(self.db.as_ref(), &id).await?)
    }

    /// Every stored position of a connection.
    pub async fn positions(&self, connection_id: &str) -> Result<Vec<SyncPosition>> {
        Ok(positions::find_by_connection(self.db.as_ref(), connection_id).await?)
    }

    /// Newest log entries first.
    pub async fn latest_logs(
        &self,
        connection_id: Option<&str>,
        handler_id: Option<&str>,
        limit: u64,
    ) -> Result<Vec<SyncLogEntry>> {
        let filter = LogFilter {
            connection_id: connection_id.map(str::to_string),
            handler_id: handler_id.map(str::to_string),
            limit,
        };
        Ok(self.logs.latest(&filter).await?)
    }

    /// Synced records, newest first.
    pub async fn records(&self, filter: &RecordFilter) -> Result<Vec<SyncedRecordModel>> {
        Ok(records::find(self.db.as_ref(), filter).await?)
    }

    /// Sync every connection matching `source`/`account`.
    ///
    /// Connections run concurrently up to
    /// [`SyncOptions::connection_concurrency`]; handlers within a connection
    /// run in order. Failures are recorded per connection and never returned.
    #[tracing::instrument(skip(self), fields(user = %self.user_id))]
    pub async fn sync(
        &self,
        source: Option<&str>,
        account_id: Option<&str>,
        force: bool,
    ) -> Result<SyncReport> {
        // Status and last_sync_at drive claiming, so start from fresh rows.
        self.invalidate_cache().await;
        let targets = self.get_connections(source, account_id).await?;
        tracing::info!(connections = targets.len(), force, "Starting sync");

        let orchestrator = self.orchestrator();
        let concurrency = self.options.connection_concurrency.max(1);

        let results = if targets.len() <= 1 || concurrency == 1 {
            let mut results = Vec::with_capacity(targets.len());
            for connection in &targets {
                results.push(orchestrator.run(connection, force).await);
            }
            results
        } else {
            run_concurrently(&orchestrator, &targets, force, concurrency).await
        };

        self.invalidate_cache().await;
        let refreshed = self.get_connections(source, account_id).await?;
        let connections = refreshed
            .into_iter()
            .filter(|c| targets.iter().any(|t| t.id == c.id))
            .collect();

        Ok(SyncReport {
            connections,
            results,
        })
    }

    fn validate_handlers(
        definition: &SourceDefinition,
        handlers: &[HandlerConfig],
    ) -> Result<()> {
        for handler in handlers {
            if !definition.handlers.contains(&handler.handler_id) {
                return Err(SyncError::UnknownHandler {
                    source_id: definition.id.clone(),
                    handler_id: handler.handler_id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Create a connection, or refresh an existing one, in `connected` state.
    ///
    /// Without an explicit handler list a new connection enables every
    /// handler registered for the source, in registry order; an existing one
    /// keeps its list.
    pub async fn connect(
        &self,
        source: &str,
        account_id: &str,
        profile: Value,
        credentials: Value,
        handlers: Option<Vec<HandlerConfig>>,
    ) -> Result<ConnectionModel> {
        let definition = self
            .sources
            .get(source)
            .ok_or_else(|| SyncError::unknown_source(source))?;
        if let Some(handlers) = &handlers {
            Self::validate_handlers(definition, handlers)?;
        }

        let id = ConnectionModel::make_id(source, account_id);
        let now = Utc::now().fixed_offset();

        let connection = match connections::get(self.db.as_ref(), &id).await? {
            Some(mut existing) => {
                existing.profile = profile;
                existing.credentials = credentials;
                existing.last_error = None;
                if existing.sync_status != SyncStatus::SyncActive {
                    existing.sync_status = SyncStatus::Connected;
                }
                if let Some(handlers) = &handlers {
                    existing.handlers = handlers_to_json(handlers);
                }
                existing
            }
            None => {
                let handlers = handlers.unwrap_or_else(|| {
                    definition
                        .handlers
                        .ids()
                        .into_iter()
                        .map(HandlerConfig::enabled)
                        .collect()
                });
                ConnectionModel {
                    id: id.clone(),
                    source: source.to_string(),
                    account_id: account_id.to_string(),
                    profile,
                    credentials,
                    sync_status: SyncStatus::Connected,
                    sync_frequency_secs: None,
                    handlers: handlers_to_json(&handlers),
                    source_config: Value::Object(Default::default()),
                    last_sync_at: None,
                    last_error: None,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        let saved = connections::save(self.db.as_ref(), connection).await?;
        tracing::info!(connection_id = %saved.id, "Connected");
        self.invalidate_cache().await;
        Ok(saved)
    }

    /// Store fresh credentials and leave the `error` state.
    pub async fn reconnect(&self, connection_id: &str, credentials: Value) -> Result<ConnectionModel> {
        self.update(connection_id, |connection| {
            connection.credentials = credentials;
            connection.last_error = None;
            if connection.sync_status == SyncStatus::Error {
                connection.sync_status = SyncStatus::Connected;
            }
            Ok(())
        })
        .await
    }

    /// Replace the ordered handler list.
    pub async fn update_handlers(
        &self,
        connection_id: &str,
        handlers: Vec<HandlerConfig>,
    ) -> Result<ConnectionModel> {
        let connection = self.require_connection(connection_id).await?;
        let definition = self
            .sources
            .get(&connection.source)
            .ok_or_else(|| SyncError::unknown_source(&connection.source))?;
        Self::validate_handlers(definition, &handlers)?;

        self.update(connection_id, |connection| {
            connection.handlers = handlers_to_json(&handlers);
            Ok(())
        })
        .await
    }

    /// Replace the source-level configuration object.
    pub async fn update_source_config(
        &self,
        connection_id: &str,
        source_config: Value,
    ) -> Result<ConnectionModel> {
        if !source_config.is_object() {
            return Err(SyncError::InvalidInput {
                message: "source config must be a JSON object".to_string(),
            });
        }
        self.update(connection_id, |connection| {
            connection.source_config = source_config;
            Ok(())
        })
        .await
    }

    /// Set the minimum time between non-forced syncs. `None` syncs on every request.
    pub async fn update_sync_frequency(
        &self,
        connection_id: &str,
        every_secs: Option<i64>,
    ) -> Result<ConnectionModel> {
        if every_secs.is_some_and(|secs| secs <= 0) {
            return Err(SyncError::InvalidInput {
                message: "sync frequency must be positive".to_string(),
            });
        }
        self.update(connection_id, |connection| {
            connection.sync_frequency_secs = every_secs;
            Ok(())
        })
        .await
    }

    /// Stop scheduled and explicit syncs until [`resume`](Self::resume).
    pub async fn pause(&self, connection_id: &str) -> Result<ConnectionModel> {
        self.update(connection_id, |connection| {
            connection.sync_status = SyncStatus::Paused;
            Ok(())
        })
        .await
    }

    /// Leave the `paused` state. Other states are left alone.
    pub async fn resume(&self, connection_id: &str) -> Result<ConnectionModel> {
        self.update(connection_id, |connection| {
            if connection.sync_status == SyncStatus::Paused {
                connection.sync_status = SyncStatus::Connected;
            }
            Ok(())
        })
        .await
    }

    /// Delete a connection and its positions, and optionally its records.
    pub async fn disconnect(
        &self,
        connection_id: &str,
        purge_records: bool,
    ) -> Result<DisconnectSummary> {
        let txn = self.db.begin().await.map_err(StoreError::from)?;

        let mut summary = DisconnectSummary {
            positions: positions::delete_by_connection(&txn, connection_id).await?,
            ..Default::default()
        };
        if purge_records {
            summary.records = records::delete_by_connection(&txn, connection_id).await?;
        }
        if connections::delete(&txn, connection_id).await? == 0 {
            return Err(SyncError::connection_not_found(connection_id));
        }

        txn.commit().await.map_err(StoreError::from)?;
        self.invalidate_cache().await;

        tracing::info!(
            connection_id,
            positions = summary.positions,
            records = summary.records,
            "Disconnected"
        );
        Ok(summary)
    }

    async fn update<F>(&self, connection_id: &str, apply: F) -> Result<ConnectionModel>
    where
        F: FnOnce(&mut ConnectionModel) -> Result<()>,
    {
        let mut connection = self.require_connection(connection_id).await?;
        apply(&mut connection)?;
        let saved = connections::save(self.db.as_ref(), connection).await?;
        self.invalidate_cache().await;
        Ok(saved)
    }
}

async fn run_concurrently(
    orchestrator: &ConnectionOrchestrator,
    targets: &[ConnectionModel],
    force: bool,
    concurrency: usize,
) -> Vec<ConnectionSyncResult> {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(targets.len());

    for connection in targets {
        let orchestrator = orchestrator.clone();
        let semaphore = Arc::clone(&semaphore);
        let connection_id = connection.id.clone();
        let connection = connection.clone();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => {
                    let mut result = ConnectionSyncResult::new(&connection.id);
                    result.error = Some("Semaphore closed unexpectedly".to_string());
                    return result;
                }
            };
            orchestrator.run(&connection, force).await
        });
        handles.push((connection_id, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (connection_id, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "Sync task panicked");
                let mut result = ConnectionSyncResult::new(&connection_id);
                result.error = Some(format!("sync task failed: {e}"));
                results.push(result);
            }
        }
    }
    results
}
