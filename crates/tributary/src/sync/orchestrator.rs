//! Runs every enabled handler of one connection.
//!
//! The connection row doubles as the run lock: a run starts only if it can
//! move the status from `connected` to `sync_active`, and ends by writing
//! `connected`, or `error` when the credentials were rejected.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::DatabaseConnection;

use crate::entity::connection::{HandlerConfig, Model as ConnectionModel};
use crate::entity::sync_log::{LogKind, LogLevel};
use crate::entity::sync_status::SyncStatus;
use crate::handler::{DataHandler, HandlerSettings};
use crate::source::{Credentials, SourceDefinition, SourceError, SourceRegistry, short_error_message};
use crate::store::{LogSink, connections};

use super::progress::{ProgressCallback, SyncProgress, emit};
use super::sync_loop::{LoopContext, run_sync_loop};
use super::types::{
    ConnectionSyncResult, HandlerOutcome, HandlerSyncResult, SkipReason, SyncOptions,
};

/// Message stored as `last_error` when a connection needs new credentials.
pub const RECONNECT_REQUIRED: &str = "Credentials expired or revoked; reconnect required";

/// Syncs single connections. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionOrchestrator {
    db: Arc<DatabaseConnection>,
    sources: Arc<SourceRegistry>,
    logs: LogSink,
    options: SyncOptions,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for ConnectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionOrchestrator")
            .field("sources", &self.sources.ids())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// How a single handler slot ended, before the loop or inside it.
enum Step {
    Continue(HandlerSyncResult),
    Fatal(HandlerSyncResult),
}

impl ConnectionOrchestrator {
    pub fn new(
        db: Arc<DatabaseConnection>,
        sources: Arc<SourceRegistry>,
        logs: LogSink,
        options: SyncOptions,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> Self {
        Self {
            db,
            sources,
            logs,
            options,
            on_progress,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Sync one connection.
    ///
    /// Without `force`, connections that are not due per their
    /// `sync_frequency_secs` are skipped. `force` also claims connections in
    /// `error` (or stuck in `sync_active`), but never `paused` ones.
    ///
    /// Never returns an error; the outcome is in the result and on the
    /// connection row.
    #[tracing::instrument(
        skip_all,
        fields(
            connection_id = %connection.id,
            source = %connection.source,
            account = %connection.account_id,
            force
        )
    )]
    pub async fn run(&self, connection: &ConnectionModel, force: bool) -> ConnectionSyncResult {
        let on_progress = self.on_progress.as_deref();

        if !force && !connection.is_due(Utc::now()) {
            tracing::debug!("Connection not due yet, skipping");
            return self.skip(connection, SkipReason::NotDue);
        }

        match connections::try_begin_sync(self.db.as_ref(), &connection.id, force).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(status = %connection.sync_status, "Connection not claimable, skipping");
                return self.skip(connection, SkipReason::NotConnected);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim connection");
                let mut result = ConnectionSyncResult::new(&connection.id);
                result.error = Some(e.to_string());
                return result;
            }
        }

        let handlers = connection.enabled_handlers();
        tracing::info!(handlers = handlers.len(), "Starting connection sync");
        emit(
            on_progress,
            SyncProgress::ConnectionStarted {
                connection_id: connection.id.clone(),
                handlers: handlers.len(),
            },
        );

        let mut result = ConnectionSyncResult::new(&connection.id);
        let ctx = LoopContext {
            db: self.db.as_ref(),
            logs: &self.logs,
            connection,
            options: &self.options,
            on_progress,
        };

        // Only rejected credentials move the connection to `error`; an
        // unregistered source leaves it claimable for a later run.
        let (status, last_error, synced_at) = match self.sources.get(&connection.source) {
            Some(definition) => {
                match self.run_handlers(&ctx, definition, &handlers, &mut result).await {
                    Some(fatal) => (SyncStatus::Error, Some(fatal), None),
                    None => (SyncStatus::Connected, None, Some(Utc::now())),
                }
            }
            None => {
                let message = format!("Unknown source '{}'", connection.source);
                tracing::error!("{message}");
                ctx.log(LogLevel::Error, LogKind::Configuration, None, message.clone())
                    .await;
                (SyncStatus::Connected, Some(message), None)
            }
        };

        if let Err(e) = connections::finish_sync(
            self.db.as_ref(),
            &connection.id,
            status,
            last_error.clone(),
            synced_at,
        )
        .await
        {
            tracing::error!(error = %e, "Failed to record sync outcome");
        }

        result.error = last_error;
        tracing::info!(
            inserted = result.inserted(),
            error = result.error.as_deref().unwrap_or("-"),
            "Connection sync finished"
        );
        emit(
            on_progress,
            SyncProgress::ConnectionFinished {
                connection_id: connection.id.clone(),
                inserted: result.inserted(),
                error: result.error.clone(),
            },
        );

        result
    }

    fn skip(&self, connection: &ConnectionModel, reason: SkipReason) -> ConnectionSyncResult {
        emit(
            self.on_progress.as_deref(),
            SyncProgress::ConnectionSkipped {
                connection_id: connection.id.clone(),
                reason,
            },
        );
        ConnectionSyncResult::skipped(&connection.id, reason)
    }

    /// Run handlers in configuration order. Returns the connection-fatal
    /// error, if one stopped the run.
    async fn run_handlers(
        &self,
        ctx: &LoopContext<'_>,
        definition: &SourceDefinition,
        handlers: &[HandlerConfig],
        result: &mut ConnectionSyncResult,
    ) -> Option<String> {
        let mut credentials = Credentials::new(ctx.connection.credentials.clone());

        for config in handlers {
            match self
                .run_handler(ctx, definition, config, &mut credentials)
                .await
            {
                Step::Continue(handler_result) => result.handlers.push(handler_result),
                Step::Fatal(handler_result) => {
                    result.handlers.push(handler_result);
                    tracing::warn!(
                        handler = %config.handler_id,
                        "Credentials rejected, skipping remaining handlers"
                    );
                    return Some(RECONNECT_REQUIRED.to_string());
                }
            }
        }

        None
    }

    async fn run_handler(
        &self,
        ctx: &LoopContext<'_>,
        definition: &SourceDefinition,
        config: &HandlerConfig,
        credentials: &mut Credentials,
    ) -> Step {
        let handler_id = config.handler_id.as_str();

        let handler = match self.build_handler(definition, config) {
            Ok(handler) => handler,
            Err(message) => {
                tracing::warn!(handler = handler_id, error = %message, "Skipping handler");
                ctx.log(
                    LogLevel::Error,
                    LogKind::Configuration,
                    Some(handler_id),
                    message.clone(),
                )
                .await;
                return Step::Continue(HandlerSyncResult::failed(
                    handler_id,
                    HandlerOutcome::InvalidConfig,
                    message,
                ));
            }
        };

        let session = match definition
            .credentials
            .api_client(credentials, &ctx.connection.source_config)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                let message = short_error_message(&e);
                let (outcome, level, kind) = match &e {
                    SourceError::CredentialExpired => (
                        HandlerOutcome::CredentialExpired,
                        LogLevel::Error,
                        LogKind::CredentialExpired,
                    ),
                    SourceError::RateLimited { .. } => {
                        (HandlerOutcome::RateLimited, LogLevel::Warn, LogKind::RateLimited)
                    }
                    _ => (HandlerOutcome::SourceFailed, LogLevel::Error, LogKind::Source),
                };
                tracing::warn!(handler = handler_id, error = %message, "Could not create API client");
                ctx.log(level, kind, Some(handler_id), message.clone()).await;

                let handler_result = HandlerSyncResult::failed(handler_id, outcome, message);
                return match outcome {
                    HandlerOutcome::CredentialExpired => Step::Fatal(handler_result),
                    _ => Step::Continue(handler_result),
                };
            }
        };

        if let Some(refreshed) = session.refreshed_credentials {
            match connections::update_credentials(
                ctx.db,
                &ctx.connection.id,
                refreshed.expose().clone(),
            )
            .await
            {
                Ok(()) => tracing::debug!(handler = handler_id, "Stored refreshed credentials"),
                Err(e) => tracing::warn!(error = %e, "Failed to store refreshed credentials"),
            }
            *credentials = refreshed;
        }

        let handler_result = run_sync_loop(ctx, handler.as_ref(), session.client.as_ref()).await;
        match handler_result.outcome {
            HandlerOutcome::CredentialExpired => Step::Fatal(handler_result),
            _ => Step::Continue(handler_result),
        }
    }

    fn build_handler(
        &self,
        definition: &SourceDefinition,
        config: &HandlerConfig,
    ) -> Result<Box<dyn DataHandler>, String> {
        let settings = HandlerSettings::from_config(&config.config, self.options.page_size)
            .map_err(|e| format!("Handler '{}': {}", config.handler_id, e))?;

        definition
            .handlers
            .build(&config.handler_id, settings)
            .ok_or_else(|| {
                format!(
                    "Handler '{}' is not registered for source '{}'",
                    config.handler_id, definition.id
                )
            })
    }
}
