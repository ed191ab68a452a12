//! The per-handler page loop.
//!
//! One run walks the FORWARD position from the newest records down to the
//! previous run's break id and continues any BACKFILL walk that still has a
//! cursor. On a handler's very first run the FORWARD walk takes only the first
//! page and hands its cursor to BACKFILL, so the historical import and later
//! forward runs never share a cursor.
//!
//! While both positions have work, each page goes to the one that was served
//! least recently. Pages alternate within a run and the first page of a run
//! goes to whichever kind missed out last time, so a `max_sync_loops` budget
//! of one still moves BACKFILL forward every other run.

use chrono::Utc;
use sea_orm::DatabaseConnection;

use crate::entity::connection::Model as ConnectionModel;
use crate::entity::sync_log::{LogKind, LogLevel};
use crate::entity::sync_position::{PositionKind, SyncPosition};
use crate::handler::{DataHandler, HandlerError};
use crate::source::{SourceClient, short_error_message};
use crate::store::{LogSink, NewLogEntry, StoreError, positions, records};

use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{HandlerOutcome, HandlerSyncResult, SyncOptions};

/// Everything a loop needs besides the handler and its client.
pub struct LoopContext<'a> {
    pub db: &'a DatabaseConnection,
    pub logs: &'a LogSink,
    pub connection: &'a ConnectionModel,
    pub options: &'a SyncOptions,
    pub on_progress: Option<&'a ProgressCallback>,
}

impl LoopContext<'_> {
    /// Append a log entry for this connection. Failures are traced, never raised.
    pub async fn log(&self, level: LogLevel, kind: LogKind, handler_id: Option<&str>, message: String) {
        let entry = NewLogEntry {
            level,
            kind: Some(kind),
            connection_id: self.connection.id.clone(),
            source: self.connection.source.clone(),
            account_id: self.connection.account_id.clone(),
            handler_id: handler_id.map(str::to_string),
            message,
        };

        if let Err(e) = self.logs.append(entry).await {
            tracing::error!(
                connection_id = %self.connection.id,
                handler = handler_id.unwrap_or("-"),
                error = %e,
                "Failed to write sync log entry"
            );
        }
    }
}

/// Map a handler error to its outcome, log level and log kind.
fn classify(err: &HandlerError) -> (HandlerOutcome, LogLevel, LogKind) {
    match err {
        HandlerError::CredentialExpired => (
            HandlerOutcome::CredentialExpired,
            LogLevel::Error,
            LogKind::CredentialExpired,
        ),
        HandlerError::RateLimited { .. } => {
            (HandlerOutcome::RateLimited, LogLevel::Warn, LogKind::RateLimited)
        }
        HandlerError::Transform { .. } => {
            (HandlerOutcome::TransformFailed, LogLevel::Error, LogKind::Transform)
        }
        HandlerError::InvalidConfig { .. } => (
            HandlerOutcome::InvalidConfig,
            LogLevel::Error,
            LogKind::Configuration,
        ),
        HandlerError::Source(_) => (HandlerOutcome::SourceFailed, LogLevel::Error, LogKind::Source),
    }
}

/// Pick the position the next page goes to, or `None` when both are done.
///
/// Ties go to BACKFILL: the initial hand-off saves both positions together
/// and the next page should continue the import.
fn next_kind(forward: &SyncPosition, backfill: &SyncPosition) -> Option<PositionKind> {
    match (forward.is_active(), backfill.has_cursor()) {
        (true, true) if backfill.updated_at <= forward.updated_at => Some(PositionKind::Backfill),
        (true, _) => Some(PositionKind::Forward),
        (false, true) => Some(PositionKind::Backfill),
        (false, false) => None,
    }
}

fn handler_error_message(err: &HandlerError) -> String {
    match err {
        HandlerError::RateLimited {
            reset_at: Some(reset_at),
        } => format!("{} (resets at {})", err, reset_at.to_rfc3339()),
        HandlerError::Source(source) => short_error_message(source),
        other => other.to_string(),
    }
}

/// Drive one handler until both positions stop, the budget runs out, or an
/// error ends the run.
///
/// Never returns an error: failures are logged against the connection and
/// reported through [`HandlerSyncResult::outcome`].
#[tracing::instrument(
    skip_all,
    fields(connection_id = %ctx.connection.id, handler = %handler.id())
)]
pub async fn run_sync_loop(
    ctx: &LoopContext<'_>,
    handler: &dyn DataHandler,
    api: &dyn SourceClient,
) -> HandlerSyncResult {
    let handler_id = handler.id().to_string();
    let connection_id = ctx.connection.id.as_str();
    let mut result = HandlerSyncResult::new(&handler_id);

    let loaded = async {
        let forward =
            positions::load_or_default(ctx.db, connection_id, &handler_id, PositionKind::Forward)
                .await?;
        let backfill =
            positions::load_or_default(ctx.db, connection_id, &handler_id, PositionKind::Backfill)
                .await?;
        Ok::<_, StoreError>((forward, backfill))
    }
    .await;

    let (mut forward, mut backfill) = match loaded {
        Ok(pair) => pair,
        Err(e) => return store_failure(ctx, &handler_id, result, "load positions", e).await,
    };

    // A stopped forward walk starts again from the newest page; an interrupted
    // one resumes at its cursor.
    forward.rearm();

    emit(
        ctx.on_progress,
        SyncProgress::HandlerStarted {
            connection_id: connection_id.to_string(),
            handler_id: handler_id.clone(),
            initial_import: forward.break_id.is_none() && backfill.is_untouched(),
        },
    );

    loop {
        let Some(kind) = next_kind(&forward, &backfill) else {
            result.outcome = HandlerOutcome::Completed;
            break;
        };

        if let Some(max) = ctx.options.max_sync_loops
            && result.iterations >= max
        {
            tracing::debug!(max, "Sync loop budget exhausted");
            result.outcome = HandlerOutcome::BudgetExhausted;
            break;
        }

        let initial_import =
            kind == PositionKind::Forward && forward.break_id.is_none() && backfill.is_untouched();
        let current = match kind {
            PositionKind::Forward => &forward,
            PositionKind::Backfill => &backfill,
        };
        let requested_ref = current.this_ref.clone();

        result.iterations += 1;
        tracing::debug!(
            %kind,
            iteration = result.iterations,
            cursor = requested_ref.as_deref().unwrap_or("<first>"),
            initial_import,
            "Fetching page"
        );

        let page = match handler.fetch_page(api, current.clone()).await {
            Ok(page) => page,
            Err(e) => {
                let (outcome, level, log_kind) = classify(&e);
                let message = handler_error_message(&e);
                match level {
                    LogLevel::Warn => tracing::warn!(%kind, error = %message, "Handler stopped"),
                    _ => tracing::error!(%kind, error = %message, "Handler failed"),
                }
                ctx.log(level, log_kind, Some(&handler_id), message.clone()).await;
                result.outcome = outcome;
                result.error = Some(message);
                break;
            }
        };

        let mut next = page.position;
        if next.is_active() && next.this_ref.is_some() && next.this_ref == requested_ref {
            let message = format!(
                "source returned the same cursor twice ({}); stopping",
                requested_ref.as_deref().unwrap_or_default()
            );
            tracing::error!(%kind, "{message}");
            ctx.log(LogLevel::Error, LogKind::Source, Some(&handler_id), message.clone())
                .await;
            result.outcome = HandlerOutcome::SourceFailed;
            result.error = Some(message);
            break;
        }

        let now = Utc::now().fixed_offset();
        let models = page
            .records
            .into_iter()
            .map(|record| record.into_active_model(connection_id, &handler_id, now))
            .collect();

        let stats = match records::insert_page(ctx.db, models).await {
            Ok(stats) => stats,
            Err(e) => return store_failure(ctx, &handler_id, result, "insert records", e).await,
        };
        result.inserted += stats.inserted;
        result.already_present += stats.already_present;

        let saved = if initial_import {
            match next.this_ref.take() {
                Some(cursor) => {
                    backfill.advance(cursor);
                    next.finalize();
                }
                None => backfill.exhaust(),
            }
            next.touch();
            backfill.updated_at = next.updated_at;
            positions::save_all(ctx.db, &[&next, &backfill]).await
        } else {
            next.touch();
            positions::save(ctx.db, &next).await
        };

        if let Err(e) = saved {
            return store_failure(ctx, &handler_id, result, "save position", e).await;
        }

        tracing::debug!(
            %kind,
            inserted = stats.inserted,
            already_present = stats.already_present,
            status = %next.status,
            "Applied page"
        );
        emit(
            ctx.on_progress,
            SyncProgress::PageApplied {
                connection_id: connection_id.to_string(),
                handler_id: handler_id.clone(),
                kind,
                iteration: result.iterations,
                inserted: stats.inserted,
                already_present: stats.already_present,
            },
        );

        match kind {
            PositionKind::Forward => forward = next,
            PositionKind::Backfill => backfill = next,
        }
    }

    finish(ctx, result)
}

async fn store_failure(
    ctx: &LoopContext<'_>,
    handler_id: &str,
    mut result: HandlerSyncResult,
    action: &str,
    err: StoreError,
) -> HandlerSyncResult {
    let message = format!("Failed to {action}: {err}");
    tracing::error!(error = %err, action, "Store failure, stopping handler");
    ctx.log(LogLevel::Error, LogKind::StoreFailure, Some(handler_id), message.clone())
        .await;
    result.outcome = HandlerOutcome::StoreFailure;
    result.error = Some(message);
    finish(ctx, result)
}

fn finish(ctx: &LoopContext<'_>, result: HandlerSyncResult) -> HandlerSyncResult {
    tracing::info!(
        outcome = ?result.outcome,
        iterations = result.iterations,
        inserted = result.inserted,
        already_present = result.already_present,
        "Handler finished"
    );
    emit(
        ctx.on_progress,
        SyncProgress::HandlerFinished {
            connection_id: ctx.connection.id.clone(),
            handler_id: result.handler_id.clone(),
            outcome: result.outcome,
            inserted: result.inserted,
        },
    );
    result
}
