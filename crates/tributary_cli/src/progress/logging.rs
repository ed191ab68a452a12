use tributary::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::ConnectionStarted {
                connection_id,
                handlers,
            } => {
                tracing::info!(connection = %connection_id, handlers, "Syncing connection");
            }

            SyncProgress::ConnectionSkipped {
                connection_id,
                reason,
            } => {
                tracing::info!(connection = %connection_id, reason = %reason, "Skipped connection");
            }

            SyncProgress::HandlerStarted {
                connection_id,
                handler_id,
                initial_import,
            } => {
                tracing::debug!(connection = %connection_id, handler = %handler_id, initial_import, "Handler started");
            }

            SyncProgress::PageApplied {
                connection_id,
                handler_id,
                kind,
                iteration,
                inserted,
                already_present,
            } => {
                tracing::debug!(
                    connection = %connection_id,
                    handler = %handler_id,
                    %kind,
                    iteration,
                    inserted,
                    already_present,
                    "Applied page"
                );
            }

            SyncProgress::HandlerFinished {
                connection_id,
                handler_id,
                outcome,
                inserted,
            } => {
                if outcome.is_success() {
                    tracing::info!(connection = %connection_id, handler = %handler_id, ?outcome, inserted, "Handler finished");
                } else {
                    tracing::warn!(connection = %connection_id, handler = %handler_id, ?outcome, inserted, "Handler stopped");
                }
            }

            SyncProgress::ConnectionFinished {
                connection_id,
                inserted,
                error,
            } => match error {
                Some(error) => {
                    tracing::error!(connection = %connection_id, inserted, error = %error, "Connection sync failed");
                }
                None => {
                    tracing::info!(connection = %connection_id, inserted, "Connection synced");
                }
            },

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
