//! Progress events emitted during sync runs.
//!
//! Events mirror the structured log lines so a caller can render progress
//! without parsing logs.

use crate::entity::sync_position::PositionKind;

use super::types::{HandlerOutcome, SkipReason};

/// Progress events emitted during sync operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A connection run began.
    ConnectionStarted {
        connection_id: String,
        /// Enabled handlers, in run order.
        handlers: usize,
    },

    /// A connection was not synced.
    ConnectionSkipped {
        connection_id: String,
        reason: SkipReason,
    },

    /// A handler's loop began.
    HandlerStarted {
        connection_id: String,
        handler_id: String,
        /// True when this is the first import for the handler.
        initial_import: bool,
    },

    /// One page was fetched and applied.
    PageApplied {
        connection_id: String,
        handler_id: String,
        kind: PositionKind,
        /// 1-indexed page number within this run.
        iteration: u32,
        inserted: u64,
        already_present: u64,
    },

    /// A handler's loop ended.
    HandlerFinished {
        connection_id: String,
        handler_id: String,
        outcome: HandlerOutcome,
        inserted: u64,
    },

    /// A connection run ended.
    ConnectionFinished {
        connection_id: String,
        inserted: u64,
        /// Set when the connection ended in `error`.
        error: Option<String>,
    },

    /// Warning message (non-fatal).
    Warning {
        /// Warning message.
        message: String,
    },
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
