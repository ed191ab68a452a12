//! Progress reporting for sync operations.
//!
//! This module provides two modes of progress reporting:
//! - Interactive mode (TTY): one styled line per connection and handler
//! - Logging mode (non-TTY): Structured logging using tracing

use std::sync::Arc;

use console::Term;
use tributary::sync::{ProgressCallback, SyncProgress};

mod interactive;
mod logging;

pub use interactive::InteractiveReporter;
pub use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub enum ProgressReporter {
    /// Styled lines for TTY.
    Interactive(InteractiveReporter),
    /// Structured logging for non-TTY (CI, pipes, services).
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub fn new() -> Self {
        if Term::stderr().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    /// Create a logging reporter regardless of the terminal.
    pub fn logging() -> Self {
        Self::Logging(LoggingReporter::new())
    }

    /// Handle a progress event.
    pub fn handle(&self, event: SyncProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a ProgressCallback for the library.
    pub fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| {
            reporter.handle(event);
        })
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_forwards_events() {
        let reporter = Arc::new(ProgressReporter::logging());
        let callback = reporter.as_callback();

        callback(SyncProgress::Warning {
            message: "slow source".to_string(),
        });
        callback(SyncProgress::ConnectionFinished {
            connection_id: "social:alice".to_string(),
            inserted: 3,
            error: None,
        });

        assert_eq!(Arc::strong_count(&reporter), 2);
        drop(callback);
        assert_eq!(Arc::strong_count(&reporter), 1);
    }

    #[test]
    fn test_interactive_reporter_tracks_running_handlers() {
        let reporter = InteractiveReporter::new();

        reporter.handle(SyncProgress::HandlerStarted {
            connection_id: "social:alice".to_string(),
            handler_id: "posts".to_string(),
            initial_import: true,
        });
        for iteration in 1..=3 {
            reporter.handle(SyncProgress::PageApplied {
                connection_id: "social:alice".to_string(),
                handler_id: "posts".to_string(),
                kind: tributary::PositionKind::Forward,
                iteration,
                inserted: 1,
                already_present: 0,
            });
        }
        assert_eq!(reporter.running_handlers(), 1);

        reporter.handle(SyncProgress::HandlerFinished {
            connection_id: "social:alice".to_string(),
            handler_id: "posts".to_string(),
            outcome: tributary::sync::HandlerOutcome::Completed,
            inserted: 3,
        });
        assert_eq!(reporter.running_handlers(), 0);
    }
}
