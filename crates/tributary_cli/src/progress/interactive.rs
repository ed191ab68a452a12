use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use console::{Term, style};
use tributary::sync::SyncProgress;

/// Pages applied per handler, keyed by (connection, handler).
type PageCounts = HashMap<(String, String), u32>;

/// Line-oriented reporter for terminals.
///
/// Connections can run concurrently, so every line names its connection
/// instead of redrawing a shared status line.
pub struct InteractiveReporter {
    term: Term,
    pages: Mutex<PageCounts>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Handlers that started but have not finished.
    #[cfg(test)]
    pub fn running_handlers(&self) -> usize {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn line(&self, text: String) {
        // A closed stderr is not worth failing a sync over.
        let _ = self.term.write_line(&text);
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::ConnectionStarted {
                connection_id,
                handlers,
            } => {
                self.line(format!(
                    "{} {} ({} handler{})",
                    style("→").cyan(),
                    style(&connection_id).bold(),
                    handlers,
                    if handlers == 1 { "" } else { "s" }
                ));
            }

            SyncProgress::ConnectionSkipped {
                connection_id,
                reason,
            } => {
                self.line(format!(
                    "{} {} skipped: {}",
                    style("·").dim(),
                    connection_id,
                    style(reason).dim()
                ));
            }

            SyncProgress::HandlerStarted {
                connection_id,
                handler_id,
                ..
            } => {
                self.pages
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert((connection_id, handler_id), 0);
            }

            SyncProgress::PageApplied {
                connection_id,
                handler_id,
                ..
            } => {
                *self
                    .pages
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry((connection_id, handler_id))
                    .or_default() += 1;
            }

            SyncProgress::HandlerFinished {
                connection_id,
                handler_id,
                outcome,
                inserted,
            } => {
                let pages = self
                    .pages
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&(connection_id.clone(), handler_id.clone()))
                    .unwrap_or_default();
                let marker = if outcome.is_success() {
                    style("✓").green()
                } else {
                    style("!").yellow()
                };
                self.line(format!(
                    "  {} {}/{}: {} new in {} page{} ({:?})",
                    marker,
                    connection_id,
                    handler_id,
                    inserted,
                    pages,
                    if pages == 1 { "" } else { "s" },
                    outcome
                ));
            }

            SyncProgress::ConnectionFinished {
                connection_id,
                inserted,
                error,
            } => match error {
                Some(error) => self.line(format!(
                    "{} {} failed: {}",
                    style("✗").red(),
                    style(&connection_id).bold(),
                    style(error).red()
                )),
                None => self.line(format!(
                    "{} {} done, {} new record{}",
                    style("✓").green(),
                    style(&connection_id).bold(),
                    inserted,
                    if inserted == 1 { "" } else { "s" }
                )),
            },

            SyncProgress::Warning { message } => {
                self.line(format!("{} {}", style("warning:").yellow(), message));
            }

            _ => {}
        }
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
