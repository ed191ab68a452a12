//! `tributary sync`: one foreground run over a user's connections.

use console::style;
use serde::Serialize;
use tabled::Tabled;
use tributary::SyncReport;
use tributary::SyncManager;

use crate::commands::shared::{CliResult, OutputFormat, or_dash, print_rows};

/// One line of the sync summary: a handler run, or a skipped connection.
#[derive(Debug, Clone, Serialize, Tabled)]
struct SyncRow {
    #[tabled(rename = "Connection")]
    connection: String,
    #[tabled(rename = "Handler")]
    handler: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Pages")]
    pages: u32,
    #[tabled(rename = "New")]
    inserted: u64,
    #[tabled(rename = "Seen")]
    already_present: u64,
    #[tabled(rename = "Error")]
    error: String,
}

fn summary_rows(report: &SyncReport) -> Vec<SyncRow> {
    let mut rows = Vec::new();

    for result in &report.results {
        if let Some(reason) = result.skipped {
            rows.push(SyncRow {
                connection: result.connection_id.clone(),
                handler: "-".to_string(),
                outcome: format!("skipped ({reason})"),
                pages: 0,
                inserted: 0,
                already_present: 0,
                error: "-".to_string(),
            });
            continue;
        }

        for handler in &result.handlers {
            rows.push(SyncRow {
                connection: result.connection_id.clone(),
                handler: handler.handler_id.clone(),
                outcome: format!("{:?}", handler.outcome),
                pages: handler.iterations,
                inserted: handler.inserted,
                already_present: handler.already_present,
                error: or_dash(handler.error.as_deref()),
            });
        }

        if result.handlers.is_empty() {
            rows.push(SyncRow {
                connection: result.connection_id.clone(),
                handler: "-".to_string(),
                outcome: "no handlers".to_string(),
                pages: 0,
                inserted: 0,
                already_present: 0,
                error: or_dash(result.error.as_deref()),
            });
        }
    }

    rows
}

pub(crate) async fn handle_sync(
    manager: &SyncManager,
    source: Option<&str>,
    account_id: Option<&str>,
    force: bool,
    format: OutputFormat,
) -> CliResult {
    let report = manager.sync(source, account_id, force).await?;

    let rows = summary_rows(&report);
    print_rows(rows.clone(), &rows, format, "No matching connections.")?;

    let failed: Vec<&str> = report
        .results
        .iter()
        .filter(|r| r.error.is_some())
        .map(|r| r.connection_id.as_str())
        .collect();

    if matches!(format, OutputFormat::Table) {
        println!(
            "{} new record{} across {} connection{}",
            style(report.inserted()).bold(),
            if report.inserted() == 1 { "" } else { "s" },
            report.results.len(),
            if report.results.len() == 1 { "" } else { "s" }
        );
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(format!("sync failed for: {}", failed.join(", ")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary::sync::{ConnectionSyncResult, HandlerOutcome, HandlerSyncResult, SkipReason};

    fn handler(id: &str, outcome: HandlerOutcome, inserted: u64) -> HandlerSyncResult {
        HandlerSyncResult {
            handler_id: id.to_string(),
            iterations: 2,
            inserted,
            already_present: 1,
            outcome,
            error: None,
        }
    }

    #[test]
    fn test_summary_rows() {
        let report = SyncReport {
            connections: Vec::new(),
            results: vec![
                ConnectionSyncResult {
                    connection_id: "social:alice".to_string(),
                    skipped: None,
                    handlers: vec![
                        handler("posts", HandlerOutcome::Completed, 4),
                        handler("contacts", HandlerOutcome::RateLimited, 0),
                    ],
                    error: None,
                },
                ConnectionSyncResult {
                    connection_id: "mail:alice".to_string(),
                    skipped: Some(SkipReason::NotDue),
                    handlers: Vec::new(),
                    error: None,
                },
            ],
        };

        let rows = summary_rows(&report);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].handler, "posts");
        assert_eq!(rows[0].inserted, 4);
        assert_eq!(rows[1].outcome, "RateLimited");
        assert_eq!(rows[2].outcome, "skipped (not due)");
        assert_eq!(report.inserted(), 4);
    }

    #[test]
    fn test_summary_row_for_connection_error_without_handlers() {
        let report = SyncReport {
            connections: Vec::new(),
            results: vec![ConnectionSyncResult {
                connection_id: "gone:alice".to_string(),
                skipped: None,
                handlers: Vec::new(),
                error: Some("Unknown source 'gone'".to_string()),
            }],
        };

        let rows = summary_rows(&report);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].error, "Unknown source 'gone'");
    }
}
