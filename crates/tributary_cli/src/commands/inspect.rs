//! Read-only views: positions, sync logs and synced records.

use tabled::Tabled;
use tributary::store::RecordFilter;
use tributary::{SyncLogEntry, SyncManager, SyncPosition, SyncedRecordModel};

use crate::commands::shared::{CliResult, OutputFormat, or_dash, print_rows};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Tabled)]
struct PositionRow {
    #[tabled(rename = "Handler")]
    handler: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Cursor")]
    this_ref: String,
    #[tabled(rename = "Break")]
    break_id: String,
    #[tabled(rename = "Next Break")]
    future_break_id: String,
    #[tabled(rename = "Updated")]
    updated_at: String,
}

impl From<&SyncPosition> for PositionRow {
    fn from(position: &SyncPosition) -> Self {
        Self {
            handler: position.handler_id.clone(),
            kind: position.kind.to_string(),
            status: position.status.to_string(),
            this_ref: or_dash(position.this_ref.as_deref()),
            break_id: or_dash(position.break_id.as_deref()),
            future_break_id: or_dash(position.future_break_id.as_deref()),
            updated_at: position.updated_at.format(TIME_FORMAT).to_string(),
        }
    }
}

pub(crate) async fn handle_positions(
    manager: &SyncManager,
    connection_id: &str,
    format: OutputFormat,
) -> CliResult {
    if manager.get_connection(connection_id).await?.is_none() {
        return Err(format!("Connection not found: {connection_id}").into());
    }

    let positions = manager.positions(connection_id).await?;
    let rows = positions.iter().map(PositionRow::from).collect();
    print_rows(rows, &positions, format, "No positions yet; the connection has not synced.")
}

#[derive(Debug, Tabled)]
struct LogRow {
    #[tabled(rename = "Time")]
    at: String,
    #[tabled(rename = "Level")]
    level: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Connection")]
    connection: String,
    #[tabled(rename = "Handler")]
    handler: String,
    #[tabled(rename = "Message")]
    message: String,
}

impl From<&SyncLogEntry> for LogRow {
    fn from(entry: &SyncLogEntry) -> Self {
        Self {
            at: entry.created_at.format(TIME_FORMAT).to_string(),
            level: entry.level.to_string(),
            kind: or_dash(entry.kind),
            connection: entry.connection_id.clone(),
            handler: or_dash(entry.handler_id.as_deref()),
            message: entry.message.clone(),
        }
    }
}

pub(crate) async fn handle_logs(
    manager: &SyncManager,
    connection_id: Option<&str>,
    handler_id: Option<&str>,
    limit: u64,
    format: OutputFormat,
) -> CliResult {
    let entries = manager.latest_logs(connection_id, handler_id, limit).await?;
    let rows = entries.iter().map(LogRow::from).collect();
    print_rows(rows, &entries, format, "No log entries.")
}

/// Longest payload excerpt shown in the records table.
const PAYLOAD_PREVIEW: usize = 60;

#[derive(Debug, Tabled)]
struct RecordRow {
    #[tabled(rename = "Type")]
    record_type: String,
    #[tabled(rename = "Native Id")]
    native_id: String,
    #[tabled(rename = "Handler")]
    handler: String,
    #[tabled(rename = "Occurred")]
    occurred_at: String,
    #[tabled(rename = "Payload")]
    payload: String,
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PAYLOAD_PREVIEW) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_string(),
    }
}

impl From<&SyncedRecordModel> for RecordRow {
    fn from(record: &SyncedRecordModel) -> Self {
        Self {
            record_type: record.record_type.clone(),
            native_id: record.native_id.clone(),
            handler: record.handler_id.clone(),
            occurred_at: or_dash(record.occurred_at.map(|at| at.format(TIME_FORMAT).to_string())),
            payload: preview(&record.payload.to_string()),
        }
    }
}

/// Filters for `tributary records`.
#[derive(Debug, Default)]
pub(crate) struct RecordQuery {
    pub(crate) connection_id: Option<String>,
    pub(crate) handler_id: Option<String>,
    pub(crate) record_type: Option<String>,
    pub(crate) limit: u64,
}

pub(crate) async fn handle_records(
    manager: &SyncManager,
    query: RecordQuery,
    format: OutputFormat,
) -> CliResult {
    let filter = RecordFilter {
        connection_id: query.connection_id,
        handler_id: query.handler_id,
        record_type: query.record_type,
        limit: Some(query.limit),
    };
    let records = manager.records(&filter).await?;
    let rows = records.iter().map(RecordRow::from).collect();
    print_rows(rows, &records, format, "No records.")
}
