use console::style;
use serde_json::Value;
use tabled::Tabled;
use tributary::{ConnectionModel, HandlerConfig, SyncManager, SyncStatus};

use crate::commands::shared::{CliResult, OutputFormat, or_dash, print_rows};

#[derive(Debug, Tabled)]
struct ConnectionRow {
    #[tabled(rename = "Connection")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Handlers")]
    handlers: String,
    #[tabled(rename = "Every")]
    every: String,
    #[tabled(rename = "Last Sync")]
    last_sync: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&ConnectionModel> for ConnectionRow {
    fn from(connection: &ConnectionModel) -> Self {
        let handlers = connection
            .handler_configs()
            .iter()
            .map(|h| {
                if h.enabled {
                    h.handler_id.clone()
                } else {
                    format!("{} (off)", h.handler_id)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            id: connection.id.clone(),
            status: connection.sync_status.to_string(),
            handlers,
            every: or_dash(connection.sync_frequency_secs.map(|s| format!("{s}s"))),
            last_sync: or_dash(
                connection
                    .last_sync_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
            error: or_dash(connection.last_error.as_deref()),
        }
    }
}

fn status_line(connection: &ConnectionModel) -> String {
    let status = match connection.sync_status {
        SyncStatus::Connected => style(connection.sync_status).green(),
        SyncStatus::SyncActive => style(connection.sync_status).cyan(),
        SyncStatus::Paused => style(connection.sync_status).yellow(),
        SyncStatus::Error => style(connection.sync_status).red(),
    };
    format!("{} is {}", style(&connection.id).bold(), status)
}

pub(crate) async fn handle_list(
    manager: &SyncManager,
    source: Option<&str>,
    account_id: Option<&str>,
    format: OutputFormat,
) -> CliResult {
    let connections = manager.get_connections(source, account_id).await?;
    let rows = connections.iter().map(ConnectionRow::from).collect();
    print_rows(rows, &connections, format, "No connections.")
}

pub(crate) async fn handle_connect(
    manager: &SyncManager,
    source: &str,
    account_id: &str,
    profile: Value,
    credentials: Value,
    handlers: Vec<String>,
) -> CliResult {
    let handlers: Option<Vec<HandlerConfig>> =
        (!handlers.is_empty()).then(|| handlers.into_iter().map(HandlerConfig::enabled).collect());
    let connection = manager
        .connect(source, account_id, profile, credentials, handlers)
        .await?;

    println!("{}", status_line(&connection));
    Ok(())
}

pub(crate) async fn handle_reconnect(
    manager: &SyncManager,
    connection_id: &str,
    credentials: Value,
) -> CliResult {
    let connection = manager.reconnect(connection_id, credentials).await?;
    println!("{}", status_line(&connection));
    Ok(())
}

/// Changes requested by `tributary configure`.
#[derive(Debug, Default)]
pub(crate) struct ConfigureChanges {
    pub(crate) handlers: Option<Vec<String>>,
    pub(crate) disabled: Vec<String>,
    pub(crate) source_config: Option<Value>,
    pub(crate) every_secs: Option<i64>,
    pub(crate) clear_every: bool,
}

impl ConfigureChanges {
    fn is_empty(&self) -> bool {
        self.handlers.is_none()
            && self.disabled.is_empty()
            && self.source_config.is_none()
            && self.every_secs.is_none()
            && !self.clear_every
    }
}

/// Reorder the handler list and set which entries are disabled.
///
/// Entries keep their configuration; `disabled` replaces the previous set.
fn apply_handler_changes(
    current: Vec<HandlerConfig>,
    order: Option<&[String]>,
    disabled: &[String],
) -> Vec<HandlerConfig> {
    let mut handlers = match order {
        Some(ids) => ids
            .iter()
            .map(|id| {
                current
                    .iter()
                    .find(|h| &h.handler_id == id)
                    .cloned()
                    .unwrap_or_else(|| HandlerConfig::enabled(id.clone()))
            })
            .collect(),
        None => current,
    };
    for handler in &mut handlers {
        handler.enabled = !disabled.contains(&handler.handler_id);
    }
    handlers
}

pub(crate) async fn handle_configure(
    manager: &SyncManager,
    connection_id: &str,
    changes: ConfigureChanges,
) -> CliResult {
    if changes.is_empty() {
        return Err("nothing to change; see `tributary configure --help`".into());
    }

    let mut connection = manager
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| format!("Connection not found: {connection_id}"))?;

    if changes.handlers.is_some() || !changes.disabled.is_empty() {
        let handlers = apply_handler_changes(
            connection.handler_configs(),
            changes.handlers.as_deref(),
            &changes.disabled,
        );
        connection = manager.update_handlers(connection_id, handlers).await?;
    }
    if let Some(source_config) = changes.source_config {
        connection = manager
            .update_source_config(connection_id, source_config)
            .await?;
    }
    if changes.clear_every {
        connection = manager.update_sync_frequency(connection_id, None).await?;
    } else if let Some(secs) = changes.every_secs {
        connection = manager
            .update_sync_frequency(connection_id, Some(secs))
            .await?;
    }

    let row = ConnectionRow::from(&connection);
    println!("{}", status_line(&connection));
    println!("  handlers: {}", row.handlers);
    println!("  every:    {}", row.every);
    Ok(())
}

pub(crate) async fn handle_pause(manager: &SyncManager, connection_id: &str) -> CliResult {
    let connection = manager.pause(connection_id).await?;
    println!("{}", status_line(&connection));
    Ok(())
}

pub(crate) async fn handle_resume(manager: &SyncManager, connection_id: &str) -> CliResult {
    let connection = manager.resume(connection_id).await?;
    println!("{}", status_line(&connection));
    Ok(())
}

pub(crate) async fn handle_disconnect(
    manager: &SyncManager,
    connection_id: &str,
    purge_records: bool,
) -> CliResult {
    let summary = manager.disconnect(connection_id, purge_records).await?;
    println!(
        "Disconnected {} ({} positions, {} records removed)",
        style(connection_id).bold(),
        summary.positions,
        summary.records
    );
    Ok(())
}
