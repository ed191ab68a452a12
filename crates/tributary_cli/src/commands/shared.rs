use std::path::Path;
use std::sync::Arc;

use clap::ValueEnum;
use serde::Serialize;
use serde_json::{Value, json};
use tabled::{Table, Tabled};
use tributary::http::ReqwestTransport;
use tributary::source::{BearerTokenProvider, BearerTokenSettings};
use tributary::sync::ProgressCallback;
use tributary::{
    ApiRateLimiter, HandlerRegistry, SourceDefinition, SourceRegistry, SyncManager,
    connect_and_migrate,
};

use crate::config::Config;

pub(crate) type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Output format for listings.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Print rows as a rounded table, or `json` as pretty JSON.
pub(crate) fn print_rows<R: Tabled, J: Serialize + ?Sized>(
    rows: Vec<R>,
    json: &J,
    format: OutputFormat,
    empty_message: &str,
) -> CliResult {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(json)?),
        OutputFormat::Table if rows.is_empty() => println!("{empty_message}"),
        OutputFormat::Table => {
            let mut table = Table::new(rows);
            table.with(tabled::settings::Style::rounded());
            println!("{table}");
        }
    }
    Ok(())
}

/// Build the source registry from the `[sources.*]` tables.
///
/// Every source gets the bearer-token provider over reqwest and the
/// standard handler set.
pub(crate) fn build_sources(config: &Config) -> CliResult<SourceRegistry> {
    let mut registry = SourceRegistry::new();

    for (id, settings) in &config.sources {
        if settings.base_url.is_empty() {
            tracing::warn!(source = %id, "Source has no base_url, skipping");
            continue;
        }

        let transport = ReqwestTransport::with_timeout(settings.timeout())?;
        let provider = BearerTokenProvider::new(
            BearerTokenSettings::new(id, &settings.base_url)
                .with_token_url(settings.token_url.clone())
                .with_client_options(settings.client_options()),
            Arc::new(transport),
            ApiRateLimiter::new(settings.requests_per_second),
        );
        registry.register(SourceDefinition::new(
            id,
            Arc::new(provider),
            HandlerRegistry::standard(),
        ));
    }

    Ok(registry)
}

/// Create the parent directory of a `sqlite://` database file.
pub(crate) fn ensure_sqlite_dir(database_url: &str) -> CliResult {
    let Some(db_path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    // Strip query parameters (e.g., ?mode=rwc) before path operations
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let db_path = Path::new(db_path);

    if db_path.is_relative() && !db_path.as_os_str().is_empty() {
        tracing::warn!(
            "Database path '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            db_path.display()
        );
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub(crate) fn database_url(config: &Config, user_id: &str) -> CliResult<String> {
    let url = config
        .database_url(user_id)
        .ok_or("Could not determine a database location; set database.url_template")?;
    ensure_sqlite_dir(&url)?;
    Ok(url)
}

/// Open (and migrate) a user's database and wrap it in a manager.
pub(crate) async fn open_manager(
    config: &Config,
    sources: Arc<SourceRegistry>,
    user_id: &str,
    on_progress: Option<ProgressCallback>,
) -> CliResult<SyncManager> {
    let url = database_url(config, user_id)?;
    let db = connect_and_migrate(&url).await?;

    let manager = SyncManager::new(user_id, Arc::new(db), sources).with_options(config.sync_options());
    Ok(match on_progress {
        Some(callback) => manager.with_progress(callback),
        None => manager,
    })
}

/// Parse a JSON argument, naming the flag on failure.
pub(crate) fn parse_json(flag: &str, raw: &str) -> CliResult<Value> {
    serde_json::from_str(raw).map_err(|e| format!("--{flag} is not valid JSON: {e}").into())
}

/// Credentials from `--token` or `--credentials`.
pub(crate) fn credentials_arg(token: Option<String>, raw: Option<&str>) -> CliResult<Value> {
    match (token, raw) {
        (Some(token), None) => Ok(json!({ "access_token": token })),
        (None, Some(raw)) => parse_json("credentials", raw),
        (Some(_), Some(_)) => Err("use either --token or --credentials, not both".into()),
        (None, None) => Err("credentials required: pass --token or --credentials".into()),
    }
}

/// Render an optional value for a table cell.
pub(crate) fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_token() {
        let creds = credentials_arg(Some("abc".to_string()), None).unwrap();
        assert_eq!(creds, json!({"access_token": "abc"}));
    }

    #[test]
    fn test_credentials_from_json() {
        let creds = credentials_arg(None, Some(r#"{"access_token":"x","refresh_token":"y"}"#)).unwrap();
        assert_eq!(creds["refresh_token"], "y");
    }

    #[test]
    fn test_credentials_conflicts_and_missing() {
        assert!(credentials_arg(Some("a".to_string()), Some("{}")).is_err());
        assert!(credentials_arg(None, None).is_err());
        let err = credentials_arg(None, Some("not json")).unwrap_err();
        assert!(err.to_string().contains("--credentials"));
    }

    #[test]
    fn test_build_sources_skips_missing_base_url() {
        let mut config = Config::default();
        config.sources.insert(
            "social".to_string(),
            crate::config::SourceSettings {
                base_url: "https://social.example/api".to_string(),
                ..Default::default()
            },
        );
        config
            .sources
            .insert("broken".to_string(), crate::config::SourceSettings::default());

        let registry = build_sources(&config).unwrap();
        assert_eq!(registry.ids(), vec!["social"]);
        let social = registry.get("social").unwrap();
        assert!(social.handlers.contains("posts"));
        assert!(social.handlers.contains("contacts"));
    }

    #[test]
    fn test_ensure_sqlite_dir_ignores_other_schemes() {
        assert!(ensure_sqlite_dir("postgres://localhost/tributary").is_ok());
        assert!(ensure_sqlite_dir("sqlite::memory:").is_ok());
    }

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(None::<String>), "-");
        assert_eq!(or_dash(Some(5)), "5");
    }
}
