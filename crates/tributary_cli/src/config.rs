//! Configuration file support for tributary.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `TRIBUTARY_`, nested keys joined by `__`)
//! 3. Config file (./tributary.toml, then ~/.config/tributary/config.toml)
//! 4. Built-in defaults
//!
//! Every user gets a separate database. The URL template defaults to
//! `sqlite://~/.local/state/tributary/{user}.db?mode=rwc` on Linux.
//!
//! Example config file:
//! ```toml
//! [database]
//! url_template = "postgres://sync@localhost/tributary_{user}"
//!
//! [sync]
//! max_sync_loops = 20
//! page_size = 50
//! connection_concurrency = 4
//!
//! [scheduler]
//! enabled = true
//! tick_secs = 60
//! interval_secs = 900
//! users = ["alice", "bob"]
//!
//! [sources.mastodon]
//! base_url = "https://mastodon.social/api/v1"
//! requests_per_second = 5
//! token_url = "https://mastodon.social/oauth/token"
//! ```
//!
//! `TRIBUTARY_SOURCES__MASTODON__BASE_URL` sets the same key as the last
//! table above.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use tributary::handler::DEFAULT_PAGE_SIZE;
use tributary::source::{JsonClientOptions, rate_limits};
use tributary::sync::DEFAULT_CONNECTION_CONCURRENCY;
use tributary::{SchedulerConfig, SyncOptions, USER_PLACEHOLDER, database_url_for};

const APP_NAME: &str = "tributary";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub scheduler: SchedulerSettings,
    /// Source id to API settings.
    pub sources: BTreeMap<String, SourceSettings>,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL with a `{user}` placeholder.
    /// Supports sqlite:// and postgres:// schemes.
    pub url_template: Option<String>,
}

/// Default sync options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pages fetched per handler per run. Unset means no limit.
    pub max_sync_loops: Option<u32>,
    pub page_size: u32,
    /// Connections synced at once for one user.
    pub connection_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_sync_loops: None,
            page_size: DEFAULT_PAGE_SIZE,
            connection_concurrency: DEFAULT_CONNECTION_CONCURRENCY,
        }
    }
}

/// Background scheduler settings for `tributary serve`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub tick_secs: u64,
    /// Minimum seconds between two background syncs of one user.
    pub interval_secs: u64,
    /// Users synced in the background.
    pub users: Vec<String>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            enabled: defaults.enabled,
            tick_secs: defaults.tick.as_secs(),
            interval_secs: defaults.interval.as_secs(),
            users: Vec::new(),
        }
    }
}

/// API settings for one source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub base_url: String,
    pub requests_per_second: u32,
    /// OAuth token endpoint used to refresh expired access tokens.
    pub token_url: Option<String>,
    pub timeout_secs: u64,
    /// Response field holding the item array.
    pub items_field: Option<String>,
    /// Response field holding the next-page cursor.
    pub next_field: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            requests_per_second: rate_limits::DEFAULT_RPS,
            token_url: None,
            timeout_secs: 30,
            items_field: None,
            next_field: None,
        }
    }
}

impl SourceSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn client_options(&self) -> JsonClientOptions {
        let mut options = JsonClientOptions::default();
        if let Some(field) = &self.items_field {
            options.items_field = field.clone();
        }
        if let Some(field) = &self.next_field {
            options.next_field = field.clone();
        }
        options
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/tributary/config.toml)
    /// 3. Local config file (./tributary.toml)
    /// 4. Environment variables with TRIBUTARY_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("tributary.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./tributary.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // TRIBUTARY_SYNC__PAGE_SIZE -> sync.page_size
        builder = builder.add_source(
            Environment::with_prefix("TRIBUTARY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("scheduler.users")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// The database URL template, falling back to the default state directory.
    ///
    /// The `mode=rwc` parameter creates the SQLite file if it doesn't exist.
    pub fn database_url_template(&self) -> Option<String> {
        self.database.url_template.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join(format!("{USER_PLACEHOLDER}.db"));
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// The database URL of one user.
    pub fn database_url(&self, user_id: &str) -> Option<String> {
        self.database_url_template()
            .map(|template| database_url_for(&template, user_id))
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions::default()
            .with_max_sync_loops(self.sync.max_sync_loops)
            .with_page_size(self.sync.page_size)
            .with_connection_concurrency(self.sync.connection_concurrency)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            enabled: self.scheduler.enabled,
            tick: Duration::from_secs(self.scheduler.tick_secs.max(1)),
            interval: Duration::from_secs(self.scheduler.interval_secs),
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/tributary` or `~/.local/state/tributary`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| {
            // state_dir() returns None on macOS/Windows
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
