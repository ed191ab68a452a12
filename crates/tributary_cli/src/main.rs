//! Tributary CLI - command-line interface for the incremental sync engine.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::connections::ConfigureChanges;
use crate::commands::inspect::RecordQuery;
use crate::commands::shared::{
    CliResult, OutputFormat, build_sources, credentials_arg, database_url, open_manager,
    parse_json,
};
use crate::progress::ProgressReporter;

#[derive(Parser)]
#[command(name = "tributary")]
#[command(version)]
#[command(about = "Incremental sync of social feeds, mailboxes and contacts")]
#[command(
    long_about = "Tributary pulls paginated data from external sources into a per-user \
database. Each handler walks new records down to where the previous run stopped and, \
separately, backfills history until the source runs out. Interrupted runs resume where \
they left off."
)]
#[command(after_long_help = r#"EXAMPLES
    Connect an account with a personal access token:
        $ tributary connect mastodon alice@mastodon.social --token "$TOKEN"

    Sync every connection of the current user:
        $ tributary sync

    Sync one source, ignoring the per-connection frequency:
        $ tributary sync --source mastodon --force

    Show where each handler stopped:
        $ tributary positions mastodon:alice@mastodon.social

    Keep syncing in the background for the configured users:
        $ tributary serve

CONFIGURATION
    Tributary reads configuration from:
      1. ~/.config/tributary/config.toml (or $XDG_CONFIG_HOME/tributary/config.toml)
      2. ./tributary.toml
      3. Environment variables (TRIBUTARY_* prefix, nested keys joined by __)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    TRIBUTARY_USER                          User whose database is used (default: default)
    TRIBUTARY_TOKEN                         Access token for connect/reconnect
    TRIBUTARY_DATABASE__URL_TEMPLATE        Database URL with a {user} placeholder
    TRIBUTARY_SYNC__MAX_SYNC_LOOPS          Pages per handler per run
    TRIBUTARY_SCHEDULER__USERS              Comma-separated users for `serve`
    TRIBUTARY_SOURCES__<ID>__BASE_URL       API base URL of a source
"#)]
struct Cli {
    /// User whose database is used
    #[arg(short, long, global = true, env = "TRIBUTARY_USER", default_value = "default")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations for the user's database
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Connect an account, or refresh an existing connection
    Connect {
        /// Source id from the [sources.*] configuration
        source: String,
        /// Account identifier on the source
        account: String,

        #[command(flatten)]
        credentials: CredentialArgs,

        /// Display profile as a JSON object
        #[arg(long)]
        profile: Option<String>,

        /// Handlers to enable, in order (default: all handlers of the source)
        #[arg(long = "handler", value_delimiter = ',')]
        handlers: Vec<String>,
    },
    /// Store new credentials and clear the error state
    Reconnect {
        /// Connection id ("source:account")
        connection: String,

        #[command(flatten)]
        credentials: CredentialArgs,
    },
    /// List connections
    Connections {
        #[arg(short, long)]
        source: Option<String>,

        #[arg(short, long)]
        account: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Change handlers, source configuration or sync frequency
    Configure {
        /// Connection id ("source:account")
        connection: String,

        /// New handler order; handlers not listed are removed
        #[arg(long, value_delimiter = ',')]
        handlers: Option<Vec<String>>,

        /// Handlers to keep configured but not run (replaces the previous set)
        #[arg(long, value_delimiter = ',')]
        disable: Vec<String>,

        /// Source configuration as a JSON object
        #[arg(long)]
        source_config: Option<String>,

        /// Minimum seconds between non-forced syncs
        #[arg(long, conflicts_with = "clear_every")]
        every: Option<i64>,

        /// Sync on every request again
        #[arg(long)]
        clear_every: bool,
    },
    /// Sync connections now
    Sync {
        #[arg(short, long)]
        source: Option<String>,

        #[arg(short, long)]
        account: Option<String>,

        /// Ignore sync frequency and claim connections left in error or mid-sync
        #[arg(short, long)]
        force: bool,

        /// Pages per handler for this run (default from config, unlimited)
        #[arg(short = 'm', long)]
        max_loops: Option<u32>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show the stored sync positions of a connection
    Positions {
        /// Connection id ("source:account")
        connection: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show recent sync log entries, newest first
    Logs {
        #[arg(short, long)]
        connection: Option<String>,

        #[arg(long)]
        handler: Option<String>,

        #[arg(short = 'n', long, default_value_t = 20)]
        limit: u64,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show synced records, newest first
    Records {
        #[arg(short, long)]
        connection: Option<String>,

        #[arg(long)]
        handler: Option<String>,

        /// Record type, e.g. "social.post"
        #[arg(short = 't', long = "type")]
        record_type: Option<String>,

        #[arg(short = 'n', long, default_value_t = 20)]
        limit: u64,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Stop syncing a connection until resumed
    Pause {
        /// Connection id ("source:account")
        connection: String,
    },
    /// Resume a paused connection
    Resume {
        /// Connection id ("source:account")
        connection: String,
    },
    /// Remove a connection and its sync positions
    Disconnect {
        /// Connection id ("source:account")
        connection: String,

        /// Also delete the records it synced
        #[arg(long)]
        purge: bool,
    },
    /// Sync in the background until Ctrl+C
    Serve {
        /// Users to sync (default: scheduler.users, else --user)
        #[arg(long, value_delimiter = ',')]
        users: Vec<String>,

        /// Sync every user once and exit
        #[arg(long)]
        once: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply pending migrations
    Up,
    /// Roll back the latest migration
    Down,
    /// List applied and pending migrations
    Status,
    /// Drop every table and rebuild the schema (deletes all sync state)
    Fresh,
}

/// Credential input shared by `connect` and `reconnect`.
#[derive(Debug, Clone, Args)]
struct CredentialArgs {
    /// Bearer access token
    #[arg(long, env = "TRIBUTARY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Full credential JSON (access_token, refresh_token, expires_at, ...)
    #[arg(long, conflicts_with = "token")]
    credentials: Option<String>,
}

impl CredentialArgs {
    fn into_value(self) -> CliResult<serde_json::Value> {
        credentials_arg(self.token, self.credentials.as_deref())
    }
}

fn init_tracing() {
    let default_filter = if Term::stderr().is_term() {
        "tributary=warn,tributary_cli=warn"
    } else {
        "tributary=info,tributary_cli=info"
    };
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(default_filter),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    // Load configuration (config file -> env vars -> defaults)
    let mut config = config::Config::load();

    let cli = Cli::parse();
    let user = cli.user;

    let command = match cli.command {
        Commands::Completions { shell } => return commands::meta::handle_completions(shell),
        Commands::Migrate { action } => {
            let url = database_url(&config, &user)?;
            return commands::migrate::handle_migrate(action, &user, &url).await;
        }
        command => command,
    };

    if let Commands::Sync {
        max_loops: Some(max),
        ..
    } = &command
    {
        config.sync.max_sync_loops = Some(*max);
    }

    let sources = Arc::new(build_sources(&config)?);

    if let Commands::Serve { users, once } = command {
        let users = if !users.is_empty() {
            users
        } else if !config.scheduler.users.is_empty() {
            config.scheduler.users.clone()
        } else {
            vec![user]
        };
        return commands::serve::handle_serve(&config, sources, users, once).await;
    }

    let on_progress = matches!(command, Commands::Sync { .. })
        .then(|| Arc::new(ProgressReporter::new()).as_callback());
    let manager = open_manager(&config, sources, &user, on_progress).await?;

    match command {
        Commands::Connect {
            source,
            account,
            credentials,
            profile,
            handlers,
        } => {
            let profile = match profile {
                Some(raw) => parse_json("profile", &raw)?,
                None => serde_json::json!({}),
            };
            commands::connections::handle_connect(
                &manager,
                &source,
                &account,
                profile,
                credentials.into_value()?,
                handlers,
            )
            .await?;
        }
        Commands::Reconnect {
            connection,
            credentials,
        } => {
            commands::connections::handle_reconnect(&manager, &connection, credentials.into_value()?)
                .await?;
        }
        Commands::Connections {
            source,
            account,
            output,
        } => {
            commands::connections::handle_list(
                &manager,
                source.as_deref(),
                account.as_deref(),
                output,
            )
            .await?;
        }
        Commands::Configure {
            connection,
            handlers,
            disable,
            source_config,
            every,
            clear_every,
        } => {
            let source_config = source_config
                .map(|raw| parse_json("source-config", &raw))
                .transpose()?;
            let changes = ConfigureChanges {
                handlers,
                disabled: disable,
                source_config,
                every_secs: every,
                clear_every,
            };
            commands::connections::handle_configure(&manager, &connection, changes).await?;
        }
        Commands::Sync {
            source,
            account,
            force,
            output,
            ..
        } => {
            commands::sync::handle_sync(
                &manager,
                source.as_deref(),
                account.as_deref(),
                force,
                output,
            )
            .await?;
        }
        Commands::Positions { connection, output } => {
            commands::inspect::handle_positions(&manager, &connection, output).await?;
        }
        Commands::Logs {
            connection,
            handler,
            limit,
            output,
        } => {
            commands::inspect::handle_logs(
                &manager,
                connection.as_deref(),
                handler.as_deref(),
                limit,
                output,
            )
            .await?;
        }
        Commands::Records {
            connection,
            handler,
            record_type,
            limit,
            output,
        } => {
            let query = RecordQuery {
                connection_id: connection,
                handler_id: handler,
                record_type,
                limit,
            };
            commands::inspect::handle_records(&manager, query, output).await?;
        }
        Commands::Pause { connection } => {
            commands::connections::handle_pause(&manager, &connection).await?;
        }
        Commands::Resume { connection } => {
            commands::connections::handle_resume(&manager, &connection).await?;
        }
        Commands::Disconnect { connection, purge } => {
            commands::connections::handle_disconnect(&manager, &connection, purge).await?;
        }
        Commands::Migrate { .. } | Commands::Completions { .. } | Commands::Serve { .. } => {}
    }

    Ok(())
}
