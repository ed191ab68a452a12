//! Per-user database handles.
//!
//! Each user syncs into a database of their own. Its URL comes from a
//! template with a `{user}` placeholder (see [`database_url_for`]), so the
//! engine never mixes two users' positions or records in one file.

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};

/// Replaced with the sanitized user id in database URL templates.
pub const USER_PLACEHOLDER: &str = "{user}";

/// Applied to every SQLite file on connect. WAL lets the inspect commands
/// read while a background sync writes; the busy timeout absorbs the short
/// write locks taken by concurrent connection syncs.
const SQLITE_PRAGMAS: [&str; 3] = [
    "PRAGMA journal_mode=WAL",
    "PRAGMA busy_timeout=5000",
    "PRAGMA synchronous=NORMAL",
];

/// Substitute `user_id` into `template`.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_` and leading dots are
/// dropped, so `../etc/passwd` cannot leave the configured directory.
pub fn database_url_for(template: &str, user_id: &str) -> String {
    let sanitized: String = user_id
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    template.replace(USER_PLACEHOLDER, sanitized.trim_start_matches('.'))
}

/// Open `database_url`, tuning SQLite files for concurrent access.
///
/// # Errors
/// Returns `DbErr` if the database cannot be opened.
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url);
    options.sqlx_logging(false);

    let db = Database::connect(options).await?;

    if database_url.starts_with("sqlite://") {
        let backend = db.get_database_backend();
        for pragma in SQLITE_PRAGMAS {
            db.execute(Statement::from_string(backend, pragma)).await?;
        }
        tracing::debug!(url = database_url, "Configured SQLite pragmas");
    }

    Ok(db)
}

/// [`connect`], then bring the schema up to date.
///
/// ```ignore
/// let db = tributary::connect_and_migrate("sqlite://state/alice.db?mode=rwc").await?;
/// ```
#[cfg(feature = "migrate")]
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    use sea_orm_migration::MigratorTrait;

    let db = connect(database_url).await?;
    crate::migration::Migrator::up(&db, None).await?;
    Ok(db)
}
