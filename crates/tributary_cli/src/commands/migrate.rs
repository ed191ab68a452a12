use tributary::db;
use tributary::migration::{Migrator, MigratorTrait};

use crate::MigrateAction;
use crate::commands::shared::CliResult;

/// Run a schema action against one user's database.
pub(crate) async fn handle_migrate(action: MigrateAction, user: &str, database_url: &str) -> CliResult {
    let db = db::connect(database_url).await?;

    match action {
        MigrateAction::Up => {
            Migrator::up(&db, None).await?;
            println!("Schema for '{user}' is up to date.");
        }
        MigrateAction::Down => {
            Migrator::down(&db, Some(1)).await?;
            println!("Rolled back the latest migration for '{user}'.");
        }
        MigrateAction::Status => Migrator::status(&db).await?,
        MigrateAction::Fresh => {
            tracing::warn!(user, "Dropping all sync state");
            Migrator::fresh(&db).await?;
            println!("Recreated the schema for '{user}'; connections, positions and records are gone.");
        }
    }

    Ok(())
}
