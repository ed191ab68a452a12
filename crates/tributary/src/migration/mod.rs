//! Schema migrations, behind the `migrate` feature.

pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_schema;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260301_000001_create_schema::Migration)]
    }

    /// Kept apart from any `seaql_migrations` table an embedding application owns.
    fn migration_table_name() -> SeaRc<dyn Iden> {
        SeaRc::new(Alias::new("tributary_migrations"))
    }
}
