//! SeaORM entity definitions for the per-user sync database.

pub mod connection;
pub mod prelude;
pub mod sync_log;
pub mod sync_position;
pub mod sync_status;
pub mod synced_record;
