//! Tributary - an incremental multi-source synchronization engine.
//!
//! This library pulls paginated data from external sources (social feeds,
//! mailboxes, address books, ...) into a per-user database. Every handler
//! keeps two durable positions: a FORWARD position that picks up records
//! newer than the last completed run, and a BACKFILL position that walks
//! historical pages until the source runs out. Interrupted runs resume
//! where they stopped and records are deduplicated by a stable id.
//!
//! # Features
//!
//! - `sqlite` (default) / `postgres` - database drivers.
//! - `migrate` (default) - schema migrations and [`connect_and_migrate`].
//! - `http` (default) - the reqwest-backed [`HttpTransport`](http::HttpTransport).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tributary::{SyncManager, connect_and_migrate, database_url_for};
//!
//! let url = database_url_for("sqlite://data/{user}.db?mode=rwc", "alice");
//! let db = Arc::new(connect_and_migrate(&url).await?);
//! let manager = SyncManager::new("alice", db, Arc::new(sources));
//!
//! manager.connect("mastodon", "alice@example.social", profile, credentials, None).await?;
//! let report = manager.sync(None, None, false).await?;
//! ```

pub mod db;
pub mod entity;
pub mod handler;
pub mod http;
pub mod retry;
pub mod source;
pub mod store;
pub mod sync;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::{USER_PLACEHOLDER, connect, database_url_for};
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use handler::{
    DataHandler, HandlerError, HandlerPage, HandlerRegistry, HandlerSettings, strip_null_values,
};
pub use source::{
    ApiRateLimiter, ApiSession, CredentialProvider, Credentials, RateLimitedClient, SourceClient,
    SourceDefinition, SourceError, SourceRegistry, rate_limits,
};
pub use store::StoreError;
pub use sync::{
    BackgroundScheduler, SchedulerConfig, SyncError, SyncManager, SyncOptions, SyncProgress,
    SyncReport,
};
