//! The sync engine.
//!
//! # Module Structure
//!
//! - [`types`] - Options and results: `SyncOptions`, `HandlerSyncResult`, `SyncReport`
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`sync_loop`] - The per-handler page loop over FORWARD and BACKFILL positions
//! - [`orchestrator`] - Runs every enabled handler of one connection
//! - [`manager`] - Per-user queries, lifecycle operations and `sync()`
//! - [`scheduler`] - Periodic background syncing across users
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tributary::sync::{SyncManager, SyncOptions};
//!
//! let manager = SyncManager::new("alice", Arc::new(db), Arc::new(sources))
//!     .with_options(SyncOptions::default().with_max_sync_loops(Some(20)));
//! let report = manager.sync(Some("mastodon"), None, false).await?;
//! println!("Inserted {} records", report.inserted());
//! ```

mod errors;
pub mod manager;
pub mod orchestrator;
mod progress;
pub mod scheduler;
pub mod sync_loop;
mod types;

pub use errors::{Result, SyncError};
pub use manager::{DisconnectSummary, SyncManager};
pub use orchestrator::{ConnectionOrchestrator, RECONNECT_REQUIRED};
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use scheduler::{BackgroundScheduler, SchedulerConfig};
pub use sync_loop::{LoopContext, run_sync_loop};
pub use types::{
    ConnectionSyncResult, DEFAULT_CONNECTION_CONCURRENCY, HandlerOutcome, HandlerSyncResult,
    SkipReason, SyncOptions, SyncReport,
};
