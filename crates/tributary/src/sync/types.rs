//! Options and result types shared by the sync loop, orchestrator and manager.

use crate::entity::connection::Model as ConnectionModel;
use crate::handler::DEFAULT_PAGE_SIZE;

/// Default number of connections synced at once by [`SyncManager::sync`].
///
/// [`SyncManager::sync`]: super::SyncManager::sync
pub const DEFAULT_CONNECTION_CONCURRENCY: usize = 4;

/// Knobs for one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum pages fetched per handler per run. `None` is unbounded.
    pub max_sync_loops: Option<u32>,
    /// Page size used when a handler's config does not set one.
    pub page_size: u32,
    /// Maximum connections synced concurrently.
    pub connection_concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_sync_loops: None,
            page_size: DEFAULT_PAGE_SIZE,
            connection_concurrency: DEFAULT_CONNECTION_CONCURRENCY,
        }
    }
}

impl SyncOptions {
    #[must_use]
    pub fn with_max_sync_loops(mut self, max: Option<u32>) -> Self {
        self.max_sync_loops = max;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_connection_concurrency(mut self, concurrency: usize) -> Self {
        self.connection_concurrency = concurrency.max(1);
        self
    }
}

/// Why a handler's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Both positions are stopped; nothing left to fetch this run.
    Completed,
    /// `max_sync_loops` pages were fetched; the rest waits for the next run.
    BudgetExhausted,
    /// Credentials were rejected. Fatal for the connection.
    CredentialExpired,
    /// The source throttled us.
    RateLimited,
    /// A raw item could not be converted; the position was not advanced.
    TransformFailed,
    /// The source failed in some other way.
    SourceFailed,
    /// Records or positions could not be written.
    StoreFailure,
    /// The handler's settings were unusable.
    InvalidConfig,
}

impl HandlerOutcome {
    /// Whether the loop ended without an error.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed | Self::BudgetExhausted)
    }
}

/// What one handler did during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerSyncResult {
    pub handler_id: String,
    /// Pages fetched.
    pub iterations: u32,
    pub inserted: u64,
    pub already_present: u64,
    pub outcome: HandlerOutcome,
    pub error: Option<String>,
}

impl HandlerSyncResult {
    pub(crate) fn new(handler_id: &str) -> Self {
        Self {
            handler_id: handler_id.to_string(),
            iterations: 0,
            inserted: 0,
            already_present: 0,
            outcome: HandlerOutcome::Completed,
            error: None,
        }
    }

    pub(crate) fn failed(handler_id: &str, outcome: HandlerOutcome, error: String) -> Self {
        Self {
            outcome,
            error: Some(error),
            ..Self::new(handler_id)
        }
    }
}

/// What happened to one connection during [`SyncManager::sync`].
///
/// [`SyncManager::sync`]: super::SyncManager::sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSyncResult {
    pub connection_id: String,
    /// Set when the connection was not synced at all.
    pub skipped: Option<SkipReason>,
    pub handlers: Vec<HandlerSyncResult>,
    /// Connection-level error recorded as `last_error`.
    pub error: Option<String>,
}

impl ConnectionSyncResult {
    pub(crate) fn new(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            skipped: None,
            handlers: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn skipped(connection_id: &str, reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::new(connection_id)
        }
    }

    /// Records inserted across all handlers.
    pub fn inserted(&self) -> u64 {
        self.handlers.iter().map(|h| h.inserted).sum()
    }
}

/// Why a connection was not synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Status was not `connected` (or `paused` under force).
    NotConnected,
    /// `sync_frequency_secs` has not elapsed since the last sync.
    NotDue,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => f.write_str("not connected"),
            Self::NotDue => f.write_str("not due"),
        }
    }
}

/// Result of [`SyncManager::sync`].
///
/// [`SyncManager::sync`]: super::SyncManager::sync
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Connection records re-read after the run.
    pub connections: Vec<ConnectionModel>,
    pub results: Vec<ConnectionSyncResult>,
}

impl SyncReport {
    /// Records inserted across all connections.
    pub fn inserted(&self) -> u64 {
        self.results.iter().map(ConnectionSyncResult::inserted).sum()
    }
}
