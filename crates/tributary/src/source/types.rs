use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::errors::Result;

/// A request for one page of a source resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Resource path relative to the source's base URL (e.g. "timelines/home").
    pub resource: String,
    /// Opaque cursor from the previous page, `None` for the first page.
    pub cursor: Option<String>,
    /// Requested number of items.
    pub page_size: u32,
    /// Extra query parameters.
    pub params: Vec<(String, String)>,
}

impl PageRequest {
    pub fn new(resource: impl Into<String>, page_size: u32) -> Self {
        Self {
            resource: resource.into(),
            cursor: None,
            page_size,
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }
}

/// One page of raw items, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub items: Vec<Value>,
    /// Cursor for the next (older) page. `None` when the source has no more pages.
    pub next_cursor: Option<String>,
}

/// An authenticated client for one account on one source.
///
/// Implementations are expected to map authentication failures to
/// [`SourceError::CredentialExpired`](super::SourceError::CredentialExpired)
/// and throttling to [`SourceError::RateLimited`](super::SourceError::RateLimited).
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Source identifier this client talks to.
    fn source_id(&self) -> &str;

    /// Fetch one page of a resource.
    async fn fetch_page(&self, request: &PageRequest) -> Result<SourcePage>;
}

#[async_trait]
impl<T: SourceClient + ?Sized> SourceClient for Arc<T> {
    fn source_id(&self) -> &str {
        (**self).source_id()
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<SourcePage> {
        (**self).fetch_page(request).await
    }
}
