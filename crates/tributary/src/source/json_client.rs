//! Generic paginated JSON API client.
//!
//! Requests `GET {base_url}/{resource}?limit={page_size}&cursor={cursor}` with
//! a bearer token and reads a response shaped like:
//!
//! ```json
//! { "data": [ ...items, newest first... ], "next_cursor": "opaque" }
//! ```
//!
//! Field names are configurable through [`JsonClientOptions`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use url::Url;

use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::retry::{RetryPolicy, retry_transient};

use super::errors::{Result, SourceError};
use super::types::{PageRequest, SourceClient, SourcePage};

/// Longest response body excerpt kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Response-shape and retry options for [`JsonApiClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonClientOptions {
    /// Field holding the item array. A top-level array is also accepted.
    pub items_field: String,
    /// Field holding the next-page cursor.
    pub next_field: String,
    /// Query parameter carrying the page size.
    pub limit_param: String,
    /// Query parameter carrying the cursor.
    pub cursor_param: String,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for JsonClientOptions {
    fn default() -> Self {
        Self {
            items_field: "data".to_string(),
            next_field: "next_cursor".to_string(),
            limit_param: "limit".to_string(),
            cursor_param: "cursor".to_string(),
            user_agent: format!("tributary/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
        }
    }
}

/// Bearer-token JSON client behind an [`HttpTransport`].
pub struct JsonApiClient {
    source_id: String,
    base_url: Url,
    token: String,
    transport: Arc<dyn HttpTransport>,
    options: JsonClientOptions,
}

impl fmt::Debug for JsonApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonApiClient")
            .field("source_id", &self.source_id)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl JsonApiClient {
    /// Create a client.
    ///
    /// # Errors
    /// Returns [`SourceError::Internal`] if `base_url` is not a valid URL.
    pub fn new(
        source_id: &str,
        base_url: &str,
        token: &str,
        transport: Arc<dyn HttpTransport>,
        options: JsonClientOptions,
    ) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| SourceError::internal(format!("invalid base URL {}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            source_id: source_id.to_string(),
            base_url,
            token: token.to_string(),
            transport,
            options,
        })
    }

    /// Build the full URL for a page request.
    pub fn page_url(&self, request: &PageRequest) -> Result<Url> {
        let resource = request.resource.trim_start_matches('/');
        let mut url = self
            .base_url
            .join(resource)
            .map_err(|e| SourceError::internal(format!("invalid resource {}: {}", resource, e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair(&self.options.limit_param, &request.page_size.to_string());
            if let Some(cursor) = &request.cursor {
                query.append_pair(&self.options.cursor_param, cursor);
            }
            for (key, value) in &request.params {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }

    async fn send_once(&self, url: &str) -> Result<SourcePage> {
        let request = HttpRequest::get(url)
            .bearer(&self.token)
            .header("Accept", "application/json")
            .header("User-Agent", self.options.user_agent.clone());

        let response = self.transport.send(request).await?;
        check_status(&response)?;
        parse_page(&response.body, &self.options)
    }
}

#[async_trait]
impl SourceClient for JsonApiClient {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<SourcePage> {
        let url = self.page_url(request)?;
        let context = format!("{} {}", self.source_id, request.resource);

        let page =
            retry_transient(|| self.send_once(url.as_str()), &self.options.retry, &context).await?;

        tracing::debug!(
            source = %self.source_id,
            resource = %request.resource,
            count = page.items.len(),
            has_next = page.next_cursor.is_some(),
            "Fetched page"
        );
        Ok(page)
    }
}

/// Map a non-success status to a [`SourceError`].
fn check_status(response: &HttpResponse) -> Result<()> {
    match response.status {
        200..=299 => Ok(()),
        403 if is_throttled(response) => Err(SourceError::RateLimited {
            reset_at: rate_limit_reset(response, Utc::now()),
        }),
        401 | 403 => Err(SourceError::CredentialExpired),
        429 => Err(SourceError::RateLimited {
            reset_at: rate_limit_reset(response, Utc::now()),
        }),
        status => {
            Err(SourceError::api(status, response.body_excerpt(ERROR_BODY_LIMIT)))
        }
    }
}

/// Some APIs answer an exhausted quota with 403 instead of 429. Those
/// responses carry rate-limit headers; a bare 403 is a rejected token.
fn is_throttled(response: &HttpResponse) -> bool {
    response.header("retry-after").is_some()
        || response.header("x-ratelimit-reset").is_some()
        || response
            .header("x-ratelimit-remaining")
            .is_some_and(|v| v.trim() == "0")
}

/// When a throttled request may be retried, from `Retry-After` (seconds or
/// HTTP date) or `X-RateLimit-Reset` (unix seconds).
fn rate_limit_reset(response: &HttpResponse, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(value) = response.header("retry-after") {
        let value = value.trim();
        if let Ok(secs) = value.parse::<i64>() {
            return Some(now + Duration::seconds(secs));
        }
        if let Ok(at) = DateTime::parse_from_rfc2822(value) {
            return Some(at.with_timezone(&Utc));
        }
    }

    response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn parse_page(body: &[u8], options: &JsonClientOptions) -> Result<SourcePage> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| SourceError::invalid_response(format!("malformed JSON: {}", e)))?;

    let (items, next_cursor) = match value {
        Value::Array(items) => (items, None),
        Value::Object(mut map) => {
            let items = match map.remove(&options.items_field) {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(_) => {
                    return Err(SourceError::invalid_response(format!(
                        "field {} is not an array",
                        options.items_field
                    )));
                }
            };
            let next_cursor = match map.remove(&options.next_field) {
                Some(Value::String(s)) if !s.is_empty() => Some(s),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            (items, next_cursor)
        }
        _ => return Err(SourceError::invalid_response("expected a JSON object or array")),
    };

    Ok(SourcePage { items, next_cursor })
}
