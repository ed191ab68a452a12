use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};

use crate::http::{HttpRequest, HttpTransport};

use super::errors::{Result, SourceError};
use super::json_client::{JsonApiClient, JsonClientOptions};
use super::rate_limit::{ApiRateLimiter, RateLimitedClient};
use super::types::SourceClient;

/// Opaque credential material for one connection.
///
/// The `Debug` output never includes the contents.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(Value);

impl Credentials {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Borrow the raw credential JSON.
    pub fn expose(&self) -> &Value {
        &self.0
    }

    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Read a string field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Parse `expires_at` as RFC 3339 or unix seconds.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.0.get("expires_at")? {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
            _ => None,
        }
    }

    /// Whether the access token is known to be expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

impl From<Value> for Credentials {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// An API client plus any credentials the provider refreshed while creating it.
pub struct ApiSession {
    pub client: Arc<dyn SourceClient>,
    /// When set, the caller must persist these onto the connection.
    pub refreshed_credentials: Option<Credentials>,
}

impl fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSession")
            .field("source", &self.client.source_id())
            .field("refreshed", &self.refreshed_credentials.is_some())
            .finish()
    }
}

/// Turns stored credentials into an authenticated [`SourceClient`].
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Build a client for one connection.
    ///
    /// # Errors
    /// Returns [`SourceError::CredentialExpired`] when the credentials are
    /// unusable and cannot be refreshed.
    async fn api_client(&self, credentials: &Credentials, source_config: &Value) -> Result<ApiSession>;
}

/// Settings shared by every connection of a bearer-token source.
#[derive(Debug, Clone)]
pub struct BearerTokenSettings {
    pub source_id: String,
    /// Default API base URL; a connection's `source_config.base_url` overrides it.
    pub base_url: String,
    /// OAuth token endpoint used to refresh expired access tokens.
    pub token_url: Option<String>,
    pub client: JsonClientOptions,
}

impl BearerTokenSettings {
    pub fn new(source_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            base_url: base_url.into(),
            token_url: None,
            client: JsonClientOptions::default(),
        }
    }

    #[must_use]
    pub fn with_token_url(mut self, token_url: Option<String>) -> Self {
        self.token_url = token_url;
        self
    }

    #[must_use]
    pub fn with_client_options(mut self, client: JsonClientOptions) -> Self {
        self.client = client;
        self
    }
}

/// Default credential provider: a bearer `access_token` in the credential JSON.
///
/// If `expires_at` is in the past and a `refresh_token` plus a token URL are
/// available, the token is refreshed with an OAuth `refresh_token` grant and
/// the new credentials are returned in the session.
pub struct BearerTokenProvider {
    settings: BearerTokenSettings,
    transport: Arc<dyn HttpTransport>,
    limiter: ApiRateLimiter,
}

impl BearerTokenProvider {
    pub fn new(
        settings: BearerTokenSettings,
        transport: Arc<dyn HttpTransport>,
        limiter: ApiRateLimiter,
    ) -> Self {
        Self {
            settings,
            transport,
            limiter,
        }
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        let (Some(token_url), Some(refresh_token)) = (
            self.settings.token_url.as_deref(),
            credentials.field("refresh_token"),
        ) else {
            return Err(SourceError::CredentialExpired);
        };

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        if let Some(client_id) = credentials.field("client_id") {
            form.push(("client_id", client_id));
        }

        let response = self
            .transport
            .send(HttpRequest::post_form(token_url, &form))
            .await?;

        match response.status {
            200..=299 => {}
            400 | 401 | 403 => return Err(SourceError::CredentialExpired),
            429 => return Err(SourceError::RateLimited { reset_at: None }),
            status => {
                return Err(SourceError::api(status, response.body_excerpt(200)));
            }
        }

        let body: Value = serde_json::from_slice(&response.body)
            .map_err(|e| SourceError::invalid_response(format!("token response: {}", e)))?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::invalid_response("token response without access_token"))?;

        let mut refreshed = credentials.expose().clone();
        if let Value::Object(map) = &mut refreshed {
            map.insert("access_token".to_string(), json!(access_token));
            if let Some(new_refresh) = body.get("refresh_token").and_then(Value::as_str) {
                map.insert("refresh_token".to_string(), json!(new_refresh));
            }
            match body.get("expires_in").and_then(Value::as_i64) {
                Some(secs) => {
                    let at = Utc::now() + Duration::seconds(secs);
                    map.insert("expires_at".to_string(), json!(at.to_rfc3339()));
                }
                None => {
                    map.remove("expires_at");
                }
            }
        }

        tracing::info!(source = %self.settings.source_id, "Refreshed access token");
        Ok(Credentials::new(refreshed))
    }
}

#[async_trait]
impl CredentialProvider for BearerTokenProvider {
    async fn api_client(&self, credentials: &Credentials, source_config: &Value) -> Result<ApiSession> {
        let (credentials, refreshed) = if credentials.field("access_token").is_none()
            || credentials.is_expired(Utc::now())
        {
            let fresh = self.refresh(credentials).await?;
            (fresh.clone(), Some(fresh))
        } else {
            (credentials.clone(), None)
        };

        let token = credentials
            .field("access_token")
            .ok_or(SourceError::CredentialExpired)?;

        let base_url = source_config
            .get("base_url")
            .and_then(Value::as_str)
            .unwrap_or(&self.settings.base_url);

        let client = JsonApiClient::new(
            &self.settings.source_id,
            base_url,
            token,
            Arc::clone(&self.transport),
            self.settings.client.clone(),
        )?;

        Ok(ApiSession {
            client: Arc::new(RateLimitedClient::with_limiter(client, self.limiter.clone())),
            refreshed_credentials: refreshed,
        })
    }
}
