//! Wire boundary between sources and the network.
//!
//! Page fetches and token refreshes are expressed as plain [`HttpRequest`]
//! values and handed to an [`HttpTransport`]. The reqwest implementation sits
//! behind the `http` feature; unit tests script responses with
//! `MockTransport` instead.

use async_trait::async_trait;
use thiserror::Error;

/// The verbs sources need: GET for pages, POST for token refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// Ordered header list. Lookups ignore case.
pub type Headers = Vec<(String, String)>;

/// Find the first value for `name`, ignoring case.
#[must_use]
pub fn header_get<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find_map(|(k, v)| k.eq_ignore_ascii_case(name).then_some(v.as_str()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// A bodiless GET.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// A POST carrying `form` as `application/x-www-form-urlencoded`.
    #[must_use]
    pub fn post_form(url: impl Into<String>, form: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: Headers::new(),
            body: encoded.into_bytes(),
        }
        .header("Content-Type", "application/x-www-form-urlencoded")
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Append `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// At most `limit` characters of the body, lossily decoded. Used for
    /// error messages so a large HTML error page does not flood the log.
    #[must_use]
    pub fn body_excerpt(&self, limit: usize) -> String {
        String::from_utf8_lossy(&self.body).chars().take(limit).collect()
    }

    /// A response with a JSON body.
    #[must_use]
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Connect { url: String, message: String },

    #[error("could not build HTTP client: {0}")]
    Client(String),

    #[error("no scripted response for {method} {url}")]
    Unscripted { method: HttpMethod, url: String },
}

/// Sends requests on behalf of sources and credential providers.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

#[cfg(feature = "http")]
pub use reqwest_transport::ReqwestTransport;

#[cfg(feature = "http")]
mod reqwest_transport {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{Headers, HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

    /// [`HttpTransport`] over a shared reqwest client.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        /// A client whose requests give up after `timeout`.
        pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map(Self::new)
                .map_err(|e| HttpError::Client(e.to_string()))
        }
    }

    fn classify(url: &str, err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            HttpError::Timeout {
                url: url.to_string(),
            }
        } else {
            HttpError::Connect {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let HttpRequest {
                method,
                url,
                headers,
                body,
            } = request;

            let mut builder = match method {
                HttpMethod::Get => self.client.get(&url),
                HttpMethod::Post => self.client.post(&url).body(body),
            };
            for (name, value) in headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| classify(&url, e))?;

            let status = response.status().as_u16();
            let headers: Headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response
                .bytes()
                .await
                .map_err(|e| classify(&url, e))?
                .to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
pub use mock::MockTransport;

#[cfg(test)]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use async_trait::async_trait;

    use super::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

    #[derive(Default)]
    struct Script {
        responses: HashMap<(HttpMethod, String), VecDeque<HttpResponse>>,
        sent: Vec<HttpRequest>,
    }

    /// Scripted transport: responses are queued per method and URL and
    /// served in order. Every request is recorded.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        script: Arc<Mutex<Script>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn script(&self) -> MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub fn push_response(
            &self,
            method: HttpMethod,
            url: impl Into<String>,
            response: HttpResponse,
        ) {
            self.script()
                .responses
                .entry((method, url.into()))
                .or_default()
                .push_back(response);
        }

        /// Requests sent so far, oldest first.
        pub fn requests(&self) -> Vec<HttpRequest> {
            self.script().sent.clone()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut script = self.script();
            let key = (request.method, request.url.clone());
            script.sent.push(request);

            script
                .responses
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
                .ok_or(HttpError::Unscripted {
                    method: key.0,
                    url: key.1,
                })
        }
    }
}
