//! Shared fixtures: an in-memory paginated source with scripted failures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tributary::entity::connection::HandlerConfig;
use tributary::source::{
    ApiSession, CredentialProvider, Credentials, PageRequest, SourceClient, SourceDefinition,
    SourceError, SourcePage, SourceRegistry,
};
use tributary::sync::{SyncManager, SyncOptions};
use tributary::{HandlerRegistry, connect_and_migrate};

pub const SOURCE: &str = "social";
pub const ACCOUNT: &str = "alice";
pub const CONNECTION_ID: &str = "social:alice";

/// A failure to inject on the next request matching `resource` and `cursor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    CredentialExpired,
    RateLimited,
    ServerError,
}

impl Failure {
    fn into_error(self) -> SourceError {
        match self {
            Failure::CredentialExpired => SourceError::CredentialExpired,
            Failure::RateLimited => SourceError::RateLimited { reset_at: None },
            Failure::ServerError => SourceError::api(503, "unavailable"),
        }
    }
}

/// Resource name to items (newest first), paginated by numeric offset cursors.
#[derive(Default)]
pub struct Feed {
    items: Mutex<HashMap<String, Vec<Value>>>,
    failures: Mutex<Vec<(String, Option<String>, Failure)>>,
    requests: Mutex<Vec<(String, Option<String>)>>,
}

impl Feed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace a resource's items with posts `ids` in the given order.
    pub fn set_posts(&self, ids: impl IntoIterator<Item = u32>) {
        let items = ids
            .into_iter()
            .map(|id| json!({"id": id, "content": format!("post {id}")}))
            .collect();
        self.items.lock().unwrap().insert("posts".to_string(), items);
    }

    pub fn set_contacts(&self, names: &[&str]) {
        let items = names
            .iter()
            .enumerate()
            .map(|(i, name)| json!({"id": format!("c{i}"), "name": name}))
            .collect();
        self.items
            .lock()
            .unwrap()
            .insert("contacts".to_string(), items);
    }

    /// Contacts with numeric ids, so they can collide with post ids.
    pub fn set_numbered_contacts(&self, ids: impl IntoIterator<Item = u32>) {
        let items = ids
            .into_iter()
            .map(|id| json!({"id": id, "name": format!("contact {id}")}))
            .collect();
        self.items
            .lock()
            .unwrap()
            .insert("contacts".to_string(), items);
    }

    /// Add a post at the top of the feed.
    pub fn push_post(&self, id: u32) {
        self.items
            .lock()
            .unwrap()
            .entry("posts".to_string())
            .or_default()
            .insert(0, json!({"id": id, "content": format!("post {id}")}));
    }

    pub fn fail_once(&self, resource: &str, cursor: Option<&str>, failure: Failure) {
        self.failures.lock().unwrap().push((
            resource.to_string(),
            cursor.map(str::to_string),
            failure,
        ));
    }

    /// Every request served so far, as (resource, cursor).
    pub fn requests(&self) -> Vec<(String, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, resource: &str) -> usize {
        self.requests()
            .iter()
            .filter(|(r, _)| r == resource)
            .count()
    }
}

pub struct FeedClient {
    feed: Arc<Feed>,
}

#[async_trait]
impl SourceClient for FeedClient {
    fn source_id(&self) -> &str {
        SOURCE
    }

    async fn fetch_page(&self, request: &PageRequest) -> tributary::source::Result<SourcePage> {
        self.feed
            .requests
            .lock()
            .unwrap()
            .push((request.resource.clone(), request.cursor.clone()));

        {
            let mut failures = self.feed.failures.lock().unwrap();
            if let Some(pos) = failures
                .iter()
                .position(|(r, c, _)| *r == request.resource && *c == request.cursor)
            {
                let (_, _, failure) = failures.remove(pos);
                return Err(failure.into_error());
            }
        }

        let items = self.feed.items.lock().unwrap();
        let all = items.get(&request.resource).cloned().unwrap_or_default();
        let offset: usize = request
            .cursor
            .as_deref()
            .map(|c| c.parse().expect("numeric cursor"))
            .unwrap_or(0);
        let end = (offset + request.page_size as usize).min(all.len());
        let page = all.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();

        Ok(SourcePage {
            items: page,
            next_cursor: (end < all.len()).then(|| end.to_string()),
        })
    }
}

/// Hands out [`FeedClient`]s; credentials with `"revoked": true` are rejected.
pub struct FeedProvider {
    feed: Arc<Feed>,
}

#[async_trait]
impl CredentialProvider for FeedProvider {
    async fn api_client(
        &self,
        credentials: &Credentials,
        _source_config: &Value,
    ) -> tributary::source::Result<ApiSession> {
        if credentials.expose().get("revoked") == Some(&Value::Bool(true)) {
            return Err(SourceError::CredentialExpired);
        }
        Ok(ApiSession {
            client: Arc::new(FeedClient {
                feed: Arc::clone(&self.feed),
            }),
            refreshed_credentials: None,
        })
    }
}

pub fn registry(feed: &Arc<Feed>) -> Arc<SourceRegistry> {
    Arc::new(SourceRegistry::new().with(SourceDefinition::new(
        SOURCE,
        Arc::new(FeedProvider {
            feed: Arc::clone(feed),
        }),
        HandlerRegistry::standard(),
    )))
}

pub async fn setup_db() -> Arc<sea_orm::DatabaseConnection> {
    Arc::new(
        connect_and_migrate("sqlite::memory:")
            .await
            .expect("Failed to create test database"),
    )
}

/// A manager over a fresh database with page size 3.
pub async fn manager(feed: &Arc<Feed>) -> SyncManager {
    manager_with(feed, SyncOptions::default().with_page_size(3)).await
}

pub async fn manager_with(feed: &Arc<Feed>, options: SyncOptions) -> SyncManager {
    SyncManager::new("alice", setup_db().await, registry(feed)).with_options(options)
}

/// Connect the default account with the given handlers.
pub async fn connect(manager: &SyncManager, handlers: &[&str]) {
    manager
        .connect(
            SOURCE,
            ACCOUNT,
            json!({"display_name": "Alice"}),
            json!({"access_token": "t0k3n"}),
            Some(handlers.iter().map(|h| HandlerConfig::enabled(*h)).collect()),
        )
        .await
        .expect("connect");
}
