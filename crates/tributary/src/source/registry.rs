use std::collections::BTreeMap;
use std::sync::Arc;

use crate::handler::HandlerRegistry;

use super::credentials::CredentialProvider;

/// Everything the engine needs to sync one kind of source.
#[derive(Clone)]
pub struct SourceDefinition {
    pub id: String,
    pub credentials: Arc<dyn CredentialProvider>,
    pub handlers: HandlerRegistry,
}

impl SourceDefinition {
    pub fn new(
        id: impl Into<String>,
        credentials: Arc<dyn CredentialProvider>,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            id: id.into(),
            credentials,
            handlers,
        }
    }
}

impl std::fmt::Debug for SourceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDefinition")
            .field("id", &self.id)
            .field("handlers", &self.handlers.ids())
            .finish_non_exhaustive()
    }
}

/// Source id to definition. Built once at startup and shared.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: BTreeMap<String, SourceDefinition>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source, replacing any previous definition with the same id.
    pub fn register(&mut self, definition: SourceDefinition) {
        self.sources.insert(definition.id.clone(), definition);
    }

    #[must_use]
    pub fn with(mut self, definition: SourceDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn get(&self, id: &str) -> Option<&SourceDefinition> {
        self.sources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// Registered source ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
