use std::sync::Arc;

use super::walk::{PagedHandler, RecordMapper};
use super::{ContactsMapper, DataHandler, HandlerSettings, MessagesMapper, PostsMapper};

/// Builds a handler from its per-connection settings.
pub type HandlerFactory = Arc<dyn Fn(HandlerSettings) -> Box<dyn DataHandler> + Send + Sync>;

/// Handler id to factory, in registration order.
///
/// Registration order is the default handler order for new connections.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    entries: Vec<(String, HandlerFactory)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts, messages and contacts.
    pub fn standard() -> Self {
        Self::new()
            .with_mapper(PostsMapper)
            .with_mapper(MessagesMapper)
            .with_mapper(ContactsMapper)
    }

    /// Register a factory, replacing any previous one with the same id.
    pub fn register(&mut self, id: impl Into<String>, factory: HandlerFactory) {
        let id = id.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = factory,
            None => self.entries.push((id, factory)),
        }
    }

    #[must_use]
    pub fn with(mut self, id: impl Into<String>, factory: HandlerFactory) -> Self {
        self.register(id, factory);
        self
    }

    /// Register a [`PagedHandler`] over `mapper`.
    #[must_use]
    pub fn with_mapper<M>(self, mapper: M) -> Self
    where
        M: RecordMapper + Clone + 'static,
    {
        let id = mapper.handler_id();
        self.with(
            id,
            Arc::new(move |settings: HandlerSettings| -> Box<dyn DataHandler> {
                Box::new(PagedHandler::new(mapper.clone(), settings))
            }),
        )
    }

    pub fn get(&self, id: &str) -> Option<&HandlerFactory> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, factory)| factory)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Instantiate a handler.
    pub fn build(&self, id: &str, settings: HandlerSettings) -> Option<Box<dyn DataHandler>> {
        self.get(id).map(|factory| factory(settings))
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|(id, _)| id.as_str()).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.ids())
            .finish()
    }
}
