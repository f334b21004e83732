//! Event subscribers.

use std::{borrow::Cow, collections::HashMap, fmt::Debug, future::Future, sync::Arc};

use super::Event;

/// Subscriber can be registered to [`Handlers`] and process events.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    /// subscriber name
    fn name(&self) -> Cow<'static, str>;
    /// callback will be executed on its own task for every subscribed event
    async fn on_event(self: Arc<Self>, event: Arc<Event>);
}

#[async_trait::async_trait]
impl<F, Fut> Subscriber for F
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    fn name(&self) -> Cow<'static, str> {
        "Anonymous Fn Subscriber".into()
    }

    async fn on_event(self: Arc<Self>, event: Arc<Event>) {
        self(event).await
    }
}

/// Registry of subscribers keyed by lower cased event name
#[derive(Clone, Default)]
pub struct Handlers {
    subscribers: HashMap<String, Vec<Arc<dyn Subscriber>>>,
}

impl Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (event, subscribers) in self.subscribers.iter() {
            map.entry(
                event,
                &subscribers.iter().map(|s| s.name()).collect::<Vec<_>>(),
            );
        }
        map.finish()
    }
}

impl Handlers {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe an event by name, like `chat` or `disconnect`
    pub fn on<S>(mut self, event: &str, subscriber: S) -> Self
    where
        S: Subscriber + 'static,
    {
        let event = event.to_lowercase();
        log::debug!("Register subscriber {} for event {}", subscriber.name(), event);
        self.subscribers
            .entry(event)
            .or_default()
            .push(Arc::new(subscriber));
        self
    }

    /// Check if any subscriber is registered for the event
    pub fn contains(&self, event: &str) -> bool {
        self.subscribers.contains_key(&event.to_lowercase())
    }

    /// Run every subscriber of the event on its own task
    pub(crate) fn dispatch(&self, event: &Arc<Event>) {
        let subscribers = match self.subscribers.get(event.name()) {
            Some(s) => s,
            None => return,
        };

        for subscriber in subscribers {
            log::trace!(
                "Schedule subscriber {} for event {}",
                subscriber.name(),
                event.name()
            );
            tokio::spawn(Arc::clone(subscriber).on_event(Arc::clone(event)));
        }
    }
}
