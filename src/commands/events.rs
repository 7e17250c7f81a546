use crate::models::metrics::SharedMetrics;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use uuid::Uuid;

pub type SubscriptionId = Uuid;

type EventHandler = Arc<dyn Fn(&PlannerEvent) + Send + Sync>;

#[derive(Debug, Clone)]
pub enum PlannerEvent {
    /// The graph compiler finished; carries no payload.
    GraphCompilationUpdated,
    MetricsChanged(SharedMetrics),
    BusyChanged(bool),
}

/// In-process pub/sub hub shared between the graph compiler, the metrics
/// coordinator and the UI.
#[derive(Default)]
pub struct EventAggregator {
    handlers: RwLock<Vec<(SubscriptionId, EventHandler)>>,
}

impl EventAggregator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PlannerEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        log::debug!("subscription {id} registered");
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if removed {
            log::debug!("subscription {id} removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Deliver `event` to every subscriber on the calling thread.
    pub fn publish(&self, event: &PlannerEvent) {
        // Handlers may (un)subscribe while being called.
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(event);
        }
    }

    /// Deliver `event` on a fresh background thread.
    pub fn publish_on_worker(self: &Arc<Self>, event: PlannerEvent) -> std::io::Result<JoinHandle<()>> {
        let aggregator = Arc::clone(self);
        std::thread::Builder::new()
            .name("planlens-events".to_string())
            .spawn(move || aggregator.publish(&event))
    }
}

impl std::fmt::Debug for EventAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventAggregator")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
