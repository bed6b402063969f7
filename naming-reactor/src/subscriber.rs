use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use dashmap::DashMap;
use shared::types::{ServiceInfo, ServiceKey};

/// Receives every snapshot the reactor publishes as a change.
/// Fire-and-forget: the reactor neither waits on nor retries a sink.
pub trait SubscriptionSink: Send + Sync {
    fn service_changed(&self, service: &ServiceInfo);
}

pub type Listener = Arc<dyn Fn(&ServiceInfo) + Send + Sync>;

/// Per-service listener registry.
#[derive(Default)]
pub struct Subscribers {
    listeners: DashMap<ServiceKey, Vec<Listener>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, name: &str, clusters: &str, listener: Listener) {
        self.listeners
            .entry(ServiceKey::new(name, clusters))
            .or_default()
            .push(listener);
    }

    pub fn unsubscribe_all(&self, name: &str, clusters: &str) {
        self.listeners.remove(&ServiceKey::new(name, clusters));
    }

    pub fn is_subscribed(&self, name: &str, clusters: &str) -> bool {
        self.listeners
            .get(&ServiceKey::new(name, clusters))
            .is_some_and(|l| !l.is_empty())
    }
}

impl SubscriptionSink for Subscribers {
    fn service_changed(&self, service: &ServiceInfo) {
        // Clone out so listeners run without holding the shard lock
        let listeners = match self.listeners.get(&service.key()) {
            Some(entry) => entry.value().clone(),
            None => return,
        };

        tracing::debug!(service = %service.key(), listeners = listeners.len(), "Notifying subscribers");
        for listener in listeners {
            // A panicking listener must not starve the others or unwind
            // into the reactor
            if catch_unwind(AssertUnwindSafe(|| listener(service))).is_err() {
                tracing::error!(service = %service.key(), "Subscriber listener panicked");
            }
        }
    }
}
