//! Topic-to-callback dispatch table.
//!
//! Routes incoming messages by exact topic. Wildcard filters can be
//! subscribed to, but only a message whose topic equals the registered
//! string reaches the callback.

use crate::engine::Engine;
use crate::handler::{EventContext, Handler};
use crate::message::Message;
use crate::types::QoS;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

struct Route {
    handler: Arc<dyn Handler>,
    qos: QoS,
}

/// Mapping from topic to the callback registered for it.
#[derive(Default)]
pub struct DispatchTable {
    routes: RwLock<HashMap<String, Route>>,
}

impl DispatchTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`, returning the handler it replaced.
    pub fn insert(
        &self,
        topic: &str,
        qos: QoS,
        handler: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        self.routes
            .write()
            .insert(topic.to_string(), Route { handler, qos })
            .map(|old| old.handler)
    }

    /// Remove `topic`. Returns whether it was registered.
    pub fn remove(&self, topic: &str) -> bool {
        self.routes.write().remove(topic).is_some()
    }

    /// Check if `topic` has a callback.
    pub fn contains(&self, topic: &str) -> bool {
        self.routes.read().contains_key(topic)
    }

    /// Number of registered topics.
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether no topic is registered.
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Registered topics with their subscription QoS.
    pub fn topics(&self) -> Vec<(String, QoS)> {
        self.routes
            .read()
            .iter()
            .map(|(topic, route)| (topic.clone(), route.qos))
            .collect()
    }

    /// Route `msg` to the callback registered for its topic.
    ///
    /// Returns false when no callback is registered; the message is dropped.
    pub fn dispatch(&self, ctx: &EventContext<'_>, msg: &Message) -> bool {
        let handler = self
            .routes
            .read()
            .get(&msg.topic)
            .map(|route| route.handler.clone());

        let Some(handler) = handler else {
            debug!("no handler for topic {}, dropping message", msg.topic);
            return false;
        };

        if let Err(e) = handler.handle_message(ctx, msg) {
            error!("handler for topic {} failed: {}", msg.topic, e);
        }
        true
    }

    /// Re-issue engine subscriptions for every registered topic.
    pub(crate) fn resubscribe(&self, engine: &dyn Engine) {
        for (topic, qos) in self.topics() {
            if let Err(e) = engine.subscribe(&topic, qos) {
                error!("Resubscribe to {} failed: {}", topic, e);
            }
        }
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut topics: Vec<String> = self.routes.read().keys().cloned().collect();
        topics.sort();
        f.debug_struct("DispatchTable").field("topics", &topics).finish()
    }
}
