//! Single-topic listener.
//!
//! Listens to one fixed topic and runs a callback for every message
//! received.

use crate::config::Settings;
use crate::engine::Engine;
use crate::error::Result;
use crate::handler::{EventContext, Handler};
use crate::message::Message;
use crate::session::{Inbox, Session};
use crate::types::QoS;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// Subscription QoS for the listened topic.
const LISTEN_QOS: QoS = QoS::ExactlyOnce;

/// MQTT client bound to a single topic.
///
/// Built with [`ClientBuilder::listen`](crate::ClientBuilder::listen).
pub struct TopicListener {
    session: Arc<Session>,
    inbox: Arc<ListenerInbox>,
}

pub(crate) struct ListenerInbox {
    topic: String,
    handler: Arc<dyn Handler>,
    subscribe_on_connect: AtomicBool,
}

impl TopicListener {
    pub(crate) fn inbox(topic: String, handler: Arc<dyn Handler>) -> Arc<ListenerInbox> {
        Arc::new(ListenerInbox {
            topic,
            handler,
            subscribe_on_connect: AtomicBool::new(false),
        })
    }

    pub(crate) fn new(session: Arc<Session>, inbox: Arc<ListenerInbox>) -> Self {
        Self { session, inbox }
    }

    /// The listened topic.
    pub fn topic(&self) -> &str {
        &self.inbox.topic
    }

    /// Connect and subscribe to the topic. No-op if already connected.
    pub async fn connect(&self) -> Result<()> {
        if self.session.is_connected() {
            return Ok(());
        }

        self.session.connect().await?;
        debug!("subscribing to {}", self.inbox.topic);
        self.session.engine()?.subscribe(&self.inbox.topic, LISTEN_QOS)
    }

    /// Connect and drive the engine loop on the calling task.
    ///
    /// The topic is subscribed from the connect event since this call does
    /// not return while connected.
    pub async fn run_forever(&self) -> Result<()> {
        self.inbox.subscribe_on_connect.store(true, Ordering::SeqCst);
        let result = self.session.run_forever().await;
        self.inbox.subscribe_on_connect.store(false, Ordering::SeqCst);
        result
    }

    /// Stop the engine loop and close the connection. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Resolved settings.
    pub fn settings(&self) -> &Settings {
        self.session.settings()
    }

    /// Whether an engine connection is open, connected or not.
    pub fn has_engine(&self) -> bool {
        self.session.has_engine()
    }
}

impl Inbox for ListenerInbox {
    fn deliver(&self, ctx: &EventContext<'_>, msg: &Message) {
        if let Err(e) = self.handler.handle_message(ctx, msg) {
            error!("handler for topic {} failed: {}", msg.topic, e);
        }
    }

    fn on_connected(&self, engine: &dyn Engine) {
        if self.subscribe_on_connect.load(Ordering::SeqCst) {
            if let Err(e) = engine.subscribe(&self.topic, LISTEN_QOS) {
                error!("subscribe to {} failed: {}", self.topic, e);
            }
        }
    }
}
