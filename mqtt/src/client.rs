//! Multi-topic MQTT client.
//!
//! Provides a client for connecting to MQTT brokers with:
//! - Birth and will messages
//! - Per-topic callbacks via a dispatch table
//! - Lazy connection on publish

use crate::config::{ClientConfig, Settings};
use crate::dispatch::DispatchTable;
use crate::engine::{ConnectEvent, DisconnectEvent, Engine, EngineFactory};
use crate::error::Result;
use crate::handler::{EventContext, FnHandler, Handler};
use crate::listener::TopicListener;
use crate::message::Message;
use crate::rumqtt::RumqttcFactory;
use crate::session::{Hooks, Inbox, Session};
use crate::types::QoS;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Builds a [`Client`] or a [`TopicListener`].
///
/// Configuration is validated when the client is built.
pub struct ClientBuilder {
    config: ClientConfig,
    factory: Option<Arc<dyn EngineFactory>>,
    hooks: Hooks,
}

impl ClientBuilder {
    /// Create a builder for `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            factory: None,
            hooks: Hooks::default(),
        }
    }

    /// Use a specific engine factory. Defaults to [`RumqttcFactory`].
    pub fn with_factory(mut self, factory: impl EngineFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Set the on_connect callback.
    pub fn with_on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn(&EventContext<'_>, &ConnectEvent) + Send + Sync + 'static,
    {
        self.hooks.on_connect = Some(Box::new(f));
        self
    }

    /// Set the on_disconnect callback.
    pub fn with_on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn(&EventContext<'_>, &DisconnectEvent) + Send + Sync + 'static,
    {
        self.hooks.on_disconnect = Some(Box::new(f));
        self
    }

    /// Attach a value every callback can read through
    /// [`EventContext::userdata`].
    pub fn with_userdata<T: Any + Send + Sync>(mut self, userdata: T) -> Self {
        self.hooks.userdata = Some(Arc::new(userdata));
        self
    }

    /// Build a multi-topic [`Client`].
    pub fn build(self) -> Result<Client> {
        let routes = Arc::new(DispatchTable::new());
        let session = self.into_session(routes.clone())?;
        Ok(Client { session, routes })
    }

    /// Build a single-topic [`TopicListener`] that hands every message to `f`.
    pub fn listen<F>(self, topic: impl Into<String>, f: F) -> Result<TopicListener>
    where
        F: Fn(&EventContext<'_>, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.listen_handler(topic, Arc::new(FnHandler::new(f)))
    }

    /// Build a single-topic [`TopicListener`] with a [`Handler`].
    pub fn listen_handler(
        self,
        topic: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<TopicListener> {
        let inbox = TopicListener::inbox(topic.into(), handler);
        let session = self.into_session(inbox.clone())?;
        Ok(TopicListener::new(session, inbox))
    }

    fn into_session(self, inbox: Arc<dyn Inbox>) -> Result<Arc<Session>> {
        let settings = self.config.resolve()?;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(RumqttcFactory::new()));
        Ok(Session::new(settings, factory, self.hooks, inbox))
    }
}

/// MQTT client with per-topic callbacks.
pub struct Client {
    session: Arc<Session>,
    routes: Arc<DispatchTable>,
}

impl Client {
    /// Create a client for `config` using the rumqttc engine and no hooks.
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(config).build()
    }

    /// Start building a client.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Connect to the broker. No-op if already connected.
    ///
    /// Returns once the broker has acknowledged the connection, or fails
    /// with [`Error::ConnectionTimeout`](crate::Error::ConnectionTimeout).
    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    /// Connect and drive the engine loop on the calling task.
    ///
    /// Does not return while the connection is up. Replaces any existing
    /// connection.
    pub async fn run_forever(&self) -> Result<()> {
        self.session.run_forever().await
    }

    /// Stop the engine loop and close the connection. Safe to call repeatedly.
    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Resolved settings, including the effective birth and will messages.
    pub fn settings(&self) -> &Settings {
        self.session.settings()
    }

    /// The topic dispatch table.
    pub fn dispatch_table(&self) -> &DispatchTable {
        &self.routes
    }

    /// Subscribe to `topic` at QoS 0 and route its messages to `f`.
    pub fn subscribe<F>(&self, topic: &str, f: F) -> Result<()>
    where
        F: Fn(&EventContext<'_>, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_with_qos(topic, QoS::AtMostOnce, f)
    }

    /// Subscribe to `topic` at `qos` and route its messages to `f`.
    pub fn subscribe_with_qos<F>(&self, topic: &str, qos: QoS, f: F) -> Result<()>
    where
        F: Fn(&EventContext<'_>, &Message) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_handler(topic, qos, Arc::new(FnHandler::new(f)))
    }

    /// Subscribe to `topic` with a [`Handler`].
    ///
    /// Subscribing again replaces the previous callback.
    pub fn subscribe_handler(&self, topic: &str, qos: QoS, handler: Arc<dyn Handler>) -> Result<()> {
        let engine = self.session.engine()?;
        engine.subscribe(topic, qos)?;
        if self.routes.insert(topic, qos, handler).is_some() {
            debug!("replaced callback for topic {}", topic);
        }
        Ok(())
    }

    /// Unsubscribe from `topic`. No-op if it was never subscribed.
    pub fn unsubscribe(&self, topic: &str) -> Result<()> {
        if !self.routes.contains(topic) {
            return Ok(());
        }

        let engine = self.session.engine()?;
        engine.unsubscribe(topic)?;
        self.routes.remove(topic);
        Ok(())
    }

    /// Publish `payload` to `topic` at QoS 0, connecting first if needed.
    pub async fn publish(&self, topic: &str, payload: impl AsRef<[u8]>) -> Result<()> {
        self.publish_with(topic, payload, QoS::AtMostOnce, false).await
    }

    /// Publish with explicit QoS and retain flag, connecting first if needed.
    pub async fn publish_with(
        &self,
        topic: &str,
        payload: impl AsRef<[u8]>,
        qos: QoS,
        retain: bool,
    ) -> Result<()> {
        if !self.is_connected() {
            self.connect().await?;
        }

        self.session
            .engine()?
            .publish(topic, Some(payload.as_ref()), qos, retain)
    }
}

impl Inbox for DispatchTable {
    fn deliver(&self, ctx: &EventContext<'_>, msg: &Message) {
        self.dispatch(ctx, msg);
    }

    fn on_connected(&self, engine: &dyn Engine) {
        self.resubscribe(engine);
    }
}
