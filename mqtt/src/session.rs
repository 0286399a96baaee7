//! Connection lifecycle shared by [`Client`](crate::Client) and
//! [`TopicListener`](crate::TopicListener).
//!
//! Connection state is only ever written from engine events. `connect`
//! asks the engine to connect and then polls that state until the broker
//! confirms or the timeout passes.

use crate::config::Settings;
use crate::engine::{ConnectEvent, DisconnectEvent, Engine, EngineFactory, EventHandler};
use crate::error::{Error, Result};
use crate::handler::{ConnectHook, DisconnectHook, EventContext, Userdata};
use crate::message::Message;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Receives the messages and connect notifications of one client variant.
pub(crate) trait Inbox: Send + Sync {
    /// Deliver an incoming message.
    fn deliver(&self, ctx: &EventContext<'_>, msg: &Message);

    /// Called after the birth message on every connect event.
    fn on_connected(&self, _engine: &dyn Engine) {}
}

/// Caller hooks and userdata.
#[derive(Default)]
pub(crate) struct Hooks {
    pub(crate) on_connect: Option<Box<ConnectHook>>,
    pub(crate) on_disconnect: Option<Box<DisconnectHook>>,
    pub(crate) userdata: Option<Userdata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopMode {
    Threaded,
    Blocking,
}

pub(crate) struct Session {
    settings: Settings,
    factory: Arc<dyn EngineFactory>,
    hooks: Hooks,
    inbox: Arc<dyn Inbox>,
    connected: AtomicBool,
    engine: Mutex<Option<Arc<dyn Engine>>>,
}

impl Session {
    pub(crate) fn new(
        settings: Settings,
        factory: Arc<dyn EngineFactory>,
        hooks: Hooks,
        inbox: Arc<dyn Inbox>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            factory,
            hooks,
            inbox,
            connected: AtomicBool::new(false),
            engine: Mutex::new(None),
        })
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The current engine handle.
    pub(crate) fn engine(&self) -> Result<Arc<dyn Engine>> {
        self.engine.lock().clone().ok_or(Error::NotConnected)
    }

    pub(crate) fn has_engine(&self) -> bool {
        self.engine.lock().is_some()
    }

    /// Connect unless already connected.
    pub(crate) async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.is_connected() {
            debug!("already connected, skipping connect");
            return Ok(());
        }

        let mode = if self.settings.threaded {
            LoopMode::Threaded
        } else {
            LoopMode::Blocking
        };
        self.start(mode).await
    }

    /// Connect and drive the engine loop on the calling task until it ends.
    pub(crate) async fn run_forever(self: &Arc<Self>) -> Result<()> {
        self.start(LoopMode::Blocking).await
    }

    async fn start(self: &Arc<Self>, mode: LoopMode) -> Result<()> {
        self.release_stale().await;
        let engine = self.open()?;

        match mode {
            LoopMode::Threaded => {
                engine.start_loop()?;
                self.wait_connected().await
            }
            LoopMode::Blocking => {
                debug!("running engine loop on the calling task");
                engine.run_loop().await
            }
        }
    }

    fn open(self: &Arc<Self>) -> Result<Arc<dyn Engine>> {
        let settings = &self.settings;
        let engine = self.factory.open(settings.client_id.as_deref())?;

        engine.set_handler(Arc::new(SessionEvents {
            session: Arc::downgrade(self),
        }));
        engine.set_will(&settings.will_message)?;
        if let Some(credentials) = &settings.credentials {
            engine.set_credentials(&credentials.username, credentials.password.as_deref())?;
        }

        info!(
            "Connecting to mqtt://{}:{}",
            settings.broker_host, settings.broker_port
        );
        engine.connect(&settings.broker_host, settings.broker_port)?;

        *self.engine.lock() = Some(engine.clone());
        Ok(engine)
    }

    async fn wait_connected(&self) -> Result<()> {
        let timeout = self.settings.connect_timeout;
        let start = Instant::now();

        while !self.is_connected() {
            if start.elapsed() > timeout {
                warn!("timeout waiting to connect to MQTT broker");
                return Err(Error::ConnectionTimeout(timeout));
            }
            tokio::time::sleep(self.settings.connect_poll_interval).await;
        }
        Ok(())
    }

    /// Tear down an engine left over from a dropped or timed out connection.
    async fn release_stale(&self) {
        let stale = self.engine.lock().take();
        if let Some(engine) = stale {
            debug!("releasing stale engine before reconnecting");
            if let Err(e) = shutdown(engine.as_ref()).await {
                warn!("failed to release stale engine: {}", e);
            }
        }
    }

    /// Stop the engine loop and close the connection.
    ///
    /// The engine reference is cleared even when no connection existed or
    /// teardown fails.
    pub(crate) async fn disconnect(&self) -> Result<()> {
        let engine = self.engine.lock().take();
        match engine {
            Some(engine) => {
                info!("Disconnecting from MQTT broker");
                shutdown(engine.as_ref()).await
            }
            None => Ok(()),
        }
    }

    fn context<'a>(&'a self, engine: &'a dyn Engine) -> EventContext<'a> {
        EventContext::new(engine, self.hooks.userdata.as_ref())
    }

    fn handle_connect(&self, engine: &dyn Engine, event: &ConnectEvent) {
        self.connected.store(true, Ordering::SeqCst);

        let birth = &self.settings.birth_message;
        match engine.publish(&birth.topic, birth.payload.as_deref(), birth.qos, birth.retain) {
            Ok(()) => debug!("published birth message to {}", birth.topic),
            Err(e) => error!("failed to publish birth message: {}", e),
        }

        self.inbox.on_connected(engine);

        if let Some(hook) = &self.hooks.on_connect {
            hook(&self.context(engine), event);
        }
    }

    fn handle_disconnect(&self, engine: &dyn Engine, event: &DisconnectEvent) {
        self.connected.store(false, Ordering::SeqCst);
        if event.is_requested() {
            debug!("connection closed");
        } else {
            warn!("connection lost: {:?}", event.reason);
        }

        if let Some(hook) = &self.hooks.on_disconnect {
            hook(&self.context(engine), event);
        }
    }
}

async fn shutdown(engine: &dyn Engine) -> Result<()> {
    let stopped = engine.stop_loop().await;
    let closed = engine.close().await;
    stopped.and(closed)
}

/// Engine-facing bridge. Holds the session weakly so the engine's handler
/// does not keep a dropped client alive.
struct SessionEvents {
    session: Weak<Session>,
}

impl EventHandler for SessionEvents {
    fn on_connect(&self, engine: &dyn Engine, event: &ConnectEvent) {
        if let Some(session) = self.session.upgrade() {
            session.handle_connect(engine, event);
        }
    }

    fn on_disconnect(&self, engine: &dyn Engine, event: &DisconnectEvent) {
        if let Some(session) = self.session.upgrade() {
            session.handle_disconnect(engine, event);
        }
    }

    fn on_message(&self, engine: &dyn Engine, msg: &Message) {
        if let Some(session) = self.session.upgrade() {
            session.inbox.deliver(&session.context(engine), msg);
        }
    }
}
