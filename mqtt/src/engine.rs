//! Protocol engine capability.
//!
//! The wrapper never speaks MQTT itself. All network I/O goes through an
//! [`Engine`] opened by an [`EngineFactory`]; the engine reports broker
//! events back through an [`EventHandler`].

use crate::error::Result;
use crate::message::{Message, MessageSpec};
use crate::types::QoS;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens engine connections.
pub trait EngineFactory: Send + Sync {
    /// Create a new, unconnected engine for `client_id`.
    ///
    /// `None` leaves identity selection to the engine.
    fn open(&self, client_id: Option<&str>) -> Result<Arc<dyn Engine>>;
}

/// A single connection handle to a protocol engine.
///
/// `publish`, `subscribe` and `unsubscribe` only enqueue requests and never
/// wait on the network, so they are safe to call from event callbacks.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Register the receiver for connect, disconnect and message events.
    fn set_handler(&self, handler: Arc<dyn EventHandler>);

    /// Configure credentials. Must precede [`Engine::connect`].
    fn set_credentials(&self, username: &str, password: Option<&str>) -> Result<()>;

    /// Configure the will message. Must precede [`Engine::connect`].
    fn set_will(&self, will: &MessageSpec) -> Result<()>;

    /// Initiate the network connection to `host:port`.
    fn connect(&self, host: &str, port: u16) -> Result<()>;

    /// Run the event loop in the background.
    fn start_loop(&self) -> Result<()>;

    /// Run the event loop on the calling task until it stops.
    async fn run_loop(&self) -> Result<()>;

    /// Stop a background event loop. No-op if none is running.
    async fn stop_loop(&self) -> Result<()>;

    /// Close the connection.
    async fn close(&self) -> Result<()>;

    /// Subscribe to `topic`.
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;

    /// Unsubscribe from `topic`.
    fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Publish `payload` to `topic`. `None` publishes an empty message.
    fn publish(&self, topic: &str, payload: Option<&[u8]>, qos: QoS, retain: bool) -> Result<()>;
}

/// Receives engine events. Called from whatever task drives the engine loop.
pub trait EventHandler: Send + Sync {
    /// The broker accepted the connection.
    fn on_connect(&self, engine: &dyn Engine, event: &ConnectEvent);

    /// The connection ended.
    fn on_disconnect(&self, engine: &dyn Engine, event: &DisconnectEvent);

    /// A publication arrived.
    fn on_message(&self, engine: &dyn Engine, msg: &Message);
}

/// Broker connection acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectEvent {
    /// The broker resumed an existing session.
    pub session_present: bool,
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client closed the connection.
    Requested,
    /// The transport failed or the broker dropped the client.
    Lost(String),
}

/// Connection teardown notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectEvent {
    /// Why the connection ended.
    pub reason: DisconnectReason,
}

impl DisconnectEvent {
    /// A caller-requested disconnect.
    pub fn requested() -> Self {
        Self {
            reason: DisconnectReason::Requested,
        }
    }

    /// An unexpected disconnect.
    pub fn lost(cause: impl Into<String>) -> Self {
        Self {
            reason: DisconnectReason::Lost(cause.into()),
        }
    }

    /// Whether the caller asked for this disconnect.
    pub fn is_requested(&self) -> bool {
        self.reason == DisconnectReason::Requested
    }
}
