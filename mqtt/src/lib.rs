//! MQTT client wrapper.
//!
//! This crate wraps an MQTT protocol engine (rumqttc by default) and adds:
//! - birth and will messages, defaulting to a retained
//!   `clients/{client_id}/connected` status topic
//! - a connect call that waits for the broker to acknowledge
//! - per-topic callbacks ([`Client`]) or a single fixed topic
//!   ([`TopicListener`])
//!
//! # Example - Client
//!
//! ```no_run
//! use iotc_mqtt::{Client, ClientConfig, QoS};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::new()
//!         .with_broker("127.0.0.1", 1883)
//!         .with_client_id("sensor-7");
//!
//!     let client = Client::builder(config)
//!         .with_on_connect(|_ctx, _event| println!("connected"))
//!         .build()?;
//!
//!     client.connect().await?;
//!     client.subscribe_with_qos("sensor-7/cmd", QoS::AtLeastOnce, |_ctx, msg| {
//!         println!("Received: {:?}", msg.payload);
//!         Ok(())
//!     })?;
//!     client.publish("sensor-7/temp", "21.5").await?;
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Example - Listener
//!
//! ```no_run
//! use iotc_mqtt::{ClientBuilder, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = ClientBuilder::new(ClientConfig::new()).listen("doors/#", |_ctx, msg| {
//!         println!("{}: {:?}", msg.topic, msg.payload_str());
//!         Ok(())
//!     })?;
//!
//!     listener.run_forever().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod dispatch;
mod engine;
mod error;
mod handler;
mod listener;
mod message;
#[cfg(test)]
mod mock;
mod rumqtt;
mod session;
#[cfg(test)]
mod tests;
mod types;

pub use client::{Client, ClientBuilder};
pub use config::{
    ClientConfig, Credentials, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT,
    DEFAULT_CONNECT_POLL_INTERVAL, DEFAULT_CONNECT_TIMEOUT, Settings, resolve_threaded,
};
pub use dispatch::DispatchTable;
pub use engine::{
    ConnectEvent, DisconnectEvent, DisconnectReason, Engine, EngineFactory, EventHandler,
};
pub use error::{Error, Result};
pub use handler::{ConnectHook, DisconnectHook, EventContext, Handler, HandlerFunc, Userdata};
pub use listener::TopicListener;
pub use message::{Message, MessageSpec, MessageTemplate};
pub use rumqtt::{RumqttcEngine, RumqttcFactory};
pub use types::QoS;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::{
        Client, ClientBuilder, ClientConfig, Error, EventContext, Handler, Message,
        MessageTemplate, QoS, Result, TopicListener,
    };
}
