//! Error types for the MQTT client wrapper.

use std::time::Duration;
use thiserror::Error;

/// Error type for MQTT client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The client configuration was rejected at construction.
    #[error("mqtt: invalid configuration: {0}")]
    Config(String),

    /// The broker did not acknowledge the connection in time.
    #[error("mqtt: timeout waiting to connect to broker after {0:?}")]
    ConnectionTimeout(Duration),

    /// No engine connection is open.
    #[error("mqtt: not connected")]
    NotConnected,

    /// QoS level outside 0..=2.
    #[error("mqtt: invalid qos level: {0}")]
    InvalidQoS(u8),

    /// Protocol engine failure.
    #[error("mqtt: engine error: {0}")]
    Engine(String),

    /// Message callback error.
    #[error("mqtt: handler error: {0}")]
    Handler(String),

    /// Client error from rumqttc.
    #[error("mqtt client error: {0}")]
    ClientError(#[from] rumqttc::ClientError),

    /// Connection error from rumqttc.
    #[error("mqtt connection error: {0}")]
    ConnectionError(#[from] rumqttc::ConnectionError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML config parse error.
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON config parse error.
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error was raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::InvalidQoS(_))
    }
}

/// Result type for MQTT operations.
pub type Result<T> = std::result::Result<T, Error>;
