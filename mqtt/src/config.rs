//! Client configuration.
//!
//! [`ClientConfig`] is what callers build or load from a YAML/JSON file.
//! [`ClientConfig::resolve`] validates it once and produces the immutable
//! [`Settings`] a client runs with.

use crate::error::{Error, Result};
use crate::message::{MessageSpec, MessageTemplate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default broker host.
pub const DEFAULT_BROKER_HOST: &str = "127.0.0.1";
/// Default broker port (unsecured MQTT).
pub const DEFAULT_BROKER_PORT: u16 = 1883;
/// Default time to wait for the broker to acknowledge a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default interval between connection state checks while waiting.
pub const DEFAULT_CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Caller-facing client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Broker host address.
    pub broker_host: String,
    /// Broker port.
    pub broker_port: u16,
    /// Client identifier sent to the broker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password. Requires a username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Message published on every successful connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_message: Option<MessageTemplate>,
    /// Message the broker publishes if the client drops unexpectedly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_message: Option<MessageTemplate>,
    /// Run the engine loop in the background. See [`resolve_threaded`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threaded: Option<bool>,
    /// Connection acknowledgement timeout.
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Duration,
    /// Connection state polling interval.
    #[serde(rename = "connect_poll_interval_ms", with = "millis")]
    pub connect_poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_host: DEFAULT_BROKER_HOST.to_string(),
            broker_port: DEFAULT_BROKER_PORT,
            client_id: None,
            username: None,
            password: None,
            birth_message: None,
            will_message: None,
            threaded: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connect_poll_interval: DEFAULT_CONNECT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broker address.
    pub fn with_broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.broker_host = host.into();
        self.broker_port = port;
        self
    }

    /// Set the client ID.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Set the username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the birth message.
    pub fn with_birth_message(mut self, message: impl Into<MessageTemplate>) -> Self {
        self.birth_message = Some(message.into());
        self
    }

    /// Set the will message.
    pub fn with_will_message(mut self, message: impl Into<MessageTemplate>) -> Self {
        self.will_message = Some(message.into());
        self
    }

    /// Set the threaded flag.
    pub fn with_threaded(mut self, threaded: bool) -> Self {
        self.threaded = Some(threaded);
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the connection polling interval.
    pub fn with_connect_poll_interval(mut self, interval: Duration) -> Self {
        self.connect_poll_interval = interval;
        self
    }

    /// Load a config from a YAML or JSON file.
    ///
    /// The format follows the file extension; anything else is tried as
    /// YAML first, then JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Self::parse(&data, path)
    }

    /// Parse config data, choosing the format from `path`'s extension.
    pub fn parse(data: &[u8], path: impl AsRef<Path>) -> Result<Self> {
        let ext = path
            .as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_slice(data)?),
            Some("json") => Ok(serde_json::from_slice(data)?),
            _ => match serde_yaml::from_slice(data) {
                Ok(v) => Ok(v),
                Err(yaml_err) => serde_json::from_slice(data).map_err(|_| yaml_err.into()),
            },
        }
    }

    /// Validate and resolve into [`Settings`].
    pub fn resolve(&self) -> Result<Settings> {
        let credentials = match (&self.username, &self.password) {
            (None, Some(_)) => {
                return Err(Error::Config(
                    "must provide username if using password".to_string(),
                ));
            }
            (Some(username), password) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, None) => None,
        };

        if self.client_id.as_deref() == Some("") {
            return Err(Error::Config("client_id must not be empty".to_string()));
        }
        if self.connect_poll_interval.is_zero() {
            return Err(Error::Config(
                "connect_poll_interval must be positive".to_string(),
            ));
        }

        let client_id = self.client_id.as_deref();
        let birth_message = match &self.birth_message {
            Some(template) => template.resolve("birth_message")?,
            None => MessageSpec::birth(client_id),
        };
        let will_message = match &self.will_message {
            Some(template) => template.resolve("will_message")?,
            None => MessageSpec::will(client_id),
        };

        Ok(Settings {
            broker_host: self.broker_host.clone(),
            broker_port: self.broker_port,
            client_id: self.client_id.clone(),
            credentials,
            birth_message,
            will_message,
            threaded: resolve_threaded(self.threaded),
            connect_timeout: self.connect_timeout,
            connect_poll_interval: self.connect_poll_interval,
        })
    }
}

/// Resolve the threaded flag.
///
/// An absent or `false` value falls back to threaded mode, so this always
/// returns `true`. The blocking loop is reached through `run_forever`
/// instead.
pub fn resolve_threaded(_requested: Option<bool>) -> bool {
    true
}

/// Broker credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Optional password.
    pub password: Option<String>,
}

/// Validated client settings, fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Broker host address.
    pub broker_host: String,
    /// Broker port.
    pub broker_port: u16,
    /// Client identifier, `None` lets the engine pick one.
    pub client_id: Option<String>,
    /// Credentials, if a username was given.
    pub credentials: Option<Credentials>,
    /// Birth message.
    pub birth_message: MessageSpec,
    /// Will message.
    pub will_message: MessageSpec,
    /// Whether `connect` starts a background loop.
    pub threaded: bool,
    /// Connection acknowledgement timeout.
    pub connect_timeout: Duration,
    /// Connection state polling interval.
    pub connect_poll_interval: Duration,
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
