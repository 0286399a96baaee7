//! Message types: birth/will specs and incoming publications.

use crate::error::{Error, Result};
use crate::types::QoS;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A birth or will message as supplied by the caller.
///
/// Every field is optional so that configuration files can name only the
/// topic. [`MessageTemplate::resolve`] fills the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Topic to publish to. Required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Payload. Defaults to none (an empty publication).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// QoS level. Defaults to 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qos: Option<QoS>,
    /// Retain flag. Defaults to false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retain: Option<bool>,
}

impl MessageTemplate {
    /// Create a template for the given topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Set the QoS level.
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = Some(qos);
        self
    }

    /// Set the retain flag.
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = Some(retain);
        self
    }

    /// Resolve into a [`MessageSpec`], defaulting payload to none, QoS to 0
    /// and retain to false. `kind` names the message in the error.
    pub fn resolve(&self, kind: &str) -> Result<MessageSpec> {
        let topic = self
            .topic
            .clone()
            .ok_or_else(|| Error::Config(format!("{kind} must have a topic")))?;

        Ok(MessageSpec {
            topic,
            payload: self.payload.clone().map(Bytes::from),
            qos: self.qos.unwrap_or_default(),
            retain: self.retain.unwrap_or(false),
        })
    }
}

/// A fully resolved outgoing message, used for birth and will.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSpec {
    /// Topic to publish to.
    pub topic: String,
    /// Payload, `None` publishes an empty message.
    pub payload: Option<Bytes>,
    /// QoS level.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
}

impl MessageSpec {
    /// Default birth message: `clients/{client_id}/connected` = "1", QoS 1, retained.
    ///
    /// A missing client id leaves the segment empty (`clients//connected`).
    pub fn birth(client_id: Option<&str>) -> Self {
        Self::status(client_id, "1")
    }

    /// Default will message: `clients/{client_id}/connected` = "0", QoS 1, retained.
    pub fn will(client_id: Option<&str>) -> Self {
        Self::status(client_id, "0")
    }

    fn status(client_id: Option<&str>, payload: &'static str) -> Self {
        Self {
            topic: format!("clients/{}/connected", client_id.unwrap_or_default()),
            payload: Some(Bytes::from_static(payload.as_bytes())),
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }

    /// Payload bytes, empty when unset.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }
}

/// MQTT message received from a subscription.
#[derive(Debug, Clone)]
pub struct Message {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload.
    pub payload: Bytes,
    /// QoS level.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
    /// Packet ID (for QoS > 0).
    pub packet_id: Option<u16>,
}

impl Message {
    /// Create a new message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            packet_id: None,
        }
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl From<rumqttc::Publish> for Message {
    fn from(publish: rumqttc::Publish) -> Self {
        let packet_id = (publish.pkid != 0).then_some(publish.pkid);
        Self {
            topic: publish.topic,
            payload: publish.payload,
            qos: publish.qos.into(),
            retain: publish.retain,
            packet_id,
        }
    }
}
