//! Publish command.

use clap::Args;
use iotc_mqtt::Client;
use tracing::info;

use super::{client_config, parse_qos};
use crate::Cli;

/// Publish one message, connecting first.
#[derive(Args)]
pub struct PublishCommand {
    /// Topic to publish to
    topic: String,

    /// Message payload
    message: String,

    /// QoS level (0, 1 or 2)
    #[arg(short = 'q', long, default_value_t = 0)]
    qos: u8,

    /// Retain the message
    #[arg(short = 'r', long)]
    retain: bool,
}

impl PublishCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let qos = parse_qos(self.qos)?;
        let client = Client::new(client_config(cli)?)?;

        client
            .publish_with(&self.topic, &self.message, qos, self.retain)
            .await?;
        info!("Published to '{}'", self.topic);

        client.disconnect().await?;
        Ok(())
    }
}
