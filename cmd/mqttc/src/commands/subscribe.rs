//! Subscribe command.

use anyhow::bail;
use clap::Args;
use iotc_mqtt::Client;
use tracing::{info, warn};

use super::{client_config, parse_qos, print_message};
use crate::Cli;

/// Subscribe to topics and print every message until Ctrl+C.
///
/// Messages are matched to topics exactly, so wildcard filters go through
/// `listen` instead.
#[derive(Args)]
pub struct SubscribeCommand {
    /// Topics to subscribe to
    #[arg(required = true)]
    topics: Vec<String>,

    /// QoS level (0, 1 or 2)
    #[arg(short = 'q', long, default_value_t = 0)]
    qos: u8,
}

impl SubscribeCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let qos = parse_qos(self.qos)?;
        for topic in &self.topics {
            check_exact_topic(topic)?;
        }
        let client = Client::builder(client_config(cli)?)
            .with_on_disconnect(|_ctx, event| {
                if !event.is_requested() {
                    warn!("Connection lost: {:?}", event.reason);
                }
            })
            .build()?;

        client.connect().await?;
        for topic in &self.topics {
            client.subscribe_with_qos(topic, qos, |_ctx, msg| {
                print_message(msg);
                Ok(())
            })?;
        }
        info!("Subscribed to {}", self.topics.join(", "));

        tokio::signal::ctrl_c().await?;

        info!("Disconnecting...");
        client.disconnect().await?;
        Ok(())
    }
}

/// Rejects topic filters with `+` or `#` wildcards.
pub(crate) fn check_exact_topic(topic: &str) -> anyhow::Result<()> {
    if topic.contains(['+', '#']) {
        bail!("wildcard topic '{topic}' is not supported by sub, use `mqttc listen '{topic}'`");
    }
    Ok(())
}
