//! Listen command.

use clap::Args;
use iotc_mqtt::ClientBuilder;
use tracing::info;

use super::{client_config, print_message};
use crate::Cli;

/// Listen to a single topic at QoS 2.
#[derive(Args)]
pub struct ListenCommand {
    /// Topic to listen to
    topic: String,

    /// Drive the connection on the main task instead of in the background
    #[arg(long)]
    blocking: bool,
}

impl ListenCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let listener = ClientBuilder::new(client_config(cli)?).listen(&self.topic, |_ctx, msg| {
            print_message(msg);
            Ok(())
        })?;

        if self.blocking {
            tokio::select! {
                result = listener.run_forever() => result?,
                _ = tokio::signal::ctrl_c() => {}
            }
        } else {
            listener.connect().await?;
            info!("Listening on '{}'", listener.topic());
            tokio::signal::ctrl_c().await?;
        }

        info!("Disconnecting...");
        listener.disconnect().await?;
        Ok(())
    }
}
