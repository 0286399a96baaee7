//! mqttc - A command line MQTT client.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{ListenCommand, PublishCommand, SubscribeCommand};

/// mqttc - A command line MQTT client.
///
/// Connects with a birth message on `clients/<id>/connected` and a matching
/// will message unless the config file sets others.
#[derive(Parser)]
#[command(name = "mqttc")]
#[command(about = "MQTT client tool")]
#[command(version)]
pub struct Cli {
    /// Client config file (YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Broker host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Broker port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Client ID
    #[arg(long, global = true)]
    pub id: Option<String>,

    /// Username
    #[arg(short = 'u', long, global = true)]
    pub username: Option<String>,

    /// Password (requires a username)
    #[arg(short = 'P', long, global = true)]
    pub password: Option<String>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a message
    Pub(PublishCommand),
    /// Subscribe to topics and print messages
    Sub(SubscribeCommand),
    /// Listen to a single topic
    Listen(ListenCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match &cli.command {
        Commands::Pub(cmd) => cmd.run(&cli).await,
        Commands::Sub(cmd) => cmd.run(&cli).await,
        Commands::Listen(cmd) => cmd.run(&cli).await,
    }
}
