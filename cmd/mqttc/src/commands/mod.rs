//! CLI commands module.

mod listen;
mod publish;
mod subscribe;

pub use listen::ListenCommand;
pub use publish::PublishCommand;
pub use subscribe::SubscribeCommand;

use iotc_mqtt::{ClientConfig, Message, QoS};

use crate::Cli;

/// Builds the client config from the config file and command line flags.
///
/// Flags override values from the file.
pub(crate) fn client_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::new(),
    };

    if let Some(host) = &cli.host {
        config.broker_host = host.clone();
    }
    if let Some(port) = cli.port {
        config.broker_port = port;
    }
    if let Some(id) = &cli.id {
        config.client_id = Some(id.clone());
    }
    if let Some(username) = &cli.username {
        config.username = Some(username.clone());
    }
    if let Some(password) = &cli.password {
        config.password = Some(password.clone());
    }
    Ok(config)
}

/// Parses a QoS level flag.
pub(crate) fn parse_qos(level: u8) -> anyhow::Result<QoS> {
    Ok(QoS::try_from(level)?)
}

/// Prints a received message as `topic payload`.
pub(crate) fn print_message(msg: &Message) {
    match msg.payload_str() {
        Some(text) => println!("{} {}", msg.topic, text),
        None => println!("{} <{} bytes>", msg.topic, msg.payload.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::subscribe::check_exact_topic;
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "mqttc", "--host", "broker.local", "--port", "1884", "--id", "cli-1", "-u", "admin",
            "pub", "a/b", "hello",
        ]);

        let config = client_config(&cli).unwrap();
        assert_eq!(config.broker_host, "broker.local");
        assert_eq!(config.broker_port, 1884);
        assert_eq!(config.client_id.as_deref(), Some("cli-1"));
        assert_eq!(config.username.as_deref(), Some("admin"));
        assert_eq!(config.password, None);
    }

    #[test]
    fn test_defaults_without_flags() {
        let cli = Cli::parse_from(["mqttc", "sub", "a/b"]);

        let config = client_config(&cli).unwrap();
        assert_eq!(config, ClientConfig::new());
    }

    #[test]
    fn test_parse_qos() {
        assert_eq!(parse_qos(2).unwrap(), QoS::ExactlyOnce);
        assert!(parse_qos(3).is_err());
    }

    #[test]
    fn test_sub_rejects_wildcards() {
        assert!(check_exact_topic("sensors/door").is_ok());

        let err = check_exact_topic("sensors/#").unwrap_err();
        assert!(err.to_string().contains("mqttc listen"));
        assert!(check_exact_topic("sensors/+/temp").is_err());
    }
}
