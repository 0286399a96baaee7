//! Additional tests for the MQTT client wrapper.
//!
//! Note: tests that need a running broker live in the mqttc command.
//! These tests drive the client through the recording mock engine.

#[cfg(test)]
mod additional_tests {
    use crate::mock::{Behavior, CONNECT, Call, DISCONNECT, FakeBroker, MockFactory};
    use crate::{
        Client, ClientBuilder, ClientConfig, Error, MessageSpec, MessageTemplate, QoS,
    };
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = Error::NotConnected;
        assert_eq!(format!("{}", err), "mqtt: not connected");

        let err = Error::Config("must provide username if using password".to_string());
        assert!(format!("{}", err).contains("username"));
        assert!(err.is_config());
    }

    #[tokio::test]
    async fn test_default_birth_without_client_id() {
        let factory = MockFactory::new(Behavior::ConnectImmediately);
        let client = Client::builder(ClientConfig::new())
            .with_factory(factory.clone())
            .build()
            .unwrap();

        client.connect().await.unwrap();

        let calls = factory.calls();
        assert_eq!(calls[0], Call::Open(None));
        assert!(calls.contains(&Call::SetWill(MessageSpec {
            topic: "clients//connected".into(),
            payload: Some("0".into()),
            qos: QoS::AtLeastOnce,
            retain: true,
        })));
        assert!(calls.contains(&Call::publish(
            "clients//connected",
            Some(b"1"),
            QoS::AtLeastOnce,
            true
        )));
        assert!(!calls.iter().any(|c| matches!(c, Call::SetCredentials(..))));
    }

    #[tokio::test]
    async fn test_custom_will_topic_only() {
        let factory = MockFactory::new(Behavior::ConnectImmediately);
        let client = Client::builder(
            ClientConfig::new().with_will_message(MessageTemplate::new("dev/gone")),
        )
        .with_factory(factory.clone())
        .build()
        .unwrap();

        client.connect().await.unwrap();

        assert!(factory.calls().contains(&Call::SetWill(MessageSpec {
            topic: "dev/gone".into(),
            payload: None,
            qos: QoS::AtMostOnce,
            retain: false,
        })));
        assert_eq!(client.settings().will_message.topic, "dev/gone");
    }

    #[tokio::test]
    async fn test_lost_connection_waits_for_caller() {
        let factory = MockFactory::new(Behavior::ConnectImmediately);
        let client = Client::builder(ClientConfig::new().with_client_id("c"))
            .with_factory(factory.clone())
            .build()
            .unwrap();
        client.connect().await.unwrap();

        factory.engine().drop_connection("keep-alive timeout");
        tokio::task::yield_now().await;

        assert!(!client.is_connected());
        assert_eq!(factory.opened(), 1);
    }

    #[test]
    fn test_mock_engine_log_is_per_engine() {
        use crate::engine::Engine;

        let engine = crate::mock::MockEngine::connecting();
        engine.subscribe("x", QoS::AtMostOnce).unwrap();
        assert_eq!(engine.calls(), vec![Call::Subscribe("x".into(), QoS::AtMostOnce)]);
    }

    #[tokio::test]
    async fn test_disconnect_after_dropping_run_forever() {
        let broker = FakeBroker::start().await;
        let listener = ClientBuilder::new(
            ClientConfig::new()
                .with_broker("127.0.0.1", broker.port())
                .with_client_id("door-1"),
        )
        .listen("doors/front", |_ctx, _msg| Ok(()))
        .unwrap();

        tokio::select! {
            result = listener.run_forever() => panic!("loop ended early: {:?}", result),
            _ = async {
                while !listener.is_connected() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            } => {}
        }

        listener.disconnect().await.unwrap();
        assert!(!listener.is_connected());
        assert!(!listener.has_engine());

        let types = broker.packet_types().await;
        assert_eq!(types.first(), Some(&CONNECT));
        assert!(!types.contains(&DISCONNECT));
    }

    #[tokio::test]
    async fn test_disconnect_stops_run_forever_cleanly() {
        let broker = FakeBroker::start().await;
        let client = std::sync::Arc::new(
            Client::builder(
                ClientConfig::new()
                    .with_broker("127.0.0.1", broker.port())
                    .with_client_id("door-2"),
            )
            .build()
            .unwrap(),
        );

        let runner = client.clone();
        let task = tokio::spawn(async move { runner.run_forever().await });
        while !client.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        client.disconnect().await.unwrap();
        task.await.unwrap().unwrap();

        let types = broker.packet_types().await;
        assert_eq!(types.first(), Some(&CONNECT));
        assert_eq!(types.last(), Some(&DISCONNECT));
    }
}
