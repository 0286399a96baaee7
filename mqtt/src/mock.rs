//! Recording engine and loopback broker used by unit tests.

use crate::engine::{ConnectEvent, DisconnectEvent, Engine, EngineFactory, EventHandler};
use crate::error::{Error, Result};
use crate::message::{Message, MessageSpec};
use crate::types::QoS;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// One capability call, in the order the wrapper made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Open(Option<String>),
    SetCredentials(String, Option<String>),
    SetWill(MessageSpec),
    Connect(String, u16),
    StartLoop,
    RunLoop,
    StopLoop,
    Close,
    Subscribe(String, QoS),
    Unsubscribe(String),
    Publish {
        topic: String,
        payload: Option<Vec<u8>>,
        qos: QoS,
        retain: bool,
    },
}

impl Call {
    pub(crate) fn publish(topic: &str, payload: Option<&[u8]>, qos: QoS, retain: bool) -> Self {
        Call::Publish {
            topic: topic.to_string(),
            payload: payload.map(<[u8]>::to_vec),
            qos,
            retain,
        }
    }
}

type CallLog = Arc<Mutex<Vec<Call>>>;

/// What the simulated broker does once the loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    ConnectImmediately,
    NeverConnect,
}

/// Factory handing out [`MockEngine`]s that share one call log.
#[derive(Clone)]
pub(crate) struct MockFactory {
    log: CallLog,
    behavior: Behavior,
    engines: Arc<Mutex<Vec<MockEngine>>>,
}

impl MockFactory {
    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            behavior,
            engines: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.log.lock().clone()
    }

    pub(crate) fn clear(&self) {
        self.log.lock().clear();
    }

    pub(crate) fn opened(&self) -> usize {
        self.engines.lock().len()
    }

    /// The most recently opened engine.
    pub(crate) fn engine(&self) -> MockEngine {
        self.engines
            .lock()
            .last()
            .cloned()
            .expect("no engine opened")
    }
}

impl EngineFactory for MockFactory {
    fn open(&self, client_id: Option<&str>) -> Result<Arc<dyn Engine>> {
        self.log.lock().push(Call::Open(client_id.map(str::to_string)));
        let engine = MockEngine::with_log(self.log.clone(), self.behavior);
        self.engines.lock().push(engine.clone());
        Ok(Arc::new(engine))
    }
}

/// Simulated engine connection.
#[derive(Clone)]
pub(crate) struct MockEngine {
    inner: Arc<MockInner>,
}

struct MockInner {
    log: CallLog,
    behavior: Behavior,
    handler: RwLock<Option<Arc<dyn EventHandler>>>,
    connected: AtomicBool,
    reject_requests: AtomicBool,
    loop_done: Notify,
}

impl MockEngine {
    fn with_log(log: CallLog, behavior: Behavior) -> Self {
        Self {
            inner: Arc::new(MockInner {
                log,
                behavior,
                handler: RwLock::new(None),
                connected: AtomicBool::new(false),
                reject_requests: AtomicBool::new(false),
                loop_done: Notify::new(),
            }),
        }
    }

    /// Standalone engine with its own log.
    pub(crate) fn connecting() -> Self {
        Self::with_log(Arc::new(Mutex::new(Vec::new())), Behavior::ConnectImmediately)
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.inner.log.lock().clone()
    }

    fn record(&self, call: Call) {
        self.inner.log.lock().push(call);
    }

    fn handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.inner.handler.read().clone()
    }

    /// Make publish/subscribe/unsubscribe fail.
    pub(crate) fn reject_requests(&self) {
        self.inner.reject_requests.store(true, Ordering::SeqCst);
    }

    fn check_requests(&self) -> Result<()> {
        if self.inner.reject_requests.load(Ordering::SeqCst) {
            return Err(Error::Engine("request rejected".into()));
        }
        Ok(())
    }

    /// Simulate a CONNACK.
    pub(crate) fn emit_connect(&self) {
        self.inner.connected.store(true, Ordering::SeqCst);
        if let Some(handler) = self.handler() {
            handler.on_connect(self, &ConnectEvent::default());
        }
    }

    /// Simulate an incoming publication.
    pub(crate) fn emit_message(&self, msg: Message) {
        if let Some(handler) = self.handler() {
            handler.on_message(self, &msg);
        }
    }

    /// Simulate losing the connection; ends a blocking loop.
    pub(crate) fn drop_connection(&self, cause: &str) {
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            if let Some(handler) = self.handler() {
                handler.on_disconnect(self, &DisconnectEvent::lost(cause));
            }
        }
        self.inner.loop_done.notify_one();
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn set_handler(&self, handler: Arc<dyn EventHandler>) {
        *self.inner.handler.write() = Some(handler);
    }

    fn set_credentials(&self, username: &str, password: Option<&str>) -> Result<()> {
        self.record(Call::SetCredentials(
            username.to_string(),
            password.map(str::to_string),
        ));
        Ok(())
    }

    fn set_will(&self, will: &MessageSpec) -> Result<()> {
        self.record(Call::SetWill(will.clone()));
        Ok(())
    }

    fn connect(&self, host: &str, port: u16) -> Result<()> {
        self.record(Call::Connect(host.to_string(), port));
        Ok(())
    }

    fn start_loop(&self) -> Result<()> {
        self.record(Call::StartLoop);
        if self.inner.behavior == Behavior::ConnectImmediately {
            self.emit_connect();
        }
        Ok(())
    }

    async fn run_loop(&self) -> Result<()> {
        self.record(Call::RunLoop);
        if self.inner.behavior == Behavior::ConnectImmediately {
            self.emit_connect();
        }
        self.inner.loop_done.notified().await;
        Ok(())
    }

    async fn stop_loop(&self) -> Result<()> {
        self.record(Call::StopLoop);
        self.inner.loop_done.notify_one();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record(Call::Close);
        if self.inner.connected.swap(false, Ordering::SeqCst) {
            if let Some(handler) = self.handler() {
                handler.on_disconnect(self, &DisconnectEvent::requested());
            }
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        self.check_requests()?;
        self.record(Call::Subscribe(topic.to_string(), qos));
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.check_requests()?;
        self.record(Call::Unsubscribe(topic.to_string()));
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Option<&[u8]>, qos: QoS, retain: bool) -> Result<()> {
        self.check_requests()?;
        self.record(Call::publish(topic, payload, qos, retain));
        Ok(())
    }
}

pub(crate) const CONNECT: u8 = 1;
pub(crate) const DISCONNECT: u8 = 14;

/// MQTT broker on a loopback port that accepts one client.
///
/// It acknowledges CONNECT and records the type of every packet it reads
/// until the client closes the socket.
pub(crate) struct FakeBroker {
    port: u16,
    handle: JoinHandle<Vec<u8>>,
}

impl FakeBroker {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut types = Vec::new();
            while let Some(kind) = read_packet_type(&mut stream).await {
                types.push(kind);
                if kind == CONNECT {
                    // CONNACK, session not present, accepted
                    stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
                }
            }
            types
        });

        Self { port, handle }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Wait for the client to close the socket and return the packet types.
    pub(crate) async fn packet_types(self) -> Vec<u8> {
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("client never closed the socket")
            .unwrap()
    }
}

async fn read_packet_type(stream: &mut TcpStream) -> Option<u8> {
    let header = stream.read_u8().await.ok()?;

    let mut len = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await.ok()?;
        len |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }

    let mut body = vec![0; len];
    stream.read_exact(&mut body).await.ok()?;
    Some(header >> 4)
}
