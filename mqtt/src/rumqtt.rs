//! Protocol engine backed by rumqttc.
//!
//! The rumqttc `EventLoop` owns the socket. `start_loop` moves it into a
//! tokio task and `run_loop` drives it on the caller's task. `stop_loop`
//! cancels either one and waits until the loop is parked again so that
//! `close` can flush the DISCONNECT packet through it.

use crate::engine::{ConnectEvent, DisconnectEvent, Engine, EngineFactory, EventHandler};
use crate::error::{Error, Result};
use crate::message::{Message, MessageSpec};
use crate::types::QoS;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
const DEFAULT_CAPACITY: usize = 100;
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Opens [`RumqttcEngine`] connections.
#[derive(Debug, Clone)]
pub struct RumqttcFactory {
    keep_alive: Duration,
    capacity: usize,
}

impl Default for RumqttcFactory {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl RumqttcFactory {
    /// Create a factory with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the keep-alive interval (at least 5 seconds).
    pub fn with_keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = Duration::from_secs(seconds as u64);
        self
    }

    /// Set the request channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

impl EngineFactory for RumqttcFactory {
    fn open(&self, client_id: Option<&str>) -> Result<Arc<dyn Engine>> {
        let id = client_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!("opening rumqttc engine for client {}", id);
        Ok(Arc::new(RumqttcEngine::new(id, self.keep_alive, self.capacity)))
    }
}

/// rumqttc connection handle.
#[derive(Clone)]
pub struct RumqttcEngine {
    shared: Arc<Shared>,
}

struct Shared {
    client_id: String,
    keep_alive: Duration,
    capacity: usize,
    handler: RwLock<Option<Arc<dyn EventHandler>>>,
    credentials: Mutex<Option<(String, String)>>,
    will: Mutex<Option<LastWill>>,
    client: Mutex<Option<AsyncClient>>,
    event_loop: Mutex<Option<EventLoop>>,
    task: Mutex<Option<LoopTask>>,
    connected: AtomicBool,
}

struct LoopTask {
    cancel: CancellationToken,
    runner: LoopRunner,
}

enum LoopRunner {
    /// Spawned by `start_loop`, hands the loop back on join.
    Spawned(JoinHandle<(EventLoop, Result<()>)>),
    /// Driven by `run_loop`, signals once the loop is parked. The sender is
    /// dropped without a signal when the `run_loop` future itself is dropped.
    Blocking(oneshot::Receiver<()>),
}

impl Shared {
    fn handler(&self) -> Option<Arc<dyn EventHandler>> {
        self.handler.read().clone()
    }

    fn client(&self) -> Result<AsyncClient> {
        self.client.lock().clone().ok_or(Error::NotConnected)
    }

    fn mark_disconnected(&self, engine: &dyn Engine, event: DisconnectEvent) {
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Some(handler) = self.handler() {
                handler.on_disconnect(engine, &event);
            }
        }
    }
}

impl RumqttcEngine {
    fn new(client_id: String, keep_alive: Duration, capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                client_id,
                keep_alive,
                capacity,
                handler: RwLock::new(None),
                credentials: Mutex::new(None),
                will: Mutex::new(None),
                client: Mutex::new(None),
                event_loop: Mutex::new(None),
                task: Mutex::new(None),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Client identifier presented to the broker.
    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    /// Whether the broker has acknowledged the connection.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn take_event_loop(&self) -> Result<EventLoop> {
        self.shared
            .event_loop
            .lock()
            .take()
            .ok_or_else(|| Error::Engine("event loop is not available, call connect first".into()))
    }

    async fn drive(
        self,
        mut event_loop: EventLoop,
        cancel: CancellationToken,
    ) -> (EventLoop, Result<()>) {
        let shared = &self.shared;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => None,
                event = event_loop.poll() => Some(event),
            };
            let Some(event) = event else {
                debug!("event loop stop requested");
                return (event_loop, Ok(()));
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to MQTT broker as {}", shared.client_id);
                    shared.connected.store(true, Ordering::SeqCst);
                    if let Some(handler) = shared.handler() {
                        let event = ConnectEvent {
                            session_present: ack.session_present,
                        };
                        handler.on_connect(&self, &event);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!("Received message on topic: {}", publish.topic);
                    let msg = Message::from(publish);
                    if let Some(handler) = shared.handler() {
                        handler.on_message(&self, &msg);
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(suback))) => {
                    debug!("Subscription acknowledged: {:?}", suback);
                }
                Ok(Event::Incoming(Packet::PubAck(puback))) => {
                    debug!("Publish acknowledged: {}", puback.pkid);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Disconnected by broker");
                    shared.mark_disconnected(&self, DisconnectEvent::lost("broker sent disconnect"));
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Event loop error: {}", e);
                    shared.mark_disconnected(&self, DisconnectEvent::lost(e.to_string()));
                    return (event_loop, Err(e.into()));
                }
            }
        }
    }
}

#[async_trait]
impl Engine for RumqttcEngine {
    fn set_handler(&self, handler: Arc<dyn EventHandler>) {
        *self.shared.handler.write() = Some(handler);
    }

    fn set_credentials(&self, username: &str, password: Option<&str>) -> Result<()> {
        *self.shared.credentials.lock() =
            Some((username.to_string(), password.unwrap_or_default().to_string()));
        Ok(())
    }

    fn set_will(&self, will: &MessageSpec) -> Result<()> {
        *self.shared.will.lock() = Some(LastWill::new(
            &will.topic,
            will.payload_bytes().to_vec(),
            will.qos.into(),
            will.retain,
        ));
        Ok(())
    }

    fn connect(&self, host: &str, port: u16) -> Result<()> {
        let mut client_slot = self.shared.client.lock();
        if client_slot.is_some() {
            return Err(Error::Engine("engine is already connected".into()));
        }

        let mut options = MqttOptions::new(&self.shared.client_id, host, port);
        options.set_keep_alive(self.shared.keep_alive);
        if let Some((username, password)) = self.shared.credentials.lock().clone() {
            options.set_credentials(username, password);
        }
        if let Some(will) = self.shared.will.lock().clone() {
            options.set_last_will(will);
        }

        debug!("connecting to mqtt://{}:{}", host, port);
        let (client, event_loop) = AsyncClient::new(options, self.shared.capacity);
        *client_slot = Some(client);
        *self.shared.event_loop.lock() = Some(event_loop);
        Ok(())
    }

    fn start_loop(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Engine(format!("no tokio runtime: {e}")))?;
        let event_loop = self.take_event_loop()?;

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(self.clone().drive(event_loop, cancel.clone()));
        *self.shared.task.lock() = Some(LoopTask {
            cancel,
            runner: LoopRunner::Spawned(handle),
        });
        Ok(())
    }

    async fn run_loop(&self) -> Result<()> {
        let event_loop = self.take_event_loop()?;

        let cancel = CancellationToken::new();
        let (parked_tx, parked_rx) = oneshot::channel();
        *self.shared.task.lock() = Some(LoopTask {
            cancel: cancel.clone(),
            runner: LoopRunner::Blocking(parked_rx),
        });

        let (event_loop, result) = self.clone().drive(event_loop, cancel).await;
        self.shared.task.lock().take();
        *self.shared.event_loop.lock() = Some(event_loop);
        let _ = parked_tx.send(());
        result
    }

    async fn stop_loop(&self) -> Result<()> {
        let task = self.shared.task.lock().take();
        let Some(task) = task else {
            return Ok(());
        };

        task.cancel.cancel();
        match task.runner {
            LoopRunner::Spawned(handle) => {
                let (event_loop, _) = handle
                    .await
                    .map_err(|e| Error::Engine(format!("event loop task failed: {e}")))?;
                *self.shared.event_loop.lock() = Some(event_loop);
            }
            LoopRunner::Blocking(parked) => {
                if parked.await.is_err() {
                    debug!("blocking event loop was dropped before it stopped");
                }
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let client = self.shared.client.lock().take();
        let Some(client) = client else {
            return Ok(());
        };

        let sent = client.try_disconnect();
        let event_loop = self.shared.event_loop.lock().take();
        let Some(mut event_loop) = event_loop else {
            // The loop went away with its socket, nothing is left to close.
            if let Err(e) = sent {
                debug!("disconnect not sent, event loop already dropped: {}", e);
            }
            self.shared.mark_disconnected(self, DisconnectEvent::requested());
            return Ok(());
        };

        if sent.is_ok() && self.is_connected() {
            let flush = async {
                loop {
                    match event_loop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            };
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, flush).await.is_err() {
                warn!("timed out flushing disconnect to broker");
            }
        }

        self.shared.mark_disconnected(self, DisconnectEvent::requested());
        sent.map_err(Error::from)
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        self.shared.client()?.try_subscribe(topic, qos.into())?;
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.shared.client()?.try_unsubscribe(topic)?;
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Option<&[u8]>, qos: QoS, retain: bool) -> Result<()> {
        let payload = payload.unwrap_or_default().to_vec();
        self.shared
            .client()?
            .try_publish(topic, qos.into(), retain, payload)?;
        Ok(())
    }
}
