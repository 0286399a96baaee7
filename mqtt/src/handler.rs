//! Caller callbacks.
//!
//! Every callback receives an [`EventContext`] (the engine that raised the
//! event plus the caller's userdata) and a typed event payload.

use crate::engine::{ConnectEvent, DisconnectEvent, Engine};
use crate::error::Result;
use crate::message::Message;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Caller-owned value handed to every callback.
pub type Userdata = Arc<dyn Any + Send + Sync>;

/// Context passed to callbacks.
#[derive(Clone, Copy)]
pub struct EventContext<'a> {
    engine: &'a dyn Engine,
    userdata: Option<&'a Userdata>,
}

impl<'a> EventContext<'a> {
    pub(crate) fn new(engine: &'a dyn Engine, userdata: Option<&'a Userdata>) -> Self {
        Self { engine, userdata }
    }

    /// The engine that raised the event. Publishing through it does not block.
    pub fn engine(&self) -> &'a dyn Engine {
        self.engine
    }

    /// The userdata, if it was set and has type `T`.
    pub fn userdata<T: Any + Send + Sync>(&self) -> Option<&'a T> {
        self.userdata.and_then(|u| u.downcast_ref::<T>())
    }
}

impl fmt::Debug for EventContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("userdata", &self.userdata.is_some())
            .finish()
    }
}

/// Called after the broker accepts a connection.
pub type ConnectHook = dyn Fn(&EventContext<'_>, &ConnectEvent) + Send + Sync;

/// Called after a connection ends.
pub type DisconnectHook = dyn Fn(&EventContext<'_>, &DisconnectEvent) + Send + Sync;

/// Handler trait for processing MQTT messages.
pub trait Handler: Send + Sync {
    /// Handle an incoming MQTT message.
    fn handle_message(&self, ctx: &EventContext<'_>, msg: &Message) -> Result<()>;
}

/// Handler function type.
pub type HandlerFunc = dyn Fn(&EventContext<'_>, &Message) -> Result<()> + Send + Sync;

/// Wrapper for handler functions.
pub(crate) struct FnHandler {
    f: Box<HandlerFunc>,
}

impl FnHandler {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: Fn(&EventContext<'_>, &Message) -> Result<()> + Send + Sync + 'static,
    {
        Self { f: Box::new(f) }
    }
}

impl Handler for FnHandler {
    fn handle_message(&self, ctx: &EventContext<'_>, msg: &Message) -> Result<()> {
        (self.f)(ctx, msg)
    }
}
